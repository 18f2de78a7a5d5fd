use benchtrack_store::SeriesPoint;
use serde::{Deserialize, Serialize};
use serde_repr::*;
use std::collections::BTreeMap;
use tracing::debug;

/// whether larger or smaller values of a metric indicate worse performance
///
/// Polarity is supplied per metric through configuration; it is never
/// inferred from the unit string, several of which share a polarity without
/// saying so ("s" and "-" are both larger-is-worse, "mm" depends on the
/// metric).
#[derive(Serialize_repr, Deserialize_repr, PartialEq, Eq, Debug, Clone, Copy)]
#[repr(i8)]
pub enum Polarity {
    SmallerIsWorse = -1,
    LargerIsWorse = 1,
}

impl Polarity {
    /// whether a candidate deviating from the baseline mean in this
    /// direction is a degradation
    fn is_adverse(self, candidate: f64, mean: f64) -> bool {
        match self {
            Self::LargerIsWorse => candidate > mean,
            Self::SmallerIsWorse => candidate < mean,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct EvaluatorConfig {
    /// number of trailing accepted points forming the rolling baseline
    #[serde(default = "default_window")]
    pub window: usize,

    /// threshold multiplier k; a point regresses when it deviates from the
    /// baseline mean by more than k standard deviations in the adverse
    /// direction
    #[serde(default = "default_threshold")]
    pub threshold: f64,

    /// per-metric polarity table, keyed by bench name
    #[serde(default)]
    pub polarity: BTreeMap<String, Polarity>,

    /// fallback for benches missing from the table; leaving this unset
    /// means such benches are not judged at all
    #[serde(default)]
    pub default_polarity: Option<Polarity>,
}

impl EvaluatorConfig {
    pub fn polarity_of(&self, bench: &str) -> Option<Polarity> {
        self.polarity.get(bench).copied().or(self.default_polarity)
    }
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            window: default_window(),
            threshold: default_threshold(),
            polarity: BTreeMap::new(),
            default_polarity: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    NoRegression,
    Regression,
    /// fewer than two baseline points; no verdict rather than a false one
    Insufficient,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Evaluation {
    pub verdict: Verdict,
    /// signed distance of the candidate from the baseline mean
    pub delta: f64,
    /// the k·σ bound the candidate was measured against
    pub threshold_used: f64,
}

impl Evaluation {
    fn insufficient() -> Self {
        Self {
            verdict: Verdict::Insufficient,
            delta: 0.0,
            threshold_used: 0.0,
        }
    }
}

/// Decides whether a new series point is a statistically meaningful
/// regression against its rolling baseline. Pure; acting on a verdict is
/// the caller's business.
#[derive(Clone, Debug)]
pub struct Evaluator {
    config: EvaluatorConfig,
}

impl Evaluator {
    pub fn new(config: EvaluatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    /// judge a candidate value against an explicit baseline window
    ///
    /// A constant window (σ = 0) flags any adverse non-equal candidate: a
    /// step away from a constant is a norm break whatever its magnitude.
    #[tracing::instrument(level = "debug", skip(self, window))]
    pub fn judge(&self, window: &[f64], candidate: f64, polarity: Polarity) -> Evaluation {
        if window.len() < 2 {
            return Evaluation::insufficient();
        }

        let mean = window.iter().sum::<f64>() / window.len() as f64;
        let variance = window
            .iter()
            .map(|value| (value - mean) * (value - mean))
            .sum::<f64>()
            / (window.len() - 1) as f64;
        let deviation = variance.sqrt();

        let delta = candidate - mean;
        let threshold_used = self.config.threshold * deviation;
        let adverse = polarity.is_adverse(candidate, mean);

        let regressed = if deviation == 0.0 {
            adverse && candidate != mean
        } else {
            adverse && delta.abs() > threshold_used
        };

        debug!(
            mean = mean,
            deviation = deviation,
            delta = delta,
            adverse = adverse,
            "Judged candidate against rolling baseline"
        );

        Evaluation {
            verdict: if regressed {
                Verdict::Regression
            } else {
                Verdict::NoRegression
            },
            delta,
            threshold_used,
        }
    }

    /// judge the newest series point against the trailing window of up to
    /// `window` preceding points, in timestamp order
    pub fn judge_latest(&self, points: &[SeriesPoint], polarity: Polarity) -> Evaluation {
        match points.split_last() {
            Some((candidate, preceding)) => self.judge_at(preceding, candidate.value, polarity),
            None => Evaluation::insufficient(),
        }
    }

    /// judge a candidate against the tail of `preceding`
    pub fn judge_at(
        &self,
        preceding: &[SeriesPoint],
        candidate: f64,
        polarity: Polarity,
    ) -> Evaluation {
        let start = preceding.len().saturating_sub(self.config.window);
        let window: Vec<f64> = preceding[start..].iter().map(|point| point.value).collect();

        self.judge(&window, candidate, polarity)
    }
}

fn default_window() -> usize {
    5
}

fn default_threshold() -> f64 {
    2.0
}
