use benchtrack_analysis::EvaluatorConfig;
use benchtrack_store::StoreConfig;
use serde::{Deserialize, Serialize};
use std::{fs::File, path::Path, time::Duration};
use thiserror::Error;
use tracing::{error, warn};

#[derive(Error, Debug)]
pub enum ConfigErrors {
    #[error("failed to read the configuration file")]
    Io(#[from] std::io::Error),
    #[error("failed to parse the configuration")]
    Parse(#[from] serde_yaml::Error),
    #[error("configuration failed preflight checks")]
    FailedPreflight,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct TrackerConfig {
    #[serde(default, alias = "db")]
    pub store: StoreConfig,

    #[serde(default)]
    pub evaluator: EvaluatorConfig,

    #[serde(default)]
    pub retry: RetryPolicy,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct RetryPolicy {
    /// total append attempts before a partition lock timeout becomes fatal
    /// for that record
    #[serde(default = "default_attempts")]
    pub attempts: u32,

    /// first backoff delay in milliseconds, doubled after every contended
    /// attempt
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl RetryPolicy {
    /// backoff delays between attempts: base, 2x base, 4x base, ...,
    /// saturating at `u64::MAX` milliseconds for degenerate settings
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        let base = self.base_delay_ms;

        (0..self.attempts.saturating_sub(1)).map(move |attempt| {
            Duration::from_millis(base.saturating_mul(2u64.saturating_pow(attempt)))
        })
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

impl TrackerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigErrors> {
        let file = File::open(path)?;
        let mut config: TrackerConfig = serde_yaml::from_reader(file)?;

        if config.preflight_checks() {
            return Err(ConfigErrors::FailedPreflight);
        }

        Ok(config)
    }

    /// attempt to catch all errors instead of piece-by-piece to make
    /// debugging easier for users
    pub fn preflight_checks(&mut self) -> bool {
        let mut contains_error = false;

        if self.evaluator.window == 0 {
            error!("evaluator.window cannot be 0, the rolling baseline would be empty");
            contains_error = true;
        }

        if self.evaluator.threshold.is_nan() || self.evaluator.threshold <= 0.0 {
            error!("evaluator.threshold must be a positive number");
            contains_error = true;
        }

        if self.evaluator.polarity.is_empty() && self.evaluator.default_polarity.is_none() {
            warn!("No polarity is configured, no series can be judged for regressions");
        }

        if self.retry.attempts == 0 {
            error!("retry.attempts cannot be 0, an append would never run");
            contains_error = true;
        }

        if self.store.lock_timeout_ms == 0 {
            warn!("store.lock_timeout_ms is 0, contended appends fail without waiting");
        }

        contains_error
    }
}

fn default_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    50
}
