use crate::config::{RetryPolicy, TrackerConfig};
use benchtrack_analysis::Polarity;
use benchtrack_store::{DedupKey, SnapshotFormat};
use std::time::Duration;

#[test]
pub fn empty_mapping_yields_the_documented_defaults() {
    let config: TrackerConfig = serde_yaml::from_str("{}").unwrap();

    assert_eq!(config.evaluator.window, 5);
    assert_eq!(config.evaluator.threshold, 2.0);
    assert_eq!(config.store.dedup, DedupKey::CommitId);
    assert_eq!(config.store.format, SnapshotFormat::Json);
    assert_eq!(config.retry.attempts, 3);
    assert_eq!(config.retry.base_delay_ms, 50);
}

#[test]
pub fn full_configuration_parses() {
    let config: TrackerConfig = serde_yaml::from_str(
        r#"
store:
  path: history.data.js
  format: data-js
  dedup: commit-id-and-date
  repo_url: https://github.com/Ultimaker/CuraEngine
  lock_timeout_ms: 500
evaluator:
  window: 3
  threshold: 3.5
  polarity:
    "Print time squaring.gcode": 1
    "Minimum Line Length squaring.gcode": -1
retry:
  attempts: 5
  base_delay_ms: 10
"#,
    )
    .unwrap();

    assert_eq!(config.store.dedup, DedupKey::CommitIdAndDate);
    assert_eq!(config.store.format, SnapshotFormat::DataJs);
    assert_eq!(config.store.lock_timeout_ms, 500);
    assert_eq!(config.evaluator.window, 3);
    assert_eq!(
        config.evaluator.polarity_of("Print time squaring.gcode"),
        Some(Polarity::LargerIsWorse)
    );
    assert_eq!(
        config
            .evaluator
            .polarity_of("Minimum Line Length squaring.gcode"),
        Some(Polarity::SmallerIsWorse)
    );
    assert_eq!(config.evaluator.polarity_of("unlisted"), None);
    assert_eq!(config.retry.attempts, 5);
}

#[test]
pub fn unknown_keys_are_refused() {
    let parsed = serde_yaml::from_str::<TrackerConfig>("stroe: {}");

    assert!(parsed.is_err());
}

#[test]
pub fn preflight_catches_degenerate_settings() {
    let mut zero_window: TrackerConfig = serde_yaml::from_str("evaluator: { window: 0 }").unwrap();
    assert!(zero_window.preflight_checks());

    let mut bad_threshold: TrackerConfig =
        serde_yaml::from_str("evaluator: { threshold: -1.0 }").unwrap();
    assert!(bad_threshold.preflight_checks());

    let mut no_attempts: TrackerConfig = serde_yaml::from_str("retry: { attempts: 0 }").unwrap();
    assert!(no_attempts.preflight_checks());

    let mut fine: TrackerConfig = serde_yaml::from_str("{}").unwrap();
    assert!(!fine.preflight_checks());
}

#[test]
pub fn backoff_delays_double_between_attempts() {
    let retry = RetryPolicy {
        attempts: 4,
        base_delay_ms: 50,
    };

    let delays: Vec<Duration> = retry.delays().collect();

    assert_eq!(
        delays,
        [
            Duration::from_millis(50),
            Duration::from_millis(100),
            Duration::from_millis(200)
        ]
    );
}

#[test]
pub fn backoff_delays_saturate_instead_of_overflowing() {
    let retry = RetryPolicy {
        attempts: 100,
        base_delay_ms: u64::MAX / 2,
    };

    // the doubling would overflow long before the last attempt
    let last = retry.delays().last().unwrap();

    assert_eq!(last, Duration::from_millis(u64::MAX));
}
