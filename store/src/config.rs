use crate::snapshot::SnapshotFormat;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, str::FromStr, time::Duration};

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// snapshot file holding the at-rest history
    #[serde(default = "default_snapshot_path")]
    pub path: PathBuf,

    /// on-disk flavour of the snapshot, raw JSON or the renderer's
    /// `window.BENCHMARK_DATA = ...` wrapper
    #[serde(default)]
    pub format: SnapshotFormat,

    /// identity key for commit records within a partition
    #[serde(default)]
    pub dedup: DedupKey,

    /// upstream repository URL recorded in freshly created snapshots
    #[serde(default)]
    pub repo_url: String,

    /// bounded wait for a partition write lock before an append gives up
    /// with a retryable error
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

/// which fields identify a commit record within its partition
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum DedupKey {
    /// one record per commit hash; re-submissions are duplicates
    #[default]
    CommitId,
    /// a re-run of the same commit at a different submission date is an
    /// intentional new point, not a duplicate
    CommitIdAndDate,
}

impl StoreConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_snapshot_path(),
            format: SnapshotFormat::default(),
            dedup: DedupKey::default(),
            repo_url: String::new(),
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

fn default_snapshot_path() -> PathBuf {
    PathBuf::from_str("benchtrack.json").unwrap()
}

fn default_lock_timeout_ms() -> u64 {
    2000
}
