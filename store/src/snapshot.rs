use crate::record::CommitRecord;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs, path::Path};
use thiserror::Error;
use tracing::{debug, info};

/// prefix the external chart renderer expects in front of the JSON body
pub const DATA_JS_PREFIX: &str = "window.BENCHMARK_DATA = ";

/// the complete at-rest history: a mapping from tool name to its ordered
/// list of commit records, plus bookkeeping consumed by the renderer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// epoch milliseconds of the last accepted append
    #[serde(rename = "lastUpdate")]
    pub last_update: i64,
    #[serde(rename = "repoUrl")]
    pub repo_url: String,
    pub entries: BTreeMap<String, Vec<CommitRecord>>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SnapshotFormat {
    #[default]
    Json,
    /// JSON body assigned to `window.BENCHMARK_DATA`, the shape the static
    /// site loads directly
    DataJs,
}

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("failed to access the snapshot file")]
    Io(#[from] std::io::Error),
    #[error("failed to decode the snapshot body")]
    Decode(#[from] serde_json::Error),
}

impl Snapshot {
    pub fn empty(repo_url: String) -> Self {
        Self {
            last_update: 0,
            repo_url,
            entries: BTreeMap::new(),
        }
    }
}

/// read a snapshot, accepting both raw JSON and the data.js wrapper
pub fn read(path: &Path) -> Result<Snapshot, SnapshotError> {
    let raw = fs::read_to_string(path)?;
    let body = strip_wrapper(&raw);

    let snapshot: Snapshot = serde_json::from_str(body)?;

    info!(
        path = %path.display(),
        tools = snapshot.entries.len(),
        "Loaded snapshot"
    );

    Ok(snapshot)
}

pub fn write(path: &Path, snapshot: &Snapshot, format: SnapshotFormat) -> Result<(), SnapshotError> {
    let body = serde_json::to_string_pretty(snapshot)?;

    let rendered = match format {
        SnapshotFormat::Json => body,
        SnapshotFormat::DataJs => format!("{DATA_JS_PREFIX}{body}"),
    };

    fs::write(path, rendered)?;
    debug!(path = %path.display(), "Wrote snapshot");

    Ok(())
}

/// strip the `window.BENCHMARK_DATA = ` assignment and a trailing semicolon
/// if present, leaving the JSON body untouched otherwise
fn strip_wrapper(raw: &str) -> &str {
    let body = raw.trim();

    match body.strip_prefix("window.BENCHMARK_DATA") {
        Some(rest) => rest
            .trim_start()
            .strip_prefix('=')
            .unwrap_or(rest)
            .trim_start()
            .trim_end_matches(';'),
        None => body,
    }
}
