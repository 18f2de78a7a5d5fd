pub mod config;
pub mod history;
pub mod query;
pub mod record;
pub mod snapshot;

#[cfg(test)]
mod testutil;

pub use config::{DedupKey, StoreConfig};
pub use history::{AppendError, HistoryStore, QueryError, RecordOrder, SeriesPoint, StoreError};
pub use record::{Bench, CommitMeta, CommitRecord, Person};
pub use snapshot::{Snapshot, SnapshotFormat};
