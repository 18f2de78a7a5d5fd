use crate::{
    config::{DedupKey, StoreConfig},
    record::CommitRecord,
    snapshot::{self, Snapshot, SnapshotError},
};
use parking_lot::RwLock;
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum AppendError {
    #[error("commit {commit_id} is already recorded for {tool}")]
    DuplicateCommit { tool: String, commit_id: String },
    #[error("bench {bench} is recorded with unit {expected:?} but the record carries {found:?}")]
    UnitMismatch {
        bench: String,
        expected: String,
        found: String,
    },
    #[error("bench {bench} carries the non-finite value {value}")]
    InvalidValue { bench: String, value: f64 },
    #[error("bench {bench} appears twice in one record")]
    DuplicateBench { bench: String },
    #[error("timed out waiting for the {tool} partition lock")]
    LockTimeout { tool: String },
}

impl AppendError {
    /// duplicates leave the partition unchanged and ingestion may continue
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateCommit { .. })
    }

    /// lock timeouts carry no data change and are worth retrying with backoff
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LockTimeout { .. })
    }
}

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("no matching record in the history")]
    NotFound,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("snapshot failure")]
    Snapshot(#[from] SnapshotError),
}

/// one point of a metric series, projected out of a commit record
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesPoint {
    pub commit_id: String,
    /// submission time in epoch milliseconds
    pub timestamp: i64,
    pub value: f64,
    pub unit: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOrder {
    /// the order records were accepted in
    Insertion,
    /// ordered by submission date, ties broken by insertion order
    Timestamp,
}

/// Append-only, deduplicated storage of commit records partitioned by tool
/// name. Partitions lock independently so concurrent appends only contend
/// when they target the same tool.
#[derive(Debug)]
pub struct HistoryStore {
    partitions: RwLock<BTreeMap<String, Arc<Partition>>>,
    meta: RwLock<Meta>,
    config: StoreConfig,
}

#[derive(Debug)]
struct Meta {
    last_update: i64,
    repo_url: String,
}

#[derive(Debug, Default)]
pub(crate) struct Partition {
    pub(crate) inner: RwLock<PartitionInner>,
}

#[derive(Debug, Default)]
pub(crate) struct PartitionInner {
    /// insertion-ordered, append-only record log
    pub(crate) records: Vec<CommitRecord>,
    /// commit id -> insertion positions, earliest first
    by_commit: BTreeMap<String, Vec<usize>>,
    /// (date, insertion position) pairs for timestamp-ordered walks
    by_date: BTreeSet<(i64, usize)>,
    /// bench name -> unit and timestamp-ordered points of that series
    pub(crate) series: BTreeMap<String, SeriesIndex>,
}

#[derive(Debug)]
pub(crate) struct SeriesIndex {
    pub(crate) unit: String,
    /// keyed by (date, insertion position) so equal dates keep their
    /// insertion order
    pub(crate) points: BTreeMap<(i64, usize), f64>,
}

impl SeriesIndex {
    fn new(unit: String) -> Self {
        Self {
            unit,
            points: BTreeMap::new(),
        }
    }
}

impl HistoryStore {
    /// open the store, reading the snapshot file if one exists
    pub fn load(config: &StoreConfig) -> Result<Self, StoreError> {
        let snapshot = if config.path.exists() {
            snapshot::read(&config.path)?
        } else {
            info!(
                path = %config.path.display(),
                "No snapshot found, starting with an empty history"
            );

            Snapshot::empty(config.repo_url.clone())
        };

        Ok(Self::from_snapshot(snapshot, config.clone()))
    }

    /// rebuild all partition indices from a snapshot; the snapshot log is
    /// authoritative, so dedup is not re-applied here
    pub fn from_snapshot(snapshot: Snapshot, config: StoreConfig) -> Self {
        let partitions = snapshot
            .entries
            .into_iter()
            .map(|(tool, records)| {
                let partition = Arc::new(Partition {
                    inner: RwLock::new(PartitionInner::restore(&tool, records)),
                });

                (tool, partition)
            })
            .collect();

        Self {
            partitions: RwLock::new(partitions),
            meta: RwLock::new(Meta {
                last_update: snapshot.last_update,
                repo_url: snapshot.repo_url,
            }),
            config,
        }
    }

    /// insert a record into the partition for `tool`
    ///
    /// The whole record is validated before anything is touched; a rejected
    /// record leaves the partition exactly as it was. A reader never sees a
    /// partially applied record since all indices update under one write
    /// guard.
    pub fn append(&self, tool: &str, record: CommitRecord) -> Result<(), AppendError> {
        let partition = self.partition_or_create(tool);
        let mut inner = partition
            .inner
            .try_write_for(self.config.lock_timeout())
            .ok_or_else(|| AppendError::LockTimeout {
                tool: tool.to_owned(),
            })?;

        inner.validate(tool, &record, self.config.dedup)?;

        debug!(
            tool = %tool,
            commit = %record.commit.id,
            benches = record.benches.len(),
            "Appending record"
        );
        inner.apply(record);
        drop(inner);

        self.touch();

        Ok(())
    }

    /// first-inserted record for a commit, or `NotFound`
    pub fn get(&self, tool: &str, commit_id: &str) -> Result<CommitRecord, QueryError> {
        let partition = self.partition(tool).ok_or(QueryError::NotFound)?;
        let inner = partition.inner.read();

        inner
            .by_commit
            .get(commit_id)
            .and_then(|positions| positions.first())
            .map(|&pos| inner.records[pos].clone())
            .ok_or(QueryError::NotFound)
    }

    /// the full metric series for `(tool, bench)` in timestamp order, ties
    /// broken by insertion order
    pub fn list_series(&self, tool: &str, bench: &str) -> Result<Vec<SeriesPoint>, QueryError> {
        let partition = self.partition(tool).ok_or(QueryError::NotFound)?;
        let inner = partition.inner.read();
        let series = inner.series.get(bench).ok_or(QueryError::NotFound)?;

        Ok(series
            .points
            .iter()
            .map(|(&(timestamp, seq), &value)| SeriesPoint {
                commit_id: inner.records[seq].commit.id.clone(),
                timestamp,
                value,
                unit: series.unit.clone(),
            })
            .collect())
    }

    /// all records of a partition in either supported ordering, without
    /// rescanning the log for the timestamp variant
    pub fn records(&self, tool: &str, order: RecordOrder) -> Result<Vec<CommitRecord>, QueryError> {
        let partition = self.partition(tool).ok_or(QueryError::NotFound)?;
        let inner = partition.inner.read();

        Ok(match order {
            RecordOrder::Insertion => inner.records.clone(),
            RecordOrder::Timestamp => inner
                .by_date
                .iter()
                .map(|&(_, seq)| inner.records[seq].clone())
                .collect(),
        })
    }

    /// materialize the at-rest shape of the whole history
    pub fn snapshot(&self) -> Snapshot {
        let meta = self.meta.read();
        let partitions = self.partitions.read();

        let entries = partitions
            .iter()
            .map(|(tool, partition)| (tool.clone(), partition.inner.read().records.clone()))
            .collect();

        Snapshot {
            last_update: meta.last_update,
            repo_url: meta.repo_url.clone(),
            entries,
        }
    }

    /// write the history back to its snapshot file
    pub fn flush(&self) -> Result<(), StoreError> {
        let snapshot = self.snapshot();

        snapshot::write(&self.config.path, &snapshot, self.config.format)?;
        info!(
            path = %self.config.path.display(),
            tools = snapshot.entries.len(),
            "Flushed history"
        );

        Ok(())
    }

    /// flush and tear the store down
    pub fn close(self) -> Result<(), StoreError> {
        self.flush()?;
        info!("Closed history store");

        Ok(())
    }

    pub(crate) fn partition(&self, tool: &str) -> Option<Arc<Partition>> {
        self.partitions.read().get(tool).map(Arc::clone)
    }

    pub(crate) fn partition_names(&self) -> Vec<String> {
        self.partitions.read().keys().cloned().collect()
    }

    fn partition_or_create(&self, tool: &str) -> Arc<Partition> {
        if let Some(partition) = self.partitions.read().get(tool) {
            return Arc::clone(partition);
        }

        let mut partitions = self.partitions.write();

        Arc::clone(
            partitions
                .entry(tool.to_owned())
                .or_insert_with(|| Arc::new(Partition::default())),
        )
    }

    fn touch(&self) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as i64)
            .unwrap_or(0);

        self.meta.write().last_update = now;
    }
}

impl PartitionInner {
    /// check a record against the partition without touching it
    fn validate(
        &self,
        tool: &str,
        record: &CommitRecord,
        dedup: DedupKey,
    ) -> Result<(), AppendError> {
        let duplicate = match self.by_commit.get(&record.commit.id) {
            Some(positions) => match dedup {
                DedupKey::CommitId => true,
                DedupKey::CommitIdAndDate => positions
                    .iter()
                    .any(|&pos| self.records[pos].date == record.date),
            },
            None => false,
        };

        if duplicate {
            return Err(AppendError::DuplicateCommit {
                tool: tool.to_owned(),
                commit_id: record.commit.id.clone(),
            });
        }

        let mut seen = BTreeSet::new();

        for bench in record.benches.iter() {
            if !seen.insert(bench.name.as_str()) {
                return Err(AppendError::DuplicateBench {
                    bench: bench.name.clone(),
                });
            }

            if !bench.value.is_finite() {
                return Err(AppendError::InvalidValue {
                    bench: bench.name.clone(),
                    value: bench.value,
                });
            }

            if let Some(series) = self.series.get(&bench.name) {
                if series.unit != bench.unit {
                    return Err(AppendError::UnitMismatch {
                        bench: bench.name.clone(),
                        expected: series.unit.clone(),
                        found: bench.unit.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    /// insert a validated record into the log and every index
    fn apply(&mut self, record: CommitRecord) {
        let seq = self.records.len();

        self.by_commit
            .entry(record.commit.id.clone())
            .or_default()
            .push(seq);
        self.by_date.insert((record.date, seq));

        for bench in record.benches.iter() {
            let series = self
                .series
                .entry(bench.name.clone())
                .or_insert_with(|| SeriesIndex::new(bench.unit.clone()));

            series.points.insert((record.date, seq), bench.value);
        }

        self.records.push(record);
    }

    /// rebuild indices for records loaded from a snapshot
    ///
    /// Loaded logs may legitimately contain repeated commit ids (upstream
    /// re-runs); those are kept. A point whose unit disagrees with the
    /// established series stays in the log but is left out of the series
    /// index.
    fn restore(tool: &str, records: Vec<CommitRecord>) -> Self {
        let mut inner = Self::default();

        for record in records {
            let seq = inner.records.len();

            inner
                .by_commit
                .entry(record.commit.id.clone())
                .or_default()
                .push(seq);
            inner.by_date.insert((record.date, seq));

            for bench in record.benches.iter() {
                let series = inner
                    .series
                    .entry(bench.name.clone())
                    .or_insert_with(|| SeriesIndex::new(bench.unit.clone()));

                if series.unit == bench.unit {
                    series.points.insert((record.date, seq), bench.value);
                } else {
                    warn!(
                        tool = %tool,
                        bench = %bench.name,
                        expected = %series.unit,
                        found = %bench.unit,
                        "Unit disagrees with the established series, point left out of the index"
                    );
                }
            }

            inner.records.push(record);
        }

        inner
    }
}
