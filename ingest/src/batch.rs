use crate::config::RetryPolicy;
use benchtrack_analysis::{Evaluator, Verdict};
use benchtrack_store::{AppendError, CommitRecord, HistoryStore};
use rayon::prelude::*;
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    thread,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("failed to read the record file")]
    Io(#[from] std::io::Error),
    #[error("failed to decode the commit record")]
    Decode(#[from] serde_json::Error),
}

/// cooperative cancellation flag shared between a batch and its owner;
/// checked between appends, so the store is always in a valid state at the
/// cancellation point
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub accepted: usize,
    /// re-submissions the store already knew; not an error
    pub duplicates: usize,
    /// unreadable files and records the store rejected
    pub rejected: usize,
    /// accepted points flagged against their rolling baseline
    pub regressions: usize,
    pub cancelled: bool,
}

impl BatchOutcome {
    /// whether CI may treat this batch as green
    pub fn is_clean(&self) -> bool {
        self.rejected == 0 && self.regressions == 0 && !self.cancelled
    }
}

/// append one commit record per file into the partition for `tool`
///
/// Files are processed on the rayon pool; per-partition locking in the
/// store keeps concurrent appends safe. Rejected records are logged and
/// counted without aborting the rest of the batch.
pub fn ingest_files(
    store: &HistoryStore,
    evaluator: &Evaluator,
    tool: &str,
    files: &[PathBuf],
    retry: &RetryPolicy,
    cancel: &CancelToken,
) -> BatchOutcome {
    let accepted = AtomicUsize::new(0);
    let duplicates = AtomicUsize::new(0);
    let rejected = AtomicUsize::new(0);
    let regressions = AtomicUsize::new(0);

    files.par_iter().for_each(|path| {
        if cancel.is_cancelled() {
            return;
        }

        let record = match read_record(path) {
            Ok(record) => record,
            Err(error) => {
                error!(
                    error = ?error,
                    path = %path.display(),
                    "Failed to read commit record: {error}"
                );
                rejected.fetch_add(1, Ordering::SeqCst);

                return;
            }
        };

        match append_with_retry(store, tool, &record, retry) {
            Ok(()) => {
                accepted.fetch_add(1, Ordering::SeqCst);
                regressions.fetch_add(
                    judge_fresh_point(store, evaluator, tool, &record),
                    Ordering::SeqCst,
                );
            }
            Err(error) if error.is_duplicate() => {
                info!(
                    tool = %tool,
                    commit = %record.commit.id,
                    "Record already present, keeping the existing entry"
                );
                duplicates.fetch_add(1, Ordering::SeqCst);
            }
            Err(error) => {
                error!(
                    error = ?error,
                    path = %path.display(),
                    "Record rejected: {error}"
                );
                rejected.fetch_add(1, Ordering::SeqCst);
            }
        }
    });

    let outcome = BatchOutcome {
        accepted: accepted.into_inner(),
        duplicates: duplicates.into_inner(),
        rejected: rejected.into_inner(),
        regressions: regressions.into_inner(),
        cancelled: cancel.is_cancelled(),
    };

    info!(
        accepted = outcome.accepted,
        duplicates = outcome.duplicates,
        rejected = outcome.rejected,
        regressions = outcome.regressions,
        cancelled = outcome.cancelled,
        "Finished ingestion batch"
    );

    outcome
}

/// retry lock timeouts with doubling backoff; every other outcome is final
pub fn append_with_retry(
    store: &HistoryStore,
    tool: &str,
    record: &CommitRecord,
    retry: &RetryPolicy,
) -> Result<(), AppendError> {
    let mut delays = retry.delays();

    loop {
        match store.append(tool, record.clone()) {
            Err(error) if error.is_retryable() => match delays.next() {
                Some(delay) => {
                    warn!(
                        tool = %tool,
                        "Partition lock contended, backing off for {}ms",
                        delay.as_millis()
                    );
                    thread::sleep(delay);
                }
                None => return Err(error),
            },
            outcome => return outcome,
        }
    }
}

pub(crate) fn read_record(path: &Path) -> Result<CommitRecord, RecordError> {
    let raw = fs::read_to_string(path)?;

    Ok(serde_json::from_str(&raw)?)
}

/// judge the just-accepted point of every series the record touched; the
/// baseline is whatever precedes the point in timestamp order, so backfills
/// are judged in their historical place
fn judge_fresh_point(
    store: &HistoryStore,
    evaluator: &Evaluator,
    tool: &str,
    record: &CommitRecord,
) -> usize {
    let mut regressions = 0;

    for bench in record.benches.iter() {
        let Some(polarity) = evaluator.config().polarity_of(&bench.name) else {
            debug!(bench = %bench.name, "No polarity configured, not judged");
            continue;
        };

        let points = match store.list_series(tool, &bench.name) {
            Ok(points) => points,
            Err(_) => continue,
        };

        let Some(position) = points
            .iter()
            .position(|point| point.commit_id == record.commit.id && point.timestamp == record.date)
        else {
            continue;
        };

        let evaluation = evaluator.judge_at(&points[..position], points[position].value, polarity);

        if evaluation.verdict == Verdict::Regression {
            warn!(
                tool = %tool,
                bench = %bench.name,
                commit = %record.commit.id,
                delta = evaluation.delta,
                threshold = evaluation.threshold_used,
                "Regression against the rolling baseline"
            );
            regressions += 1;
        }
    }

    regressions
}
