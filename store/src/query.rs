//! Read-only projections consumed by the external renderer.
//!
//! All queries walk maintained indices; none rescans a partition's record
//! log. Results reflect a committed state, never an in-flight append.

use crate::history::{HistoryStore, QueryError, SeriesPoint};
use itertools::Itertools;

impl HistoryStore {
    /// every tool with at least one partition, sorted
    pub fn tools(&self) -> Vec<String> {
        self.partition_names()
    }

    /// distinct bench names observed for a tool
    ///
    /// Names are collected in one pass over the series key index and handed
    /// out as a consuming iterator; re-invoke to re-enumerate. Keeping a
    /// lazy borrow open would pin the partition against appends.
    pub fn metric_names(&self, tool: &str) -> Result<std::vec::IntoIter<String>, QueryError> {
        let partition = self.partition(tool).ok_or(QueryError::NotFound)?;
        let inner = partition.inner.read();

        Ok(inner.series.keys().cloned().collect_vec().into_iter())
    }

    /// series points with a timestamp in `[from, to]`, inclusive on both
    /// ends, timestamp-ordered
    pub fn series_in_range(
        &self,
        tool: &str,
        bench: &str,
        from: i64,
        to: i64,
    ) -> Result<Vec<SeriesPoint>, QueryError> {
        let partition = self.partition(tool).ok_or(QueryError::NotFound)?;
        let inner = partition.inner.read();
        let series = inner.series.get(bench).ok_or(QueryError::NotFound)?;

        // an inverted range selects nothing; BTreeMap::range would panic
        if from > to {
            return Ok(Vec::new());
        }

        Ok(series
            .points
            .range((from, usize::MIN)..=(to, usize::MAX))
            .map(|(&(timestamp, seq), &value)| SeriesPoint {
                commit_id: inner.records[seq].commit.id.clone(),
                timestamp,
                value,
                unit: series.unit.clone(),
            })
            .collect())
    }

    /// most recent point of a series by timestamp, or `NotFound` when the
    /// series is empty or unknown
    pub fn latest(&self, tool: &str, bench: &str) -> Result<SeriesPoint, QueryError> {
        let partition = self.partition(tool).ok_or(QueryError::NotFound)?;
        let inner = partition.inner.read();
        let series = inner.series.get(bench).ok_or(QueryError::NotFound)?;

        series
            .points
            .last_key_value()
            .map(|(&(timestamp, seq), &value)| SeriesPoint {
                commit_id: inner.records[seq].commit.id.clone(),
                timestamp,
                value,
                unit: series.unit.clone(),
            })
            .ok_or(QueryError::NotFound)
    }
}
