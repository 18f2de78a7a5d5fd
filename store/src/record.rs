use serde::{Deserialize, Serialize};

/// one benchmark run tied to a source commit, the leaf data unit of the
/// history. Field names match the at-rest artifact so records round-trip
/// through snapshots without translation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub commit: CommitMeta,
    /// submission time in epoch milliseconds, the ordering key of all series
    pub date: i64,
    /// suite format label as delivered by the runner (e.g.
    /// "customBiggerIsBetter"), kept verbatim
    pub tool: String,
    pub benches: Vec<Bench>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitMeta {
    pub author: Person,
    pub committer: Person,
    /// source VCS hash, the primary dedup key within a partition
    pub id: String,
    pub message: String,
    /// commit time as reported upstream, treated as an opaque label
    pub timestamp: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub name: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// one scalar measurement; the same `name` recurring across records forms a
/// metric series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bench {
    pub name: String,
    pub value: f64,
    /// opaque label, preserved exactly as delivered ("s", "mm", "-", "#",
    /// "Celcius" and whatever else upstream emits)
    pub unit: String,
}
