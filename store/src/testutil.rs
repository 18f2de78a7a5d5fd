use crate::{
    config::{DedupKey, StoreConfig},
    history::HistoryStore,
    record::{Bench, CommitMeta, CommitRecord, Person},
    snapshot::Snapshot,
};

pub fn person(name: &str) -> Person {
    Person {
        name: name.to_owned(),
        username: name.to_owned(),
        email: None,
    }
}

pub fn record(id: &str, date: i64, benches: &[(&str, f64, &str)]) -> CommitRecord {
    CommitRecord {
        commit: CommitMeta {
            author: person("Ultimaker"),
            committer: person("Ultimaker"),
            id: id.to_owned(),
            message: format!("bench run {id}"),
            timestamp: "2023-08-09T05:02:58Z".to_owned(),
            url: format!("https://example.invalid/commit/{id}"),
        },
        date,
        tool: "customBiggerIsBetter".to_owned(),
        benches: benches
            .iter()
            .map(|&(name, value, unit)| Bench {
                name: name.to_owned(),
                value,
                unit: unit.to_owned(),
            })
            .collect(),
    }
}

pub fn empty_store(dedup: DedupKey) -> HistoryStore {
    HistoryStore::from_snapshot(
        Snapshot::empty(String::new()),
        StoreConfig {
            dedup,
            ..StoreConfig::default()
        },
    )
}
