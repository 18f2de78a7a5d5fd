use crate::{
    batch::{append_with_retry, ingest_files, read_record, CancelToken, RecordError},
    config::RetryPolicy,
};
use benchtrack_analysis::{Evaluator, EvaluatorConfig, Polarity};
use benchtrack_store::{
    AppendError, Bench, CommitMeta, CommitRecord, HistoryStore, Person, Snapshot, StoreConfig,
};
use std::{env, fs, path::PathBuf};

const TOOL: &str = "CGcodeAnalyzer";

fn person() -> Person {
    Person {
        name: "Ultimaker".to_owned(),
        username: "Ultimaker".to_owned(),
        email: None,
    }
}

fn record(id: &str, date: i64, value: f64, unit: &str) -> CommitRecord {
    CommitRecord {
        commit: CommitMeta {
            author: person(),
            committer: person(),
            id: id.to_owned(),
            message: format!("bench run {id}"),
            timestamp: "2023-08-09T05:02:58Z".to_owned(),
            url: format!("https://example.invalid/commit/{id}"),
        },
        date,
        tool: "customBiggerIsBetter".to_owned(),
        benches: vec![Bench {
            name: "Print time".to_owned(),
            value,
            unit: unit.to_owned(),
        }],
    }
}

fn empty_store() -> HistoryStore {
    HistoryStore::from_snapshot(Snapshot::empty(String::new()), StoreConfig::default())
}

fn evaluator() -> Evaluator {
    let mut config = EvaluatorConfig {
        window: 2,
        ..EvaluatorConfig::default()
    };
    config
        .polarity
        .insert("Print time".to_owned(), Polarity::LargerIsWorse);

    Evaluator::new(config)
}

fn write_record(name: &str, record: &CommitRecord) -> PathBuf {
    let path = env::temp_dir().join(format!(
        "benchtrack-batch-{}-{name}.json",
        std::process::id()
    ));

    fs::write(&path, serde_json::to_string(record).unwrap()).unwrap();

    path
}

#[test]
pub fn batch_appends_every_readable_record() {
    let store = empty_store();
    let files: Vec<PathBuf> = [
        ("all-a", record("aaa", 100, 10.0, "s")),
        ("all-b", record("bbb", 200, 10.5, "s")),
        ("all-c", record("ccc", 300, 9.5, "s")),
    ]
    .iter()
    .map(|(name, record)| write_record(name, record))
    .collect();

    let outcome = ingest_files(
        &store,
        &evaluator(),
        TOOL,
        &files,
        &RetryPolicy::default(),
        &CancelToken::new(),
    );

    for file in &files {
        fs::remove_file(file).unwrap();
    }

    assert_eq!(outcome.accepted, 3);
    assert_eq!(outcome.rejected, 0);
    assert_eq!(store.list_series(TOOL, "Print time").unwrap().len(), 3);
}

#[test]
pub fn resubmission_counts_as_duplicate_and_stays_clean() {
    let store = empty_store();
    let file = write_record("dup", &record("aaa", 100, 10.0, "s"));

    let first = ingest_files(
        &store,
        &evaluator(),
        TOOL,
        std::slice::from_ref(&file),
        &RetryPolicy::default(),
        &CancelToken::new(),
    );
    let second = ingest_files(
        &store,
        &evaluator(),
        TOOL,
        std::slice::from_ref(&file),
        &RetryPolicy::default(),
        &CancelToken::new(),
    );

    fs::remove_file(&file).unwrap();

    assert_eq!(first.accepted, 1);
    assert_eq!(second.accepted, 0);
    assert_eq!(second.duplicates, 1);
    assert!(second.is_clean());
    assert_eq!(store.list_series(TOOL, "Print time").unwrap().len(), 1);
}

#[test]
pub fn unreadable_files_are_rejected_without_aborting_the_batch() {
    let store = empty_store();
    let good = write_record("mixed-good", &record("aaa", 100, 10.0, "s"));
    let bad = env::temp_dir().join(format!("benchtrack-batch-{}-garbage.json", std::process::id()));
    fs::write(&bad, "not a record").unwrap();

    let outcome = ingest_files(
        &store,
        &evaluator(),
        TOOL,
        &[good.clone(), bad.clone()],
        &RetryPolicy::default(),
        &CancelToken::new(),
    );

    fs::remove_file(&good).unwrap();
    fs::remove_file(&bad).unwrap();

    assert_eq!(outcome.accepted, 1);
    assert_eq!(outcome.rejected, 1);
    assert!(!outcome.is_clean());
}

#[test]
pub fn read_errors_keep_the_io_and_decode_cases_apart() {
    let missing = env::temp_dir().join(format!(
        "benchtrack-batch-{}-does-not-exist.json",
        std::process::id()
    ));
    assert!(matches!(read_record(&missing), Err(RecordError::Io(_))));

    let garbage = write_record("decode", &record("aaa", 100, 10.0, "s"));
    fs::write(&garbage, "not a record").unwrap();
    let parsed = read_record(&garbage);
    fs::remove_file(&garbage).unwrap();

    assert!(matches!(parsed, Err(RecordError::Decode(_))));
}

#[test]
pub fn regressions_are_flagged_as_points_arrive() {
    let store = empty_store();
    let evaluator = evaluator();
    let runs = [
        ("reg-a", record("aaa", 100, 10.0, "s")),
        ("reg-b", record("bbb", 200, 10.0, "s")),
        ("reg-c", record("ccc", 300, 11.0, "s")),
    ];

    let mut last = None;

    for (name, record) in &runs {
        let file = write_record(name, record);
        last = Some(ingest_files(
            &store,
            &evaluator,
            TOOL,
            std::slice::from_ref(&file),
            &RetryPolicy::default(),
            &CancelToken::new(),
        ));
        fs::remove_file(&file).unwrap();
    }

    // the third run steps up from a constant baseline of a larger-is-worse
    // metric
    let outcome = last.unwrap();
    assert_eq!(outcome.regressions, 1);
    assert!(!outcome.is_clean());
}

#[test]
pub fn cancelled_batches_append_nothing_further() {
    let store = empty_store();
    let file = write_record("cancel", &record("aaa", 100, 10.0, "s"));
    let cancel = CancelToken::new();
    cancel.cancel();

    let outcome = ingest_files(
        &store,
        &evaluator(),
        TOOL,
        std::slice::from_ref(&file),
        &RetryPolicy::default(),
        &cancel,
    );

    fs::remove_file(&file).unwrap();

    assert_eq!(outcome.accepted, 0);
    assert!(outcome.cancelled);
    assert!(store.list_series(TOOL, "Print time").is_err());
}

#[test]
pub fn validation_failures_are_not_retried() {
    let store = empty_store();
    let retry = RetryPolicy {
        attempts: 5,
        base_delay_ms: 1,
    };

    append_with_retry(&store, TOOL, &record("aaa", 100, 10.0, "s"), &retry).unwrap();
    let rejected = append_with_retry(&store, TOOL, &record("bbb", 200, 10.0, "ms"), &retry);

    assert!(matches!(rejected, Err(AppendError::UnitMismatch { .. })));
}
