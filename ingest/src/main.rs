mod batch;
mod config;

#[cfg(test)]
mod batch_test;
#[cfg(test)]
mod config_test;

use crate::{
    batch::CancelToken,
    config::{ConfigErrors, TrackerConfig},
};
use benchtrack_analysis::{Evaluator, Verdict};
use benchtrack_store::{
    snapshot::{self, SnapshotError},
    HistoryStore, QueryError, SnapshotFormat, StoreError,
};
use clap::{Parser, Subcommand, ValueEnum};
use std::{path::PathBuf, process::exit};
use thiserror::Error;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Error, Debug)]
enum TrackerErrors {
    #[error("configuration error")]
    Config(#[from] ConfigErrors),
    #[error("store error")]
    Store(#[from] StoreError),
    #[error("query error")]
    Query(#[from] QueryError),
    #[error("snapshot error")]
    Snapshot(#[from] SnapshotError),
}

#[derive(Parser, Debug)]
#[command(
    name = "benchtrack",
    about = "Benchmark history store and regression tracker",
    version
)]
struct Cli {
    /// path to the tracker configuration
    #[arg(short, long, default_value = "benchtrack.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// append commit records produced by CI runs, one JSON file per run
    Ingest {
        /// tool partition receiving the records
        #[arg(short, long)]
        tool: String,

        files: Vec<PathBuf>,
    },
    /// judge the newest point of each series against its rolling baseline
    Report {
        #[arg(short, long)]
        tool: String,

        /// restrict the report to a single bench
        #[arg(short, long)]
        bench: Option<String>,
    },
    /// print the most recent point of one series
    Latest {
        #[arg(short, long)]
        tool: String,

        #[arg(short, long)]
        bench: String,
    },
    /// write the history in its at-rest shape for the renderer
    Export {
        #[arg(short, long)]
        output: PathBuf,

        #[arg(long, value_enum, default_value = "json")]
        format: ExportFormat,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ExportFormat {
    Json,
    DataJs,
}

impl From<ExportFormat> for SnapshotFormat {
    fn from(format: ExportFormat) -> Self {
        match format {
            ExportFormat::Json => SnapshotFormat::Json,
            ExportFormat::DataJs => SnapshotFormat::DataJs,
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => exit(code),
        Err(error) => {
            error!(error = ?error, "Fatal: {error}");

            exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<i32, TrackerErrors> {
    let config = TrackerConfig::load(&cli.config)?;
    let store = HistoryStore::load(&config.store)?;
    let evaluator = Evaluator::new(config.evaluator.clone());

    match cli.command {
        Commands::Ingest { tool, files } => {
            let outcome = batch::ingest_files(
                &store,
                &evaluator,
                &tool,
                &files,
                &config.retry,
                &CancelToken::new(),
            );

            store.close()?;

            Ok(if outcome.is_clean() { 0 } else { 1 })
        }
        Commands::Report { tool, bench } => report(&store, &evaluator, &tool, bench.as_deref()),
        Commands::Latest { tool, bench } => {
            let point = store.latest(&tool, &bench)?;

            println!(
                "{} {} {} {}",
                point.commit_id, point.timestamp, point.value, point.unit
            );

            Ok(0)
        }
        Commands::Export { output, format } => {
            snapshot::write(&output, &store.snapshot(), format.into())?;

            Ok(0)
        }
    }
}

fn report(
    store: &HistoryStore,
    evaluator: &Evaluator,
    tool: &str,
    bench: Option<&str>,
) -> Result<i32, TrackerErrors> {
    let benches: Vec<String> = match bench {
        Some(bench) => vec![bench.to_owned()],
        None => store.metric_names(tool)?.collect(),
    };

    let mut regressions = 0;

    for name in benches {
        let Some(polarity) = evaluator.config().polarity_of(&name) else {
            println!("{name}: no polarity configured, not judged");
            continue;
        };

        let points = store.list_series(tool, &name)?;
        let evaluation = evaluator.judge_latest(&points, polarity);

        match evaluation.verdict {
            Verdict::Regression => {
                regressions += 1;
                println!(
                    "{name}: REGRESSION (delta {:+.4}, threshold {:.4})",
                    evaluation.delta, evaluation.threshold_used
                );
            }
            Verdict::NoRegression => println!(
                "{name}: ok (delta {:+.4}, threshold {:.4})",
                evaluation.delta, evaluation.threshold_used
            ),
            Verdict::Insufficient => println!("{name}: insufficient history"),
        }
    }

    Ok(if regressions == 0 { 0 } else { 1 })
}
