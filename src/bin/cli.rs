//! Evaluate a trained tracker on a labeled test database.
//!
//! Usage:
//!   landmark-eval -t tracker.bin <database>                   # Summary line
//!   landmark-eval -t tracker.bin -r rects.csv <database>      # Override rectangles
//!   landmark-eval -t tracker.bin <database> --json            # Full result as JSON

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use landmark_eval::{
    evaluate, import_database, CascadeTracker, DatabaseType, EvaluationOptions, FailurePolicy,
    LandmarkDistanceNormalizer, SampleData, TestResult,
};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "landmark-eval")]
#[command(author, version, about = "Evaluate regressor on test database", long_about = None)]
struct Args {
    /// Path to database directory to load
    #[arg(required = true)]
    database: PathBuf,

    /// Trained tracker to load
    #[arg(short, long)]
    tracker: PathBuf,

    /// Initial rectangles to provide to tracker (x y width height per line)
    #[arg(short, long)]
    rectangles: Option<PathBuf>,

    /// Output the full result as JSON
    #[arg(long)]
    json: bool,

    /// Abort on the first sample that cannot be evaluated
    #[arg(long)]
    fail_fast: bool,

    /// Number of worker threads (default: one per core)
    #[arg(long)]
    threads: Option<usize>,

    /// Show progress on stderr
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Serialize)]
struct Output<'a> {
    database: String,
    convention: DatabaseType,
    normalizer: &'a LandmarkDistanceNormalizer,
    #[serde(flatten)]
    result: &'a TestResult,
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(&args) {
        Ok(output) => println!("{}", output),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(args: &Args) -> anyhow::Result<String> {
    let tracker = CascadeTracker::load(&args.tracker).context("Failed to load tracker")?;
    info!(path = %args.tracker.display(), stages = tracker.num_cascade_stages(), "loaded tracker");

    let db = import_database(&args.database, args.rectangles.as_deref())
        .context("Failed to load database")?;
    let normalizer = LandmarkDistanceNormalizer::for_database(db.kind);

    let mut data = SampleData::new(db.input);
    data.create_testing_samples()
        .context("Failed to prepare testing samples")?;

    let options = EvaluationOptions {
        failure_policy: if args.fail_fast {
            FailurePolicy::Abort
        } else {
            FailurePolicy::SkipAndCount
        },
        threads: args.threads,
    };
    let result = evaluate(&data, &tracker, &normalizer, &options).context("Evaluation failed")?;

    if args.json {
        let output = Output {
            database: args.database.display().to_string(),
            convention: db.kind,
            normalizer: &normalizer,
            result: &result,
        };
        Ok(serde_json::to_string_pretty(&output)?)
    } else {
        Ok(summary_line(&result))
    }
}

fn summary_line(result: &TestResult) -> String {
    let mut s = format!(
        "Average normalized error: {}",
        result.mean_normalized_distance
    );
    if result.failure_count > 0 {
        s.push_str(&format!(
            " ({} of {} samples failed)",
            result.failure_count,
            result.per_sample.len()
        ));
    }
    s
}
