//! Submission Writer
//!
//! Scores every row of a test CSV with the configured artifacts and writes
//! an `id,stroke` submission file.

use anyhow::{Context, Result};
use clap::Parser;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use stroke_risk_service::config::AppConfig;
use stroke_risk_service::models::loader::Artifacts;
use stroke_risk_service::payload::read_csv;
use stroke_risk_service::training::{score_submission, write_submission};
use stroke_risk_service::types::DECISION_THRESHOLD;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Test CSV with a header line
    #[arg(short, long)]
    input: PathBuf,
    /// Where to write the submission CSV
    #[arg(short, long, default_value = "submission.csv")]
    output: PathBuf,
    /// Service configuration naming the model and manifest
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Probability at or above which a row is labelled 1
    #[arg(short, long, default_value_t = DECISION_THRESHOLD)]
    threshold: f64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("stroke_risk_service=info".parse()?)
                .add_directive("make_submission=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };

    let artifacts = Artifacts::load(&config.artifacts);
    let engine = artifacts.engine()?.with_threshold(args.threshold);

    let body = std::fs::read(&args.input)
        .with_context(|| format!("Failed to read {}", args.input.display()))?;
    let table = read_csv(&body).with_context(|| format!("Failed to parse {}", args.input.display()))?;
    info!(rows = table.height(), encoding = ?engine.encoding(), "Scoring test data");

    let rows = score_submission(&engine, &table)?;
    let positives = rows.iter().filter(|r| r.label == 1).count();

    let file = File::create(&args.output)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;
    write_submission(&rows, BufWriter::new(file))?;

    info!(
        rows = rows.len(),
        positives,
        threshold = args.threshold,
        path = %args.output.display(),
        "Submission written"
    );
    Ok(())
}
