//! Scaler Manifest Fitter
//!
//! Reads a labelled training CSV and writes the scaler manifest the
//! service aligns and standardizes against.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use stroke_risk_service::payload::read_csv;
use stroke_risk_service::training::fit_manifest;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Training CSV with a header line
    #[arg(short, long)]
    input: PathBuf,
    /// Where to write the manifest JSON
    #[arg(short, long, default_value = "artifacts/scaler.json")]
    output: PathBuf,
    /// Label column excluded from the features
    #[arg(short, long, default_value = "stroke")]
    target: String,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("stroke_risk_service=info".parse()?)
                .add_directive("fit_scaler=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let body = std::fs::read(&args.input)
        .with_context(|| format!("Failed to read {}", args.input.display()))?;
    let table = read_csv(&body).with_context(|| format!("Failed to parse {}", args.input.display()))?;
    info!(
        rows = table.height(),
        columns = ?table.column_names(),
        path = %args.input.display(),
        "Training data loaded"
    );

    let manifest = fit_manifest(&table, &args.target)?;
    if let Some(parent) = args.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    manifest.save(&args.output)?;

    info!(
        columns = manifest.width().unwrap_or(0),
        path = %args.output.display(),
        "Scaler manifest written"
    );
    Ok(())
}
