//! Offline side of the pipeline: fitting the scaler manifest and writing
//! submission files.
//!
//! The manifest is fit on the exact feature frame the inference pipeline
//! builds, so its column list is the order inference aligns against.

use crate::models::inference::InferenceEngine;
use crate::models::scaler::ScalerManifest;
use crate::preprocessing::{complete_columns, engineer_features, numeric_column};
use crate::types::record::RawTable;
use anyhow::{bail, Context, Result};
use polars::prelude::*;
use serde::Serialize;
use std::io::Write;
use tracing::info;

/// Fit a standard scaler over the engineered features of a labelled
/// training table.
///
/// Missing `bmi` values take the median of the table. `id` and the target
/// column never become features. Statistics are population mean and
/// standard deviation, with a zero deviation replaced by 1.
pub fn fit_manifest(table: &RawTable, target: &str) -> Result<ScalerManifest> {
    if table.is_empty() {
        bail!("training table has no rows");
    }
    if !table.has_column(target) {
        bail!("training table has no `{}` column", target);
    }
    let table = complete_columns(table)?;

    let bmi = numeric_column(&table, "bmi")?;
    let fill = bmi
        .median()
        .context("training table has no bmi values to take a median of")?;
    let frame = engineer_features(&table, bmi.fill_null_with_values(fill)?)?;

    let mut names = Vec::with_capacity(frame.width());
    let mut mean = Vec::with_capacity(frame.width());
    let mut scale = Vec::with_capacity(frame.width());
    for series in frame.get_columns() {
        let values = series.f64()?;
        let std = values.std(0).unwrap_or(0.0);
        names.push(series.name().to_string());
        mean.push(values.mean().unwrap_or(0.0));
        scale.push(if std == 0.0 { 1.0 } else { std });
    }

    info!(
        rows = frame.height(),
        columns = names.len(),
        bmi_median = fill,
        "Fitted scaler manifest"
    );
    Ok(ScalerManifest::new(names, mean, scale))
}

/// One line of a submission file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionRow {
    pub id: String,
    #[serde(rename = "stroke")]
    pub label: u8,
}

/// Label every row of a test table. Rows without an `id` are numbered by
/// position.
pub fn score_submission(engine: &InferenceEngine, table: &RawTable) -> Result<Vec<SubmissionRow>> {
    let batch = engine.predict_table(table)?;
    Ok(batch
        .predictions
        .iter()
        .enumerate()
        .map(|(row, prediction)| SubmissionRow {
            id: table
                .text(row, "id")
                .map(str::to_string)
                .unwrap_or_else(|| row.to_string()),
            label: prediction.label,
        })
        .collect())
}

/// Write an `id,stroke` CSV.
pub fn write_submission<W: Write>(rows: &[SubmissionRow], writer: W) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    if rows.is_empty() {
        csv.write_record(["id", "stroke"])?;
    }
    for row in rows {
        csv.serialize(row)?;
    }
    csv.flush().context("Failed to write submission")?;
    Ok(())
}
