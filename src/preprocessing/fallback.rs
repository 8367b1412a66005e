//! Fixed-order encoding used when no manifest column list is available.
//!
//! Unlike the manifest path this does not look at the rest of the batch:
//! every category set is hard-coded, so a record always maps to the same
//! 19 values.

use super::{indicator, numeric_column, FeatureMatrix};
use crate::error::PreprocessingError;
use crate::types::record::RawTable;
use polars::prelude::*;

pub const GENDERS: [&str; 3] = ["Female", "Male", "Other"];

pub const WORK_TYPES: [&str; 5] = [
    "children",
    "Govt_job",
    "Never_worked",
    "Private",
    "Self-employed",
];

pub const SMOKING_STATUSES: [&str; 4] = ["formerly smoked", "never smoked", "smokes", "Unknown"];

/// Spellings of a positive `ever_married` answer (compared lower-cased).
const MARRIED_TOKENS: [&str; 4] = ["yes", "y", "true", "1"];

/// Output column names, in vector order.
pub const FALLBACK_COLUMNS: [&str; 19] = [
    "gender_Female",
    "gender_Male",
    "gender_Other",
    "age",
    "hypertension",
    "heart_disease",
    "ever_married",
    "work_type_children",
    "work_type_Govt_job",
    "work_type_Never_worked",
    "work_type_Private",
    "work_type_Self-employed",
    "Residence_type",
    "avg_glucose_level",
    "bmi",
    "smoking_status_formerly smoked",
    "smoking_status_never smoked",
    "smoking_status_smokes",
    "smoking_status_Unknown",
];

/// Encode every row of an already-completed table. `bmi` holds the imputed
/// BMI column.
pub fn encode(
    table: &RawTable,
    bmi: &Float64Chunked,
) -> Result<FeatureMatrix, PreprocessingError> {
    let mut columns = one_hot(table, "gender", &GENDERS)?;
    columns.push(number_or_zero(table, "age")?);
    columns.push(number_or_zero(table, "hypertension")?);
    columns.push(number_or_zero(table, "heart_disease")?);
    columns.push(flag_column(table, "ever_married", |s| MARRIED_TOKENS.contains(&s))?);
    columns.extend(one_hot(table, "work_type", &WORK_TYPES)?);
    columns.push(flag_column(table, "Residence_type", |s| s == "urban")?);
    columns.push(number_or_zero(table, "avg_glucose_level")?);
    columns.push(bmi.clone().into_series());
    columns.extend(one_hot(table, "smoking_status", &SMOKING_STATUSES)?);

    let frame = DataFrame::new(columns)?;
    debug_assert_eq!(frame.get_column_names(), FALLBACK_COLUMNS);
    Ok(FeatureMatrix::from_frame(&frame)?)
}

fn one_hot(table: &RawTable, field: &str, levels: &[&str]) -> PolarsResult<Vec<Series>> {
    let cells = table.text_column(field)?;
    levels
        .iter()
        .map(|level| indicator(cells, level, &format!("{}_{}", field, level)))
        .collect()
}

/// `1.0` where the trimmed, lower-cased cell satisfies `set`.
fn flag_column(
    table: &RawTable,
    column: &str,
    set: impl Fn(&str) -> bool,
) -> PolarsResult<Series> {
    let flags: Vec<f64> = table
        .text_column(column)?
        .into_iter()
        .map(|cell| match cell {
            Some(text) if set(text.trim().to_lowercase().as_str()) => 1.0,
            _ => 0.0,
        })
        .collect();
    Ok(Series::new(column, flags))
}

fn number_or_zero(table: &RawTable, column: &str) -> Result<Series, PreprocessingError> {
    Ok(numeric_column(table, column)?
        .fill_null_with_values(0.0)?
        .into_series())
}
