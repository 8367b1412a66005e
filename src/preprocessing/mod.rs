//! Feature preprocessing for stroke-risk model inference.
//!
//! Reproduces the transformation applied before the scaler was fit:
//! column completion, BMI imputation, interaction features, drop-first
//! one-hot expansion, alignment to the manifest column list and
//! standardization. Without a manifest the fixed-order encoding in
//! [`fallback`] is used instead.
//!
//! Every step works on polars frames; the result is flattened into a
//! [`FeatureMatrix`] only once it is final.

pub mod fallback;
mod matrix;

pub use matrix::FeatureMatrix;

use crate::error::PreprocessingError;
use crate::models::scaler::ScalerManifest;
use crate::types::record::{raw_schema, RawTable, CATEGORICAL_COLUMNS, RAW_COLUMNS};
use polars::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Which encoding produced a feature matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Drop-first one-hot expansion aligned to the manifest, then scaled
    Manifest,
    /// Fixed category ordering, unscaled
    Fallback,
}

/// Converts raw tables into the matrix the model expects.
#[derive(Debug, Clone, Default)]
pub struct Preprocessor {
    manifest: Option<Arc<ScalerManifest>>,
}

impl Preprocessor {
    pub fn new(manifest: Option<Arc<ScalerManifest>>) -> Self {
        Self { manifest }
    }

    /// Preprocessor that always takes the fallback path.
    pub fn fallback() -> Self {
        Self { manifest: None }
    }

    pub fn manifest(&self) -> Option<&ScalerManifest> {
        self.manifest.as_deref()
    }

    /// The encoding [`transform`](Self::transform) will use.
    pub fn encoding(&self) -> Encoding {
        match self.manifest().and_then(ScalerManifest::columns) {
            Some(_) => Encoding::Manifest,
            None => Encoding::Fallback,
        }
    }

    /// Run the full pipeline over a batch.
    pub fn transform(&self, table: &RawTable) -> Result<FeatureMatrix, PreprocessingError> {
        if table.is_empty() {
            return Err(PreprocessingError::EmptyTable);
        }

        let table = complete_columns(table)?;
        let bmi = impute_bmi(&table, self.manifest())?;

        let Some((manifest, columns)) = self
            .manifest()
            .and_then(|m| m.columns().map(|columns| (m, columns)))
        else {
            debug!(rows = table.height(), "No manifest column list, using fallback encoding");
            return fallback::encode(&table, &bmi);
        };

        let frame = engineer_features(&table, bmi)?;
        let (aligned, report) = align(&frame, columns)?;
        report.log();

        let matrix = FeatureMatrix::from_frame(&standardize(&aligned, manifest)?)?;
        debug!(
            rows = matrix.rows(),
            columns = matrix.cols(),
            zero_filled = report.filled.len(),
            dropped = report.dropped.len(),
            "Preprocessed batch"
        );
        Ok(matrix)
    }
}

/// Columns the manifest asked for but the batch did not produce, and
/// engineered columns the manifest does not know.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlignmentReport {
    pub filled: Vec<String>,
    pub dropped: Vec<String>,
}

impl AlignmentReport {
    fn log(&self) {
        for column in &self.dropped {
            if indicator_field(column).is_some() {
                warn!(column = %column, "Categorical level not seen at training time, dropped");
            } else {
                debug!(column = %column, "Column not in manifest, dropped");
            }
        }
        for column in &self.filled {
            if indicator_field(column).is_some() {
                debug!(column = %column, "Level absent from batch, zero-filled");
            } else {
                warn!(
                    column = %column,
                    "Manifest column is not produced by feature engineering, zero-filled"
                );
            }
        }
    }
}

/// Categorical field an indicator column belongs to.
fn indicator_field(column: &str) -> Option<&'static str> {
    CATEGORICAL_COLUMNS.iter().copied().find(|field| {
        column
            .strip_prefix(field)
            .is_some_and(|rest| rest.starts_with('_'))
    })
}

/// Make sure every raw schema column exists.
pub fn complete_columns(table: &RawTable) -> Result<RawTable, PreprocessingError> {
    Ok(table.with_columns(RAW_COLUMNS)?)
}

/// Read a column as optional numbers.
///
/// A cell that holds text which does not parse as a number is an error
/// naming the column and row.
pub fn numeric_column(
    table: &RawTable,
    name: &str,
) -> Result<Float64Chunked, PreprocessingError> {
    let text = table.text_column(name)?;
    let numbers = text.clone().into_series().cast(&DataType::Float64)?;
    let numbers = numbers.f64()?;

    let bad = text
        .into_iter()
        .zip(numbers.into_iter())
        .enumerate()
        .find_map(|(row, cells)| match cells {
            (Some(value), None) => Some((row, value)),
            _ => None,
        });
    if let Some((row, value)) = bad {
        return Err(PreprocessingError::NotNumeric {
            column: name.to_string(),
            row,
            value: value.to_string(),
        });
    }
    Ok(numbers.clone())
}

fn required_column(table: &RawTable, name: &str) -> Result<Float64Chunked, PreprocessingError> {
    let values = numeric_column(table, name)?;
    let missing = values.into_iter().position(|v| v.is_none());
    match missing {
        Some(row) => Err(PreprocessingError::MissingValue {
            column: name.to_string(),
            row,
        }),
        None => Ok(values),
    }
}

/// Fill missing BMI values.
///
/// Batch median first, then the manifest's training mean for `bmi`, then 0.
pub fn impute_bmi(
    table: &RawTable,
    manifest: Option<&ScalerManifest>,
) -> Result<Float64Chunked, PreprocessingError> {
    let bmi = numeric_column(table, "bmi")?;
    let missing = bmi.null_count();
    if missing == 0 {
        return Ok(bmi);
    }

    let fill = match bmi.median() {
        Some(m) => m,
        None => match manifest {
            Some(manifest) => manifest.mean_of("bmi")?.unwrap_or(0.0),
            None => 0.0,
        },
    };

    debug!(missing, fill, "Imputed missing bmi");
    Ok(bmi.fill_null_with_values(fill)?)
}

/// Numeric, interaction and indicator columns, in training order.
///
/// `bmi` must already be imputed. Schema columns that are neither numeric
/// features nor categorical fields (`id`, targets, extras) are not carried.
pub fn engineer_features(
    table: &RawTable,
    bmi: Float64Chunked,
) -> Result<DataFrame, PreprocessingError> {
    let schema = raw_schema();
    let mut columns = Vec::new();
    for (name, dtype) in schema.iter() {
        if dtype != &DataType::Float64 {
            continue;
        }
        let values = match name.as_str() {
            "bmi" => bmi.clone(),
            name => required_column(table, name)?,
        };
        columns.push(values.into_series());
    }

    let age = required_column(table, "age")?;
    let hypertension = required_column(table, "hypertension")?;
    let mut age_bmi = (&age * &bmi).into_series();
    age_bmi.rename("age_bmi");
    let mut age_hypertension = (&age * &hypertension).into_series();
    age_hypertension.rename("age_hypertension");
    columns.push(age_bmi);
    columns.push(age_hypertension);

    for field in CATEGORICAL_COLUMNS {
        columns.extend(expand_categorical(table, field)?);
    }

    Ok(DataFrame::new(columns)?)
}

/// Drop-first one-hot expansion of one field over the levels in the batch.
///
/// Levels are sorted by code point and the first one is the reference.
/// Missing cells are zero in every indicator column.
pub fn expand_categorical(table: &RawTable, field: &str) -> PolarsResult<Vec<Series>> {
    let cells = table.text_column(field)?;
    let levels: BTreeSet<&str> = cells.into_iter().flatten().collect();

    levels
        .into_iter()
        .skip(1)
        .map(|level| indicator(cells, level, &format!("{}_{}", field, level)))
        .collect()
}

/// `1.0` where the cell equals `level`, `0.0` elsewhere (missing included).
pub(crate) fn indicator(cells: &Utf8Chunked, level: &str, name: &str) -> PolarsResult<Series> {
    let mut column = cells
        .equal(level)
        .fill_null_with_values(false)?
        .into_series()
        .cast(&DataType::Float64)?;
    column.rename(name);
    Ok(column)
}

/// Reorder an engineered frame to the manifest columns.
///
/// Missing columns are zero-filled, unknown ones dropped.
pub fn align(
    frame: &DataFrame,
    columns: &[String],
) -> Result<(DataFrame, AlignmentReport), PreprocessingError> {
    let mut report = AlignmentReport::default();
    let names: Vec<String> = frame
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect();

    let mut completed = frame.clone();
    for column in columns {
        if !names.contains(column) {
            report.filled.push(column.clone());
            completed.with_column(Series::new(column, vec![0.0; frame.height()]))?;
        }
    }
    report.dropped = names.into_iter().filter(|n| !columns.contains(n)).collect();

    Ok((completed.select(columns)?, report))
}

/// Apply the manifest scaler to every column of an aligned frame.
fn standardize(frame: &DataFrame, manifest: &ScalerManifest) -> PolarsResult<DataFrame> {
    let columns = frame
        .get_columns()
        .iter()
        .enumerate()
        .map(|(index, series)| -> PolarsResult<Series> {
            let values = series.f64()?;
            Ok(values
                .apply(move |v| manifest.scale_value(index, v))
                .into_series())
        })
        .collect::<PolarsResult<Vec<_>>>()?;
    DataFrame::new(columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::record::RawRecord;

    fn record(gender: &str, work: &str, smoking: &str, bmi: Option<f64>) -> RawRecord {
        RawRecord {
            id: Some("1".into()),
            gender: Some(gender.into()),
            age: Some(50.0),
            hypertension: Some(1.0),
            heart_disease: Some(0.0),
            ever_married: Some("Yes".into()),
            work_type: Some(work.into()),
            residence_type: Some("Urban".into()),
            avg_glucose_level: Some(90.0),
            bmi,
            smoking_status: Some(smoking.into()),
        }
    }

    fn table(records: &[RawRecord]) -> RawTable {
        complete_columns(&RawTable::from_records(records).unwrap()).unwrap()
    }

    fn bmi(values: &[f64]) -> Float64Chunked {
        Float64Chunked::from_slice("bmi", values)
    }

    fn values(frame: &DataFrame, name: &str) -> Vec<f64> {
        frame
            .column(name)
            .unwrap()
            .f64()
            .unwrap()
            .into_no_null_iter()
            .collect()
    }

    fn text(s: &str) -> Option<String> {
        Some(s.to_string())
    }

    /// Column list a scaler fit on the full dataset would carry.
    fn training_columns() -> Vec<String> {
        [
            "age",
            "hypertension",
            "heart_disease",
            "avg_glucose_level",
            "bmi",
            "age_bmi",
            "age_hypertension",
            "gender_Male",
            "gender_Other",
            "ever_married_Yes",
            "work_type_Never_worked",
            "work_type_Private",
            "work_type_Self-employed",
            "work_type_children",
            "Residence_type_Urban",
            "smoking_status_formerly smoked",
            "smoking_status_never smoked",
            "smoking_status_smokes",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    fn manifest() -> Arc<ScalerManifest> {
        let columns = training_columns();
        let n = columns.len();
        let mut mean = vec![0.0; n];
        let mut scale = vec![1.0; n];
        mean[0] = 40.0;
        scale[0] = 20.0;
        mean[4] = 28.0;
        scale[4] = 7.0;
        Arc::new(ScalerManifest::new(columns, mean, scale))
    }

    #[test]
    fn test_output_matches_manifest_columns() {
        let table = table(&[
            record("Male", "Private", "smokes", Some(25.0)),
            record("Female", "Govt_job", "Unknown", Some(31.0)),
        ]);
        let matrix = Preprocessor::new(Some(manifest())).transform(&table).unwrap();

        assert_eq!(matrix.cols(), training_columns().len());
        assert_eq!(matrix.columns(), training_columns().as_slice());
        assert_eq!(matrix.rows(), 2);
        // age scaled with mean 40, scale 20
        assert_eq!(matrix.row(0)[0], 0.5);
        // bmi scaled with mean 28, scale 7
        assert_eq!(matrix.row(1)[4], 3.0 / 7.0);
    }

    #[test]
    fn test_transform_is_idempotent() {
        let table = table(&[
            record("Male", "Private", "smokes", None),
            record("Other", "children", "never smoked", Some(18.2)),
            record("Female", "Self-employed", "formerly smoked", Some(33.3)),
        ]);
        let preprocessor = Preprocessor::new(Some(manifest()));

        let first = preprocessor.transform(&table).unwrap();
        let second = preprocessor.transform(&table).unwrap();
        let bits = |m: &FeatureMatrix| m.values().iter().map(|v| v.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(&first), bits(&second));
    }

    #[test]
    fn test_alignment_hides_batch_composition() {
        let target = record("Female", "Govt_job", "Unknown", Some(25.0));
        let alone = table(&[target.clone()]);
        let mixed = table(&[
            target,
            record("Male", "Private", "smokes", Some(22.0)),
            record("Other", "children", "never smoked", Some(19.0)),
        ]);

        // Expansion differs before alignment...
        let alone_frame = engineer_features(&alone, bmi(&[25.0])).unwrap();
        let mixed_frame = engineer_features(&mixed, bmi(&[25.0, 22.0, 19.0])).unwrap();
        assert_ne!(
            alone_frame.get_column_names(),
            mixed_frame.get_column_names()
        );

        // ...but not after.
        let preprocessor = Preprocessor::new(Some(manifest()));
        let a = preprocessor.transform(&alone).unwrap();
        let b = preprocessor.transform(&mixed).unwrap();
        assert_eq!(a.columns(), b.columns());
        assert_eq!(a.row(0), b.row(0));
    }

    #[test]
    fn test_single_row_batch_loses_its_only_level() {
        // A lone level is the batch's reference level, so its indicator is
        // never emitted and alignment zero-fills it.
        let table = table(&[record("Male", "Private", "smokes", Some(25.0))]);
        let matrix = Preprocessor::new(Some(manifest())).transform(&table).unwrap();

        assert_eq!(matrix.cols(), training_columns().len());
        assert_eq!(matrix.column("gender_Male"), Some(vec![0.0]));
        assert_eq!(matrix.column("work_type_Private"), Some(vec![0.0]));
    }

    #[test]
    fn test_bmi_batch_median() {
        let table = table(&[
            record("Male", "Private", "smokes", None),
            record("Male", "Private", "smokes", Some(20.0)),
            record("Male", "Private", "smokes", Some(40.0)),
        ]);
        let bmi = impute_bmi(&table, Some(&manifest())).unwrap();
        assert_eq!(bmi.into_no_null_iter().collect::<Vec<_>>(), vec![30.0, 20.0, 40.0]);
    }

    #[test]
    fn test_bmi_manifest_mean_then_zero() {
        let table = table(&[record("Male", "Private", "smokes", None)]);
        let filled = |manifest: Option<&ScalerManifest>| {
            impute_bmi(&table, manifest)
                .unwrap()
                .into_no_null_iter()
                .collect::<Vec<_>>()
        };
        assert_eq!(filled(Some(&manifest())), vec![28.0]);
        assert_eq!(filled(None), vec![0.0]);

        let no_bmi = ScalerManifest::new(vec!["age".into()], vec![1.0], vec![1.0]);
        assert_eq!(filled(Some(&no_bmi)), vec![0.0]);
    }

    #[test]
    fn test_bmi_mean_lookup_failure() {
        let table = table(&[record("Male", "Private", "smokes", None)]);
        let broken = ScalerManifest {
            feature_names: Some(vec!["age".into(), "bmi".into()]),
            mean: Some(vec![1.0]),
            scale: None,
        };
        assert!(matches!(
            impute_bmi(&table, Some(&broken)),
            Err(PreprocessingError::MissingStatistic { index: 1, .. })
        ));
    }

    #[test]
    fn test_expand_drops_first_level() {
        let table = table(&[
            record("Male", "Private", "smokes", Some(1.0)),
            record("Female", "children", "Unknown", Some(1.0)),
            record("Male", "Govt_job", "smokes", Some(1.0)),
        ]);

        let gender = expand_categorical(&table, "gender").unwrap();
        assert_eq!(gender.len(), 1);
        assert_eq!(gender[0].name(), "gender_Male");
        assert_eq!(
            gender[0].f64().unwrap().into_no_null_iter().collect::<Vec<_>>(),
            vec![1.0, 0.0, 1.0]
        );

        // Upper case sorts before lower case, so Govt_job is the reference.
        let work: Vec<String> = expand_categorical(&table, "work_type")
            .unwrap()
            .iter()
            .map(|s| s.name().to_string())
            .collect();
        assert_eq!(work, vec!["work_type_Private", "work_type_children"]);
    }

    #[test]
    fn test_single_level_yields_no_columns() {
        let table = table(&[record("Male", "Private", "smokes", Some(1.0))]);
        assert!(expand_categorical(&table, "gender").unwrap().is_empty());
    }

    #[test]
    fn test_missing_levels_are_all_zero() {
        let mut no_gender = record("Male", "Private", "smokes", Some(1.0));
        no_gender.gender = None;
        let table = table(&[
            record("Male", "Private", "smokes", Some(1.0)),
            record("Other", "Private", "smokes", Some(1.0)),
            no_gender,
        ]);

        let gender = expand_categorical(&table, "gender").unwrap();
        assert_eq!(gender.len(), 1);
        assert_eq!(gender[0].name(), "gender_Other");
        assert_eq!(
            gender[0].f64().unwrap().into_no_null_iter().collect::<Vec<_>>(),
            vec![0.0, 1.0, 0.0]
        );
    }

    #[test]
    fn test_align_reports_filled_and_dropped() {
        // "Freelance" sorts before "Private", so it is the reference level and
        // Private becomes an indicator the manifest knows.
        let table_a = table(&[
            record("Male", "Private", "smokes", Some(25.0)),
            record("Female", "Freelance", "smokes", Some(25.0)),
        ]);
        let frame = engineer_features(&table_a, bmi(&[25.0, 25.0])).unwrap();
        let (aligned, report) = align(&frame, &training_columns()).unwrap();

        assert!(report.dropped.is_empty());
        assert!(report.filled.contains(&"gender_Other".to_string()));
        assert!(!report.filled.contains(&"gender_Male".to_string()));
        assert_eq!(aligned.get_column_names(), training_columns());
        assert_eq!(values(&aligned, "work_type_Private"), vec![1.0, 0.0]);
        assert_eq!(values(&aligned, "work_type_children"), vec![0.0, 0.0]);

        // An unseen level that is not the reference has nowhere to go.
        let table_b = table(&[
            record("Male", "Private", "smokes", Some(25.0)),
            record("Female", "Zookeeper", "smokes", Some(25.0)),
        ]);
        let frame = engineer_features(&table_b, bmi(&[25.0, 25.0])).unwrap();
        let (_, report) = align(&frame, &training_columns()).unwrap();
        assert_eq!(report.dropped, vec!["work_type_Zookeeper".to_string()]);
    }

    #[test]
    fn test_non_numeric_value_fails() {
        let table = RawTable::from_rows(
            &["gender", "age"],
            vec![
                vec![text("Male"), text("50")],
                vec![text("Male"), text("old")],
            ],
        )
        .unwrap();

        let err = Preprocessor::new(Some(manifest())).transform(&table).unwrap_err();
        assert_eq!(
            err,
            PreprocessingError::NotNumeric {
                column: "age".into(),
                row: 1,
                value: "old".into()
            }
        );
    }

    #[test]
    fn test_missing_required_numeric_fails_on_manifest_path() {
        let mut r = record("Male", "Private", "smokes", Some(1.0));
        r.avg_glucose_level = None;
        let table = table(&[r]);

        let err = Preprocessor::new(Some(manifest())).transform(&table).unwrap_err();
        assert!(matches!(err, PreprocessingError::MissingValue { ref column, row: 0 } if column == "avg_glucose_level"));
    }

    #[test]
    fn test_empty_table_fails() {
        let table = RawTable::from_rows(&["age"], Vec::new()).unwrap();
        assert_eq!(
            Preprocessor::fallback().transform(&table),
            Err(PreprocessingError::EmptyTable)
        );
    }

    #[test]
    fn test_encoding_selection() {
        assert_eq!(Preprocessor::fallback().encoding(), Encoding::Fallback);
        assert_eq!(Preprocessor::new(Some(manifest())).encoding(), Encoding::Manifest);

        let unnamed = ScalerManifest {
            feature_names: None,
            mean: Some(vec![0.0]),
            scale: Some(vec![1.0]),
        };
        assert_eq!(
            Preprocessor::new(Some(Arc::new(unnamed))).encoding(),
            Encoding::Fallback
        );
    }

    #[test]
    fn test_columns_outside_schema_are_ignored() {
        let rows = vec![serde_json::json!({
            "gender": "Male", "age": 50, "hypertension": 0, "heart_disease": 0,
            "ever_married": "Yes", "work_type": "Private", "Residence_type": "Urban",
            "avg_glucose_level": 90, "bmi": 25, "smoking_status": "smokes",
            "stroke": 1, "favourite_colour": "blue"
        })
        .as_object()
        .cloned()
        .unwrap()];
        let table = complete_columns(&RawTable::from_json_rows(&rows).unwrap()).unwrap();
        let frame = engineer_features(&table, bmi(&[25.0])).unwrap();

        assert!(frame.column("stroke").is_err());
        assert!(frame.column("favourite_colour").is_err());
        assert_eq!(values(&frame, "age_bmi"), vec![1250.0]);
        assert_eq!(values(&frame, "age_hypertension"), vec![0.0]);
    }
}
