//! Raw health-record data structures
//!
//! Requests are resolved into a [`RawTable`]: a polars frame whose columns
//! all hold text, the shape a CSV file or a list of JSON objects naturally
//! has. Numeric coercion happens later, in the preprocessing pipeline, by
//! casting to [`raw_schema`], so that a bad value is reported against its
//! column and row.

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Columns every raw table carries after column completion, in input order.
pub const RAW_COLUMNS: [&str; 11] = [
    "id",
    "gender",
    "age",
    "hypertension",
    "heart_disease",
    "ever_married",
    "work_type",
    "Residence_type",
    "avg_glucose_level",
    "bmi",
    "smoking_status",
];

/// Categorical fields, in the order their indicator columns are emitted.
pub const CATEGORICAL_COLUMNS: [&str; 5] = [
    "gender",
    "ever_married",
    "work_type",
    "Residence_type",
    "smoking_status",
];

/// Tokens read as a missing value (the usual CSV null spellings).
const MISSING_TOKENS: [&str; 10] = [
    "", "NA", "N/A", "n/a", "NaN", "nan", "null", "NULL", "None", "<NA>",
];

/// Typed schema of a stroke record.
pub fn raw_schema() -> Schema {
    Schema::from_iter(vec![
        Field::new("id", DataType::Utf8),
        Field::new("gender", DataType::Utf8),
        Field::new("age", DataType::Float64),
        Field::new("hypertension", DataType::Float64),
        Field::new("heart_disease", DataType::Float64),
        Field::new("ever_married", DataType::Utf8),
        Field::new("work_type", DataType::Utf8),
        Field::new("Residence_type", DataType::Utf8),
        Field::new("avg_glucose_level", DataType::Float64),
        Field::new("bmi", DataType::Float64),
        Field::new("smoking_status", DataType::Utf8),
    ])
}

/// Cell text of a CSV field: trimmed, `None` for the missing spellings.
pub fn cell_from_field(field: &str) -> Option<String> {
    let field = field.trim();
    if MISSING_TOKENS.contains(&field) {
        None
    } else {
        Some(field.to_string())
    }
}

/// Cell text of a JSON value. Booleans read as `1` / `0`.
pub fn cell_from_json(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        serde_json::Value::Number(n) => n.as_f64().filter(|v| !v.is_nan()).map(|v| v.to_string()),
        serde_json::Value::String(s) => cell_from_field(s),
        other => Some(other.to_string()),
    }
}

/// Make header names unique and non-blank the way pandas reads a CSV:
/// a blank name becomes `Unnamed: <position>`, a repeated one gets a
/// `.1`, `.2`, ... suffix.
pub fn unique_headers<I, S>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let names: Vec<String> = names
        .into_iter()
        .enumerate()
        .map(|(i, name)| match name.as_ref().trim() {
            "" => format!("Unnamed: {}", i),
            name => name.to_string(),
        })
        .collect();

    let mut taken: HashSet<String> = HashSet::new();
    let mut unique = Vec::with_capacity(names.len());
    for name in &names {
        let mut candidate = name.clone();
        let mut suffix = 0;
        while taken.contains(&candidate) {
            suffix += 1;
            candidate = format!("{}.{}", name, suffix);
        }
        taken.insert(candidate.clone());
        unique.push(candidate);
    }
    unique
}

/// Canonical tabular form of a request: rows × named text columns.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    frame: DataFrame,
}

impl RawTable {
    /// Build a table from a header and rows of cells. Header names are made
    /// unique with [`unique_headers`]; short rows are padded with missing
    /// cells and extra cells are ignored.
    pub fn from_rows<S: AsRef<str>>(
        header: &[S],
        rows: Vec<Vec<Option<String>>>,
    ) -> PolarsResult<Self> {
        let names = unique_headers(header);
        let mut columns: Vec<Vec<Option<String>>> =
            vec![Vec::with_capacity(rows.len()); names.len()];
        for mut row in rows {
            row.resize(names.len(), None);
            for (column, cell) in columns.iter_mut().zip(row) {
                column.push(cell);
            }
        }

        let series = names
            .iter()
            .zip(columns)
            .map(|(name, values)| Series::new(name, values))
            .collect::<Vec<_>>();
        Ok(Self {
            frame: DataFrame::new(series)?,
        })
    }

    /// Build a table from JSON objects. Columns appear in first-seen key
    /// order; keys absent from a row read as missing.
    pub fn from_json_rows(
        rows: &[serde_json::Map<String, serde_json::Value>],
    ) -> PolarsResult<Self> {
        let mut header: Vec<&str> = Vec::new();
        for row in rows {
            for key in row.keys() {
                if !header.contains(&key.as_str()) {
                    header.push(key);
                }
            }
        }
        let cells = rows
            .iter()
            .map(|row| {
                header
                    .iter()
                    .map(|key| row.get(*key).and_then(cell_from_json))
                    .collect()
            })
            .collect();
        Self::from_rows(&header, cells)
    }

    /// Build a table from typed records.
    pub fn from_records(records: &[RawRecord]) -> PolarsResult<Self> {
        let rows = records.iter().map(|r| r.cells().to_vec()).collect();
        Self::from_rows(&RAW_COLUMNS, rows)
    }

    /// Copy with an all-missing column for every name not present yet.
    pub fn with_columns<I, S>(&self, names: I) -> PolarsResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut frame = self.frame.clone();
        for name in names {
            let name = name.as_ref();
            if !self.has_column(name) {
                frame.with_column(Series::full_null(name, self.height(), &DataType::Utf8))?;
            }
        }
        Ok(Self { frame })
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.frame.column(name).is_ok()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.frame.get_column_names()
    }

    /// Text cells of one column.
    pub fn text_column(&self, name: &str) -> PolarsResult<&Utf8Chunked> {
        self.frame.column(name)?.utf8()
    }

    /// Cell at `(row, column)`; `None` when missing or the column does not
    /// exist.
    pub fn text(&self, row: usize, name: &str) -> Option<&str> {
        self.text_column(name)
            .ok()
            .filter(|cells| row < cells.len())
            .and_then(|cells| cells.get(row))
    }

    /// Number of rows
    pub fn height(&self) -> usize {
        self.frame.height()
    }

    pub fn is_empty(&self) -> bool {
        self.height() == 0
    }
}

/// One subject's health record.
///
/// Typed counterpart of a raw table row, used when building tables in code.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawRecord {
    #[serde(default)]
    pub id: Option<String>,
    pub gender: Option<String>,
    pub age: Option<f64>,
    pub hypertension: Option<f64>,
    pub heart_disease: Option<f64>,
    pub ever_married: Option<String>,
    pub work_type: Option<String>,
    #[serde(rename = "Residence_type")]
    pub residence_type: Option<String>,
    pub avg_glucose_level: Option<f64>,
    #[serde(default)]
    pub bmi: Option<f64>,
    pub smoking_status: Option<String>,
}

impl RawRecord {
    /// Cells in [`RAW_COLUMNS`] order.
    pub fn cells(&self) -> [Option<String>; 11] {
        let number = |v: Option<f64>| v.filter(|n| !n.is_nan()).map(|n| n.to_string());
        [
            self.id.clone(),
            self.gender.clone(),
            number(self.age),
            number(self.hypertension),
            number(self.heart_disease),
            self.ever_married.clone(),
            self.work_type.clone(),
            self.residence_type.clone(),
            number(self.avg_glucose_level),
            number(self.bmi),
            self.smoking_status.clone(),
        ]
    }
}
