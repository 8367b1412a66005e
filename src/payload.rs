//! Request body decoding
//!
//! Every accepted body shape is resolved into a [`RawTable`] here, so the
//! rest of the prediction path never looks at content types.

use crate::error::PayloadError;
use crate::types::record::{cell_from_field, RawTable};
use axum::body::Bytes;
use serde_json::{Map, Value as JsonValue};

/// Body encodings accepted by `/predict`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Json,
    Csv,
    /// Form upload; the first file part holds CSV.
    Multipart,
    /// Raw upload, read as CSV.
    OctetStream,
}

impl ContentKind {
    /// Classify a `Content-Type` header value.
    pub fn from_header(header: Option<&str>) -> Result<Self, PayloadError> {
        let value = header.unwrap_or_default().to_ascii_lowercase();
        if value.contains("application/json") {
            Ok(ContentKind::Json)
        } else if value.contains("text/csv") {
            Ok(ContentKind::Csv)
        } else if value.contains("multipart/form-data") {
            Ok(ContentKind::Multipart)
        } else if value.contains("application/octet-stream") {
            Ok(ContentKind::OctetStream)
        } else {
            Err(PayloadError::UnsupportedContentType(value))
        }
    }
}

/// A decoded request body.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// A single JSON object
    Record(Map<String, JsonValue>),
    /// A JSON list of objects
    Records(Vec<Map<String, JsonValue>>),
    /// CSV text with a header line
    Csv(Bytes),
}

impl Payload {
    /// Parse a JSON body: one object, or a list of objects.
    pub fn from_json(body: &[u8]) -> Result<Self, PayloadError> {
        if is_blank(body) {
            return Err(PayloadError::EmptyBody);
        }
        let value: JsonValue =
            serde_json::from_slice(body).map_err(|e| PayloadError::InvalidJson(e.to_string()))?;

        match value {
            JsonValue::Object(record) => Ok(Payload::Record(record)),
            JsonValue::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| match item {
                    JsonValue::Object(record) => Ok(record),
                    other => Err(PayloadError::InvalidJson(format!(
                        "item {} is {}, expected an object",
                        i,
                        json_kind(&other)
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Payload::Records),
            other => Err(PayloadError::InvalidJson(format!(
                "expected an object or a list of objects, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Wrap a CSV body.
    pub fn from_csv(body: Bytes) -> Result<Self, PayloadError> {
        if is_blank(&body) {
            return Err(PayloadError::EmptyBody);
        }
        Ok(Payload::Csv(body))
    }

    /// Resolve into a raw table with at least one row.
    pub fn into_table(self) -> Result<RawTable, PayloadError> {
        let table = match self {
            Payload::Record(record) => RawTable::from_json_rows(&[record])
                .map_err(|e| PayloadError::InvalidJson(e.to_string()))?,
            Payload::Records(records) => RawTable::from_json_rows(&records)
                .map_err(|e| PayloadError::InvalidJson(e.to_string()))?,
            Payload::Csv(body) => read_csv(&body)?,
        };
        if table.is_empty() {
            return Err(PayloadError::NoRows);
        }
        Ok(table)
    }
}

/// Read CSV text with a header line into a raw table. Cells stay text.
///
/// Blank header names become `Unnamed: <position>` and repeated ones get a
/// numeric suffix (`age`, `age.1`), so every cell keeps its own column.
pub fn read_csv(body: &[u8]) -> Result<RawTable, PayloadError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(body);

    let headers = reader
        .headers()
        .map_err(|e| PayloadError::InvalidCsv(e.to_string()))?
        .clone();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| PayloadError::InvalidCsv(e.to_string()))?;
        if record.len() > headers.len() {
            return Err(PayloadError::InvalidCsv(format!(
                "line {}: expected {} fields, saw {}",
                record.position().map_or(0, |p| p.line()),
                headers.len(),
                record.len()
            )));
        }
        rows.push(record.iter().map(cell_from_field).collect());
    }

    let header: Vec<&str> = headers.iter().collect();
    RawTable::from_rows(&header, rows).map_err(|e| PayloadError::InvalidCsv(e.to_string()))
}

fn is_blank(body: &[u8]) -> bool {
    body.iter().all(u8::is_ascii_whitespace)
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "a list",
        JsonValue::Object(_) => "an object",
    }
}
