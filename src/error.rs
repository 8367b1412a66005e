//! Error taxonomy for the prediction path
//!
//! Each layer owns a typed error; [`ServiceError`] gathers them at the HTTP
//! boundary where they are turned into a status code and message.

use polars::prelude::PolarsError;
use thiserror::Error;

/// Malformed or unsupported request body.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("Unsupported content-type: {0} (send JSON or CSV)")]
    UnsupportedContentType(String),

    #[error("Invalid JSON payload: {0}")]
    InvalidJson(String),

    #[error("Invalid CSV payload: {0}")]
    InvalidCsv(String),

    #[error("Invalid multipart payload: {0}")]
    InvalidMultipart(String),

    #[error("Failed to read request body: {0}")]
    UnreadableBody(String),

    #[error("Empty request body")]
    EmptyBody,

    #[error("Payload did not contain any rows")]
    NoRows,
}

/// Schema or type-coercion failure while building the feature matrix.
#[derive(Debug, Error, PartialEq)]
pub enum PreprocessingError {
    #[error("Input table has no rows")]
    EmptyTable,

    #[error("Column `{column}` row {row}: cannot convert {value:?} to a number")]
    NotNumeric {
        column: String,
        row: usize,
        value: String,
    },

    #[error("Column `{column}` row {row} is missing and has no default")]
    MissingValue { column: String, row: usize },

    #[error("Scaler manifest lists `{column}` at position {index} but has no mean for it")]
    MissingStatistic { column: String, index: usize },

    #[error("Frame operation failed: {0}")]
    Frame(String),
}

impl From<PolarsError> for PreprocessingError {
    fn from(e: PolarsError) -> Self {
        PreprocessingError::Frame(e.to_string())
    }
}

/// Model invocation failure.
#[derive(Debug, Error, PartialEq)]
pub enum InferenceError {
    #[error("Model runtime error: {0}")]
    Runtime(String),

    #[error("Model returned no scores for row {0}")]
    EmptyOutput(usize),

    #[error("Model returned {got} rows for {expected} inputs")]
    RowMismatch { expected: usize, got: usize },

    #[error("Model returned a non-finite score for row {0}")]
    NonFinite(usize),
}

/// An artifact that failed to load at startup.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("{artifact} not loaded on the server: {reason}")]
pub struct ArtifactUnavailable {
    pub artifact: &'static str,
    pub reason: String,
}

/// Everything that can fail a `/predict` request.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Payload(#[from] PayloadError),

    #[error(transparent)]
    Unavailable(#[from] ArtifactUnavailable),

    #[error("Error preprocessing input: {0}")]
    Preprocessing(#[from] PreprocessingError),

    #[error("Prediction failed: {0}")]
    Inference(#[from] InferenceError),
}

impl ServiceError {
    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Payload(PayloadError::UnsupportedContentType(_)) => "unsupported_media",
            ServiceError::Payload(_) => "payload",
            ServiceError::Unavailable(_) => "unavailable",
            ServiceError::Preprocessing(_) => "preprocessing",
            ServiceError::Inference(_) => "inference",
        }
    }
}
