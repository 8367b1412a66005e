//! Stroke Risk Service Library
//!
//! Serves a trained stroke-risk classifier over HTTP. Raw health records
//! arrive as JSON or CSV, go through the same feature engineering and
//! standardization the model was trained with, and come back as a binary
//! label with its probability.

pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod payload;
pub mod preprocessing;
pub mod server;
pub mod training;
pub mod types;

pub use config::AppConfig;
pub use error::ServiceError;
pub use models::inference::InferenceEngine;
pub use models::loader::Artifacts;
pub use preprocessing::Preprocessor;
pub use types::{prediction::Prediction, record::RawTable};
