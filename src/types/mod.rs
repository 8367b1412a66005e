//! Type definitions for the stroke risk service

pub mod prediction;
pub mod record;

pub use prediction::{Prediction, DECISION_THRESHOLD};
pub use record::{RawRecord, RawTable};
