//! Prediction result returned by `/predict`

use serde::{Deserialize, Serialize};

/// Probability at or above which a record is labelled positive.
pub const DECISION_THRESHOLD: f64 = 0.5;

/// Binary label plus the probability it was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// 1 = stroke risk, 0 = no stroke risk
    pub label: u8,
    /// Model probability in [0, 1]
    pub probability: f64,
}

impl Prediction {
    /// Label a probability with the fixed decision threshold.
    pub fn from_probability(probability: f64) -> Self {
        Self::with_threshold(probability, DECISION_THRESHOLD)
    }

    pub fn with_threshold(probability: f64, threshold: f64) -> Self {
        Self {
            label: u8::from(probability >= threshold),
            probability,
        }
    }

    pub fn is_positive(&self) -> bool {
        self.label == 1
    }
}
