//! Inference engine: preprocessing, model call and probability extraction

use crate::error::{InferenceError, ServiceError};
use crate::models::scaler::ScalerManifest;
use crate::preprocessing::{Encoding, FeatureMatrix, Preprocessor};
use crate::types::prediction::{Prediction, DECISION_THRESHOLD};
use crate::types::record::RawTable;
use std::sync::Arc;
use tracing::debug;

/// A fitted binary classifier.
///
/// Takes the aligned feature matrix and returns one score row per input row:
/// a single positive-class score, or one score per class with the positive
/// class at index 1.
///
/// Scores are read by [`extract_probability`]. Unless
/// [`outputs_logits`](Model::outputs_logits) is set, a score inside `[0, 1]`
/// is taken as a probability and anything outside it as a logit. That guess
/// is discontinuous: a logit of `0.4` reads as probability `0.4` while a
/// logit of `1.1` reads as `0.75`. Models that emit logits should say so.
pub trait Model: Send + Sync {
    /// Model name for logs
    fn name(&self) -> &str;

    fn predict(&self, features: &FeatureMatrix) -> Result<Vec<Vec<f32>>, InferenceError>;

    /// Whether every score is a logit and must go through the logistic
    /// function.
    fn outputs_logits(&self) -> bool {
        false
    }
}

/// Scores for a whole batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchPrediction {
    pub predictions: Vec<Prediction>,
    pub encoding: Encoding,
}

/// Turns raw tables into predictions with one model and an optional manifest.
#[derive(Clone)]
pub struct InferenceEngine {
    model: Arc<dyn Model>,
    preprocessor: Preprocessor,
    threshold: f64,
}

impl InferenceEngine {
    pub fn new(model: Arc<dyn Model>, manifest: Option<Arc<ScalerManifest>>) -> Self {
        Self {
            model,
            preprocessor: Preprocessor::new(manifest),
            threshold: DECISION_THRESHOLD,
        }
    }

    /// Override the decision threshold (offline scoring only; the endpoint
    /// always uses [`DECISION_THRESHOLD`]).
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn encoding(&self) -> Encoding {
        self.preprocessor.encoding()
    }

    /// Score every row, returning only the first row's prediction.
    ///
    /// The remaining rows go through the model but their scores are not
    /// inspected, so a malformed score there does not fail the call.
    pub fn predict_first(&self, table: &RawTable) -> Result<Prediction, ServiceError> {
        let outputs = self.run(table)?;
        let first = outputs.first().ok_or(InferenceError::EmptyOutput(0))?;
        let probability = extract_probability(0, first, self.model.outputs_logits())?;

        debug!(
            model = %self.model.name(),
            rows = outputs.len(),
            probability,
            "Scored first row"
        );
        Ok(Prediction::with_threshold(probability, self.threshold))
    }

    /// Score and label every row.
    pub fn predict_table(&self, table: &RawTable) -> Result<BatchPrediction, ServiceError> {
        let outputs = self.run(table)?;
        let logits = self.model.outputs_logits();
        let predictions = outputs
            .iter()
            .enumerate()
            .map(|(row, scores)| {
                extract_probability(row, scores, logits)
                    .map(|p| Prediction::with_threshold(p, self.threshold))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(BatchPrediction {
            predictions,
            encoding: self.encoding(),
        })
    }

    fn run(&self, table: &RawTable) -> Result<Vec<Vec<f32>>, ServiceError> {
        let features = self.preprocessor.transform(table)?;
        let outputs = self.model.predict(&features)?;
        if outputs.len() != features.rows() {
            return Err(InferenceError::RowMismatch {
                expected: features.rows(),
                got: outputs.len(),
            }
            .into());
        }
        Ok(outputs)
    }
}

/// Positive-class probability from one row of model output.
///
/// One score is the positive class; with several, index 1 is. `logits`
/// forces the logistic function; otherwise it is applied only to scores
/// outside `[0, 1]`.
pub fn extract_probability(
    row: usize,
    scores: &[f32],
    logits: bool,
) -> Result<f64, InferenceError> {
    let score = match scores {
        [] => return Err(InferenceError::EmptyOutput(row)),
        [single] => *single as f64,
        [_, positive, ..] => *positive as f64,
    };
    if !score.is_finite() {
        return Err(InferenceError::NonFinite(row));
    }
    if !logits && (0.0..=1.0).contains(&score) {
        Ok(score)
    } else {
        Ok(sigmoid(score))
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::record::RawRecord;

    /// Returns a fixed score for every row.
    pub(crate) struct ConstantModel(pub Vec<f32>);

    impl Model for ConstantModel {
        fn name(&self) -> &str {
            "constant"
        }

        fn predict(&self, features: &FeatureMatrix) -> Result<Vec<Vec<f32>>, InferenceError> {
            Ok(vec![self.0.clone(); features.rows()])
        }
    }

    /// Scores each row by its age, so row order is observable.
    struct AgeModel;

    impl Model for AgeModel {
        fn name(&self) -> &str {
            "age"
        }

        fn predict(&self, features: &FeatureMatrix) -> Result<Vec<Vec<f32>>, InferenceError> {
            let ages = features.column("age").unwrap_or_default();
            Ok(ages.iter().map(|a| vec![(a / 100.0) as f32]).collect())
        }
    }

    /// Emits raw logits.
    struct LogitModel(f32);

    impl Model for LogitModel {
        fn name(&self) -> &str {
            "logit"
        }

        fn predict(&self, features: &FeatureMatrix) -> Result<Vec<Vec<f32>>, InferenceError> {
            Ok(vec![vec![self.0]; features.rows()])
        }

        fn outputs_logits(&self) -> bool {
            true
        }
    }

    struct ShortModel;

    impl Model for ShortModel {
        fn name(&self) -> &str {
            "short"
        }

        fn predict(&self, _: &FeatureMatrix) -> Result<Vec<Vec<f32>>, InferenceError> {
            Ok(Vec::new())
        }
    }

    fn table(ages: &[f64]) -> RawTable {
        let records: Vec<RawRecord> = ages
            .iter()
            .map(|&age| RawRecord {
                gender: Some("Female".into()),
                age: Some(age),
                hypertension: Some(0.0),
                heart_disease: Some(0.0),
                avg_glucose_level: Some(100.0),
                bmi: Some(24.0),
                ..RawRecord::default()
            })
            .collect();
        RawTable::from_records(&records).unwrap()
    }

    #[test]
    fn test_extract_probability_shapes() {
        assert_eq!(extract_probability(0, &[0.25], false), Ok(0.25));
        assert_eq!(extract_probability(0, &[0.25, 0.75], false), Ok(0.75));
        assert_eq!(extract_probability(3, &[], false), Err(InferenceError::EmptyOutput(3)));
        assert_eq!(
            extract_probability(0, &[f32::NAN], false),
            Err(InferenceError::NonFinite(0))
        );
        assert_eq!(
            extract_probability(0, &[0.2, f32::INFINITY], false),
            Err(InferenceError::NonFinite(0))
        );
    }

    #[test]
    fn test_two_class_output_reads_the_positive_class() {
        // A confident negative must stay negative.
        let p = extract_probability(0, &[0.9, 0.1], false).unwrap();
        assert_eq!(p, 0.1f32 as f64);
        assert_eq!(Prediction::from_probability(p).label, 0);

        let p = extract_probability(0, &[0.3, 0.7], false).unwrap();
        assert_eq!(Prediction::from_probability(p).label, 1);
    }

    #[test]
    fn test_out_of_range_score_is_squashed() {
        let p = extract_probability(0, &[0.0], false).unwrap();
        assert_eq!(p, 0.0);
        let p = extract_probability(0, &[2.0], false).unwrap();
        assert!((p - 0.880_797).abs() < 1e-5);
        let p = extract_probability(0, &[-3.0], false).unwrap();
        assert!(p > 0.0 && p < 0.5);
    }

    #[test]
    fn test_declared_logits_are_always_squashed() {
        assert_eq!(extract_probability(0, &[0.0], true), Ok(0.5));
        let p = extract_probability(0, &[0.4], true).unwrap();
        assert!((p - 0.598_688).abs() < 1e-5);

        let engine = InferenceEngine::new(Arc::new(LogitModel(0.0)), None);
        let prediction = engine.predict_first(&table(&[50.0])).unwrap();
        assert_eq!(prediction.probability, 0.5);
        assert_eq!(prediction.label, 1);
    }

    #[test]
    fn test_predict_first_returns_row_zero() {
        let engine = InferenceEngine::new(Arc::new(AgeModel), None);
        let prediction = engine.predict_first(&table(&[30.0, 80.0])).unwrap();
        assert_eq!(prediction.probability, 0.3f32 as f64);
        assert_eq!(prediction.label, 0);
    }

    #[test]
    fn test_predict_table_scores_every_row() {
        let engine = InferenceEngine::new(Arc::new(ConstantModel(vec![0.5])), None);
        let batch = engine.predict_table(&table(&[30.0, 80.0, 45.0])).unwrap();

        assert_eq!(batch.predictions.len(), 3);
        assert!(batch.predictions.iter().all(|p| p.label == 1));
        assert_eq!(batch.encoding, Encoding::Fallback);
    }

    #[test]
    fn test_custom_threshold() {
        let engine =
            InferenceEngine::new(Arc::new(ConstantModel(vec![0.3])), None).with_threshold(0.25);
        assert_eq!(engine.predict_first(&table(&[50.0])).unwrap().label, 1);
    }

    #[test]
    fn test_row_mismatch_is_an_inference_error() {
        let engine = InferenceEngine::new(Arc::new(ShortModel), None);
        let err = engine.predict_first(&table(&[50.0])).unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Inference(InferenceError::RowMismatch { expected: 1, got: 0 })
        ));
    }
}
