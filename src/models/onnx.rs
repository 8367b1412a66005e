//! ONNX Runtime backend for the model artifact

use crate::error::InferenceError;
use crate::models::inference::Model;
use crate::preprocessing::FeatureMatrix;
use anyhow::{Context, Result};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

/// Network exported to ONNX.
///
/// A session needs exclusive access while it runs, so it sits behind a
/// mutex; concurrent requests queue on it.
pub struct OnnxModel {
    name: String,
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
    outputs_logits: bool,
}

impl OnnxModel {
    /// Load a model file with the given number of intra-op threads.
    pub fn load<P: AsRef<Path>>(path: P, threads: usize) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "model".to_string());

        info!(model = %name, path = %path.display(), threads, "Loading ONNX model");

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(threads)?
            .commit_from_file(path)
            .context(format!("Failed to load model from {:?}", path))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "input".to_string());

        let output_name = session
            .outputs
            .iter()
            .find(|o| o.name.contains("prob") || o.name.contains("output"))
            .or_else(|| session.outputs.first())
            .map(|o| o.name.clone())
            .unwrap_or_else(|| "output_0".to_string());

        info!(
            model = %name,
            input = %input_name,
            output = %output_name,
            "Model loaded successfully"
        );

        Ok(Self {
            name,
            session: Mutex::new(session),
            input_name,
            output_name,
            outputs_logits: false,
        })
    }

    /// Declare whether the output tensor holds logits.
    pub fn with_logits(mut self, outputs_logits: bool) -> Self {
        self.outputs_logits = outputs_logits;
        self
    }
}

impl Model for OnnxModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn predict(&self, features: &FeatureMatrix) -> Result<Vec<Vec<f32>>, InferenceError> {
        // Input tensor - shape [rows, features]
        let shape = vec![features.rows() as i64, features.cols() as i64];
        let input = Tensor::from_array((shape, features.to_f32())).map_err(runtime)?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| InferenceError::Runtime(format!("Lock error: {}", e)))?;
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input])
            .map_err(runtime)?;

        let output = outputs.get(self.output_name.as_str()).ok_or_else(|| {
            InferenceError::Runtime(format!("model has no output named {}", self.output_name))
        })?;
        let (shape, data) = output.try_extract_tensor::<f32>().map_err(runtime)?;
        let dims: Vec<i64> = shape.iter().copied().collect();

        Ok(split_rows(&dims, data))
    }

    fn outputs_logits(&self) -> bool {
        self.outputs_logits
    }
}

fn runtime(e: impl std::fmt::Display) -> InferenceError {
    InferenceError::Runtime(e.to_string())
}

/// Cut flat tensor data into rows.
///
/// `[rows, k]` gives rows of `k` scores, `[rows]` rows of one score, and
/// higher ranks fold their trailing dimensions into each row.
fn split_rows(dims: &[i64], data: &[f32]) -> Vec<Vec<f32>> {
    let width = match dims {
        [] => data.len().max(1),
        [_] => 1,
        [_, rest @ ..] => rest.iter().product::<i64>().max(1) as usize,
    };
    data.chunks(width).map(<[f32]>::to_vec).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_rows() {
        let data = [0.1, 0.9, 0.3, 0.7];
        assert_eq!(split_rows(&[2, 2], &data), vec![vec![0.1, 0.9], vec![0.3, 0.7]]);
        assert_eq!(split_rows(&[4], &data).len(), 4);
        assert_eq!(split_rows(&[4, 1], &data)[3], vec![0.7]);
        assert_eq!(split_rows(&[], &[0.2]), vec![vec![0.2]]);
    }

    #[test]
    fn test_missing_model_file() {
        assert!(OnnxModel::load("/nonexistent/stroke.onnx", 1).is_err());
    }
}
