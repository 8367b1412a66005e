//! Scaler manifest: the column list and standardization statistics the
//! model was trained against.

use crate::error::PreprocessingError;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Fitted standardization transform.
///
/// Every field is optional, matching a standard scaler fit on unnamed input
/// or with centering / scaling turned off. The pipeline aligns against
/// `feature_names` only when they are present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ScalerManifest {
    /// Ordered training-time column names
    #[serde(default)]
    pub feature_names: Option<Vec<String>>,
    /// Per-column mean subtracted before scaling
    #[serde(default)]
    pub mean: Option<Vec<f64>>,
    /// Per-column divisor
    #[serde(default)]
    pub scale: Option<Vec<f64>>,
}

impl ScalerManifest {
    /// Manifest with names and both statistics.
    pub fn new(feature_names: Vec<String>, mean: Vec<f64>, scale: Vec<f64>) -> Self {
        Self {
            feature_names: Some(feature_names),
            mean: Some(mean),
            scale: Some(scale),
        }
    }

    /// Read and validate a JSON manifest.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scaler manifest {}", path.display()))?;
        let manifest: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse scaler manifest {}", path.display()))?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Write the manifest as pretty JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write scaler manifest {}", path.display()))
    }

    /// Check the statistics agree with each other and with the column list.
    pub fn validate(&self) -> Result<()> {
        let width = self.width();
        for (kind, stats) in [("mean", &self.mean), ("scale", &self.scale)] {
            if let (Some(width), Some(stats)) = (width, stats) {
                if stats.len() != width {
                    bail!("manifest has {} columns but {} {} values", width, stats.len(), kind);
                }
            }
        }
        if let Some(names) = &self.feature_names {
            let mut seen = std::collections::HashSet::new();
            if let Some(dup) = names.iter().find(|n| !seen.insert(n.as_str())) {
                bail!("manifest lists column `{}` twice", dup);
            }
        }
        if let Some(scale) = &self.scale {
            if let Some(i) = scale.iter().position(|s| !s.is_finite() || *s == 0.0) {
                bail!("manifest scale for column {} is {}", i, scale[i]);
            }
        }
        if let Some(mean) = &self.mean {
            if let Some(i) = mean.iter().position(|m| !m.is_finite()) {
                bail!("manifest mean for column {} is {}", i, mean[i]);
            }
        }
        Ok(())
    }

    /// Number of columns the scaler was fit on, if known.
    pub fn width(&self) -> Option<usize> {
        self.feature_names
            .as_ref()
            .map(Vec::len)
            .or_else(|| self.mean.as_ref().map(Vec::len))
            .or_else(|| self.scale.as_ref().map(Vec::len))
    }

    /// Column names, when the manifest carries them.
    pub fn columns(&self) -> Option<&[String]> {
        self.feature_names.as_deref()
    }

    /// Training-time mean of a named column.
    ///
    /// `Ok(None)` when the manifest has no names, no means, or no such
    /// column; an error when the column is listed but its mean is absent.
    pub fn mean_of(&self, column: &str) -> Result<Option<f64>, PreprocessingError> {
        let (Some(names), Some(mean)) = (&self.feature_names, &self.mean) else {
            return Ok(None);
        };
        let Some(index) = names.iter().position(|n| n == column) else {
            return Ok(None);
        };
        mean.get(index)
            .copied()
            .map(Some)
            .ok_or_else(|| PreprocessingError::MissingStatistic {
                column: column.to_string(),
                index,
            })
    }

    /// Standardize one value of column `index`.
    pub fn scale_value(&self, index: usize, value: f64) -> f64 {
        let centered = match &self.mean {
            Some(mean) => value - mean.get(index).copied().unwrap_or(0.0),
            None => value,
        };
        match &self.scale {
            Some(scale) => centered / scale.get(index).copied().unwrap_or(1.0),
            None => centered,
        }
    }
}
