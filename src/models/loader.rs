//! Startup loading of the model and scaler artifacts

use crate::config::ArtifactsConfig;
use crate::error::ArtifactUnavailable;
use crate::models::inference::{InferenceEngine, Model};
use crate::models::scaler::ScalerManifest;
use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Artifact slot: loaded, or the reason it is not.
#[derive(Debug, Clone)]
pub enum ArtifactState<T> {
    Loaded(T),
    Unavailable(String),
}

impl<T> ArtifactState<T> {
    /// Record a load attempt. Failures are logged and kept as the reason.
    pub fn from_result(artifact: &str, result: Result<T>) -> Self {
        match result {
            Ok(value) => ArtifactState::Loaded(value),
            Err(e) => {
                let reason = format!("{:#}", e);
                warn!(artifact = %artifact, error = %reason, "Artifact failed to load");
                ArtifactState::Unavailable(reason)
            }
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, ArtifactState::Loaded(_))
    }

    pub fn get(&self) -> Option<&T> {
        match self {
            ArtifactState::Loaded(value) => Some(value),
            ArtifactState::Unavailable(_) => None,
        }
    }

    pub fn require(&self, artifact: &'static str) -> Result<&T, ArtifactUnavailable> {
        match self {
            ArtifactState::Loaded(value) => Ok(value),
            ArtifactState::Unavailable(reason) => Err(ArtifactUnavailable {
                artifact,
                reason: reason.clone(),
            }),
        }
    }
}

/// Loader for model files
#[derive(Debug, Clone)]
pub struct ModelLoader {
    /// Number of threads for ONNX inference
    onnx_threads: usize,
}

impl ModelLoader {
    /// Create a new model loader with the specified number of threads
    pub fn with_threads(onnx_threads: usize) -> Result<Self> {
        #[cfg(feature = "onnx")]
        {
            ort::init().commit()?;
            info!(onnx_threads, "ONNX Runtime initialized");
        }
        Ok(Self {
            onnx_threads: onnx_threads.max(1),
        })
    }

    /// Load the model file at `path`. `outputs_logits` marks a network
    /// whose scores still need the logistic function.
    #[cfg(feature = "onnx")]
    pub fn load_model<P: AsRef<Path>>(
        &self,
        path: P,
        outputs_logits: bool,
    ) -> Result<Arc<dyn Model>> {
        let model = crate::models::onnx::OnnxModel::load(path, self.onnx_threads)?
            .with_logits(outputs_logits);
        Ok(Arc::new(model))
    }

    #[cfg(not(feature = "onnx"))]
    pub fn load_model<P: AsRef<Path>>(
        &self,
        path: P,
        outputs_logits: bool,
    ) -> Result<Arc<dyn Model>> {
        let _ = (path, outputs_logits);
        anyhow::bail!("built without ONNX Runtime support")
    }
}

/// The artifacts shared by every request.
///
/// Loaded once at startup and read-only afterwards. Either slot may be
/// unavailable: without the model `/predict` answers 503, without the
/// manifest it falls back to the fixed encoding.
#[derive(Clone)]
pub struct Artifacts {
    pub model: ArtifactState<Arc<dyn Model>>,
    pub manifest: ArtifactState<Arc<ScalerManifest>>,
}

impl Artifacts {
    pub fn new(model: Arc<dyn Model>, manifest: Option<Arc<ScalerManifest>>) -> Self {
        Self {
            model: ArtifactState::Loaded(model),
            manifest: match manifest {
                Some(m) => ArtifactState::Loaded(m),
                None => ArtifactState::Unavailable("no manifest provided".to_string()),
            },
        }
    }

    /// Both slots empty with the same reason.
    pub fn unavailable(reason: &str) -> Self {
        Self {
            model: ArtifactState::Unavailable(reason.to_string()),
            manifest: ArtifactState::Unavailable(reason.to_string()),
        }
    }

    /// Load both artifacts. A failure leaves its slot unavailable and the
    /// service keeps starting.
    pub fn load(config: &ArtifactsConfig) -> Self {
        let model = ModelLoader::with_threads(config.onnx_threads).and_then(|loader| {
            loader.load_model(&config.model_path, config.model_outputs_logits)
        });
        let manifest = ScalerManifest::load(&config.manifest_path).map(Arc::new);

        let artifacts = Self {
            model: ArtifactState::from_result("model", model),
            manifest: ArtifactState::from_result("scaler", manifest),
        };

        info!(
            model_loaded = artifacts.model.is_loaded(),
            scaler_loaded = artifacts.manifest.is_loaded(),
            model_path = %config.model_path.display(),
            manifest_path = %config.manifest_path.display(),
            "Artifacts loaded"
        );
        artifacts
    }

    /// Engine over the loaded model, using the manifest when there is one.
    pub fn engine(&self) -> Result<InferenceEngine, ArtifactUnavailable> {
        let model = self.model.require("Model")?;
        Ok(InferenceEngine::new(
            Arc::clone(model),
            self.manifest.get().cloned(),
        ))
    }
}
