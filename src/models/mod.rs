//! Model artifacts and inference components

pub mod inference;
pub mod loader;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod scaler;

pub use inference::{InferenceEngine, Model};
pub use loader::{ArtifactState, Artifacts, ModelLoader};
pub use scaler::ScalerManifest;
