//! Inference backend implementations
//!
//! This module contains implementations of the InferenceEngine trait for
//! different runtimes. Backends are conditionally compiled based on feature
//! flags.

#[cfg(feature = "onnx")]
pub mod onnx;

use crate::engine::InferenceEngine;
use crate::error::OcrError;
use std::path::Path;
use std::sync::Arc;

/// Information about the compiled-in backend
#[derive(Debug, Clone, serde::Serialize)]
pub struct BackendInfo {
    pub name: &'static str,
    pub execution_providers: Vec<&'static str>,
}

/// Load a model graph with the compiled-in backend
pub fn load_engine(model_path: &Path) -> Result<Arc<dyn InferenceEngine>, OcrError> {
    #[cfg(feature = "onnx")]
    {
        let engine = onnx::OnnxEngine::load(model_path)?;
        tracing::info!("Loaded model {} with onnx backend", engine.model_name());
        Ok(Arc::new(engine))
    }

    #[cfg(not(feature = "onnx"))]
    {
        Err(OcrError::model_load(
            model_path.display(),
            "no inference backend available. Build with --features onnx",
        ))
    }
}

/// Describe the backend models are loaded with
pub fn backend_info() -> Option<BackendInfo> {
    #[cfg(feature = "onnx")]
    {
        Some(BackendInfo {
            name: "onnx",
            execution_providers: onnx::available_execution_providers(),
        })
    }

    #[cfg(not(feature = "onnx"))]
    {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_model_is_load_failure() {
        let err = load_engine(Path::new("/nonexistent/model.onnx")).err().unwrap();
        assert!(matches!(err, OcrError::ModelLoadFailed { .. }));
        assert!(err.to_string().contains("/nonexistent/model.onnx"));
    }
}
