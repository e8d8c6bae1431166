//! ONNX Runtime engine implementation
//!
//! Loads segmentation and recognition graphs with `ort`. Execution providers
//! are registered best-first; the runtime silently skips the ones it cannot
//! initialize on this machine.

use crate::engine::InferenceEngine;
use crate::error::OcrError;
use anyhow::{anyhow, Context};
use ndarray::{ArrayD, ArrayViewD, IxDyn};
use ort::execution_providers::{CPUExecutionProvider, CUDAExecutionProvider, ExecutionProvider};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;
use parking_lot::Mutex;
use std::path::Path;

/// Names of the execution providers usable on this machine, best first
pub fn available_execution_providers() -> Vec<&'static str> {
    let mut providers = Vec::new();
    if CUDAExecutionProvider::default().is_available().unwrap_or(false) {
        providers.push("CUDA");
    }
    providers.push("CPU");
    providers
}

/// Inference engine wrapping an ONNX Runtime session
pub struct OnnxEngine {
    session: Mutex<Session>,
    model_name: String,
    output_names: Vec<String>,
}

impl OnnxEngine {
    /// Load an ONNX graph from disk
    pub fn load(model_path: &Path) -> Result<Self, OcrError> {
        let artifact = model_path.display().to_string();
        if !model_path.exists() {
            return Err(OcrError::model_load(&artifact, "model file not found"));
        }

        tracing::info!(
            "Loading ONNX model {} (available providers: {:?})",
            artifact,
            available_execution_providers()
        );

        let session = build_session(model_path).map_err(|e| OcrError::model_load(&artifact, e))?;

        let model_name = model_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| artifact.clone());

        let output_names = session.outputs.iter().map(|o| o.name.clone()).collect();

        Ok(Self {
            session: Mutex::new(session),
            model_name,
            output_names,
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// Fail unless the graph declares an output called `wanted`
fn ensure_output(model_name: &str, declared: &[String], wanted: &str) -> anyhow::Result<()> {
    if declared.iter().any(|name| name == wanted) {
        Ok(())
    } else {
        Err(anyhow!(
            "Model {} has no output named '{}' (outputs: {})",
            model_name,
            wanted,
            declared.join(", ")
        ))
    }
}

fn build_session(model_path: &Path) -> ort::Result<Session> {
    Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_execution_providers([
            CUDAExecutionProvider::default().build(),
            CPUExecutionProvider::default().build(),
        ])?
        .commit_from_file(model_path)
}

impl InferenceEngine for OnnxEngine {
    fn name(&self) -> &str {
        "onnx"
    }

    fn run(
        &self,
        input_name: &str,
        output_name: &str,
        input: ArrayViewD<'_, f32>,
    ) -> anyhow::Result<ArrayD<f32>> {
        let standard = input.as_standard_layout();
        let tensor = TensorRef::from_array_view(standard.view())
            .context("Failed to wrap input tensor")?;

        ensure_output(&self.model_name, &self.output_names, output_name)?;

        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs![input_name => tensor])
            .with_context(|| format!("Failed to run model {}", self.model_name))?;

        let (shape, data) = outputs
            .get(output_name)
            .ok_or_else(|| anyhow!("Model {} produced no output '{}'", self.model_name, output_name))?
            .try_extract_tensor::<f32>()
            .with_context(|| format!("Output '{}' is not an f32 tensor", output_name))?;

        let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
        let array = ArrayD::from_shape_vec(IxDyn(&dims), data.to_vec())
            .context("Output tensor shape does not match its data")?;

        Ok(array)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_output_name_is_an_error() {
        let declared = vec!["logits".to_string(), "features".to_string()];
        assert!(ensure_output("crnn", &declared, "logits").is_ok());

        let err = ensure_output("crnn", &declared, "output").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("'output'"), "{}", message);
        assert!(message.contains("logits, features"), "{}", message);
    }

    #[test]
    fn test_missing_model_file_fails_to_load() {
        let err = OnnxEngine::load(Path::new("/nonexistent/line.onnx")).err().unwrap();
        assert!(matches!(err, OcrError::ModelLoadFailed { .. }));
    }
}
