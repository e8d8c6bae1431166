use ndarray::{ArrayD, ArrayViewD};

/// Trait that all inference backends must implement
///
/// A backend runs one named input tensor through a loaded model and returns
/// one named output tensor. Implementations must be safe to call from several
/// batch workers at once.
pub trait InferenceEngine: Send + Sync {
    /// Returns the engine identifier (e.g., "onnx")
    fn name(&self) -> &str;

    /// Run the model on `input` and return the tensor named `output_name`
    fn run(
        &self,
        input_name: &str,
        output_name: &str,
        input: ArrayViewD<'_, f32>,
    ) -> anyhow::Result<ArrayD<f32>>;
}
