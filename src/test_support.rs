//! Mock engines shared by unit tests

use crate::engine::InferenceEngine;
use crate::models::{Architecture, CharsetEncoder, RecognizerConfig};
use crate::pipeline::OcrPipeline;
use crate::recognizer::Recognizer;
use crate::segmenter::Segmenter;
use image::{Rgb, RgbImage};
use ndarray::{ArrayD, ArrayViewD, IxDyn};
use std::path::PathBuf;
use std::sync::Arc;

/// Marks every dark input pixel as text
pub struct InkEngine;

impl InferenceEngine for InkEngine {
    fn name(&self) -> &str {
        "ink"
    }

    fn run(&self, _: &str, _: &str, input: ArrayViewD<'_, f32>) -> anyhow::Result<ArrayD<f32>> {
        let shape = input.shape();
        let (n, t) = (shape[0], shape[2]);
        let mut out = ArrayD::<f32>::from_elem(IxDyn(&[n, 1, t, t]), -10.0);
        for b in 0..n {
            for y in 0..t {
                for x in 0..t {
                    if input[[b, 0, y, x]] < 0.5 {
                        out[[b, 0, y, x]] = 10.0;
                    }
                }
            }
        }
        Ok(out)
    }
}

/// Emits "ab" for any line
pub struct AbEngine;

impl InferenceEngine for AbEngine {
    fn name(&self) -> &str {
        "ab"
    }

    fn run(&self, _: &str, _: &str, _: ArrayViewD<'_, f32>) -> anyhow::Result<ArrayD<f32>> {
        // (T=4, V=3): a, b, blank, blank
        let mut out = ArrayD::<f32>::zeros(IxDyn(&[1, 4, 3]));
        out[[0, 0, 1]] = 1.0;
        out[[0, 1, 2]] = 1.0;
        out[[0, 2, 0]] = 1.0;
        out[[0, 3, 0]] = 1.0;
        Ok(out)
    }
}

pub struct BrokenEngine;

impl InferenceEngine for BrokenEngine {
    fn name(&self) -> &str {
        "broken"
    }

    fn run(&self, _: &str, _: &str, _: ArrayViewD<'_, f32>) -> anyhow::Result<ArrayD<f32>> {
        anyhow::bail!("session lost")
    }
}

pub fn recognizer_config() -> RecognizerConfig {
    RecognizerConfig {
        model_file: PathBuf::from("ocr.onnx"),
        architecture: Architecture::Easter2,
        version: "1".to_string(),
        input_width: 64,
        input_height: 16,
        input_layer: "input".to_string(),
        output_layer: "output".to_string(),
        squeeze_channel: true,
        swap_hw: false,
        encoder: CharsetEncoder::Wylie,
        charset: vec!["a".to_string(), "b".to_string()],
        add_blank: true,
        pre_pad: false,
    }
}

/// Line-mode pipeline over `InkEngine` with the given recognition backend
pub fn pipeline(recognizer: Arc<dyn InferenceEngine>) -> OcrPipeline {
    OcrPipeline::new(
        Segmenter::line(Arc::new(InkEngine), 64),
        Recognizer::new(recognizer, recognizer_config()),
    )
}

/// White 400x100 page with one 300x20 black stroke
pub fn page_with_stroke() -> RgbImage {
    let mut page = RgbImage::from_pixel(400, 100, Rgb([255, 255, 255]));
    for y in 40..60 {
        for x in 50..350 {
            page.put_pixel(x, y, Rgb([0, 0, 0]));
        }
    }
    page
}
