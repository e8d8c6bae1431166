//! Line recognition: fixed-size input preparation, inference, CTC decoding

pub mod ctc;

use crate::engine::InferenceEngine;
use crate::engines::load_engine;
use crate::error::OcrError;
use crate::models::RecognizerConfig;
use crate::preprocessing::{binarize, fit_to_box, pad_square_margins, steps::grayscale};
use ctc::CtcDecoder;
use image::RgbImage;
use ndarray::{Array2, Array3, ArrayD, Axis, Ix2};
use std::sync::Arc;

/// Sequence model that turns a line image into text
#[derive(Clone)]
pub struct Recognizer {
    engine: Arc<dyn InferenceEngine>,
    config: RecognizerConfig,
    decoder: CtcDecoder,
}

impl Recognizer {
    pub fn new(engine: Arc<dyn InferenceEngine>, config: RecognizerConfig) -> Self {
        let decoder = CtcDecoder::new(config.charset.clone(), config.add_blank);
        Self {
            engine,
            config,
            decoder,
        }
    }

    /// Load the model named by `config`
    pub fn from_config(config: RecognizerConfig) -> Result<Self, OcrError> {
        let engine = load_engine(&config.model_file)?;
        tracing::info!(
            "Recognizer ready: {} v{} ({:?} charset, {} symbols)",
            config.architecture,
            config.version,
            config.encoder,
            config.vocabulary_size()
        );
        Ok(Self::new(engine, config))
    }

    pub fn config(&self) -> &RecognizerConfig {
        &self.config
    }

    /// Build the model input tensor for one line crop
    ///
    /// Returns `None` for crops with zero area.
    pub fn prepare(&self, line: &RgbImage) -> Option<ArrayD<f32>> {
        if line.width() == 0 || line.height() == 0 {
            return None;
        }

        let mut gray = grayscale::apply(line);
        if self.config.pre_pad {
            gray = pad_square_margins(&gray);
        }
        let fitted = fit_to_box(&gray, self.config.input_width, self.config.input_height);
        let binary = binarize(&fitted);

        let (w, h) = (self.config.input_width as usize, self.config.input_height as usize);
        let mut input = Array3::<f32>::from_shape_fn((1, h, w), |(_, y, x)| {
            binary.get_pixel(x as u32, y as u32).0[0] as f32 / 127.5 - 1.0
        });

        if self.config.swap_hw {
            input = input.permuted_axes([0, 2, 1]).as_standard_layout().into_owned();
        }

        let input = input.into_dyn();
        if self.config.squeeze_channel {
            Some(input)
        } else {
            Some(input.insert_axis(Axis(1)))
        }
    }

    /// Bring raw model output to a time-major (T, V) matrix
    fn time_major_logits(&self, output: ArrayD<f32>) -> Result<Array2<f32>, String> {
        let mut logits = output;
        while let Some(axis) = logits.shape().iter().position(|&d| d == 1) {
            if logits.ndim() <= 2 {
                break;
            }
            logits = logits.index_axis_move(Axis(axis), 0);
        }

        let logits = logits
            .into_dimensionality::<Ix2>()
            .map_err(|_| "logits do not reduce to a matrix".to_string())?;

        let vocab = self.decoder.vocabulary_size();
        let (rows, cols) = logits.dim();
        if cols == vocab {
            Ok(logits)
        } else if rows == vocab {
            Ok(logits.reversed_axes().as_standard_layout().into_owned())
        } else {
            Err(format!(
                "logits shape ({}, {}) does not match vocabulary size {}",
                rows, cols, vocab
            ))
        }
    }

    /// Recognize the text of line `line_idx`
    ///
    /// A degenerate crop yields an empty string.
    pub fn recognize(&self, line_idx: usize, line: &RgbImage) -> Result<String, OcrError> {
        let Some(input) = self.prepare(line) else {
            tracing::warn!("Line {} has an empty crop, skipping recognition", line_idx);
            return Ok(String::new());
        };

        let output = self
            .engine
            .run(&self.config.input_layer, &self.config.output_layer, input.view())
            .map_err(|e| OcrError::recognition(line_idx, e))?;

        let logits = self
            .time_major_logits(output)
            .map_err(|e| OcrError::recognition(line_idx, e))?;

        Ok(self.decoder.decode(logits.view()))
    }
}
