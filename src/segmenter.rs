//! Tile-based line and layout segmentation
//!
//! Both variants share the tile engine and the backend call; they differ in
//! how the model's channels become masks.

use crate::engine::InferenceEngine;
use crate::engines::load_engine;
use crate::error::OcrError;
use crate::models::{SegmenterConfig, LINE_CLASS};
use crate::preprocessing::{binarize, steps::grayscale};
use crate::tiling::{plane_to_mask, tile_page, TileGrid};
use image::{imageops::FilterType, GrayImage, RgbImage};
use ndarray::{s, Array2, Array4, ArrayD, Axis, Ix4};
use std::sync::Arc;

/// Default probability a line model's pixel must exceed
pub const LINE_CLASS_THRESHOLD: f32 = 0.9;

/// Default probability a layout model's class must exceed
pub const LAYOUT_CLASS_THRESHOLD: f32 = 0.8;

/// Position of the text-line channel in the canonical layout class order
const FALLBACK_LINE_CHANNEL: usize = 2;

const INPUT_NAME: &str = "input";
const OUTPUT_NAME: &str = "output";

/// A loaded segmentation network and its tiling parameters
#[derive(Clone)]
pub struct SegmentationModel {
    engine: Arc<dyn InferenceEngine>,
    patch_size: u32,
    class_threshold: f32,
}

/// Segmenter variants
#[derive(Clone)]
pub enum Segmenter {
    /// Single logit channel, foreground = text line
    Line(SegmentationModel),
    /// One softmax channel per class label
    Layout {
        model: SegmentationModel,
        classes: Vec<String>,
        line_channel: usize,
    },
}

/// Per-class binary masks produced by a layout model
#[derive(Debug, Clone)]
pub struct LayoutMask {
    pub classes: Vec<String>,
    pub masks: Vec<GrayImage>,
    line_channel: usize,
}

impl LayoutMask {
    /// Mask of the class labelled `label`
    pub fn channel(&self, label: &str) -> Option<&GrayImage> {
        self.classes
            .iter()
            .position(|c| c == label)
            .and_then(|idx| self.masks.get(idx))
    }

    /// Mask of the text-line class
    pub fn text_lines(&self) -> &GrayImage {
        &self.masks[self.line_channel]
    }
}

/// Output of a segmenter, aligned to the page it was computed from
#[derive(Debug, Clone)]
pub enum Segmentation {
    Lines(GrayImage),
    Layout(LayoutMask),
}

impl Segmentation {
    /// The mask the line extractor works on
    pub fn text_lines(&self) -> &GrayImage {
        match self {
            Segmentation::Lines(mask) => mask,
            Segmentation::Layout(layout) => layout.text_lines(),
        }
    }

    pub fn into_text_lines(self) -> GrayImage {
        match self {
            Segmentation::Lines(mask) => mask,
            Segmentation::Layout(mut layout) => layout.masks.swap_remove(layout.line_channel),
        }
    }
}

impl SegmentationModel {
    pub fn new(engine: Arc<dyn InferenceEngine>, patch_size: u32, class_threshold: f32) -> Self {
        Self {
            engine,
            patch_size,
            class_threshold,
        }
    }

    pub fn patch_size(&self) -> u32 {
        self.patch_size
    }

    /// Run every tile of `page` through the model in one batch
    /// Returns the grid and the raw (N, C, T, T) output
    fn infer(&self, page: &RgbImage) -> Result<(TileGrid, Array4<f32>), OcrError> {
        let tiled = tile_page(page, self.patch_size)?;
        let t = self.patch_size as usize;

        let mut batch = Array4::<f32>::zeros((tiled.tiles.len(), 3, t, t));
        for (idx, tile) in tiled.tiles.iter().enumerate() {
            let binary = binarize(&grayscale::apply(tile));
            for (x, y, pixel) in binary.enumerate_pixels() {
                let value = pixel.0[0] as f32 / 255.0;
                for channel in 0..3 {
                    batch[[idx, channel, y as usize, x as usize]] = value;
                }
            }
        }

        let output = self
            .engine
            .run(INPUT_NAME, OUTPUT_NAME, batch.view().into_dyn())
            .map_err(OcrError::segmentation)?;

        let output = as_batch_of_planes(output, tiled.tiles.len(), t)?;
        Ok((tiled.grid, output))
    }
}

impl Segmenter {
    /// Line segmenter with the default class threshold
    pub fn line(engine: Arc<dyn InferenceEngine>, patch_size: u32) -> Self {
        Segmenter::Line(SegmentationModel::new(engine, patch_size, LINE_CLASS_THRESHOLD))
    }

    /// Layout segmenter; the text-line channel must be resolvable from `classes`
    pub fn layout(
        engine: Arc<dyn InferenceEngine>,
        patch_size: u32,
        classes: Vec<String>,
    ) -> Result<Self, OcrError> {
        let line_channel = match classes.iter().position(|c| c == LINE_CLASS) {
            Some(idx) => idx,
            None if classes.len() > FALLBACK_LINE_CHANNEL => FALLBACK_LINE_CHANNEL,
            None => {
                return Err(OcrError::InvalidInput(format!(
                    "layout classes {:?} have no text-line channel",
                    classes
                )))
            }
        };

        Ok(Segmenter::Layout {
            model: SegmentationModel::new(engine, patch_size, LAYOUT_CLASS_THRESHOLD),
            classes,
            line_channel,
        })
    }

    /// Load a segmenter from its model config
    pub fn from_config(config: &SegmenterConfig, layout: bool) -> Result<Self, OcrError> {
        let engine = load_engine(&config.model_file)?;
        if layout {
            Self::layout(engine, config.patch_size, config.layout_classes())
        } else {
            Ok(Self::line(engine, config.patch_size))
        }
    }

    /// Override the probability threshold applied to model output
    pub fn with_class_threshold(mut self, threshold: f32) -> Self {
        self.model_mut().class_threshold = threshold;
        self
    }

    pub fn model(&self) -> &SegmentationModel {
        match self {
            Segmenter::Line(model) => model,
            Segmenter::Layout { model, .. } => model,
        }
    }

    fn model_mut(&mut self) -> &mut SegmentationModel {
        match self {
            Segmenter::Line(model) => model,
            Segmenter::Layout { model, .. } => model,
        }
    }

    pub fn mode(&self) -> &'static str {
        match self {
            Segmenter::Line(_) => "line",
            Segmenter::Layout { .. } => "layout",
        }
    }

    /// Class labels produced by this segmenter
    pub fn classes(&self) -> Vec<String> {
        match self {
            Segmenter::Line(_) => vec![LINE_CLASS.to_string()],
            Segmenter::Layout { classes, .. } => classes.clone(),
        }
    }

    pub fn class_threshold(&self) -> f32 {
        self.model().class_threshold
    }

    /// Segment a page into masks aligned to the page
    pub fn predict(&self, page: &RgbImage) -> Result<Segmentation, OcrError> {
        let model = self.model();
        let (grid, output) = model.infer(page)?;
        let (width, height) = page.dimensions();

        match self {
            Segmenter::Line(_) => {
                if output.shape()[1] != 1 {
                    return Err(OcrError::segmentation(format!(
                        "line model produced {} channels, expected 1",
                        output.shape()[1]
                    )));
                }
                let probabilities = output.index_axis(Axis(1), 0).mapv(sigmoid);
                let mask = stitch_channel(&grid, &probabilities, model.class_threshold, width, height)?;
                Ok(Segmentation::Lines(mask))
            }
            Segmenter::Layout {
                classes,
                line_channel,
                ..
            } => {
                let channels = output.shape()[1];
                if channels != classes.len() {
                    return Err(OcrError::segmentation(format!(
                        "layout model produced {} channels for {} classes",
                        channels,
                        classes.len()
                    )));
                }
                let probabilities = softmax_channels(&output);
                let mut masks = Vec::with_capacity(channels);
                for channel in 0..channels {
                    let plane = probabilities.index_axis(Axis(1), channel).to_owned();
                    masks.push(stitch_channel(&grid, &plane, model.class_threshold, width, height)?);
                }
                Ok(Segmentation::Layout(LayoutMask {
                    classes: classes.clone(),
                    masks,
                    line_channel: *line_channel,
                }))
            }
        }
    }
}

/// Accept (N, C, T, T) or channel-less (N, T, T) output
fn as_batch_of_planes(output: ArrayD<f32>, tiles: usize, t: usize) -> Result<Array4<f32>, OcrError> {
    let output = if output.ndim() == 3 {
        output.insert_axis(Axis(1))
    } else {
        output
    };

    let output = output
        .into_dimensionality::<Ix4>()
        .map_err(|e| OcrError::segmentation(format!("unexpected output rank: {}", e)))?;

    let (n, _, h, w) = output.dim();
    if n != tiles || h != t || w != t {
        return Err(OcrError::segmentation(format!(
            "output shape {:?} does not match {} tiles of {}x{}",
            output.shape(),
            tiles,
            t,
            t
        )));
    }
    Ok(output)
}

/// Stitch one (N, T, T) probability stack and scale it back to the page
fn stitch_channel(
    grid: &TileGrid,
    planes: &ndarray::Array3<f32>,
    threshold: f32,
    width: u32,
    height: u32,
) -> Result<GrayImage, OcrError> {
    let views: Vec<_> = planes.outer_iter().collect();
    let stitched: Array2<f32> = grid.stitch(&views)?;
    let mask = plane_to_mask(&stitched, threshold);

    if mask.dimensions() == (width, height) {
        return Ok(mask);
    }
    Ok(image::imageops::resize(&mask, width, height, FilterType::Nearest))
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Softmax along the channel axis of (N, C, H, W)
fn softmax_channels(logits: &Array4<f32>) -> Array4<f32> {
    let mut out = logits.clone();
    let (n, c, h, w) = logits.dim();
    for b in 0..n {
        for y in 0..h {
            for x in 0..w {
                let column = logits.slice(s![b, .., y, x]);
                let max = column.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
                let sum: f32 = column.iter().map(|&v| (v - max).exp()).sum();
                for k in 0..c {
                    out[[b, k, y, x]] = (logits[[b, k, y, x]] - max).exp() / sum;
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use ndarray::{ArrayViewD, IxDyn};

    /// Emits a strong logit on dark input pixels, one channel per `channels`
    struct InkEngine {
        channels: usize,
        ink_channel: usize,
    }

    impl InferenceEngine for InkEngine {
        fn name(&self) -> &str {
            "ink"
        }

        fn run(&self, _: &str, _: &str, input: ArrayViewD<'_, f32>) -> anyhow::Result<ArrayD<f32>> {
            let shape = input.shape().to_vec();
            let (n, h, w) = (shape[0], shape[2], shape[3]);
            let mut out = ArrayD::<f32>::from_elem(IxDyn(&[n, self.channels, h, w]), -10.0);
            for b in 0..n {
                for y in 0..h {
                    for x in 0..w {
                        let ink = input[[b, 0, y, x]] < 0.5;
                        if self.channels == 1 {
                            out[[b, 0, y, x]] = if ink { 10.0 } else { -10.0 };
                        } else {
                            let hot = if ink { self.ink_channel } else { 0 };
                            out[[b, hot, y, x]] = 10.0;
                        }
                    }
                }
            }
            Ok(out)
        }
    }

    struct FailingEngine;

    impl InferenceEngine for FailingEngine {
        fn name(&self) -> &str {
            "failing"
        }

        fn run(&self, _: &str, _: &str, _: ArrayViewD<'_, f32>) -> anyhow::Result<ArrayD<f32>> {
            anyhow::bail!("session closed")
        }
    }

    fn page_with_stroke() -> RgbImage {
        let mut page = RgbImage::from_pixel(200, 100, Rgb([255, 255, 255]));
        for y in 40..56 {
            for x in 20..180 {
                page.put_pixel(x, y, Rgb([0, 0, 0]));
            }
        }
        page
    }

    #[test]
    fn test_line_segmenter_marks_stroke() {
        let segmenter = Segmenter::line(
            Arc::new(InkEngine {
                channels: 1,
                ink_channel: 0,
            }),
            64,
        );
        let result = segmenter.predict(&page_with_stroke()).unwrap();
        let mask = result.text_lines();

        assert_eq!(mask.dimensions(), (200, 100));
        assert_eq!(mask.get_pixel(100, 48).0[0], 255);
        assert_eq!(mask.get_pixel(100, 10).0[0], 0);
        assert_eq!(mask.get_pixel(5, 48).0[0], 0);
    }

    #[test]
    fn test_layout_segmenter_selects_line_channel() {
        let classes: Vec<String> = ["background", "image", "line", "margin", "caption"]
            .iter()
            .map(|c| c.to_string())
            .collect();
        let segmenter = Segmenter::layout(
            Arc::new(InkEngine {
                channels: 5,
                ink_channel: 2,
            }),
            64,
            classes,
        )
        .unwrap();

        let result = segmenter.predict(&page_with_stroke()).unwrap();
        let Segmentation::Layout(layout) = &result else {
            panic!("expected layout masks");
        };

        assert_eq!(layout.masks.len(), 5);
        assert_eq!(layout.text_lines().get_pixel(100, 48).0[0], 255);
        assert_eq!(layout.channel("background").unwrap().get_pixel(100, 10).0[0], 255);
        assert_eq!(layout.channel("image").unwrap().get_pixel(100, 48).0[0], 0);
    }

    #[test]
    fn test_layout_without_line_channel_is_rejected() {
        let err = Segmenter::layout(Arc::new(FailingEngine), 64, vec!["a".into(), "b".into()]);
        assert!(err.is_err());
    }

    #[test]
    fn test_backend_error_is_segmentation_failure() {
        let segmenter = Segmenter::line(Arc::new(FailingEngine), 64);
        let err = segmenter.predict(&page_with_stroke()).unwrap_err();
        assert!(err.to_string().contains("segmentation"));
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let logits = Array4::from_shape_vec((1, 3, 1, 1), vec![1.0, 2.0, 3.0]).unwrap();
        let probs = softmax_channels(&logits);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(probs[[0, 2, 0, 0]] > probs[[0, 1, 0, 0]]);
    }
}
