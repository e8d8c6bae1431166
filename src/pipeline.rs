use crate::config::OcrOptions;
use crate::error::OcrError;
use crate::geometry::page::extract_page_lines;
use crate::geometry::Line;
use crate::models::{RecognizerConfig, SegmenterConfig};
use crate::recognizer::Recognizer;
use crate::segmenter::{LayoutMask, Segmentation, Segmenter};
use image::{GrayImage, RgbImage};
use serde::Serialize;
use std::time::Instant;

/// Wall-clock time spent in one pipeline stage
#[derive(Debug, Clone, Serialize)]
pub struct StageTiming {
    pub stage: String,
    pub time_ms: u64,
}

/// Result of running OCR on one page
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub page_id: String,
    /// Rotation correction applied to the page, in degrees
    pub angle: f64,
    /// Text-line mask after rotation and dewarping (not serialized)
    #[serde(skip)]
    pub mask: GrayImage,
    /// Class masks of a layout model, aligned to the input page (not serialized)
    #[serde(skip)]
    pub layout: Option<LayoutMask>,
    pub lines: Vec<Line>,
    /// One string per entry of `lines`
    pub text: Vec<String>,
    pub line_threshold: f64,
    pub tps_applied: bool,
    pub k_factor: f64,
    pub total_time_ms: u64,
    pub stages: Vec<StageTiming>,
}

/// Page OCR: segmentation, line extraction and recognition
pub struct OcrPipeline {
    segmenter: Segmenter,
    recognizer: Recognizer,
}

impl OcrPipeline {
    pub fn new(segmenter: Segmenter, recognizer: Recognizer) -> Self {
        Self {
            segmenter,
            recognizer,
        }
    }

    /// Load both models from their JSON configs
    pub fn load(
        segmenter: &SegmenterConfig,
        layout: bool,
        recognizer: RecognizerConfig,
        class_threshold: Option<f32>,
    ) -> Result<Self, OcrError> {
        let mut seg = Segmenter::from_config(segmenter, layout)?;
        if let Some(threshold) = class_threshold {
            seg = seg.with_class_threshold(threshold);
        }
        let rec = Recognizer::from_config(recognizer)?;
        Ok(Self::new(seg, rec))
    }

    pub fn segmenter(&self) -> &Segmenter {
        &self.segmenter
    }

    pub fn recognizer(&self) -> &Recognizer {
        &self.recognizer
    }

    /// Swap in a new segmentation model
    ///
    /// The current model stays in place if loading fails. The class threshold
    /// carries over when the mode does not change.
    pub fn update_segmenter(&mut self, config: &SegmenterConfig, layout: bool) -> Result<(), OcrError> {
        let mut segmenter = Segmenter::from_config(config, layout)?;
        if segmenter.mode() == self.segmenter.mode() {
            segmenter = segmenter.with_class_threshold(self.segmenter.class_threshold());
        }
        tracing::info!("Segmenter replaced ({} mode)", segmenter.mode());
        self.segmenter = segmenter;
        Ok(())
    }

    /// Swap in a new recognition model
    ///
    /// The current model stays in place if loading fails.
    pub fn update_recognizer(&mut self, config: RecognizerConfig) -> Result<(), OcrError> {
        self.recognizer = Recognizer::from_config(config)?;
        Ok(())
    }

    /// Run OCR on one page
    pub fn run_ocr(
        &self,
        page_id: &str,
        page: &RgbImage,
        options: &OcrOptions,
    ) -> Result<PipelineResult, OcrError> {
        let start = Instant::now();
        let mut stages = Vec::new();

        if page.width() == 0 || page.height() == 0 {
            return Err(OcrError::InvalidInput(format!("page {} has zero area", page_id)));
        }
        options.validate().map_err(OcrError::InvalidInput)?;

        let segmentation = run_stage("segmentation", &mut stages, || self.segmenter.predict(page))?;
        let layout = match &segmentation {
            Segmentation::Layout(layout) => Some(layout.clone()),
            Segmentation::Lines(_) => None,
        };
        let mask = segmentation.into_text_lines();

        let extracted = run_stage("extraction", &mut stages, || {
            extract_page_lines(page, &mask, options)
        })?;

        let text = run_stage("recognition", &mut stages, || {
            Ok(self.recognize_lines(&extracted.images))
        })?;

        let total_time_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            "Page {} done in {}ms: {} lines, angle {:.2}, tps {}",
            page_id,
            total_time_ms,
            extracted.lines.len(),
            extracted.angle,
            extracted.tps_applied
        );

        Ok(PipelineResult {
            page_id: page_id.to_string(),
            angle: extracted.angle,
            mask: extracted.mask,
            layout,
            lines: extracted.lines,
            text,
            line_threshold: extracted.line_threshold,
            tps_applied: extracted.tps_applied,
            k_factor: extracted.k_factor,
            total_time_ms,
            stages,
        })
    }

    /// Recognize every crop; failed lines become empty strings
    fn recognize_lines(&self, images: &[Option<RgbImage>]) -> Vec<String> {
        images
            .iter()
            .enumerate()
            .map(|(idx, image)| {
                let Some(image) = image else {
                    tracing::warn!("Line {} produced no crop", idx);
                    return String::new();
                };
                self.recognizer.recognize(idx, image).unwrap_or_else(|e| {
                    tracing::warn!("{}", e);
                    String::new()
                })
            })
            .collect()
    }
}

fn run_stage<T, F>(name: &str, timings: &mut Vec<StageTiming>, stage_fn: F) -> Result<T, OcrError>
where
    F: FnOnce() -> Result<T, OcrError>,
{
    let stage_start = Instant::now();
    let result = stage_fn()?;
    timings.push(StageTiming {
        stage: name.to_string(),
        time_ms: stage_start.elapsed().as_millis() as u64,
    });
    Ok(result)
}
