//! Page-level OCR for Tibetan manuscripts and woodblock prints
//!
//! A page goes through tiled segmentation, line geometry (rotation,
//! optional dewarping, reading order, per-line crops) and CTC line
//! recognition. Inference backends plug in through [`InferenceEngine`].

pub mod batch;
pub mod config;
pub mod engine;
pub mod engines;
pub mod error;
pub mod geometry;
pub mod models;
pub mod pipeline;
pub mod preprocessing;
pub mod recognizer;
pub mod segmenter;
pub mod server;
pub mod tiling;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{OcrOptions, TpsMode};
pub use engine::InferenceEngine;
pub use error::OcrError;
pub use pipeline::{OcrPipeline, PipelineResult};
