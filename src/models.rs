//! Model artifact configuration
//!
//! Each model directory holds a JSON config next to its ONNX graph. The
//! `onnx-model` entry is resolved relative to the config file.

use crate::error::OcrError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Class labels of a layout model when its config does not list them
pub const DEFAULT_LAYOUT_CLASSES: [&str; 5] = ["background", "image", "line", "margin", "caption"];

/// Label of the text-line channel in layout predictions
pub const LINE_CLASS: &str = "line";

/// Recognition network family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Architecture {
    Easter2,
    #[serde(rename = "CRNN")]
    Crnn,
}

/// Encoding the recognizer's character set was built with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CharsetEncoder {
    Wylie,
    Stack,
}

/// Configuration of a line or layout segmentation model
#[derive(Debug, Clone, PartialEq)]
pub struct SegmenterConfig {
    pub model_file: PathBuf,
    pub patch_size: u32,
    /// Ordered class labels; `None` for single-channel line models
    pub classes: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct RawSegmenterConfig {
    #[serde(rename = "onnx-model")]
    onnx_model: String,
    patch_size: u32,
    #[serde(default)]
    classes: Option<Vec<String>>,
}

impl SegmenterConfig {
    /// Read a segmentation model config from disk
    pub fn from_file(path: &Path) -> Result<Self, OcrError> {
        let raw: RawSegmenterConfig = read_json(path)?;
        if raw.patch_size == 0 {
            return Err(OcrError::model_load(path.display(), "patch_size must be positive"));
        }

        Ok(Self {
            model_file: resolve_model_path(path, &raw.onnx_model),
            patch_size: raw.patch_size,
            classes: raw.classes,
        })
    }

    /// Class labels for layout models, falling back to the canonical order
    pub fn layout_classes(&self) -> Vec<String> {
        match &self.classes {
            Some(classes) if !classes.is_empty() => classes.clone(),
            _ => DEFAULT_LAYOUT_CLASSES.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// Ordered characters the recognizer can emit
///
/// JSON configs store it either as one string (one symbol per character) or
/// as a list of multi-character stack tokens.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
enum RawCharset {
    Chars(String),
    Tokens(Vec<String>),
}

impl From<RawCharset> for Vec<String> {
    fn from(raw: RawCharset) -> Self {
        match raw {
            RawCharset::Chars(chars) => chars.chars().map(String::from).collect(),
            RawCharset::Tokens(tokens) => tokens,
        }
    }
}

/// Configuration of a line recognition model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecognizerConfig {
    pub model_file: PathBuf,
    pub architecture: Architecture,
    pub version: String,
    pub input_width: u32,
    pub input_height: u32,
    pub input_layer: String,
    pub output_layer: String,
    pub squeeze_channel: bool,
    pub swap_hw: bool,
    pub encoder: CharsetEncoder,
    #[serde(skip)]
    pub charset: Vec<String>,
    pub add_blank: bool,
    /// Surround each line with a blank square margin before resizing
    pub pre_pad: bool,
}

#[derive(Deserialize)]
struct RawRecognizerConfig {
    #[serde(rename = "onnx-model")]
    onnx_model: String,
    architecture: Architecture,
    #[serde(default)]
    version: serde_json::Value,
    input_width: u32,
    input_height: u32,
    input_layer: String,
    output_layer: String,
    squeeze_channel_dim: String,
    swap_hw: String,
    encoder: CharsetEncoder,
    charset: RawCharset,
    add_blank: String,
    #[serde(default)]
    pre_pad: Option<String>,
}

impl RecognizerConfig {
    /// Read a recognition model config from disk
    pub fn from_file(path: &Path) -> Result<Self, OcrError> {
        let raw: RawRecognizerConfig = read_json(path)?;
        let flag = |name: &str, value: &str| {
            parse_flag(value).ok_or_else(|| {
                OcrError::model_load(
                    path.display(),
                    format!("'{}' must be \"yes\" or \"no\", got \"{}\"", name, value),
                )
            })
        };

        let squeeze_channel = flag("squeeze_channel_dim", &raw.squeeze_channel_dim)?;
        let swap_hw = flag("swap_hw", &raw.swap_hw)?;
        let add_blank = flag("add_blank", &raw.add_blank)?;
        let pre_pad = match raw.pre_pad.as_deref() {
            Some(value) => flag("pre_pad", value)?,
            None => false,
        };

        if raw.input_width == 0 || raw.input_height == 0 {
            return Err(OcrError::model_load(
                path.display(),
                "input_width and input_height must be positive",
            ));
        }

        let charset: Vec<String> = raw.charset.into();
        if charset.is_empty() {
            return Err(OcrError::model_load(path.display(), "charset is empty"));
        }

        let version = match raw.version {
            serde_json::Value::String(v) => v,
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        };

        Ok(Self {
            model_file: resolve_model_path(path, &raw.onnx_model),
            architecture: raw.architecture,
            version,
            input_width: raw.input_width,
            input_height: raw.input_height,
            input_layer: raw.input_layer,
            output_layer: raw.output_layer,
            squeeze_channel,
            swap_hw,
            encoder: raw.encoder,
            charset,
            add_blank,
            pre_pad,
        })
    }

    /// Width of the logits' vocabulary axis this model must produce
    pub fn vocabulary_size(&self) -> usize {
        self.charset.len() + usize::from(self.add_blank)
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Architecture::Easter2 => write!(f, "Easter2"),
            Architecture::Crnn => write!(f, "CRNN"),
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "yes" => Some(true),
        "no" => Some(false),
        _ => None,
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, OcrError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| OcrError::model_load(path.display(), format!("cannot read config: {}", e)))?;
    serde_json::from_str(&content)
        .map_err(|e| OcrError::model_load(path.display(), format!("invalid config: {}", e)))
}

fn resolve_model_path(config_path: &Path, model_file: &str) -> PathBuf {
    let model_path = Path::new(model_file);
    if model_path.is_absolute() {
        return model_path.to_path_buf();
    }
    config_path
        .parent()
        .map(|dir| dir.join(model_path))
        .unwrap_or_else(|| model_path.to_path_buf())
}
