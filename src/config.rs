use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub max_file_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9292,
            max_file_size: 50 * 1024 * 1024,
        }
    }
}

/// How thin-plate-spline dewarping is applied to a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TpsMode {
    /// Warp the whole page with one representative line
    #[default]
    Global,
    /// Warp each curved line's neighbourhood independently
    Local,
}

impl FromStr for TpsMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "global" => Ok(Self::Global),
            "local" => Ok(Self::Local),
            other => Err(format!("unknown tps mode '{}'", other)),
        }
    }
}

/// Per-page tuning knobs for line extraction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrOptions {
    /// Initial dilation multiplier for per-line extraction
    pub k_factor: f64,
    /// Max crop height as a multiple of the line's bbox height
    pub bbox_tolerance: f64,
    /// Merge fragments of the same band into one line
    pub merge_lines: bool,
    /// Enable dewarping of curved lines
    pub use_tps: bool,
    pub tps_mode: TpsMode,
    /// Fraction of warped lines that triggers dewarping
    pub tps_threshold: f64,
    /// Rotation search window in degrees
    pub max_angle: f64,
}

impl Default for OcrOptions {
    fn default() -> Self {
        Self {
            k_factor: 1.7,
            bbox_tolerance: 3.0,
            merge_lines: true,
            use_tps: false,
            tps_mode: TpsMode::Global,
            tps_threshold: 0.25,
            max_angle: 5.0,
        }
    }
}

impl OcrOptions {
    /// Reject knob values the extractor cannot work with
    pub fn validate(&self) -> Result<(), String> {
        if !(self.k_factor > 0.0) {
            return Err(format!("k_factor must be positive, got {}", self.k_factor));
        }
        if !(self.bbox_tolerance >= 1.0) {
            return Err(format!(
                "bbox_tolerance must be at least 1.0, got {}",
                self.bbox_tolerance
            ));
        }
        if !(0.0..=1.0).contains(&self.tps_threshold) {
            return Err(format!(
                "tps_threshold must be within [0, 1], got {}",
                self.tps_threshold
            ));
        }
        if !(self.max_angle > 0.0 && self.max_angle < 45.0) {
            return Err(format!(
                "max_angle must be within (0, 45) degrees, got {}",
                self.max_angle
            ));
        }
        Ok(())
    }
}
