use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Pipeline stage that talks to an inference backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Segmentation,
    Recognition,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Segmentation => write!(f, "segmentation"),
            Stage::Recognition => write!(f, "recognition"),
        }
    }
}

#[derive(Error, Debug)]
pub enum OcrError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Failed to load model {artifact}: {detail}")]
    ModelLoadFailed { artifact: String, detail: String },

    #[error("Inference failed during {stage}{}: {detail}", line_suffix(.line))]
    InferenceFailed {
        stage: Stage,
        line: Option<usize>,
        detail: String,
    },

    #[error("No text lines found on page")]
    NoLines,

    #[error("Degenerate geometry: {0}")]
    DegenerateGeometry(String),

    #[error("Image too large: {size} bytes (max: {max} bytes)")]
    ImageTooLarge { size: usize, max: usize },

    #[error("Missing file in request")]
    MissingFile,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn line_suffix(line: &Option<usize>) -> String {
    match line {
        Some(idx) => format!(" (line {})", idx),
        None => String::new(),
    }
}

impl OcrError {
    /// Wrap a backend error raised while segmenting a page
    pub fn segmentation(err: impl fmt::Display) -> Self {
        OcrError::InferenceFailed {
            stage: Stage::Segmentation,
            line: None,
            detail: err.to_string(),
        }
    }

    /// Wrap a backend error raised while recognizing line `line`
    pub fn recognition(line: usize, err: impl fmt::Display) -> Self {
        OcrError::InferenceFailed {
            stage: Stage::Recognition,
            line: Some(line),
            detail: err.to_string(),
        }
    }

    pub fn model_load(artifact: impl fmt::Display, err: impl fmt::Display) -> Self {
        OcrError::ModelLoadFailed {
            artifact: artifact.to_string(),
            detail: err.to_string(),
        }
    }

    /// Stable machine-readable code for this error kind
    pub fn code(&self) -> &'static str {
        match self {
            OcrError::InvalidInput(_) => "INVALID_INPUT",
            OcrError::ModelLoadFailed { .. } => "MODEL_LOAD_FAILED",
            OcrError::InferenceFailed { .. } => "INFERENCE_FAILED",
            OcrError::NoLines => "NO_LINES",
            OcrError::DegenerateGeometry(_) => "DEGENERATE_GEOMETRY",
            OcrError::ImageTooLarge { .. } => "IMAGE_TOO_LARGE",
            OcrError::MissingFile => "MISSING_FILE",
            OcrError::InvalidRequest(_) => "INVALID_REQUEST",
            OcrError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for OcrError {
    fn into_response(self) -> Response {
        let status = match &self {
            OcrError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            OcrError::ModelLoadFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            OcrError::InferenceFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            OcrError::NoLines => StatusCode::UNPROCESSABLE_ENTITY,
            OcrError::DegenerateGeometry(_) => StatusCode::UNPROCESSABLE_ENTITY,
            OcrError::ImageTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            OcrError::MissingFile => StatusCode::BAD_REQUEST,
            OcrError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            OcrError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: self.code().to_string(),
        });

        (status, body).into_response()
    }
}
