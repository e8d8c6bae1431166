use crate::config::{Config, OcrOptions, TpsMode};
use crate::engines::{backend_info, BackendInfo};
use crate::error::OcrError;
use crate::pipeline::{OcrPipeline, PipelineResult};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, State},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<OcrPipeline>,
    pub config: Arc<Config>,
    /// Knobs used for fields a request leaves out
    pub defaults: OcrOptions,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Serialize)]
pub struct SegmenterInfo {
    pub mode: String,
    pub patch_size: u32,
    pub classes: Vec<String>,
    pub class_threshold: f32,
}

#[derive(Serialize)]
pub struct RecognizerInfo {
    pub architecture: String,
    pub version: String,
    pub encoder: String,
    pub vocabulary_size: usize,
    pub input_width: u32,
    pub input_height: u32,
}

/// Server info response
#[derive(Serialize)]
pub struct InfoResponse {
    pub version: String,
    pub backend: Option<BackendInfo>,
    pub segmenter: SegmenterInfo,
    pub recognizer: RecognizerInfo,
    pub defaults: OcrOptions,
    pub max_file_size_bytes: usize,
}

/// Build the HTTP routes around a loaded pipeline
pub fn router(state: AppState) -> Router {
    let max_file_size = state.config.max_file_size;
    Router::new()
        .route("/ocr", post(handle_ocr))
        .route("/health", get(handle_health))
        .route("/info", get(handle_info))
        .layer(DefaultBodyLimit::max(max_file_size))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP server
pub async fn run(config: Config, pipeline: OcrPipeline, defaults: OcrOptions) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);

    let state = AppState {
        pipeline: Arc::new(pipeline),
        config: Arc::new(config),
        defaults,
    };
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Apply one multipart knob field onto `options`
fn apply_knob(options: &mut OcrOptions, name: &str, value: &str) -> Result<(), OcrError> {
    let value = value.trim();
    let invalid = |e: &dyn std::fmt::Display| {
        OcrError::InvalidRequest(format!("Invalid value '{}' for {}: {}", value, name, e))
    };

    match name {
        "k_factor" => options.k_factor = value.parse().map_err(|e| invalid(&e))?,
        "bbox_tolerance" => options.bbox_tolerance = value.parse().map_err(|e| invalid(&e))?,
        "merge_lines" => options.merge_lines = value.parse().map_err(|e| invalid(&e))?,
        "use_tps" => options.use_tps = value.parse().map_err(|e| invalid(&e))?,
        "tps_mode" => options.tps_mode = value.parse::<TpsMode>().map_err(|e| invalid(&e))?,
        "tps_threshold" => options.tps_threshold = value.parse().map_err(|e| invalid(&e))?,
        "max_angle" => options.max_angle = value.parse().map_err(|e| invalid(&e))?,
        _ => {}
    }
    Ok(())
}

/// Handle OCR requests
async fn handle_ocr(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<PipelineResult>, OcrError> {
    let start = Instant::now();

    let mut file_data: Option<Bytes> = None;
    let mut page_id: Option<String> = None;
    let mut options = state.defaults;

    // Parse multipart form
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| OcrError::InvalidRequest(format!("Failed to parse multipart: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();

        match name.as_str() {
            "file" => {
                if page_id.is_none() {
                    page_id = field
                        .file_name()
                        .and_then(|f| Path::new(f).file_stem())
                        .map(|stem| stem.to_string_lossy().into_owned());
                }
                file_data = Some(field.bytes().await.map_err(|e| {
                    OcrError::InvalidRequest(format!("Failed to read file data: {}", e))
                })?);
            }
            "page_id" => {
                page_id = Some(field.text().await.map_err(|e| {
                    OcrError::InvalidRequest(format!("Invalid page_id: {}", e))
                })?);
            }
            _ => {
                let value = field.text().await.map_err(|e| {
                    OcrError::InvalidRequest(format!("Invalid field {}: {}", name, e))
                })?;
                apply_knob(&mut options, &name, &value)?;
            }
        }
    }

    // Validate file was provided
    let data = file_data.ok_or(OcrError::MissingFile)?;

    // Check file size
    if data.len() > state.config.max_file_size {
        return Err(OcrError::ImageTooLarge {
            size: data.len(),
            max: state.config.max_file_size,
        });
    }

    let page = image::load_from_memory(&data)
        .map_err(|e| OcrError::InvalidInput(format!("Cannot decode image: {}", e)))?
        .to_rgb8();
    let page_id = page_id.unwrap_or_else(|| "page".to_string());

    let pipeline = state.pipeline.clone();
    let result = tokio::task::spawn_blocking(move || pipeline.run_ocr(&page_id, &page, &options))
        .await
        .map_err(|e| OcrError::Internal(format!("OCR task failed: {}", e)))??;

    tracing::info!(
        "OCR completed in {}ms, {} lines",
        start.elapsed().as_millis(),
        result.lines.len()
    );

    Ok(Json(result))
}

/// Handle health check requests
async fn handle_health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Handle info requests
async fn handle_info(State(state): State<AppState>) -> impl IntoResponse {
    let segmenter = state.pipeline.segmenter();
    let recognizer = state.pipeline.recognizer().config();

    Json(InfoResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        backend: backend_info(),
        segmenter: SegmenterInfo {
            mode: segmenter.mode().to_string(),
            patch_size: segmenter.model().patch_size(),
            classes: segmenter.classes(),
            class_threshold: segmenter.class_threshold(),
        },
        recognizer: RecognizerInfo {
            architecture: recognizer.architecture.to_string(),
            version: recognizer.version.clone(),
            encoder: format!("{:?}", recognizer.encoder).to_lowercase(),
            vocabulary_size: recognizer.vocabulary_size(),
            input_width: recognizer.input_width,
            input_height: recognizer.input_height,
        },
        defaults: state.defaults,
        max_file_size_bytes: state.config.max_file_size,
    })
}
