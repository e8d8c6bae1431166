use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use image::{ImageFormat, Rgb, RgbImage};
use ndarray::{ArrayD, ArrayViewD, IxDyn};
use pecha_ocr::config::{Config, OcrOptions};
use pecha_ocr::models::{Architecture, CharsetEncoder, RecognizerConfig};
use pecha_ocr::recognizer::Recognizer;
use pecha_ocr::segmenter::Segmenter;
use pecha_ocr::server::{router, AppState};
use pecha_ocr::{InferenceEngine, OcrPipeline};
use serde_json::Value;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceExt;

const BOUNDARY: &str = "pecha-test-boundary";

struct InkEngine;

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

/// Always reads "a"
struct AEngine;

impl InferenceEngine for AEngine {
    fn name(&self) -> &str {
        "a"
    }

    fn run(&self, _: &str, _: &str, _: ArrayViewD<'_, f32>) -> anyhow::Result<ArrayD<f32>> {
        let mut out = ArrayD::<f32>::zeros(IxDyn(&[1, 4, 2]));
        out[[0, 0, 1]] = 1.0;
        out[[0, 1, 0]] = 1.0;
        out[[0, 2, 0]] = 1.0;
        out[[0, 3, 0]] = 1.0;
        Ok(out)
    }
}

fn app(max_file_size: usize) -> axum::Router {
    let recognizer = RecognizerConfig {
        model_file: PathBuf::from("ocr.onnx"),
        architecture: Architecture::Crnn,
        version: "3".to_string(),
        input_width: 64,
        input_height: 16,
        input_layer: "input".to_string(),
        output_layer: "output".to_string(),
        squeeze_channel: false,
        swap_hw: true,
        encoder: CharsetEncoder::Stack,
        charset: vec!["a".to_string()],
        add_blank: true,
        pre_pad: false,
    };
    let pipeline = OcrPipeline::new(
        Segmenter::line(Arc::new(InkEngine), 64),
        Recognizer::new(Arc::new(AEngine), recognizer),
    );

    router(AppState {
        pipeline: Arc::new(pipeline),
        config: Arc::new(Config {
            max_file_size,
            ..Default::default()
        }),
        defaults: OcrOptions::default(),
    })
}

fn png_page(with_line: bool) -> Vec<u8> {
    let mut page = RgbImage::from_pixel(400, 100, Rgb([255, 255, 255]));
    if with_line {
        for y in 40..60 {
            for x in 50..350 {
                page.put_pixel(x, y, Rgb([0, 0, 0]));
            }
        }
    }
    let mut bytes = Vec::new();
    page.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png).unwrap();
    bytes
}

/// Multipart body with an optional file part and text fields
fn multipart(file: Option<&[u8]>, fields: &[(&str, &str)]) -> Request<Body> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    if let Some(data) = file {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"folio12.png\"\r\nContent-Type: image/png\r\n\r\n",
                BOUNDARY
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri("/ocr")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let response = app(1 << 20)
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_info_describes_models() {
    let response = app(1 << 20)
        .oneshot(Request::get("/info").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["segmenter"]["mode"], "line");
    assert_eq!(json["segmenter"]["patch_size"], 64);
    assert_eq!(json["recognizer"]["architecture"], "CRNN");
    assert_eq!(json["recognizer"]["encoder"], "stack");
    assert_eq!(json["recognizer"]["vocabulary_size"], 2);
    assert_eq!(json["defaults"]["k_factor"], 1.7);
    assert_eq!(json["max_file_size_bytes"], 1 << 20);
}

#[tokio::test]
async fn test_ocr_returns_lines_and_text() {
    let page = png_page(true);
    let response = app(1 << 20)
        .oneshot(multipart(Some(&page), &[("merge_lines", "false")]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["page_id"], "folio12");
    assert_eq!(json["text"], serde_json::json!(["a"]));
    assert_eq!(json["lines"].as_array().unwrap().len(), 1);
    assert_eq!(json["stages"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_blank_page_is_unprocessable() {
    let page = png_page(false);
    let response = app(1 << 20)
        .oneshot(multipart(Some(&page), &[]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let json = json_body(response).await;
    assert_eq!(json["code"], "NO_LINES");
}

#[tokio::test]
async fn test_missing_file_is_rejected() {
    let response = app(1 << 20)
        .oneshot(multipart(None, &[("k_factor", "1.5")]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], "MISSING_FILE");
}

#[tokio::test]
async fn test_bad_knob_is_rejected() {
    let page = png_page(true);
    let response = app(1 << 20)
        .oneshot(multipart(Some(&page), &[("tps_mode", "sideways")]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], "INVALID_REQUEST");
}

#[tokio::test]
async fn test_undecodable_file_is_invalid_input() {
    let response = app(1 << 20)
        .oneshot(multipart(Some(b"definitely not a png"), &[]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], "INVALID_INPUT");
}
