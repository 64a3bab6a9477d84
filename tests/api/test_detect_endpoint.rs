// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! /detect endpoint tests
//!
//! These tests verify that:
//! - Auth runs before anything else when a key is configured
//! - Empty, oversized and undecodable uploads are rejected without inference
//! - A missing model or failing model maps to a 500
//! - Detections and alerts are shaped from the detector output
//! - Uploads are written to disk when persistence is on

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    response::Response,
};
use frame_detect_node::{
    api::{
        detect::DetectResponse,
        errors::ErrorResponse,
        http_server::{create_app, AppState},
    },
    config::ServiceConfig,
    vision::{InferenceError, ModelHolder, ObjectDetector, RawBox, RawDetections},
};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use mockall::mock;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::util::ServiceExt; // for `oneshot`

const BOUNDARY: &str = "frame-detect-test-boundary";

mock! {
    pub Detector {}

    impl ObjectDetector for Detector {
        fn infer(
            &self,
            image: &RgbImage,
            confidence_threshold: f32,
        ) -> Result<RawDetections, InferenceError>;

        fn class_name(&self, class_id: usize) -> Option<String>;
    }
}

/// Returns a fixed set of boxes and counts invocations
struct CountingDetector {
    boxes: Vec<RawBox>,
    calls: AtomicUsize,
}

impl CountingDetector {
    fn new(boxes: Vec<RawBox>) -> Arc<Self> {
        Arc::new(Self {
            boxes,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ObjectDetector for CountingDetector {
    fn infer(&self, _: &RgbImage, _: f32) -> Result<RawDetections, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(RawDetections::new(self.boxes.clone()))
    }

    fn class_name(&self, class_id: usize) -> Option<String> {
        ["pothole", "crack"].get(class_id).map(|s| s.to_string())
    }
}

fn test_config() -> ServiceConfig {
    ServiceConfig {
        save_uploads: false,
        ..Default::default()
    }
}

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([120, 60, 30])))
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

fn multipart_body(field: &str, file_name: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            field, file_name
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn detect_request(body: Vec<u8>, api_key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri("/detect")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        );
    if let Some(key) = api_key {
        builder = builder.header("x-api-key", key);
    }
    builder.body(Body::from(body)).unwrap()
}

async fn send(state: AppState, request: Request<Body>) -> Response {
    create_app(state).oneshot(request).await.unwrap()
}

async fn read_json<T: serde::de::DeserializeOwned>(response: Response) -> T {
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn raw_box(class_id: usize, confidence: f32, xyxy: [f32; 4]) -> RawBox {
    RawBox {
        class_id,
        confidence,
        xyxy,
    }
}

#[tokio::test]
async fn test_detect_returns_frame_size_without_detections() {
    let detector = CountingDetector::new(vec![]);
    let state = AppState::new(test_config(), ModelHolder::with_detector(detector.clone()));

    let response = send(
        state,
        detect_request(multipart_body("frame", "f.png", &png_bytes(100, 80)), None),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let result: DetectResponse = read_json(response).await;
    assert_eq!(result.frame_w, 100);
    assert_eq!(result.frame_h, 80);
    assert!(result.detections.is_empty());
    assert!(result.alerts.is_empty());
    assert_eq!(result.saved_path, None);
    assert_eq!(detector.calls(), 1);
}

#[tokio::test]
async fn test_detect_wire_format() {
    let detector = CountingDetector::new(vec![raw_box(0, 0.9, [10.0, 12.0, 50.0, 60.0])]);
    let state = AppState::new(test_config(), ModelHolder::with_detector(detector));

    let response = send(
        state,
        detect_request(multipart_body("frame", "f.png", &png_bytes(100, 80)), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let json: serde_json::Value = read_json(response).await;
    let detection = &json["detections"][0];
    assert_eq!(detection["label"], "pothole");
    assert!((detection["conf"].as_f64().unwrap() - 0.9).abs() < 1e-6);
    assert_eq!(detection["xyxy"].as_array().unwrap().len(), 4);

    let alert = &json["alerts"][0];
    assert_eq!(alert["label"], "pothole");
    assert!(alert["timestamp"].as_str().unwrap().ends_with('Z'));
    assert!(!alert["thumb"].as_str().unwrap().is_empty());
    assert!(json["saved_path"].is_null());
}

#[tokio::test]
async fn test_alerts_are_subset_of_detections() {
    let detector = CountingDetector::new(vec![
        raw_box(0, 0.9, [1.0, 1.0, 20.0, 20.0]),
        raw_box(1, 0.4, [30.0, 30.0, 60.0, 60.0]),
        raw_box(1, 0.2, [0.0, 0.0, 5.0, 5.0]),
    ]);
    let state = AppState::new(test_config(), ModelHolder::with_detector(detector));

    let response = send(
        state,
        detect_request(multipart_body("frame", "f.png", &png_bytes(100, 80)), None),
    )
    .await;
    let result: DetectResponse = read_json(response).await;

    // 0.2 is below the detection threshold, 0.4 below the alert threshold
    assert_eq!(result.detections.len(), 2);
    assert_eq!(result.detections[0].label, "pothole");
    assert_eq!(result.detections[1].label, "crack");
    assert_eq!(result.alerts.len(), 1);
    assert_eq!(result.alerts[0].label, "pothole");
    assert!(result.alerts.iter().all(|alert| result
        .detections
        .iter()
        .any(|d| d.label == alert.label && d.confidence == alert.confidence)));

    // One thumbnail per request
    assert!(result
        .alerts
        .windows(2)
        .all(|pair| pair[0].thumbnail == pair[1].thumbnail));
}

#[tokio::test]
async fn test_detect_requires_api_key_when_configured() {
    let detector = CountingDetector::new(vec![]);
    let config = ServiceConfig {
        api_key: Some("secret".to_string()),
        ..test_config()
    };
    let state = AppState::new(config, ModelHolder::with_detector(detector.clone()));

    // Missing key
    let response = send(
        state.clone(),
        detect_request(multipart_body("frame", "f.png", &png_bytes(10, 10)), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let error: ErrorResponse = read_json(response).await;
    assert_eq!(error.detail, "Unauthorized");

    // Wrong key, even with a garbage body
    let response = send(
        state.clone(),
        detect_request(b"not multipart".to_vec(), Some("wrong")),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Right key
    let response = send(
        state,
        detect_request(
            multipart_body("frame", "f.png", &png_bytes(10, 10)),
            Some("secret"),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(detector.calls(), 1);
}

#[tokio::test]
async fn test_unauthorized_before_model_check() {
    let config = ServiceConfig {
        api_key: Some("secret".to_string()),
        ..test_config()
    };
    let state = AppState::new(config, ModelHolder::empty());

    let response = send(
        state,
        detect_request(multipart_body("frame", "f.png", &png_bytes(10, 10)), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_empty_file_is_rejected_without_inference() {
    let detector = CountingDetector::new(vec![]);
    let state = AppState::new(test_config(), ModelHolder::with_detector(detector.clone()));

    let response = send(state, detect_request(multipart_body("frame", "f.png", &[]), None)).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error: ErrorResponse = read_json(response).await;
    assert_eq!(error.detail, "Empty file");
    assert_eq!(detector.calls(), 0);
}

#[tokio::test]
async fn test_oversized_upload_is_rejected() {
    let detector = CountingDetector::new(vec![]);
    let config = ServiceConfig {
        max_upload_bytes: 1024,
        ..test_config()
    };
    let state = AppState::new(config, ModelHolder::with_detector(detector.clone()));

    let response = send(
        state.clone(),
        detect_request(multipart_body("frame", "big.bin", &vec![7u8; 1025]), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let error: ErrorResponse = read_json(response).await;
    assert_eq!(error.detail, "File too large");
    assert_eq!(detector.calls(), 0);

    // Exactly at the limit is not "too large"; it fails later as an invalid image
    let response = send(
        state,
        detect_request(multipart_body("frame", "big.bin", &vec![7u8; 1024]), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_undecodable_image_is_bad_request() {
    let detector = CountingDetector::new(vec![]);
    let state = AppState::new(test_config(), ModelHolder::with_detector(detector.clone()));

    let response = send(
        state,
        detect_request(multipart_body("frame", "f.png", b"garbage bytes"), None),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error: ErrorResponse = read_json(response).await;
    assert!(error.detail.starts_with("Invalid image"));
    assert_eq!(detector.calls(), 0);
}

#[tokio::test]
async fn test_missing_frame_field_is_bad_request() {
    let detector = CountingDetector::new(vec![]);
    let state = AppState::new(test_config(), ModelHolder::with_detector(detector.clone()));

    let response = send(
        state,
        detect_request(multipart_body("image", "f.png", &png_bytes(10, 10)), None),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(detector.calls(), 0);
}

#[tokio::test]
async fn test_model_not_loaded() {
    let response = send(
        AppState::new_for_test(),
        detect_request(multipart_body("frame", "f.png", &png_bytes(10, 10)), None),
    )
    .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let error: ErrorResponse = read_json(response).await;
    assert_eq!(error.detail, "Model not loaded");
    assert_eq!(error.error_type, "model_not_loaded");
}

#[tokio::test]
async fn test_model_not_loaded_regardless_of_payload() {
    let payloads = vec![
        multipart_body("frame", "f.png", &[]),
        multipart_body("frame", "f.png", b"garbage bytes"),
        multipart_body("image", "f.png", &png_bytes(10, 10)),
        b"not multipart at all".to_vec(),
    ];

    for payload in payloads {
        let response = send(AppState::new_for_test(), detect_request(payload, None)).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let error: ErrorResponse = read_json(response).await;
        assert_eq!(error.detail, "Model not loaded");
    }
}

#[tokio::test]
async fn test_inference_failure_is_500() {
    let mut detector = MockDetector::new();
    detector
        .expect_infer()
        .times(1)
        .returning(|_, _| Err(InferenceError::UnexpectedOutput("shape [1, 2]".to_string())));
    detector.expect_class_name().never();

    let state = AppState::new(test_config(), ModelHolder::with_detector(Arc::new(detector)));
    let response = send(
        state,
        detect_request(multipart_body("frame", "f.png", &png_bytes(10, 10)), None),
    )
    .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let error: ErrorResponse = read_json(response).await;
    assert!(error.detail.starts_with("Inference error"));
    assert_eq!(error.error_type, "inference_error");
}

#[tokio::test]
async fn test_detector_receives_detection_threshold() {
    let mut detector = MockDetector::new();
    detector
        .expect_infer()
        .withf(|image, threshold| image.dimensions() == (64, 48) && *threshold == 0.25)
        .times(1)
        .returning(|_, _| Ok(RawDetections::default()));

    let config = ServiceConfig {
        confidence_threshold: 0.25,
        ..test_config()
    };
    let state = AppState::new(config, ModelHolder::with_detector(Arc::new(detector)));
    let response = send(
        state,
        detect_request(multipart_body("frame", "f.png", &png_bytes(64, 48)), None),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_upload_is_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let upload_dir = dir.path().join("uploads");
    let config = ServiceConfig {
        save_uploads: true,
        upload_dir: upload_dir.clone(),
        ..Default::default()
    };
    let detector = CountingDetector::new(vec![]);
    let state = AppState::new(config, ModelHolder::with_detector(detector));

    let upload = png_bytes(32, 32);
    let response = send(
        state,
        detect_request(multipart_body("frame", "road/frame.png", &upload), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let result: DetectResponse = read_json(response).await;
    let saved = std::path::PathBuf::from(result.saved_path.expect("saved path"));
    assert_eq!(saved.parent(), Some(upload_dir.as_path()));
    assert_eq!(std::fs::read(&saved).unwrap(), upload);

    let name = saved.file_name().unwrap().to_string_lossy().into_owned();
    let (millis, rest) = name.split_once('_').unwrap();
    assert!(millis.parse::<i64>().is_ok());
    assert_eq!(rest, "frame.png");
}

#[tokio::test]
async fn test_persistence_failure_still_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    // A regular file where the upload directory should be
    let blocker = dir.path().join("uploads");
    std::fs::write(&blocker, b"x").unwrap();

    let config = ServiceConfig {
        save_uploads: true,
        upload_dir: blocker,
        ..Default::default()
    };
    let state = AppState::new(config, ModelHolder::with_detector(CountingDetector::new(vec![])));

    let response = send(
        state,
        detect_request(multipart_body("frame", "f.png", &png_bytes(16, 16)), None),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let result: DetectResponse = read_json(response).await;
    assert_eq!(result.saved_path, None);
}
