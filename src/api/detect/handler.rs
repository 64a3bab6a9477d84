// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Detect endpoint handler

use axum::{extract::State, http::HeaderMap, Json};
use axum_extra::extract::multipart::{Multipart, MultipartError, MultipartRejection};
use bytes::{Bytes, BytesMut};
use std::time::Instant;
use tracing::{debug, info, warn};

use super::response::DetectResponse;
use crate::api::errors::ApiError;
use crate::api::http_server::AppState;
use crate::config::ServiceConfig;
use crate::results::{Alert, Detection, ResultFormatter};
use crate::storage::UploadStore;
use crate::vision::image_utils::{THUMBNAIL_MAX_SIZE, THUMBNAIL_QUALITY};
use crate::vision::{decode_image_bytes, encode_thumbnail_base64, ObjectDetector};

/// Header carrying the shared secret
pub const API_KEY_HEADER: &str = "x-api-key";

/// Multipart field holding the frame
pub const FRAME_FIELD: &str = "frame";

/// A fully read `frame` field
#[derive(Debug, Clone)]
pub struct FrameUpload {
    pub file_name: Option<String>,
    pub bytes: Bytes,
}

/// Outcome of running one frame through the detector
#[derive(Debug, Clone)]
pub struct FrameAnalysis {
    pub frame_w: u32,
    pub frame_h: u32,
    pub detections: Vec<Detection>,
    pub alerts: Vec<Alert>,
}

/// POST /detect - Detect objects in an uploaded frame
///
/// # Request
/// - multipart field `frame`: the image file (required)
/// - header `x-api-key`: required when a key is configured
///
/// # Errors
/// - 401 Unauthorized: key configured and missing/mismatched
/// - 500 Internal Server Error: model not loaded, or inference failed
/// - 400 Bad Request: empty, malformed or undecodable upload
/// - 413 Payload Too Large: upload exceeds the configured limit
pub async fn detect_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<DetectResponse>, ApiError> {
    let started = Instant::now();

    // 1. Shared secret
    authorize(&state.config, &headers)?;

    // 2. Model availability
    let detector = state.models.detector().ok_or_else(|| {
        warn!("Detect request rejected: model not loaded");
        ApiError::ModelNotLoaded
    })?;

    // 3. Read the upload
    let mut multipart = multipart.map_err(|e| {
        warn!("Detect request rejected: {}", e);
        ApiError::BadRequest(format!("Invalid multipart request: {}", e))
    })?;
    let upload = read_frame_field(&mut multipart, state.config.max_upload_bytes).await?;
    if upload.bytes.is_empty() {
        warn!("Detect request rejected: empty file");
        return Err(ApiError::BadRequest("Empty file".to_string()));
    }
    debug!(
        "Received frame {:?} ({} bytes)",
        upload.file_name,
        upload.bytes.len()
    );

    // 4-9. Decode, infer, shape and persist off the async runtime
    let formatter = state.formatter;
    let store = state.uploads.clone();
    let (analysis, saved_path) = tokio::task::spawn_blocking(move || {
        let analysis = analyze_frame(detector.as_ref(), &upload.bytes, &formatter)?;
        let saved_path = store
            .as_ref()
            .and_then(|store| persist_upload(store, &upload));
        Ok::<_, ApiError>((analysis, saved_path))
    })
    .await
    .map_err(|e| ApiError::InternalError(format!("Detection task failed: {}", e)))??;

    info!(
        "Detect complete: {}x{}, {} detections, {} alerts, {}ms",
        analysis.frame_w,
        analysis.frame_h,
        analysis.detections.len(),
        analysis.alerts.len(),
        started.elapsed().as_millis()
    );

    // 10. Response
    Ok(Json(DetectResponse {
        frame_w: analysis.frame_w,
        frame_h: analysis.frame_h,
        detections: analysis.detections,
        alerts: analysis.alerts,
        saved_path,
    }))
}

/// Check the `x-api-key` header when a key is configured
pub fn authorize(config: &ServiceConfig, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = config.api_key.as_deref() else {
        return Ok(());
    };

    let presented = headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());

    if presented == Some(expected) {
        Ok(())
    } else {
        warn!("Detect request rejected: missing or invalid API key");
        Err(ApiError::Unauthorized)
    }
}

/// Read the `frame` field, failing as soon as it grows past `limit` bytes
pub async fn read_frame_field(
    multipart: &mut Multipart,
    limit: usize,
) -> Result<FrameUpload, ApiError> {
    while let Some(mut field) = multipart.next_field().await.map_err(invalid_multipart)? {
        if field.name() != Some(FRAME_FIELD) {
            continue;
        }

        let file_name = field.file_name().map(str::to_string);
        let mut bytes = BytesMut::new();
        while let Some(chunk) = field.chunk().await.map_err(invalid_multipart)? {
            if bytes.len() + chunk.len() > limit {
                warn!("Detect request rejected: upload exceeds {} bytes", limit);
                return Err(ApiError::PayloadTooLarge { limit });
            }
            bytes.extend_from_slice(&chunk);
        }

        return Ok(FrameUpload {
            file_name,
            bytes: bytes.freeze(),
        });
    }

    Err(ApiError::BadRequest(format!(
        "Missing '{}' file field",
        FRAME_FIELD
    )))
}

fn invalid_multipart(e: MultipartError) -> ApiError {
    ApiError::BadRequest(format!("Invalid multipart body: {}", e))
}

/// Decode, run inference, and shape detections and alerts
pub fn analyze_frame(
    detector: &dyn ObjectDetector,
    bytes: &[u8],
    formatter: &ResultFormatter,
) -> Result<FrameAnalysis, ApiError> {
    let (image, info) = decode_image_bytes(bytes).map_err(|e| {
        warn!("Failed to decode image: {}", e);
        ApiError::BadRequest(format!("Invalid image: {}", e))
    })?;
    debug!("Decoded image: {}x{} ({:?})", info.width, info.height, info.format);

    let raw = detector
        .infer(&image, formatter.confidence_threshold())
        .map_err(|e| {
            warn!("Inference failed: {}", e);
            ApiError::InferenceFailed(e.to_string())
        })?;

    let detections =
        formatter.format_detections(&raw, (info.width, info.height), |id| detector.class_name(id));

    let alerts = formatter.derive_alerts(&detections, || {
        encode_thumbnail_base64(&image, THUMBNAIL_MAX_SIZE, THUMBNAIL_QUALITY)
            .map_err(|e| ApiError::InternalError(e.to_string()))
    })?;

    Ok(FrameAnalysis {
        frame_w: info.width,
        frame_h: info.height,
        detections,
        alerts,
    })
}

/// Best-effort save; failures are logged and reported as no saved path
fn persist_upload(store: &UploadStore, upload: &FrameUpload) -> Option<String> {
    match store.save(upload.file_name.as_deref(), &upload.bytes) {
        Ok(path) => Some(path.to_string_lossy().into_owned()),
        Err(e) => {
            warn!("Failed to persist upload: {}", e);
            None
        }
    }
}
