// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// JSON body returned for every rejected request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    /// Human-readable reason
    pub detail: String,
    pub error_type: String,
}

/// Request-scoped failures of the detection API
#[derive(Debug, Clone, PartialEq)]
pub enum ApiError {
    /// Shared secret missing or wrong
    Unauthorized,
    /// No detection model is loaded
    ModelNotLoaded,
    /// Empty, malformed or undecodable upload
    BadRequest(String),
    /// Upload exceeds the configured byte limit
    PayloadTooLarge { limit: usize },
    /// The model failed while running
    InferenceFailed(String),
    InternalError(String),
}

impl ApiError {
    pub fn to_response(&self) -> ErrorResponse {
        let error_type = match self {
            ApiError::Unauthorized => "unauthorized",
            ApiError::ModelNotLoaded => "model_not_loaded",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::PayloadTooLarge { .. } => "payload_too_large",
            ApiError::InferenceFailed(_) => "inference_error",
            ApiError::InternalError(_) => "internal_error",
        };

        ErrorResponse {
            detail: self.to_string(),
            error_type: error_type.to_string(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::ModelNotLoaded
            | ApiError::InferenceFailed(_)
            | ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Unauthorized => write!(f, "Unauthorized"),
            ApiError::ModelNotLoaded => write!(f, "Model not loaded"),
            ApiError::BadRequest(msg) => write!(f, "{}", msg),
            ApiError::PayloadTooLarge { .. } => write!(f, "File too large"),
            ApiError::InferenceFailed(msg) => write!(f, "Inference error: {}", msg),
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.to_response())).into_response()
    }
}
