// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use axum::{extract::State, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::http_server::AppState;
use crate::results::format_timestamp;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
    pub time: String,
}

/// GET / - Liveness and model status; always succeeds
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        model_loaded: state.models.is_loaded(),
        time: format_timestamp(Utc::now()),
    })
}
