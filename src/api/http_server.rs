// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::{net::SocketAddr, sync::Arc};
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::detect::detect_handler;
use super::handlers::health_handler;
use crate::config::ServiceConfig;
use crate::results::ResultFormatter;
use crate::storage::UploadStore;
use crate::vision::ModelHolder;

/// Shared, read-only state handed to every request
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub models: ModelHolder,
    pub formatter: ResultFormatter,
    /// `None` when upload persistence is disabled
    pub uploads: Option<UploadStore>,
}

impl AppState {
    pub fn new(config: ServiceConfig, models: ModelHolder) -> Self {
        let formatter = ResultFormatter::new(config.confidence_threshold, config.alert_threshold);
        let uploads = config
            .save_uploads
            .then(|| UploadStore::new(config.upload_dir.clone()));

        Self {
            config: Arc::new(config),
            models,
            formatter,
            uploads,
        }
    }

    /// Default configuration, no model, persistence off
    pub fn new_for_test() -> Self {
        let config = ServiceConfig {
            save_uploads: false,
            ..Default::default()
        };
        Self::new(config, ModelHolder::empty())
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/", get(health_handler))
        // Detection endpoint; the upload limit is enforced while streaming the field
        .route(
            "/detect",
            post(detect_handler).layer(DefaultBodyLimit::disable()),
        )
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

pub async fn start_server(state: AppState) -> anyhow::Result<()> {
    let addr = state.config.listen_addr.parse::<SocketAddr>()?;
    let app = create_app(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("API server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
