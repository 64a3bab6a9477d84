// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{Context, Result};
use clap::Parser;
use frame_detect_node::{
    api::{start_server, AppState},
    config::{Args, ServiceConfig},
    vision::{ModelHolder, YoloConfig},
};
use std::env;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Initialize tracing subscriber for logging
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let config = ServiceConfig::from_args(args).context("Invalid configuration")?;

    info!("🚀 Starting frame detection node v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Thresholds: detection={}, alert={}, iou={}",
        config.confidence_threshold, config.alert_threshold, config.iou_threshold
    );
    if config.requires_api_key() {
        info!("API key required for /detect");
    } else {
        info!("No API key configured; /detect is open");
    }
    if config.save_uploads {
        info!("Saving uploads to {}", config.upload_dir.display());
    }

    // Load once; a failure leaves the service up in degraded mode
    let yolo_config = YoloConfig {
        model_path: config.model_path.clone(),
        labels_path: config.labels_path.clone(),
        input_size: config.input_size,
        iou_threshold: config.iou_threshold,
    };
    let models = ModelHolder::load(&yolo_config);

    let state = AppState::new(config, models);
    start_server(state).await?;

    info!("👋 Frame detection node stopped");
    Ok(())
}
