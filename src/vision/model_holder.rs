// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Process-lifetime owner of the detection model

use std::sync::Arc;

use crate::vision::detector::ObjectDetector;
use crate::vision::yolo::{YoloConfig, YoloOnnxModel};

/// Holds the single detector instance for the service
///
/// Built once at startup and shared read-only by every request. A failed load
/// leaves the holder empty; the service keeps running and detect requests
/// report the model as not loaded.
#[derive(Clone, Default)]
pub struct ModelHolder {
    detector: Option<Arc<dyn ObjectDetector>>,
}

impl std::fmt::Debug for ModelHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHolder")
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

impl ModelHolder {
    /// A holder with no model (degraded mode)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Wrap an already constructed detector
    pub fn with_detector(detector: Arc<dyn ObjectDetector>) -> Self {
        Self {
            detector: Some(detector),
        }
    }

    /// Load the YOLO model described by `config`
    ///
    /// Load failures are logged and produce an empty holder.
    pub fn load(config: &YoloConfig) -> Self {
        match YoloOnnxModel::load(config) {
            Ok(model) => {
                tracing::info!("✅ Detection model loaded from {}", config.model_path.display());
                Self::with_detector(Arc::new(model))
            }
            Err(e) => {
                tracing::warn!(
                    "⚠️ Failed loading model {}: {:#}",
                    config.model_path.display(),
                    e
                );
                Self::empty()
            }
        }
    }

    /// Get the detector if one is loaded
    pub fn detector(&self) -> Option<Arc<dyn ObjectDetector>> {
        self.detector.clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.detector.is_some()
    }
}
