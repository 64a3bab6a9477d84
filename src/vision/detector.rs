// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Object detector abstraction
//!
//! The HTTP layer only talks to [`ObjectDetector`]; the ONNX YOLO adapter is one
//! implementation and tests plug in their own.

use image::RgbImage;
use thiserror::Error;

/// Errors surfaced by a detector while running inference
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Failed to build input tensor: {0}")]
    Preprocess(String),

    #[error("ONNX runtime error: {0}")]
    Runtime(#[from] ort::Error),

    #[error("Unexpected model output: {0}")]
    UnexpectedOutput(String),

    #[error("Model session is unavailable: {0}")]
    SessionUnavailable(String),
}

/// One candidate box as produced by the model, in source image pixels
#[derive(Debug, Clone, PartialEq)]
pub struct RawBox {
    /// Class index into the model's name table
    pub class_id: usize,
    /// Score in [0, 1]
    pub confidence: f32,
    /// `[x1, y1, x2, y2]`
    pub xyxy: [f32; 4],
}

/// Raw per-image model output
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawDetections {
    pub boxes: Vec<RawBox>,
}

impl RawDetections {
    pub fn new(boxes: Vec<RawBox>) -> Self {
        Self { boxes }
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }
}

/// A loaded, ready-to-query detection model
///
/// Implementations must be shareable across request workers. Whether calls are
/// serialised internally is up to the implementation.
pub trait ObjectDetector: Send + Sync {
    /// Run detection on an RGB frame, dropping candidates below
    /// `confidence_threshold`
    fn infer(
        &self,
        image: &RgbImage,
        confidence_threshold: f32,
    ) -> Result<RawDetections, InferenceError>;

    /// Human-readable name for a class index, if the model carries one
    fn class_name(&self, class_id: usize) -> Option<String>;
}
