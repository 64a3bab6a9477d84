// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Vision processing for uploaded frames
//!
//! This module provides:
//! - Image decoding and thumbnail encoding
//! - The `ObjectDetector` seam and its YOLO/ONNX implementation
//! - `ModelHolder`, the startup-loaded model handle

pub mod detector;
pub mod image_utils;
pub mod model_holder;
pub mod yolo;

pub use detector::{InferenceError, ObjectDetector, RawBox, RawDetections};
pub use image_utils::{decode_image_bytes, encode_thumbnail_base64, ImageError, ImageInfo};
pub use model_holder::ModelHolder;
pub use yolo::{YoloConfig, YoloOnnxModel};
