// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! YOLO detection on ONNX Runtime
//!
//! Components:
//! - `preprocessing` - Letterbox resize and tensor layout
//! - `postprocess` - Output decoding and NMS
//! - `labels` - Class-name tables
//! - `model` - Session wrapper implementing `ObjectDetector`

pub mod labels;
pub mod model;
pub mod postprocess;
pub mod preprocessing;

pub use labels::ClassNames;
pub use model::{YoloConfig, YoloOnnxModel};
pub use postprocess::{Candidate, OutputLayout};
pub use preprocessing::LetterboxInfo;
