// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Detect API endpoint module
//!
//! Provides POST /detect for running object detection on an uploaded frame.

pub mod handler;
pub mod response;

pub use handler::{analyze_frame, authorize, detect_handler, FrameAnalysis, API_KEY_HEADER};
pub use response::DetectResponse;
