// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Detect response types

use serde::{Deserialize, Serialize};

use crate::results::{Alert, Detection};

/// Response from POST /detect
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectResponse {
    /// Width of the decoded frame
    pub frame_w: u32,
    /// Height of the decoded frame
    pub frame_h: u32,
    /// Detections at or above the detection threshold, in model order
    pub detections: Vec<Detection>,
    /// Detections at or above the alert threshold
    pub alerts: Vec<Alert>,
    /// Where the raw upload was saved, if it was
    pub saved_path: Option<String>,
}
