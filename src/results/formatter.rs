// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Conversion of raw model output into detections and alerts

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::vision::detector::RawDetections;

/// One classified object in the uploaded frame
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Detection {
    /// Class label (or the class index as text when no name is known)
    pub label: String,
    /// Confidence score (0.0-1.0)
    #[serde(rename = "conf")]
    pub confidence: f32,
    /// `[x1, y1, x2, y2]` in source image pixels
    #[serde(rename = "xyxy")]
    pub bbox: [f32; 4],
}

/// A high-confidence detection surfaced with a preview of the frame
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Alert {
    pub label: String,
    #[serde(rename = "conf")]
    pub confidence: f32,
    /// ISO-8601 UTC with a `Z` suffix
    pub timestamp: String,
    /// Base64 JPEG thumbnail of the whole frame
    #[serde(rename = "thumb")]
    pub thumbnail: String,
}

/// ISO-8601 UTC timestamp with microseconds, e.g. `2025-01-31T08:15:02.123456Z`
pub fn format_timestamp(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Filters raw boxes and derives alerts using two independent thresholds
#[derive(Debug, Clone, Copy)]
pub struct ResultFormatter {
    confidence_threshold: f32,
    alert_threshold: f32,
}

impl ResultFormatter {
    pub fn new(confidence_threshold: f32, alert_threshold: f32) -> Self {
        Self {
            confidence_threshold,
            alert_threshold,
        }
    }

    pub fn confidence_threshold(&self) -> f32 {
        self.confidence_threshold
    }

    pub fn alert_threshold(&self) -> f32 {
        self.alert_threshold
    }

    /// Keep boxes at or above the detection threshold, in model order
    ///
    /// `class_name` resolves a class index; unknown indices fall back to the
    /// index itself. Boxes are clamped to the `frame` (width, height).
    pub fn format_detections<F>(
        &self,
        raw: &RawDetections,
        frame: (u32, u32),
        class_name: F,
    ) -> Vec<Detection>
    where
        F: Fn(usize) -> Option<String>,
    {
        raw.boxes
            .iter()
            .filter(|b| !b.confidence.is_nan() && b.confidence >= self.confidence_threshold)
            .map(|b| Detection {
                label: class_name(b.class_id).unwrap_or_else(|| b.class_id.to_string()),
                confidence: b.confidence.clamp(0.0, 1.0),
                bbox: clamp_box(b.xyxy, frame),
            })
            .collect()
    }

    /// Build an alert for every detection at or above the alert threshold
    ///
    /// `thumbnail` is only invoked when at least one alert exists and its
    /// result is shared by all alerts of the frame.
    pub fn derive_alerts<F, E>(
        &self,
        detections: &[Detection],
        thumbnail: F,
    ) -> Result<Vec<Alert>, E>
    where
        F: FnOnce() -> Result<String, E>,
    {
        let alerting: Vec<&Detection> = detections
            .iter()
            .filter(|d| d.confidence >= self.alert_threshold)
            .collect();

        if alerting.is_empty() {
            return Ok(Vec::new());
        }

        let thumb = thumbnail()?;
        Ok(alerting
            .into_iter()
            .map(|d| Alert {
                label: d.label.clone(),
                confidence: d.confidence,
                timestamp: format_timestamp(Utc::now()),
                thumbnail: thumb.clone(),
            })
            .collect())
    }
}

fn clamp_box(xyxy: [f32; 4], (width, height): (u32, u32)) -> [f32; 4] {
    let (w, h) = (width as f32, height as f32);
    let x1 = xyxy[0].clamp(0.0, w);
    let y1 = xyxy[1].clamp(0.0, h);
    let x2 = xyxy[2].clamp(0.0, w);
    let y2 = xyxy[3].clamp(0.0, h);
    [x1.min(x2), y1.min(y2), x1.max(x2), y1.max(y2)]
}
