// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Decoding of YOLO output tensors and non-maximum suppression

use ndarray::{ArrayView2, ArrayViewD, Axis, Ix3};

use crate::vision::detector::InferenceError;

/// Upper bound on boxes kept per image (Ultralytics `max_det`)
pub const MAX_DETECTIONS: usize = 300;

/// Shape family of the first model output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputLayout {
    /// `[1, 4 + nc, N]`: cx, cy, w, h followed by per-class scores; needs NMS
    Anchors { num_classes: usize, num_anchors: usize },
    /// `[1, N, 6]`: x1, y1, x2, y2, score, class; already suppressed
    EndToEnd { num_boxes: usize },
}

/// Anchor count of a stride 8/16/32 head at a square input size
pub fn expected_anchors(input_size: u32) -> usize {
    let s = input_size as usize;
    s * s * 21 / 1024
}

impl OutputLayout {
    /// Classify an output shape for a model exported at `input_size`
    pub fn from_shape(shape: &[usize], input_size: u32) -> Result<Self, InferenceError> {
        if shape.len() != 3 || shape[0] != 1 {
            return Err(InferenceError::UnexpectedOutput(format!(
                "expected a [1, C, N] tensor, got {:?}",
                shape
            )));
        }

        let (rows, cols) = (shape[1], shape[2]);
        if rows > 4 && cols == expected_anchors(input_size) {
            return Ok(Self::Anchors {
                num_classes: rows - 4,
                num_anchors: cols,
            });
        }
        if cols == 6 {
            return Ok(Self::EndToEnd { num_boxes: rows });
        }
        // Heads with other strides still put anchors on the long axis
        if rows > 4 && rows < cols {
            return Ok(Self::Anchors {
                num_classes: rows - 4,
                num_anchors: cols,
            });
        }

        Err(InferenceError::UnexpectedOutput(format!(
            "unrecognised detection layout {:?}",
            shape
        )))
    }
}

/// A candidate box in model input space
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub class_id: usize,
    pub confidence: f32,
    pub xyxy: [f32; 4],
}

/// Decode the first model output into candidates at or above `conf_threshold`
///
/// Anchor layouts go through class-aware NMS; end-to-end layouts are only
/// filtered. The result is ordered by descending confidence.
pub fn decode_output(
    output: ArrayViewD<'_, f32>,
    input_size: u32,
    conf_threshold: f32,
    iou_threshold: f32,
) -> Result<Vec<Candidate>, InferenceError> {
    let layout = OutputLayout::from_shape(output.shape(), input_size)?;
    let output = output
        .into_dimensionality::<Ix3>()
        .map_err(|e| InferenceError::UnexpectedOutput(e.to_string()))?;
    let rows = output.index_axis_move(Axis(0), 0);

    let candidates = match layout {
        OutputLayout::Anchors { .. } => {
            let candidates = decode_anchors(rows, conf_threshold);
            non_maximum_suppression(candidates, iou_threshold, MAX_DETECTIONS)
        }
        OutputLayout::EndToEnd { .. } => {
            let mut candidates = decode_end_to_end(rows, conf_threshold);
            sort_by_confidence(&mut candidates);
            candidates.truncate(MAX_DETECTIONS);
            candidates
        }
    };

    Ok(candidates)
}

/// `rows` is `[4 + nc, N]`
pub fn decode_anchors(rows: ArrayView2<'_, f32>, conf_threshold: f32) -> Vec<Candidate> {
    let num_anchors = rows.shape()[1];
    let mut candidates = Vec::new();

    for i in 0..num_anchors {
        let column = rows.column(i);
        let (class_id, confidence) = column
            .iter()
            .skip(4)
            .enumerate()
            .fold((0usize, f32::NEG_INFINITY), |(best_id, best), (id, &score)| {
                if score > best {
                    (id, score)
                } else {
                    (best_id, best)
                }
            });

        if confidence.is_nan() || confidence < conf_threshold {
            continue;
        }

        let (cx, cy, w, h) = (column[0], column[1], column[2], column[3]);
        candidates.push(Candidate {
            class_id,
            confidence,
            xyxy: [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0],
        });
    }

    candidates
}

/// `rows` is `[N, 6]`
pub fn decode_end_to_end(rows: ArrayView2<'_, f32>, conf_threshold: f32) -> Vec<Candidate> {
    rows.axis_iter(Axis(0))
        .filter(|row| row[4] >= conf_threshold)
        .map(|row| Candidate {
            class_id: row[5].max(0.0).round() as usize,
            confidence: row[4],
            xyxy: [row[0], row[1], row[2], row[3]],
        })
        .collect()
}

/// Intersection over union of two `[x1, y1, x2, y2]` boxes
pub fn compute_iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let inter_x1 = a[0].max(b[0]);
    let inter_y1 = a[1].max(b[1]);
    let inter_x2 = a[2].min(b[2]);
    let inter_y2 = a[3].min(b[3]);

    let inter_area = (inter_x2 - inter_x1).max(0.0) * (inter_y2 - inter_y1).max(0.0);
    let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
    let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
    let union_area = area_a + area_b - inter_area;

    if union_area <= 0.0 {
        0.0
    } else {
        inter_area / union_area
    }
}

fn sort_by_confidence(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
}

/// Greedy class-aware NMS, highest confidence first
pub fn non_maximum_suppression(
    mut candidates: Vec<Candidate>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<Candidate> {
    sort_by_confidence(&mut candidates);

    let mut kept: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        if kept.len() >= max_detections {
            break;
        }
        let suppressed = kept.iter().any(|k| {
            k.class_id == candidate.class_id && compute_iou(&k.xyxy, &candidate.xyxy) > iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }

    kept
}
