// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Letterbox preprocessing for YOLO models

use image::{Rgb, RgbImage};
use ndarray::Array4;

/// Padding colour used by the Ultralytics letterbox
pub const PAD_VALUE: u8 = 114;

/// Scale and padding applied while letterboxing
///
/// Keeps what is needed to map boxes from model input space back onto the
/// source frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxInfo {
    /// Scale factor applied to the source frame
    pub scale: f32,
    /// Horizontal padding (left side)
    pub pad_x: f32,
    /// Vertical padding (top side)
    pub pad_y: f32,
    /// Source frame width
    pub original_width: u32,
    /// Source frame height
    pub original_height: u32,
}

impl LetterboxInfo {
    pub fn new(width: u32, height: u32, target_size: u32) -> Self {
        if width == 0 || height == 0 {
            return Self {
                scale: 1.0,
                pad_x: 0.0,
                pad_y: 0.0,
                original_width: width,
                original_height: height,
            };
        }

        let scale = (target_size as f32 / width as f32).min(target_size as f32 / height as f32);
        let (new_w, new_h) = scaled_size(width, height, scale);

        Self {
            scale,
            pad_x: ((target_size - new_w) / 2) as f32,
            pad_y: ((target_size - new_h) / 2) as f32,
            original_width: width,
            original_height: height,
        }
    }

    /// Map an `[x1, y1, x2, y2]` box from model input space onto the source
    /// frame, clamped to its bounds
    pub fn map_box(&self, xyxy: [f32; 4]) -> [f32; 4] {
        let w = self.original_width as f32;
        let h = self.original_height as f32;

        let x1 = ((xyxy[0] - self.pad_x) / self.scale).clamp(0.0, w);
        let y1 = ((xyxy[1] - self.pad_y) / self.scale).clamp(0.0, h);
        let x2 = ((xyxy[2] - self.pad_x) / self.scale).clamp(0.0, w);
        let y2 = ((xyxy[3] - self.pad_y) / self.scale).clamp(0.0, h);

        [x1.min(x2), y1.min(y2), x1.max(x2), y1.max(y2)]
    }
}

fn scaled_size(width: u32, height: u32, scale: f32) -> (u32, u32) {
    let new_w = ((width as f32 * scale).round() as u32).max(1);
    let new_h = ((height as f32 * scale).round() as u32).max(1);
    (new_w, new_h)
}

/// Resize with aspect ratio preservation and centre onto a grey square
pub fn letterbox(image: &RgbImage, target_size: u32) -> (RgbImage, LetterboxInfo) {
    let info = LetterboxInfo::new(image.width(), image.height(), target_size);
    let mut output = RgbImage::from_pixel(
        target_size,
        target_size,
        Rgb([PAD_VALUE, PAD_VALUE, PAD_VALUE]),
    );

    if image.width() == 0 || image.height() == 0 {
        return (output, info);
    }

    let (new_w, new_h) = scaled_size(image.width(), image.height(), info.scale);
    let resized = if (new_w, new_h) == image.dimensions() {
        image.clone()
    } else {
        image::imageops::resize(image, new_w, new_h, image::imageops::FilterType::Triangle)
    };

    image::imageops::overlay(
        &mut output,
        &resized,
        info.pad_x as i64,
        info.pad_y as i64,
    );

    (output, info)
}

/// Build the `[1, 3, S, S]` input tensor with pixel values scaled to [0, 1]
pub fn preprocess_for_detection(image: &RgbImage, target_size: u32) -> (Array4<f32>, LetterboxInfo) {
    let (padded, info) = letterbox(image, target_size);
    let size = target_size as usize;

    let mut tensor = Array4::zeros((1, 3, size, size));
    for (x, y, pixel) in padded.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        for c in 0..3 {
            tensor[[0, c, y, x]] = pixel[c] as f32 / 255.0;
        }
    }

    (tensor, info)
}
