// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Image loading and thumbnail helpers for uploaded frames

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ImageFormat, RgbImage};
use thiserror::Error;

/// Bounding box for alert thumbnails (width, height)
pub const THUMBNAIL_MAX_SIZE: (u32, u32) = (320, 320);

/// JPEG quality used for alert thumbnails
pub const THUMBNAIL_QUALITY: u8 = 70;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("Image data is empty")]
    EmptyData,

    #[error("Unsupported image format")]
    UnsupportedFormat,

    #[error("Failed to decode image: {0}")]
    DecodeFailed(String),

    #[error("Failed to encode thumbnail: {0}")]
    EncodeFailed(String),
}

/// Image information extracted during loading
#[derive(Debug, Clone)]
pub struct ImageInfo {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Detected container format
    pub format: ImageFormat,
    /// Size of the encoded upload in bytes
    pub size_bytes: usize,
}

/// Decode raw upload bytes into a 3-channel RGB image
///
/// Alpha, grey-scale and palette inputs are all normalised to RGB8 so the
/// detector always sees the same pixel layout.
pub fn decode_image_bytes(bytes: &[u8]) -> Result<(RgbImage, ImageInfo), ImageError> {
    if bytes.is_empty() {
        return Err(ImageError::EmptyData);
    }

    let format = image::guess_format(bytes).map_err(|_| ImageError::UnsupportedFormat)?;

    let img = image::load_from_memory_with_format(bytes, format)
        .map_err(|e| ImageError::DecodeFailed(e.to_string()))?;

    let rgb = img.to_rgb8();
    let info = ImageInfo {
        width: rgb.width(),
        height: rgb.height(),
        format,
        size_bytes: bytes.len(),
    };

    Ok((rgb, info))
}

/// Compute the size of a thumbnail that fits within `max` while keeping the
/// aspect ratio. Images already inside the box keep their size.
pub fn thumbnail_dimensions(width: u32, height: u32, max: (u32, u32)) -> (u32, u32) {
    let (max_w, max_h) = max;
    if width <= max_w && height <= max_h {
        return (width, height);
    }

    let scale = (max_w as f64 / width as f64).min(max_h as f64 / height as f64);
    let new_w = ((width as f64 * scale).round() as u32).clamp(1, max_w);
    let new_h = ((height as f64 * scale).round() as u32).clamp(1, max_h);
    (new_w, new_h)
}

/// Downscale the whole frame and return it as a base64 JPEG string
pub fn encode_thumbnail_base64(
    image: &RgbImage,
    max: (u32, u32),
    quality: u8,
) -> Result<String, ImageError> {
    let (w, h) = thumbnail_dimensions(image.width(), image.height(), max);

    let mut buffer = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality);

    if (w, h) == image.dimensions() {
        encoder
            .encode_image(image)
            .map_err(|e| ImageError::EncodeFailed(e.to_string()))?;
    } else {
        let thumb = image::imageops::resize(image, w, h, FilterType::Triangle);
        encoder
            .encode_image(&thumb)
            .map_err(|e| ImageError::EncodeFailed(e.to_string()))?;
    }

    Ok(STANDARD.encode(&buffer))
}
