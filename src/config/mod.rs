// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Service configuration
//!
//! Values are read once at startup from flags or environment variables and
//! frozen into a [`ServiceConfig`] that is handed to the HTTP layer. Nothing
//! re-reads the environment after that.

use clap::{ArgAction, Parser};
use std::path::PathBuf;
use thiserror::Error;
use tracing::warn;

/// Default detection confidence threshold
pub const DEFAULT_CONF_THRESHOLD: f32 = 0.35;

/// Default alert confidence threshold
pub const DEFAULT_ALERT_CONF_THRESHOLD: f32 = 0.5;

/// Default IoU threshold used for non-maximum suppression
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.7;

/// Default maximum upload size (8 MiB)
pub const DEFAULT_MAX_FILE_SIZE: usize = 8 * 1024 * 1024;

/// Default square model input size
pub const DEFAULT_INPUT_SIZE: u32 = 640;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be within [0, 1], got {value}")]
    ThresholdOutOfRange { name: &'static str, value: f32 },

    #[error("alert threshold ({alert}) must not be below the detection threshold ({detection})")]
    AlertBelowDetection { alert: f32, detection: f32 },

    #[error("iou threshold must be within (0, 1], got {0}")]
    InvalidIou(f32),

    #[error("max upload size must be greater than 0")]
    ZeroUploadLimit,

    #[error("model input size must be a positive multiple of 32, got {0}")]
    InvalidInputSize(u32),
}

/// Command line / environment arguments
#[derive(Parser, Debug, Clone)]
#[command(name = "frame-detect-node")]
#[command(about = "Object detection over uploaded frames", long_about = None)]
pub struct Args {
    /// Shared secret expected in the x-api-key header
    #[arg(long, env = "API_KEY")]
    pub api_key: Option<String>,

    /// Path to the YOLO ONNX model
    #[arg(long, env = "MODEL_PATH", default_value = "model/best.onnx")]
    pub model_path: PathBuf,

    /// Optional class-name file (one label per line)
    #[arg(long, env = "LABELS_PATH")]
    pub labels_path: Option<PathBuf>,

    /// Minimum confidence for a detection to be returned
    #[arg(long, env = "CONF_THRESHOLD", default_value_t = DEFAULT_CONF_THRESHOLD)]
    pub conf_threshold: f32,

    /// Minimum confidence for a detection to raise an alert
    #[arg(long, env = "ALERT_CONF_THRESHOLD", default_value_t = DEFAULT_ALERT_CONF_THRESHOLD)]
    pub alert_conf_threshold: f32,

    /// IoU threshold for non-maximum suppression
    #[arg(long, env = "IOU_THRESHOLD", default_value_t = DEFAULT_IOU_THRESHOLD)]
    pub iou_threshold: f32,

    /// Model input size in pixels
    #[arg(long, env = "MODEL_INPUT_SIZE", default_value_t = DEFAULT_INPUT_SIZE)]
    pub input_size: u32,

    /// Maximum accepted upload size in bytes
    #[arg(long, env = "MAX_FILE_SIZE", default_value_t = DEFAULT_MAX_FILE_SIZE)]
    pub max_file_size: usize,

    /// Persist raw uploads to UPLOAD_DIR (1/true/yes enables)
    #[arg(
        long,
        env = "SAVE_UPLOADS",
        default_value = "true",
        value_parser = parse_flag,
        action = ArgAction::Set
    )]
    pub save_uploads: bool,

    /// Directory for persisted uploads
    #[arg(long, env = "UPLOAD_DIR", default_value = "uploads")]
    pub upload_dir: PathBuf,

    /// Listen host
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Listen port
    #[arg(long, env = "PORT", default_value_t = 8000)]
    pub port: u16,
}

/// `1`/`true`/`yes` enable; anything else disables
fn parse_flag(value: &str) -> Result<bool, String> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" | "" => Ok(false),
        other => {
            warn!("Unrecognised flag value '{}', treating as false", other);
            Ok(false)
        }
    }
}

/// Validated, immutable service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Shared secret; `None` disables the header check
    pub api_key: Option<String>,
    pub model_path: PathBuf,
    pub labels_path: Option<PathBuf>,
    pub confidence_threshold: f32,
    pub alert_threshold: f32,
    pub iou_threshold: f32,
    pub input_size: u32,
    pub max_upload_bytes: usize,
    pub save_uploads: bool,
    pub upload_dir: PathBuf,
    pub listen_addr: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model_path: PathBuf::from("model/best.onnx"),
            labels_path: None,
            confidence_threshold: DEFAULT_CONF_THRESHOLD,
            alert_threshold: DEFAULT_ALERT_CONF_THRESHOLD,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            input_size: DEFAULT_INPUT_SIZE,
            max_upload_bytes: DEFAULT_MAX_FILE_SIZE,
            save_uploads: true,
            upload_dir: PathBuf::from("uploads"),
            listen_addr: "0.0.0.0:8000".to_string(),
        }
    }
}

impl ServiceConfig {
    /// Build a validated config from parsed arguments
    pub fn from_args(args: Args) -> Result<Self, ConfigError> {
        let config = Self {
            api_key: args.api_key.filter(|key| !key.is_empty()),
            model_path: args.model_path,
            labels_path: args.labels_path,
            confidence_threshold: args.conf_threshold,
            alert_threshold: args.alert_conf_threshold,
            iou_threshold: args.iou_threshold,
            input_size: args.input_size,
            max_upload_bytes: args.max_file_size,
            save_uploads: args.save_uploads,
            upload_dir: args.upload_dir,
            listen_addr: format!("{}:{}", args.host, args.port),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges and cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_unit_range("confidence threshold", self.confidence_threshold)?;
        check_unit_range("alert threshold", self.alert_threshold)?;

        // Alerts are a subset of detections
        if self.alert_threshold < self.confidence_threshold {
            return Err(ConfigError::AlertBelowDetection {
                alert: self.alert_threshold,
                detection: self.confidence_threshold,
            });
        }

        if !(self.iou_threshold > 0.0 && self.iou_threshold <= 1.0) {
            return Err(ConfigError::InvalidIou(self.iou_threshold));
        }

        if self.max_upload_bytes == 0 {
            return Err(ConfigError::ZeroUploadLimit);
        }

        if self.input_size == 0 || self.input_size % 32 != 0 {
            return Err(ConfigError::InvalidInputSize(self.input_size));
        }

        Ok(())
    }

    pub fn requires_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

fn check_unit_range(name: &'static str, value: f32) -> Result<(), ConfigError> {
    // NaN fails both comparisons
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::ThresholdOutOfRange { name, value });
    }
    Ok(())
}
