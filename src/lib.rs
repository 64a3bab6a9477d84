// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod api;
pub mod config;
pub mod results;
pub mod storage;
pub mod vision;

// Re-export main types
pub use api::{create_app, start_server, AppState};
pub use config::{Args, ConfigError, ServiceConfig};
pub use results::{Alert, Detection, ResultFormatter};
pub use vision::{InferenceError, ModelHolder, ObjectDetector, RawBox, RawDetections};
