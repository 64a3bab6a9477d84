// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Upload persistence

pub mod uploads;

pub use uploads::{sanitize_file_name, StorageError, UploadStore};
