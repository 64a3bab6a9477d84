// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Local persistence of raw uploaded frames

use chrono::Utc;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Name used when the client sent no file name
const FALLBACK_FILE_NAME: &str = "upload";

/// Attempts at finding a free name before giving up
const MAX_NAME_ATTEMPTS: u32 = 1000;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to create upload directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write upload {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Writes uploads as `<unix-millis>_<file name>` under a fixed directory
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
}

impl UploadStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist `bytes`, creating the directory if needed, and return the path
    ///
    /// Never overwrites: a name already taken in the same millisecond gets a
    /// `-<n>` counter after the timestamp.
    pub fn save(
        &self,
        original_name: Option<&str>,
        bytes: &[u8],
    ) -> Result<PathBuf, StorageError> {
        self.save_with_timestamp(Utc::now().timestamp_millis(), original_name, bytes)
    }

    fn save_with_timestamp(
        &self,
        millis: i64,
        original_name: Option<&str>,
        bytes: &[u8],
    ) -> Result<PathBuf, StorageError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| StorageError::CreateDir {
            path: self.dir.clone(),
            source,
        })?;

        let name = sanitize_file_name(original_name);
        let mut attempt = 0;
        loop {
            let file_name = if attempt == 0 {
                format!("{}_{}", millis, name)
            } else {
                format!("{}-{}_{}", millis, attempt, name)
            };
            let path = self.dir.join(file_name);

            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(bytes).map_err(|source| StorageError::Write {
                        path: path.clone(),
                        source,
                    })?;
                    debug!("Saved {} byte upload to {}", bytes.len(), path.display());
                    return Ok(path);
                }
                Err(e)
                    if e.kind() == ErrorKind::AlreadyExists && attempt < MAX_NAME_ATTEMPTS =>
                {
                    attempt += 1;
                }
                Err(source) => return Err(StorageError::Write { path, source }),
            }
        }
    }
}

/// Reduce a client-supplied name to its last path component
pub fn sanitize_file_name(name: Option<&str>) -> String {
    name.and_then(|n| n.rsplit(|c: char| c == '/' || c == '\\').next())
        .map(str::trim)
        .filter(|n| !n.is_empty() && *n != "." && *n != "..")
        .unwrap_or(FALLBACK_FILE_NAME)
        .to_string()
}
