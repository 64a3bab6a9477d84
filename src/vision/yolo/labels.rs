// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Class-name tables for detection models

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;

/// Mapping from class index to label
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassNames(HashMap<usize, String>);

impl ClassNames {
    pub fn new(names: HashMap<usize, String>) -> Self {
        Self(names)
    }

    /// Load a labels file: one name per line, line number = class index
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read labels file {}", path.display()))?;
        Ok(Self::from_lines(&contents))
    }

    pub fn from_lines(contents: &str) -> Self {
        let names = contents
            .lines()
            .enumerate()
            .filter_map(|(id, line)| {
                let name = line.trim();
                (!name.is_empty()).then(|| (id, name.to_string()))
            })
            .collect();
        Self(names)
    }

    /// Parse the `names` metadata entry written by the Ultralytics ONNX
    /// exporter, e.g. `{0: 'person', 1: 'bicycle'}`
    pub fn from_metadata(raw: &str) -> Option<Self> {
        let body = raw.trim().strip_prefix('{')?.strip_suffix('}')?;
        let mut names = HashMap::new();
        let mut rest = body.trim();

        while !rest.is_empty() {
            let (key, after) = rest.split_once(':')?;
            let id: usize = key.trim().parse().ok()?;

            let after = after.trim_start();
            let quote = after.chars().next()?;
            if quote != '\'' && quote != '"' {
                return None;
            }
            let inner = &after[1..];
            let end = inner.find(quote)?;
            names.insert(id, inner[..end].to_string());

            rest = inner[end + 1..].trim_start();
            rest = rest.strip_prefix(',').unwrap_or(rest).trim_start();
        }

        Some(Self(names))
    }

    pub fn get(&self, class_id: usize) -> Option<&str> {
        self.0.get(&class_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
