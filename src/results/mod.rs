// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Detection result shaping

pub mod formatter;

pub use formatter::{format_timestamp, Alert, Detection, ResultFormatter};
