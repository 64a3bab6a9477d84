// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! YOLO object detection on ONNX Runtime
//!
//! Loads an Ultralytics ONNX export and implements [`ObjectDetector`] for it.
//! Runs on CPU; the session is behind a mutex so concurrent requests take
//! turns.

use anyhow::{Context, Result};
use image::RgbImage;
use ort::execution_providers::CPUExecutionProvider;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};

use super::labels::ClassNames;
use super::postprocess::decode_output;
use super::preprocessing::preprocess_for_detection;
use crate::config::{DEFAULT_INPUT_SIZE, DEFAULT_IOU_THRESHOLD};
use crate::vision::detector::{InferenceError, ObjectDetector, RawBox, RawDetections};

/// Metadata key holding the class table in Ultralytics exports
const NAMES_METADATA_KEY: &str = "names";

/// Settings for loading a YOLO model
#[derive(Debug, Clone)]
pub struct YoloConfig {
    /// Path to the `.onnx` file
    pub model_path: PathBuf,
    /// Optional labels file overriding embedded class names
    pub labels_path: Option<PathBuf>,
    /// Square input size the model was exported with
    pub input_size: u32,
    /// IoU threshold for NMS
    pub iou_threshold: f32,
}

impl Default for YoloConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("model/best.onnx"),
            labels_path: None,
            input_size: DEFAULT_INPUT_SIZE,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
        }
    }
}

pub struct YoloOnnxModel {
    session: Mutex<Session>,
    input_name: String,
    input_size: u32,
    iou_threshold: f32,
    class_names: ClassNames,
}

impl std::fmt::Debug for YoloOnnxModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YoloOnnxModel")
            .field("input_name", &self.input_name)
            .field("input_size", &self.input_size)
            .field("iou_threshold", &self.iou_threshold)
            .field("classes", &self.class_names.len())
            .finish_non_exhaustive()
    }
}

impl YoloOnnxModel {
    /// Load the model and its class names
    ///
    /// # Errors
    /// Returns error if:
    /// - Model file not found
    /// - ONNX Runtime initialization fails
    /// - A configured labels file cannot be read
    pub fn load(config: &YoloConfig) -> Result<Self> {
        let model_path = config.model_path.as_path();
        if !model_path.exists() {
            anyhow::bail!("YOLO model not found: {}", model_path.display());
        }

        info!("Loading YOLO model from {}", model_path.display());

        let session = Session::builder()
            .context("Failed to create session builder")?
            .with_execution_providers([CPUExecutionProvider::default().build()])
            .context("Failed to set CPU execution provider")?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .context("Failed to set optimization level")?
            .with_intra_threads(4)
            .context("Failed to set intra threads")?
            .commit_from_file(model_path)
            .with_context(|| format!("Failed to load YOLO model from {}", model_path.display()))?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .unwrap_or_else(|| "images".to_string());

        if let Some(output) = session.outputs.first() {
            debug!("YOLO output {}: {:?}", output.name, output.output_type);
        }

        let class_names = match &config.labels_path {
            Some(path) => ClassNames::from_file(path)?,
            None => embedded_class_names(&session, model_path),
        };

        info!(
            "✅ YOLO model loaded (input: {}, {} classes)",
            input_name,
            class_names.len()
        );

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            input_size: config.input_size,
            iou_threshold: config.iou_threshold,
            class_names,
        })
    }

    pub fn class_names(&self) -> &ClassNames {
        &self.class_names
    }
}

fn embedded_class_names(session: &Session, model_path: &Path) -> ClassNames {
    let raw = session
        .metadata()
        .and_then(|metadata| metadata.custom(NAMES_METADATA_KEY));

    match raw {
        Ok(Some(raw)) => ClassNames::from_metadata(&raw).unwrap_or_else(|| {
            warn!("Unparseable class names in {}", model_path.display());
            ClassNames::default()
        }),
        Ok(None) => {
            warn!(
                "No class names embedded in {}; labels fall back to class ids",
                model_path.display()
            );
            ClassNames::default()
        }
        Err(e) => {
            warn!("Failed to read model metadata: {}", e);
            ClassNames::default()
        }
    }
}

impl ObjectDetector for YoloOnnxModel {
    fn infer(
        &self,
        image: &RgbImage,
        confidence_threshold: f32,
    ) -> Result<RawDetections, InferenceError> {
        let (input, letterbox) = preprocess_for_detection(image, self.input_size);
        let input = Tensor::from_array(input)
            .map_err(|e| InferenceError::Preprocess(e.to_string()))?;

        let output = {
            let mut session = self
                .session
                .lock()
                .map_err(|e| InferenceError::SessionUnavailable(e.to_string()))?;

            let outputs = session.run(ort::inputs![self.input_name.as_str() => input])?;
            // The extracted view borrows `outputs` and must drop first
            let array = outputs[0].try_extract_array::<f32>()?.to_owned();
            array
        };

        let candidates = decode_output(
            output.view(),
            self.input_size,
            confidence_threshold,
            self.iou_threshold,
        )?;
        debug!("YOLO produced {} candidates", candidates.len());

        let boxes = candidates
            .into_iter()
            .map(|c| RawBox {
                class_id: c.class_id,
                confidence: c.confidence,
                xyxy: letterbox.map_box(c.xyxy),
            })
            .collect();

        Ok(RawDetections::new(boxes))
    }

    fn class_name(&self, class_id: usize) -> Option<String> {
        self.class_names.get(class_id).map(str::to_string)
    }
}
