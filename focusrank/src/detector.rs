//! Region detectors.
//!
//! A detector turns a decoded image into raw detections in source pixel
//! coordinates. Clipping and class filtering happen downstream.

use anyhow::Result;
use image::DynamicImage;

use crate::onnx_session::ModelInfo;
use crate::region::Detection;

/// Class name reported by [`WholeImageDetector`]
pub const WHOLE_IMAGE_CLASS: &str = "image";

pub trait Detector: Send {
    /// Short name used in logs and the run report
    fn name(&self) -> &str;

    /// Detect regions of interest in one decoded image
    fn detect(&mut self, image: &DynamicImage) -> Result<Vec<Detection>>;

    /// Information about the backing model, if any
    fn model_info(&self) -> Option<&ModelInfo> {
        None
    }
}

/// Reports the full frame as a single region, so whole images are scored
/// without a model.
#[derive(Debug, Default, Clone)]
pub struct WholeImageDetector;

impl Detector for WholeImageDetector {
    fn name(&self) -> &str {
        "whole-image"
    }

    fn detect(&mut self, image: &DynamicImage) -> Result<Vec<Detection>> {
        if image.width() == 0 || image.height() == 0 {
            return Ok(Vec::new());
        }
        Ok(vec![Detection {
            x1: 0.0,
            y1: 0.0,
            x2: image.width() as f32,
            y2: image.height() as f32,
            confidence: 1.0,
            class_id: 0,
            class_name: WHOLE_IMAGE_CLASS.to_string(),
        }])
    }
}
