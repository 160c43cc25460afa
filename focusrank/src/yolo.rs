//! YOLOv8 object detection through ONNX Runtime.

use anyhow::Result;
use image::{DynamicImage, Rgb, RgbImage};
use log::debug;
use ndarray::{Array, IxDyn};
use ort::{session::Session, value::Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

use crate::detector::Detector;
use crate::onnx_session::{create_onnx_session, ModelInfo};
use crate::region::Detection;

const DEFAULT_MODEL_SIZE: u32 = 640;
const PAD_VALUE: u8 = 114;

/// COCO class names in YOLOv8 output order
pub const COCO_CLASSES: [&str; 80] = [
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "airplane",
    "bus",
    "train",
    "truck",
    "boat",
    "traffic light",
    "fire hydrant",
    "stop sign",
    "parking meter",
    "bench",
    "bird",
    "cat",
    "dog",
    "horse",
    "sheep",
    "cow",
    "elephant",
    "bear",
    "zebra",
    "giraffe",
    "backpack",
    "umbrella",
    "handbag",
    "tie",
    "suitcase",
    "frisbee",
    "skis",
    "snowboard",
    "sports ball",
    "kite",
    "baseball bat",
    "baseball glove",
    "skateboard",
    "surfboard",
    "tennis racket",
    "bottle",
    "wine glass",
    "cup",
    "fork",
    "knife",
    "spoon",
    "bowl",
    "banana",
    "apple",
    "sandwich",
    "orange",
    "broccoli",
    "carrot",
    "hot dog",
    "pizza",
    "donut",
    "cake",
    "chair",
    "couch",
    "potted plant",
    "bed",
    "dining table",
    "toilet",
    "tv",
    "laptop",
    "mouse",
    "remote",
    "keyboard",
    "cell phone",
    "microwave",
    "oven",
    "toaster",
    "sink",
    "refrigerator",
    "book",
    "clock",
    "vase",
    "scissors",
    "teddy bear",
    "hair drier",
    "toothbrush",
];

/// Name for a class id, falling back to the id itself for non-COCO models
pub fn class_name(class_id: u32) -> String {
    COCO_CLASSES
        .get(class_id as usize)
        .map(|name| name.to_string())
        .unwrap_or_else(|| format!("class_{class_id}"))
}

/// Geometry of a letterbox resize: source -> model input
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub x_offset: u32,
    pub y_offset: u32,
    pub new_width: u32,
    pub new_height: u32,
}

impl Letterbox {
    pub fn new(orig_width: u32, orig_height: u32, target_size: u32) -> Self {
        let max_dim = orig_width.max(orig_height).max(1);
        let scale = target_size as f32 / max_dim as f32;
        let new_width = ((orig_width as f32 * scale) as u32).clamp(1, target_size);
        let new_height = ((orig_height as f32 * scale) as u32).clamp(1, target_size);
        Self {
            scale,
            x_offset: (target_size - new_width) / 2,
            y_offset: (target_size - new_height) / 2,
            new_width,
            new_height,
        }
    }

    /// Map a model-space point back to source pixel coordinates
    pub fn to_source(&self, x: f32, y: f32) -> (f32, f32) {
        (
            (x - self.x_offset as f32) / self.scale,
            (y - self.y_offset as f32) / self.scale,
        )
    }
}

/// Letterbox an image into a normalised `[1, 3, size, size]` NCHW tensor
pub fn preprocess_image(img: &DynamicImage, target_size: u32) -> Result<(Array<f32, IxDyn>, Letterbox)> {
    let rgb_img = img.to_rgb8();
    let (orig_width, orig_height) = rgb_img.dimensions();
    let letterbox = Letterbox::new(orig_width, orig_height, target_size);

    let resized = image::imageops::resize(
        &rgb_img,
        letterbox.new_width,
        letterbox.new_height,
        image::imageops::FilterType::Lanczos3,
    );

    let mut canvas = RgbImage::from_pixel(target_size, target_size, Rgb([PAD_VALUE; 3]));
    image::imageops::replace(
        &mut canvas,
        &resized,
        letterbox.x_offset as i64,
        letterbox.y_offset as i64,
    );

    let size = target_size as usize;
    let mut input_data = Vec::with_capacity(3 * size * size);
    for c in 0..3 {
        for pixel in canvas.pixels() {
            input_data.push(pixel[c] as f32 / 255.0);
        }
    }

    let input = Array::from_shape_vec(IxDyn(&[1, 3, size, size]), input_data)?;
    Ok((input, letterbox))
}

/// Per-class non-maximum suppression
pub fn nms(detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    let mut class_groups: BTreeMap<u32, Vec<Detection>> = BTreeMap::new();
    for detection in detections {
        class_groups
            .entry(detection.class_id)
            .or_default()
            .push(detection);
    }

    let mut all_results = Vec::new();
    for (_, mut class_detections) in class_groups {
        class_detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        let mut suppressed = vec![false; class_detections.len()];
        for i in 0..class_detections.len() {
            if suppressed[i] {
                continue;
            }
            for j in (i + 1)..class_detections.len() {
                if !suppressed[j] && class_detections[i].iou(&class_detections[j]) > iou_threshold {
                    suppressed[j] = true;
                }
            }
        }

        all_results.extend(
            class_detections
                .into_iter()
                .zip(suppressed)
                .filter(|(_, suppressed)| !suppressed)
                .map(|(detection, _)| detection),
        );
    }
    all_results
}

/// Decode YOLOv8 output `[1, 4 + num_classes, num_boxes]` into detections in
/// source pixel coordinates.
pub fn postprocess_output(
    output: &Array<f32, IxDyn>,
    confidence_threshold: f32,
    iou_threshold: f32,
    letterbox: &Letterbox,
) -> Result<Vec<Detection>> {
    let shape = output.shape();
    if shape.len() != 3 {
        return Err(anyhow::anyhow!("Expected 3D output, got {}D", shape.len()));
    }
    if shape[1] <= 4 {
        return Err(anyhow::anyhow!(
            "Expected at least one class channel, got output shape {shape:?}"
        ));
    }
    let num_classes = shape[1] - 4;
    let num_boxes = shape[2];

    let mut detections = Vec::new();
    for i in 0..num_boxes {
        let mut max_confidence = 0.0;
        let mut best_class_id = 0;
        for class_idx in 0..num_classes {
            let class_confidence = output[[0, 4 + class_idx, i]];
            if class_confidence > max_confidence {
                max_confidence = class_confidence;
                best_class_id = class_idx as u32;
            }
        }
        if max_confidence <= confidence_threshold {
            continue;
        }

        let x_center = output[[0, 0, i]];
        let y_center = output[[0, 1, i]];
        let width = output[[0, 2, i]];
        let height = output[[0, 3, i]];

        let (x1, y1) = letterbox.to_source(x_center - width / 2.0, y_center - height / 2.0);
        let (x2, y2) = letterbox.to_source(x_center + width / 2.0, y_center + height / 2.0);

        detections.push(Detection {
            x1,
            y1,
            x2,
            y2,
            confidence: max_confidence,
            class_id: best_class_id,
            class_name: class_name(best_class_id),
        });
    }

    let mut kept = nms(detections, iou_threshold);
    kept.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    Ok(kept)
}

/// YOLOv8 detector backed by an ONNX Runtime session
pub struct YoloDetector {
    session: Session,
    model_info: ModelInfo,
    model_size: u32,
    input_name: String,
    output_name: String,
    confidence: f32,
    iou_threshold: f32,
}

impl YoloDetector {
    pub fn load(model_path: &Path, device: &str, confidence: f32, iou_threshold: f32) -> Result<Self> {
        let (session, model_info) = create_onnx_session(model_path, device)?;

        let input_md = session
            .inputs
            .first()
            .ok_or_else(|| anyhow::anyhow!("Model has no inputs"))?;
        let model_size = match &input_md.input_type {
            ort::value::ValueType::Tensor { shape, .. } => {
                let dims = shape.to_vec();
                match dims.get(3) {
                    Some(&size) if size > 0 => size as u32,
                    _ => DEFAULT_MODEL_SIZE,
                }
            }
            other => {
                debug!("Unexpected input type: {other:?}. Defaulting to {DEFAULT_MODEL_SIZE}");
                DEFAULT_MODEL_SIZE
            }
        };
        let input_name = input_md.name.clone();
        let output_name = session
            .outputs
            .first()
            .map(|output| output.name.clone())
            .ok_or_else(|| anyhow::anyhow!("Model has no outputs"))?;

        debug!("Input: {input_name}, model size: {model_size}, output: {output_name}");

        Ok(Self {
            session,
            model_info,
            model_size,
            input_name,
            output_name,
            confidence,
            iou_threshold,
        })
    }
}

impl Detector for YoloDetector {
    fn name(&self) -> &str {
        "yolo"
    }

    fn detect(&mut self, image: &DynamicImage) -> Result<Vec<Detection>> {
        let (input_tensor, letterbox) = preprocess_image(image, self.model_size)?;

        let inference_start = Instant::now();
        let input_value = Value::from_array(input_tensor)
            .map_err(|e| anyhow::anyhow!("Failed to create input value: {}", e))?;
        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => &input_value])
            .map_err(|e| anyhow::anyhow!("Failed to run inference: {}", e))?;

        let output_view = outputs[self.output_name.as_str()]
            .try_extract_array::<f32>()
            .map_err(|e| anyhow::anyhow!("Failed to extract output array: {}", e))?;
        let output_array =
            Array::from_shape_vec(output_view.shape(), output_view.iter().cloned().collect())?;

        debug!(
            "⚡ Inference completed in {:.1} ms",
            inference_start.elapsed().as_secs_f64() * 1000.0
        );

        postprocess_output(&output_array, self.confidence, self.iou_threshold, &letterbox)
    }

    fn model_info(&self) -> Option<&ModelInfo> {
        Some(&self.model_info)
    }
}
