//! YOLOv8 output decoding
//!
//! A YOLOv8 detection export produces one tensor of shape
//! `[1, 4 + classes, anchors]`. The first four rows hold the box centre and
//! size in model-input pixels, the rest hold per-class scores (already
//! sigmoid-activated, there is no separate objectness row).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tgelt_common::{env, PipelineError};

use crate::error::Result;

pub const DEFAULT_MODEL_PATH: &str = "yolov8n.onnx";
pub const DEFAULT_CONFIDENCE: f32 = 0.25;
pub const DEFAULT_IOU: f32 = 0.7;
pub const DEFAULT_INPUT_SIZE: u32 = 640;

/// The 80 COCO classes, in YOLOv8 class-id order
pub const COCO_CLASSES: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
    "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch", "potted plant",
    "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote", "keyboard", "cell phone",
    "microwave", "oven", "toaster", "sink", "refrigerator", "book", "clock", "vase", "scissors",
    "teddy bear", "hair drier", "toothbrush",
];

/// Name for a class id; ids outside the COCO table get a generic label.
pub fn class_name(class_id: usize) -> String {
    COCO_CLASSES
        .get(class_id)
        .map(|name| name.to_string())
        .unwrap_or_else(|| format!("class_{class_id}"))
}

/// Detector settings
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
    pub model_path: PathBuf,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    /// Square model input edge in pixels
    pub input_size: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            confidence_threshold: DEFAULT_CONFIDENCE,
            iou_threshold: DEFAULT_IOU,
            input_size: DEFAULT_INPUT_SIZE,
        }
    }
}

impl DetectorConfig {
    /// Load from `YOLO_MODEL_PATH`, `YOLO_CONFIDENCE`, `YOLO_IOU` and
    /// `YOLO_INPUT_SIZE`.
    pub fn from_env() -> Result<Self> {
        let config = Self {
            model_path: PathBuf::from(env::string_or("YOLO_MODEL_PATH", DEFAULT_MODEL_PATH)),
            confidence_threshold: env::parse_or("YOLO_CONFIDENCE", DEFAULT_CONFIDENCE)?,
            iou_threshold: env::parse_or("YOLO_IOU", DEFAULT_IOU)?,
            input_size: env::parse_or("YOLO_INPUT_SIZE", DEFAULT_INPUT_SIZE)?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(PipelineError::Config("YOLO_CONFIDENCE must be between 0 and 1".to_string()).into());
        }
        if !(0.0..=1.0).contains(&self.iou_threshold) {
            return Err(PipelineError::Config("YOLO_IOU must be between 0 and 1".to_string()).into());
        }
        if self.input_size == 0 || self.input_size % 32 != 0 {
            return Err(PipelineError::Config(format!(
                "YOLO_INPUT_SIZE must be a positive multiple of 32, got {}",
                self.input_size
            ))
            .into());
        }
        Ok(())
    }
}

/// Corner coordinates in source-image pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    /// Intersection over union; 0 when either box is empty.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let overlap = BoundingBox {
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
            x2: self.x2.min(other.x2),
            y2: self.y2.min(other.y2),
        };
        let intersection = overlap.area();
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }
}

/// One object found in an image
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    pub class_name: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// A decoded box before class names are attached
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub class_id: usize,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl Prediction {
    pub fn into_detection(self) -> Detection {
        Detection {
            class_name: class_name(self.class_id),
            confidence: self.confidence,
            bbox: self.bbox,
        }
    }
}

/// Aspect-preserving fit of a source image into the square model input.
///
/// The image is scaled by a single gain and centred, with the leftover
/// border filled with padding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    /// Model pixels per source pixel
    pub gain: f32,
    pub resized_width: u32,
    pub resized_height: u32,
    /// Left padding in model pixels
    pub pad_x: u32,
    /// Top padding in model pixels
    pub pad_y: u32,
}

impl Letterbox {
    pub fn fit(width: u32, height: u32, input_size: u32) -> Self {
        let input = input_size as f32;
        let gain = (input / width.max(1) as f32).min(input / height.max(1) as f32);
        let resized_width = ((width as f32 * gain).round() as u32).clamp(1, input_size);
        let resized_height = ((height as f32 * gain).round() as u32).clamp(1, input_size);

        // Same rounding as ultralytics, which biases odd padding to the bottom/right
        let pad = |resized: u32| ((input_size - resized) as f32 / 2.0 - 0.1).round().max(0.0) as u32;

        Self {
            gain,
            resized_width,
            resized_height,
            pad_x: pad(resized_width),
            pad_y: pad(resized_height),
        }
    }
}

/// How raw model coordinates map back onto the source image
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodeParams {
    pub anchors: usize,
    pub confidence_threshold: f32,
    /// Model pixels per source pixel
    pub gain: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub image_width: f32,
    pub image_height: f32,
}

impl DecodeParams {
    pub fn new(anchors: usize, confidence_threshold: f32, letterbox: &Letterbox, width: u32, height: u32) -> Self {
        Self {
            anchors,
            confidence_threshold,
            gain: letterbox.gain,
            pad_x: letterbox.pad_x as f32,
            pad_y: letterbox.pad_y as f32,
            image_width: width as f32,
            image_height: height as f32,
        }
    }

    fn source_x(&self, x: f32) -> f32 {
        ((x - self.pad_x) / self.gain).clamp(0.0, self.image_width)
    }

    fn source_y(&self, y: f32) -> f32 {
        ((y - self.pad_y) / self.gain).clamp(0.0, self.image_height)
    }
}

/// Decode a row-major `[4 + classes, anchors]` output into predictions.
///
/// Each anchor keeps only its best-scoring class, and only when that score
/// reaches the confidence threshold. Boxes lose the letterbox padding, are
/// rescaled to the source image and clamped to its bounds.
pub fn decode_predictions(output: &[f32], params: &DecodeParams) -> Vec<Prediction> {
    let anchors = params.anchors;
    if anchors == 0 || output.len() % anchors != 0 || output.len() / anchors <= 4 || params.gain <= 0.0 {
        return Vec::new();
    }
    let classes = output.len() / anchors - 4;
    let at = |row: usize, anchor: usize| output[row * anchors + anchor];

    (0..anchors)
        .filter_map(|anchor| {
            let (class_id, confidence) = (0..classes)
                .map(|class| (class, at(4 + class, anchor)))
                .max_by(|a, b| a.1.total_cmp(&b.1))?;
            if confidence < params.confidence_threshold {
                return None;
            }

            let (cx, cy, w, h) = (at(0, anchor), at(1, anchor), at(2, anchor), at(3, anchor));
            let bbox = BoundingBox {
                x1: params.source_x(cx - w / 2.0),
                y1: params.source_y(cy - h / 2.0),
                x2: params.source_x(cx + w / 2.0),
                y2: params.source_y(cy + h / 2.0),
            };
            Some(Prediction {
                class_id,
                confidence,
                bbox,
            })
        })
        .collect()
}

/// Class-wise non-maximum suppression.
///
/// Predictions are visited in descending confidence; a box is dropped when it
/// overlaps an already kept box of the same class by more than
/// `iou_threshold`. The result is sorted by descending confidence.
pub fn non_max_suppression(mut predictions: Vec<Prediction>, iou_threshold: f32) -> Vec<Prediction> {
    predictions.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<Prediction> = Vec::with_capacity(predictions.len());
    for candidate in predictions {
        let suppressed = kept
            .iter()
            .any(|k| k.class_id == candidate.class_id && k.bbox.iou(&candidate.bbox) > iou_threshold);
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}
