//! YOLOv8 inference over an ONNX export with `tract`

use std::path::Path;
use tract_onnx::prelude::*;
use tracing::{debug, info};

use super::detection::{decode_predictions, non_max_suppression, DecodeParams, Detection, DetectorConfig, Letterbox};
use super::ObjectDetector;
use crate::error::{IngestError, Result};

/// Grey border value ultralytics pads with, normalized
const PAD_VALUE: f32 = 114.0 / 255.0;

/// A model loaded and optimized once, reused for every image of a run
pub struct OnnxDetector {
    model: TypedRunnableModel<TypedModel>,
    config: DetectorConfig,
}

impl OnnxDetector {
    pub fn load(config: DetectorConfig) -> Result<Self> {
        let size = config.input_size as usize;
        info!(model = %config.model_path.display(), input_size = size, "Loading YOLO model");

        let model = tract_onnx::onnx()
            .model_for_path(&config.model_path)
            .and_then(|model| model.with_input_fact(0, f32::fact([1, 3, size, size]).into()))
            .and_then(|model| model.into_optimized())
            .and_then(|model| model.into_runnable())
            .map_err(|e| {
                IngestError::Detection(format!("cannot load model {}: {e:#}", config.model_path.display()))
            })?;

        Ok(Self { model, config })
    }

    fn input_tensor(&self, image: &image::RgbImage, letterbox: &Letterbox) -> Tensor {
        let resized = image::imageops::resize(
            image,
            letterbox.resized_width,
            letterbox.resized_height,
            image::imageops::FilterType::Triangle,
        );
        let edge = self.config.input_size as usize;

        tract_ndarray::Array4::from_shape_fn((1, 3, edge, edge), |(_, channel, y, x)| {
            let inside = (x as u32).checked_sub(letterbox.pad_x).zip((y as u32).checked_sub(letterbox.pad_y));
            match inside {
                Some((rx, ry)) if rx < letterbox.resized_width && ry < letterbox.resized_height => {
                    f32::from(resized.get_pixel(rx, ry)[channel]) / 255.0
                },
                _ => PAD_VALUE,
            }
        })
        .into()
    }
}

impl ObjectDetector for OnnxDetector {
    fn detect(&self, path: &Path) -> Result<Vec<Detection>> {
        let image = image::open(path).map_err(IngestError::detection)?.to_rgb8();
        let (width, height) = image.dimensions();
        let letterbox = Letterbox::fit(width, height, self.config.input_size);

        let outputs = self
            .model
            .run(tvec!(self.input_tensor(&image, &letterbox).into()))
            .map_err(IngestError::detection)?;
        let output = outputs
            .first()
            .ok_or_else(|| IngestError::Detection("model produced no outputs".to_string()))?;

        let shape = output.shape();
        if shape.len() != 3 {
            return Err(IngestError::Detection(format!("unexpected output shape {shape:?}")));
        }
        let values = output.as_slice::<f32>().map_err(IngestError::detection)?;

        let params = DecodeParams::new(shape[2], self.config.confidence_threshold, &letterbox, width, height);

        let predictions = non_max_suppression(decode_predictions(values, &params), self.config.iou_threshold);
        debug!(image = %path.display(), detections = predictions.len(), "Inference complete");

        Ok(predictions.into_iter().map(|p| p.into_detection()).collect())
    }
}
