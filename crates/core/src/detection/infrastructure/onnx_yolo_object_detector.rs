/// Generic YOLOv8-style object detector using ONNX Runtime via `ort`.
///
/// Expects the standard detection head: per candidate `[cx, cy, w, h,
/// class_0 .. class_n]` with no separate objectness score.
use std::path::Path;
use std::sync::Mutex;

use crate::detection::domain::detector::{BoxError, Detector, ModelInfo};
use crate::shared::frame::Frame;
use crate::shared::region::{Region, RegionSource};

use super::coco_labels::COCO_CLASSES;
use super::onnx_session::{load_session, model_name};
use super::yolo_common::{
    letterbox, model_input_size, nms, output_rows, RawDetection, DEFAULT_INPUT_SIZE,
    NMS_IOU_THRESH,
};

/// Default confidence threshold for object detection.
pub const DEFAULT_CONFIDENCE: f64 = 0.25;

pub struct OnnxYoloObjectDetector {
    session: Mutex<ort::session::Session>,
    info: ModelInfo,
    confidence: f64,
    input_size: u32,
}

impl OnnxYoloObjectDetector {
    /// Load a YOLO ONNX model and prepare for inference.
    ///
    /// The input resolution is read from the model's input shape (expecting NCHW).
    /// Falls back to 640 if the shape is dynamic or unreadable.
    pub fn new(model_path: &Path, confidence: f64) -> Result<Self, Box<dyn std::error::Error>> {
        let session = load_session(model_path)?;
        let input_size = model_input_size(&session).unwrap_or(DEFAULT_INPUT_SIZE);

        let info = ModelInfo {
            name: model_name(model_path, "yolo"),
            source: RegionSource::Object,
            input_size: Some(input_size),
            class_names: COCO_CLASSES.iter().map(|c| c.to_string()).collect(),
        };

        Ok(Self {
            session: Mutex::new(session),
            info,
            confidence,
            input_size,
        })
    }
}

impl Detector for OnnxYoloObjectDetector {
    fn info(&self) -> &ModelInfo {
        &self.info
    }

    fn detect(&self, frame: &Frame) -> Result<Vec<Region>, BoxError> {
        let (input_tensor, lb) = letterbox(frame, self.input_size);
        let input_value = ort::value::Tensor::from_array(input_tensor)?;

        let rows = {
            let mut session = self
                .session
                .lock()
                .map_err(|e| format!("Lock poisoned: {e}"))?;
            let outputs = session.run(ort::inputs![input_value])?;
            if outputs.len() == 0 {
                return Err("YOLO model produced no outputs".into());
            }
            let tensor = outputs[0].try_extract_array::<f32>()?;
            let data = tensor.as_slice().ok_or("Cannot get tensor slice")?;
            output_rows(tensor.shape(), data)?
        };

        let raw: Vec<RawDetection> = rows
            .iter()
            .filter_map(|row| parse_row(row, self.confidence))
            .map(|mut det| {
                let [cx, cy, w, h] = det.bbox;
                det.bbox = lb.unmap_box(cx, cy, w, h);
                det
            })
            .collect();

        Ok(nms(raw, NMS_IOU_THRESH)
            .into_iter()
            .map(|d| Region::new(d.bbox, class_label(d.class_id), d.confidence, RegionSource::Object))
            .collect())
    }
}

/// Picks the best-scoring class of one candidate row.
///
/// The returned box is still in model space as `[cx, cy, w, h]`.
fn parse_row(row: &[f32], confidence: f64) -> Option<RawDetection> {
    if row.len() < 5 {
        return None;
    }
    let (class_id, score) = row[4..]
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))?;
    let score = *score as f64;
    if score < confidence {
        return None;
    }
    Some(RawDetection {
        bbox: [row[0] as f64, row[1] as f64, row[2] as f64, row[3] as f64],
        confidence: score,
        class_id,
    })
}

fn class_label(class_id: usize) -> String {
    COCO_CLASSES
        .get(class_id)
        .map(|c| c.to_string())
        .unwrap_or_else(|| format!("class_{class_id}"))
}
