/// YOLO face localizer using ONNX Runtime via `ort`.
///
/// Runs a single-class pose-style face model (`[cx, cy, w, h, conf,
/// keypoints..]` per candidate). Keypoints are ignored; only boxes and
/// confidences become regions.
use std::path::Path;
use std::sync::Mutex;

use crate::detection::domain::detector::{BoxError, Detector, ModelInfo};
use crate::shared::frame::Frame;
use crate::shared::region::{Region, RegionSource};

use super::onnx_session::{load_session, model_name};
use super::yolo_common::{
    letterbox, model_input_size, nms, output_rows, RawDetection, DEFAULT_INPUT_SIZE,
    NMS_IOU_THRESH,
};

/// Default confidence threshold for face detection.
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

pub const FACE_LABEL: &str = "face";

pub struct OnnxYoloFaceDetector {
    session: Mutex<ort::session::Session>,
    info: ModelInfo,
    confidence: f64,
    input_size: u32,
}

impl OnnxYoloFaceDetector {
    pub fn new(model_path: &Path, confidence: f64) -> Result<Self, Box<dyn std::error::Error>> {
        let session = load_session(model_path)?;
        let input_size = model_input_size(&session).unwrap_or(DEFAULT_INPUT_SIZE);

        let info = ModelInfo {
            name: model_name(model_path, "yolo-face"),
            source: RegionSource::Face,
            input_size: Some(input_size),
            class_names: vec![FACE_LABEL.to_string()],
        };

        Ok(Self {
            session: Mutex::new(session),
            info,
            confidence,
            input_size,
        })
    }
}

impl Detector for OnnxYoloFaceDetector {
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
                return Err("YOLO face model produced no outputs".into());
            }
            let tensor = outputs[0].try_extract_array::<f32>()?;
            let data = tensor.as_slice().ok_or("Cannot get tensor slice")?;
            output_rows(tensor.shape(), data)?
        };

        let raw: Vec<RawDetection> = rows
            .iter()
            .filter(|row| row.len() >= 5 && row[4] as f64 >= self.confidence)
            .map(|row| RawDetection {
                bbox: lb.unmap_box(row[0] as f64, row[1] as f64, row[2] as f64, row[3] as f64),
                confidence: row[4] as f64,
                class_id: 0,
            })
            .collect();

        Ok(nms(raw, NMS_IOU_THRESH)
            .into_iter()
            .map(|d| Region::new(d.bbox, FACE_LABEL, d.confidence, RegionSource::Face))
            .collect())
    }
}
