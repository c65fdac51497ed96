//! Pre- and post-processing shared by the YOLO-family ONNX detectors.

use crate::shared::frame::Frame;
use crate::shared::region::{bbox_iou, BBox};

use crate::detection::domain::detector::BoxError;

/// Fallback YOLO model input resolution when the model doesn't specify dimensions.
pub const DEFAULT_INPUT_SIZE: u32 = 640;

/// NMS IoU threshold.
pub const NMS_IOU_THRESH: f64 = 0.45;

/// Letterbox geometry needed to map model coordinates back to the frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Letterbox {
    pub scale: f64,
    pub pad_x: u32,
    pub pad_y: u32,
}

impl Letterbox {
    /// Converts a model-space `(cx, cy, w, h)` box into frame-space corners.
    pub fn unmap_box(&self, cx: f64, cy: f64, w: f64, h: f64) -> BBox {
        let px = self.pad_x as f64;
        let py = self.pad_y as f64;
        [
            ((cx - w / 2.0) - px) / self.scale,
            ((cy - h / 2.0) - py) / self.scale,
            ((cx + w / 2.0) - px) / self.scale,
            ((cy + h / 2.0) - py) / self.scale,
        ]
    }
}

/// Letterbox-resize a frame to `target_size` x `target_size`.
///
/// Returns the NCHW float32 tensor and the geometry used.
pub fn letterbox(frame: &Frame, target_size: u32) -> (ndarray::Array4<f32>, Letterbox) {
    let fw = frame.width() as f64;
    let fh = frame.height() as f64;
    let target = target_size as f64;

    let scale = (target / fw).min(target / fh);
    let new_w = ((fw * scale).round() as u32).min(target_size);
    let new_h = ((fh * scale).round() as u32).min(target_size);
    let pad_x = (target_size - new_w) / 2;
    let pad_y = (target_size - new_h) / 2;

    // Padded area is 114/255 gray, the YOLO convention
    let gray = 114.0f32 / 255.0;
    let mut tensor =
        ndarray::Array4::<f32>::from_elem((1, 3, target_size as usize, target_size as usize), gray);

    let src = frame.as_ndarray();
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;

    // Nearest-neighbor resize into the padded region
    for y in 0..new_h as usize {
        let src_y = ((y as f64 / scale) as usize).min(src_h - 1);
        for x in 0..new_w as usize {
            let src_x = ((x as f64 / scale) as usize).min(src_w - 1);
            let ty = pad_y as usize + y;
            let tx = pad_x as usize + x;
            for c in 0..3 {
                tensor[[0, c, ty, tx]] = src[[src_y, src_x, c]] as f32 / 255.0;
            }
        }
    }

    (tensor, Letterbox { scale, pad_x, pad_y })
}

/// Reads the square input size from an NCHW model input, if static.
pub fn model_input_size(session: &ort::session::Session) -> Option<u32> {
    session.inputs().first().and_then(|input| {
        if let ort::value::ValueType::Tensor { ref shape, .. } = input.dtype() {
            if shape.len() >= 4 && shape[2] > 0 {
                Some(shape[2] as u32)
            } else {
                None
            }
        } else {
            None
        }
    })
}

/// Splits a YOLO output tensor into one feature row per candidate.
///
/// YOLO exports emit either `[1, features, candidates]` (transposed) or
/// `[1, candidates, features]`; the smaller axis is taken as features.
pub fn output_rows(shape: &[usize], data: &[f32]) -> Result<Vec<Vec<f32>>, BoxError> {
    if shape.len() != 3 {
        return Err(format!("Unexpected YOLO output shape: {shape:?}").into());
    }
    let transposed = shape[1] < shape[2];
    let (num_dets, num_feats) = if transposed {
        (shape[2], shape[1])
    } else {
        (shape[1], shape[2])
    };
    if data.len() < num_dets * num_feats {
        return Err(format!(
            "YOLO output has {} values, expected {}",
            data.len(),
            num_dets * num_feats
        )
        .into());
    }

    let rows = (0..num_dets)
        .map(|i| {
            if transposed {
                (0..num_feats).map(|f| data[f * num_dets + i]).collect()
            } else {
                data[i * num_feats..(i + 1) * num_feats].to_vec()
            }
        })
        .collect();
    Ok(rows)
}

#[derive(Clone, Debug, PartialEq)]
pub struct RawDetection {
    pub bbox: BBox,
    pub confidence: f64,
    pub class_id: usize,
}

/// Greedy per-class NMS: sort by confidence descending, suppress
/// same-class boxes overlapping a kept one.
pub fn nms(mut dets: Vec<RawDetection>, iou_thresh: f64) -> Vec<RawDetection> {
    dets.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<RawDetection> = Vec::new();
    for det in dets {
        let suppressed = keep
            .iter()
            .any(|k| k.class_id == det.class_id && bbox_iou(&k.bbox, &det.bbox) > iou_thresh);
        if !suppressed {
            keep.push(det);
        }
    }
    keep
}
