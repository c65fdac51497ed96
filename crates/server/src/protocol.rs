//! JSON shapes exchanged with clients.

use serde::{Deserialize, Serialize};

use visionlink_core::pipeline::detection_batch::{Detection, DetectionBatch};
use visionlink_core::pipeline::frame_pipeline::FramePipeline;
use visionlink_core::shared::region::BBox;

/// Inbound frame event. A missing `image` drops the frame.
#[derive(Debug, Deserialize)]
pub struct FrameIn {
    pub image: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct DetectionOut {
    pub bbox: BBox,
    pub confidence: f64,
    pub label: String,
    pub id: u32,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub name: Option<String>,
}

impl From<&Detection> for DetectionOut {
    fn from(d: &Detection) -> Self {
        Self {
            bbox: d.region.bbox(),
            confidence: d.region.confidence(),
            label: d.region.label().to_string(),
            id: d.id,
            kind: d.region.source().as_str().to_string(),
            name: d.name.clone(),
        }
    }
}

/// Outbound detection event; an empty list is a normal answer.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct BatchOut {
    pub detections: Vec<DetectionOut>,
}

impl From<&DetectionBatch> for BatchOut {
    fn from(batch: &DetectionBatch) -> Self {
        Self {
            detections: batch.detections.iter().map(DetectionOut::from).collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthOut {
    pub status: String,
    pub mode: String,
    pub models: Vec<String>,
    pub sessions: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DetectorInfoOut {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub input_size: Option<u32>,
    pub num_classes: usize,
    pub class_names: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecognitionInfoOut {
    pub model: String,
    pub interval: u64,
    pub threshold: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModelInfoOut {
    pub detectors: Vec<DetectorInfoOut>,
    pub recognition: Option<RecognitionInfoOut>,
}

impl ModelInfoOut {
    pub fn describe(pipeline: &FramePipeline, threshold: Option<f64>) -> Self {
        let detectors = pipeline
            .detectors()
            .iter()
            .map(|d| {
                let info = d.info();
                DetectorInfoOut {
                    name: info.name.clone(),
                    kind: info.source.as_str().to_string(),
                    input_size: info.input_size,
                    num_classes: info.class_names.len(),
                    class_names: info.class_names.clone(),
                }
            })
            .collect();
        let recognition = pipeline.recognizer_name().map(|model| RecognitionInfoOut {
            model: model.to_string(),
            interval: pipeline.config().recognition_interval,
            threshold,
        });
        Self {
            detectors,
            recognition,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct EnrollIn {
    pub name: String,
    pub image: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EnrollOut {
    pub status: String,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IdentitiesOut {
    pub identities: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorOut {
    pub error: String,
}

impl ErrorOut {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
