use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use visionlink_core::detection::infrastructure::{onnx_yolo_face_detector, onnx_yolo_object_detector};
use visionlink_core::identity::infrastructure::gallery_recognizer::DEFAULT_THRESHOLD;
use visionlink_core::pipeline::frame_pipeline::PipelineConfig;
use visionlink_core::shared::constants::{MAX_PAYLOAD_BYTES, RECOGNITION_INTERVAL, TRACKER_MAX_LOST};

pub const DEFAULT_PORT: u16 = 5001;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{0}")]
    Invalid(String),
}

/// Server settings, read from an optional JSON file.
///
/// Every field has a default, so a config file only lists what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,

    pub object_detection: bool,
    pub face_detection: bool,
    pub recognition: bool,

    /// Explicit model paths skip name-based resolution.
    pub object_model: Option<PathBuf>,
    pub face_model: Option<PathBuf>,
    pub embedding_model: Option<PathBuf>,
    /// Directory searched for bundled model files.
    pub models_dir: Option<PathBuf>,
    pub gallery_dir: PathBuf,

    pub object_confidence: f64,
    pub face_confidence: f64,
    pub match_threshold: f64,

    pub recognition_interval: u64,
    pub suppressed_labels: Vec<String>,
    pub tracking: bool,
    pub tracker_max_lost: usize,
    pub max_payload_bytes: usize,
    pub concurrent_fan_out: bool,

    /// Per-call deadlines; absent means unbounded.
    pub detector_timeout_ms: Option<u64>,
    pub recognition_timeout_ms: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let pipeline = PipelineConfig::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            object_detection: true,
            face_detection: true,
            recognition: true,
            object_model: None,
            face_model: None,
            embedding_model: None,
            models_dir: None,
            gallery_dir: default_gallery_dir(),
            object_confidence: onnx_yolo_object_detector::DEFAULT_CONFIDENCE,
            face_confidence: onnx_yolo_face_detector::DEFAULT_CONFIDENCE,
            match_threshold: DEFAULT_THRESHOLD,
            recognition_interval: RECOGNITION_INTERVAL,
            suppressed_labels: pipeline.suppressed_labels,
            tracking: true,
            tracker_max_lost: TRACKER_MAX_LOST,
            max_payload_bytes: MAX_PAYLOAD_BYTES,
            concurrent_fan_out: true,
            detector_timeout_ms: Some(2000),
            recognition_timeout_ms: Some(2000),
        }
    }
}

/// `<data dir>/VisionLink/gallery`, or `./gallery` when there is no data dir.
fn default_gallery_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("VisionLink").join("gallery"))
        .unwrap_or_else(|| PathBuf::from("gallery"))
}

impl ServerConfig {
    /// Loads `path` if given, otherwise returns the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&json).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.recognition_interval == 0 {
            return Err(ConfigError::Invalid(
                "recognition_interval must be at least 1".into(),
            ));
        }
        for (name, value) in [
            ("object_confidence", self.object_confidence),
            ("face_confidence", self.face_confidence),
            ("match_threshold", self.match_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be between 0.0 and 1.0, got {value}"
                )));
            }
        }
        for (name, value) in [
            ("detector_timeout_ms", self.detector_timeout_ms),
            ("recognition_timeout_ms", self.recognition_timeout_ms),
        ] {
            if value == Some(0) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be positive; omit it to disable the deadline"
                )));
            }
        }
        if self.max_payload_bytes == 0 {
            return Err(ConfigError::Invalid("max_payload_bytes must be positive".into()));
        }
        if !self.object_detection && !self.face_detection {
            return Err(ConfigError::Invalid(
                "at least one of object_detection and face_detection must be enabled".into(),
            ));
        }
        Ok(())
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            recognition_interval: self.recognition_interval,
            suppressed_labels: self.suppressed_labels.clone(),
            tracking: self.tracking,
            tracker_max_lost: self.tracker_max_lost,
            max_payload_bytes: self.max_payload_bytes,
            concurrent_fan_out: self.concurrent_fan_out,
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
