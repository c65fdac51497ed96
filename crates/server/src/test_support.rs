//! Model fakes shared by the server's unit tests.

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use visionlink_core::detection::domain::detector::{BoxError, Detector, ModelInfo};
use visionlink_core::identity::domain::face_embedder::FaceEmbedder;
use visionlink_core::identity::infrastructure::gallery_recognizer::GalleryRecognizer;
use visionlink_core::pipeline::frame_pipeline::{FramePipeline, PipelineConfig};
use visionlink_core::shared::frame::Frame;
use visionlink_core::shared::region::{Region, RegionSource};

/// Reports one face in the middle of every frame.
pub struct CenterFaceDetector {
    info: ModelInfo,
}

impl CenterFaceDetector {
    pub fn new() -> Self {
        Self {
            info: ModelInfo {
                name: "center-face".into(),
                source: RegionSource::Face,
                input_size: Some(64),
                class_names: vec!["face".into()],
            },
        }
    }
}

impl Detector for CenterFaceDetector {
    fn info(&self) -> &ModelInfo {
        &self.info
    }

    fn detect(&self, frame: &Frame) -> Result<Vec<Region>, BoxError> {
        let (w, h) = (frame.width() as f64, frame.height() as f64);
        Ok(vec![Region::new(
            [w * 0.25, h * 0.25, w * 0.75, h * 0.75],
            "face",
            0.9,
            RegionSource::Face,
        )])
    }
}

/// Embeds a crop as its mean colour.
pub struct MeanColorEmbedder;

impl FaceEmbedder for MeanColorEmbedder {
    fn name(&self) -> &str {
        "mean-color"
    }

    fn embed(&self, crop: &Frame) -> Result<Vec<f32>, BoxError> {
        let mut sums = [0f32; 3];
        for px in crop.data().chunks_exact(3) {
            for (sum, &v) in sums.iter_mut().zip(px) {
                *sum += v as f32;
            }
        }
        let norm = sums.iter().map(|v| v * v).sum::<f32>().sqrt().max(f32::EPSILON);
        Ok(sums.iter().map(|v| v / norm).collect())
    }
}

pub fn envelope_of(rgb: [u8; 3]) -> String {
    let img = image::RgbImage::from_pixel(64, 64, image::Rgb(rgb));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    format!("data:image/png;base64,{}", STANDARD.encode(out.into_inner()))
}

pub fn envelope() -> String {
    envelope_of([90, 90, 90])
}

pub fn face_pipeline() -> FramePipeline {
    FramePipeline::new(
        PipelineConfig::default(),
        vec![Arc::new(CenterFaceDetector::new())],
        None,
    )
}

pub fn gallery(dir: &Path) -> Arc<GalleryRecognizer> {
    Arc::new(GalleryRecognizer::new(dir, Arc::new(MeanColorEmbedder), 0.95).unwrap())
}
