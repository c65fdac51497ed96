use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use visionlink_core::detection::domain::detector::Detector;
use visionlink_core::detection::infrastructure::onnx_yolo_face_detector::OnnxYoloFaceDetector;
use visionlink_core::detection::infrastructure::onnx_yolo_object_detector::OnnxYoloObjectDetector;
use visionlink_core::detection::infrastructure::timeout_detector::TimeoutDetector;
use visionlink_core::identity::domain::face_recognizer::FaceRecognizer;
use visionlink_core::identity::infrastructure::gallery_recognizer::GalleryRecognizer;
use visionlink_core::identity::infrastructure::onnx_arcface_embedder::OnnxArcFaceEmbedder;
use visionlink_core::identity::infrastructure::timeout_recognizer::TimeoutRecognizer;
use visionlink_core::shared::constants::{
    EMBEDDING_MODEL_NAME, EMBEDDING_MODEL_URL, FACE_MODEL_NAME, FACE_MODEL_URL, OBJECT_MODEL_NAME,
};
use visionlink_core::shared::model_resolver;

use crate::config::ServerConfig;

type LoadError = Box<dyn std::error::Error>;

/// Every model the server loaded, ready to hand to the pipeline.
pub struct LoadedModels {
    pub detectors: Vec<Arc<dyn Detector>>,
    pub recognizer: Option<Arc<dyn FaceRecognizer>>,
    pub gallery: Option<Arc<GalleryRecognizer>>,
}

/// Loads the models enabled in `config`.
///
/// A model that cannot be found or loaded is skipped with a warning; the
/// server still starts as long as one detector is available.
pub fn load(config: &ServerConfig) -> Result<LoadedModels, LoadError> {
    let bundled = config.models_dir.as_deref();
    let mut detectors: Vec<Arc<dyn Detector>> = Vec::new();
    let mut face_locator: Option<Arc<dyn Detector>> = None;

    if config.object_detection {
        let loaded = model_path(config.object_model.as_deref(), OBJECT_MODEL_NAME, None, bundled)
            .and_then(|path| OnnxYoloObjectDetector::new(&path, config.object_confidence));
        match loaded {
            Ok(detector) => {
                log::info!("Loaded object model {}", detector.name());
                detectors.push(with_deadline(Arc::new(detector), config.detector_timeout_ms)?);
            }
            Err(e) => log::warn!("Object detection disabled: {e}"),
        }
    }

    if config.face_detection {
        let loaded = model_path(
            config.face_model.as_deref(),
            FACE_MODEL_NAME,
            Some(FACE_MODEL_URL),
            bundled,
        )
        .and_then(|path| OnnxYoloFaceDetector::new(&path, config.face_confidence));
        match loaded {
            Ok(detector) => {
                log::info!("Loaded face model {}", detector.name());
                let detector: Arc<dyn Detector> = Arc::new(detector);
                face_locator = Some(Arc::clone(&detector));
                detectors.push(with_deadline(detector, config.detector_timeout_ms)?);
            }
            Err(e) => log::warn!("Face detection disabled: {e}"),
        }
    }

    if detectors.is_empty() {
        return Err("no detector model could be loaded".into());
    }

    let mut gallery = None;
    let mut recognizer = None;
    if config.recognition {
        if face_locator.is_none() {
            log::warn!("Recognition disabled: it needs the face detector");
        } else {
            match load_gallery(config, bundled, face_locator) {
                Ok(loaded) => {
                    let loaded = Arc::new(loaded);
                    // Embeds the references now, outside any recognition deadline.
                    match loaded.load_index() {
                        Ok(count) => log::info!(
                            "Identity gallery at {} ({count} indexed)",
                            loaded.dir().display()
                        ),
                        Err(e) => log::warn!("Identity gallery not indexed yet: {e}"),
                    }
                    let base: Arc<dyn FaceRecognizer> = loaded.clone();
                    recognizer = Some(match config.recognition_timeout_ms {
                        Some(ms) => Arc::new(TimeoutRecognizer::new(base, Duration::from_millis(ms))?)
                            as Arc<dyn FaceRecognizer>,
                        None => base,
                    });
                    gallery = Some(loaded);
                }
                Err(e) => log::warn!("Recognition disabled: {e}"),
            }
        }
    }

    Ok(LoadedModels {
        detectors,
        recognizer,
        gallery,
    })
}

fn load_gallery(
    config: &ServerConfig,
    bundled: Option<&Path>,
    face_locator: Option<Arc<dyn Detector>>,
) -> Result<GalleryRecognizer, LoadError> {
    let path = model_path(
        config.embedding_model.as_deref(),
        EMBEDDING_MODEL_NAME,
        Some(EMBEDDING_MODEL_URL),
        bundled,
    )?;
    let embedder = Arc::new(OnnxArcFaceEmbedder::new(&path)?);
    let mut gallery =
        GalleryRecognizer::new(&config.gallery_dir, embedder, config.match_threshold)?;
    if let Some(locator) = face_locator {
        gallery = gallery.with_face_locator(locator);
    }
    Ok(gallery)
}

/// Uses `explicit` when configured, otherwise resolves `name` through the
/// model cache, the bundled directory and finally `url`.
fn model_path(
    explicit: Option<&Path>,
    name: &str,
    url: Option<&str>,
    bundled: Option<&Path>,
) -> Result<PathBuf, LoadError> {
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(format!("model file not found: {}", path.display()).into());
        }
        return Ok(path.to_path_buf());
    }
    log::info!("Resolving model: {name}");
    let progress_name = name.to_string();
    let path = model_resolver::resolve(
        name,
        url,
        bundled,
        Some(Box::new(move |downloaded, total| {
            download_progress(&progress_name, downloaded, total)
        })),
    )?;
    Ok(path)
}

fn with_deadline(
    detector: Arc<dyn Detector>,
    timeout_ms: Option<u64>,
) -> Result<Arc<dyn Detector>, LoadError> {
    Ok(match timeout_ms {
        Some(ms) => Arc::new(TimeoutDetector::new(detector, Duration::from_millis(ms))?),
        None => detector,
    })
}

fn download_progress(name: &str, downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        log::info!("Downloading {name}... {pct}%");
    } else {
        log::info!("Downloading {name}... {downloaded} bytes");
    }
}
