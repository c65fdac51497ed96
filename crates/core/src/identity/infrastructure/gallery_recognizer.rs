/// Directory-backed identity gallery with a shared embedding index.
///
/// Each reference image `<name>.<ext>` in the gallery directory enrolls
/// `<name>`. Embeddings are computed once into an index that is shared by
/// all sessions. Enrollment embeds the new reference itself and publishes
/// an updated index, so recognition never pays for an index build after
/// an enrollment.
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use thiserror::Error;

use crate::decoding::frame_decoder::decode_image;
use crate::detection::domain::detector::{BoxError, Detector};
use crate::identity::domain::face_embedder::FaceEmbedder;
use crate::identity::domain::face_recognizer::{FaceRecognizer, IdentityMatch, RecognitionError};
use crate::shared::constants::IMAGE_EXTENSIONS;
use crate::shared::frame::Frame;

use super::onnx_arcface_embedder::cosine_similarity;

/// Minimum cosine similarity for a confident match.
pub const DEFAULT_THRESHOLD: f64 = 0.4;

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("identity name is empty after sanitizing")]
    InvalidName,
    #[error("reference image must be RGB with non-zero size")]
    InvalidImage,
    #[error("failed to encode reference image: {0}")]
    Encode(#[from] image::ImageError),
    #[error("gallery I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Clone)]
struct GalleryEntry {
    name: String,
    path: PathBuf,
    embedding: Vec<f32>,
}

/// Embeddings of every usable reference image.
struct GalleryIndex {
    entries: Vec<GalleryEntry>,
}

impl GalleryIndex {
    fn best_match(&self, embedding: &[f32]) -> Option<IdentityMatch> {
        self.entries
            .iter()
            .map(|e| (e, cosine_similarity(&e.embedding, embedding)))
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(e, similarity)| IdentityMatch {
                name: e.name.clone(),
                similarity,
            })
    }

    /// Copy of this index with `entry` replacing any entry for its path.
    fn with_entry(&self, entry: GalleryEntry) -> Self {
        let mut entries: Vec<GalleryEntry> = self
            .entries
            .iter()
            .filter(|e| e.path != entry.path)
            .cloned()
            .collect();
        entries.push(entry);
        entries.sort_by(|a, b| (&a.name, &a.path).cmp(&(&b.name, &b.path)));
        Self { entries }
    }

    fn without_path(&self, path: &Path) -> Self {
        Self {
            entries: self.entries.iter().filter(|e| e.path != path).cloned().collect(),
        }
    }

    fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }
}

#[derive(Default)]
struct IndexSlot {
    generation: u64,
    index: Option<Arc<GalleryIndex>>,
}

pub struct GalleryRecognizer {
    dir: PathBuf,
    embedder: Arc<dyn FaceEmbedder>,
    face_locator: Option<Arc<dyn Detector>>,
    threshold: f64,
    slot: RwLock<IndexSlot>,
    /// Serializes index builds and enrollments.
    build: Mutex<()>,
}

impl GalleryRecognizer {
    /// Opens (creating if needed) the gallery directory.
    pub fn new(
        dir: &Path,
        embedder: Arc<dyn FaceEmbedder>,
        threshold: f64,
    ) -> Result<Self, GalleryError> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            embedder,
            face_locator: None,
            threshold,
            slot: RwLock::new(IndexSlot::default()),
            build: Mutex::new(()),
        })
    }

    /// Crops reference images to their most confident face before embedding.
    pub fn with_face_locator(mut self, locator: Arc<dyn Detector>) -> Self {
        self.face_locator = Some(locator);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Sorted, de-duplicated names of enrolled identities.
    pub fn names(&self) -> Result<Vec<String>, GalleryError> {
        let mut names: Vec<String> = self
            .reference_images()?
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        names.dedup();
        Ok(names)
    }

    /// Builds the index now if there is none; returns the indexed count.
    pub fn load_index(&self) -> Result<usize, RecognitionError> {
        Ok(self.index()?.entries.len())
    }

    /// Stores `image` as the reference for `name` and publishes an index
    /// that includes it.
    ///
    /// Returns the sanitized name. The file appears through a rename and
    /// the index is swapped in one step, so a concurrent recognition sees
    /// either the old or the new gallery.
    pub fn enroll(&self, name: &str, image: &Frame) -> Result<String, GalleryError> {
        let name = sanitize_name(name).ok_or(GalleryError::InvalidName)?;
        if image.channels() != 3 || image.width() == 0 || image.height() == 0 {
            return Err(GalleryError::InvalidImage);
        }
        let rgb = image::RgbImage::from_raw(image.width(), image.height(), image.data().to_vec())
            .ok_or(GalleryError::InvalidImage)?;

        let _build = self.build.lock().unwrap_or_else(|e| e.into_inner());
        fs::create_dir_all(&self.dir)?;
        let final_path = self.dir.join(format!("{name}.png"));
        let temp_path = self.dir.join(format!(".{name}.png.part"));
        let written = rgb
            .save_with_format(&temp_path, image::ImageFormat::Png)
            .map_err(GalleryError::from)
            .and_then(|()| fs::rename(&temp_path, &final_path).map_err(GalleryError::from));
        if let Err(e) = written {
            let _ = fs::remove_file(&temp_path);
            return Err(e);
        }

        let generation = self.generation();
        let updated = match self.current() {
            Some(index) => match self.embed_frame(image) {
                Ok(embedding) => Some(index.with_entry(GalleryEntry {
                    name: name.clone(),
                    path: final_path.clone(),
                    embedding,
                })),
                Err(e) => {
                    log::warn!("Reference for {name} could not be embedded: {e}");
                    Some(index.without_path(&final_path))
                }
            },
            // No index yet: build one from the directory, which now holds the new file.
            None => match self.build_index() {
                Ok(index) => Some(index),
                Err(e) => {
                    log::warn!("Gallery index rebuild failed: {e}");
                    None
                }
            },
        };
        self.publish(generation, updated.map(Arc::new));
        log::info!("Enrolled identity {name} at {}", final_path.display());
        Ok(name)
    }

    /// Drops the current index; the next recognition rebuilds it.
    pub fn invalidate(&self) {
        let mut slot = self.slot.write().unwrap_or_else(|e| e.into_inner());
        slot.generation += 1;
        slot.index = None;
    }

    fn current(&self) -> Option<Arc<GalleryIndex>> {
        let slot = self.slot.read().unwrap_or_else(|e| e.into_inner());
        slot.index.clone()
    }

    fn generation(&self) -> u64 {
        self.slot.read().unwrap_or_else(|e| e.into_inner()).generation
    }

    /// Stores `index` unless an invalidation happened since `generation`
    /// was read; a stale build never undoes an invalidation.
    fn publish(&self, generation: u64, index: Option<Arc<GalleryIndex>>) {
        let mut slot = self.slot.write().unwrap_or_else(|e| e.into_inner());
        if slot.generation == generation {
            slot.generation += 1;
            slot.index = index;
        }
    }

    /// `(name, path)` pairs for every image file, sorted by name then path.
    fn reference_images(&self) -> Result<Vec<(String, PathBuf)>, GalleryError> {
        let mut images = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if !path.is_file() || !has_image_extension(&path) {
                continue;
            }
            let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
                continue;
            };
            if stem.starts_with('.') || stem.is_empty() {
                continue;
            }
            images.push((stem, path));
        }
        images.sort();
        Ok(images)
    }

    /// Returns the current index, building it if there is none.
    ///
    /// Only one build runs at a time; callers that arrive during a build
    /// wait for it and share its result.
    fn index(&self) -> Result<Arc<GalleryIndex>, RecognitionError> {
        if let Some(index) = self.current() {
            return Ok(index);
        }
        let _build = self.build.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(index) = self.current() {
            return Ok(index);
        }
        let generation = self.generation();
        let built = Arc::new(self.build_index()?);
        self.publish(generation, Some(Arc::clone(&built)));
        Ok(built)
    }

    fn build_index(&self) -> Result<GalleryIndex, RecognitionError> {
        let images = self
            .reference_images()
            .map_err(|e| RecognitionError::Gallery(e.to_string()))?;
        let mut entries = Vec::with_capacity(images.len());
        for (name, path) in images {
            match self.embed_reference(&path) {
                Ok(embedding) => entries.push(GalleryEntry {
                    name,
                    path,
                    embedding,
                }),
                Err(e) => log::warn!("Skipping reference {}: {e}", path.display()),
            }
        }
        log::info!(
            "Built gallery index with {} reference(s) from {}",
            entries.len(),
            self.dir.display()
        );
        Ok(GalleryIndex { entries })
    }

    fn embed_reference(&self, path: &Path) -> Result<Vec<f32>, BoxError> {
        let bytes = fs::read(path)?;
        let frame = decode_image(&bytes)?;
        self.embed_frame(&frame)
    }

    fn embed_frame(&self, frame: &Frame) -> Result<Vec<f32>, BoxError> {
        match self.locate_face(frame) {
            Some(face) => self.embedder.embed(&face),
            None => self.embedder.embed(frame),
        }
    }

    fn locate_face(&self, frame: &Frame) -> Option<Frame> {
        let locator = self.face_locator.as_ref()?;
        let regions = locator.detect(frame).ok()?;
        let best = regions
            .iter()
            .max_by(|a, b| a.confidence().total_cmp(&b.confidence()))?;
        let rect = best.crop_rect(frame.width(), frame.height())?;
        Some(frame.crop(rect))
    }
}

impl FaceRecognizer for GalleryRecognizer {
    fn name(&self) -> &str {
        self.embedder.name()
    }

    fn recognize(&self, crop: &Frame) -> Result<Option<IdentityMatch>, RecognitionError> {
        let index = self.index()?;
        if index.entries.is_empty() {
            return Err(RecognitionError::EmptyGallery);
        }
        let embedding = self
            .embedder
            .embed(crop)
            .map_err(|e| RecognitionError::Embedding(e.to_string()))?;
        Ok(index
            .best_match(&embedding)
            .filter(|m| m.similarity >= self.threshold))
    }
}

/// Keeps ASCII alphanumerics, `-` and `_`; whitespace becomes `_`.
pub fn sanitize_name(raw: &str) -> Option<String> {
    let name: String = raw
        .trim()
        .chars()
        .filter_map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                Some(c)
            } else if c.is_whitespace() {
                Some('_')
            } else {
                None
            }
        })
        .collect();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}
