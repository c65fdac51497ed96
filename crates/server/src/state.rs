use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use visionlink_core::identity::infrastructure::gallery_recognizer::GalleryRecognizer;
use visionlink_core::pipeline::frame_pipeline::FramePipeline;

/// Shared, read-mostly state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<FramePipeline>,
    pub gallery: Option<Arc<GalleryRecognizer>>,
    sessions: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new(pipeline: Arc<FramePipeline>, gallery: Option<Arc<GalleryRecognizer>>) -> Self {
        Self {
            pipeline,
            gallery,
            sessions: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }

    /// Counts a streaming session until the returned guard is dropped.
    pub fn enter_session(&self) -> SessionGuard {
        self.sessions.fetch_add(1, Ordering::SeqCst);
        SessionGuard(Arc::clone(&self.sessions))
    }
}

pub struct SessionGuard(Arc<AtomicUsize>);

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
