use std::sync::Arc;

use crate::detection::infrastructure::bytetrack_tracker::{ByteTracker, TrackInput};
use crate::identity::domain::identity_cache::IdentityCache;
use crate::identity::domain::track_key::TrackKey;
use crate::shared::region::Region;

use super::detection_batch::DetectionBatch;
use super::pipeline_logger::PipelineLogger;

/// Everything one streaming connection owns.
///
/// Created on connect and dropped on disconnect; nothing in here is ever
/// shared with another session.
pub struct SessionState {
    id: String,
    frame_counter: u64,
    cache: IdentityCache,
    tracker: Option<ByteTracker>,
    last_batch: Option<Arc<DetectionBatch>>,
    logger: Box<dyn PipelineLogger>,
    degraded_warned: bool,
}

impl SessionState {
    /// `tracker` of `None` keys faces by their position in each frame.
    pub fn new(
        id: impl Into<String>,
        tracker: Option<ByteTracker>,
        logger: Box<dyn PipelineLogger>,
    ) -> Self {
        Self {
            id: id.into(),
            frame_counter: 0,
            cache: IdentityCache::new(),
            tracker,
            last_batch: None,
            logger,
            degraded_warned: false,
        }
    }

    /// Starts the counter at `frame_counter` instead of zero.
    pub fn with_frame_counter(mut self, frame_counter: u64) -> Self {
        self.frame_counter = frame_counter;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    pub fn cache(&self) -> &IdentityCache {
        &self.cache
    }

    pub(crate) fn cache_mut(&mut self) -> &mut IdentityCache {
        &mut self.cache
    }

    pub fn last_batch(&self) -> Option<&Arc<DetectionBatch>> {
        self.last_batch.as_ref()
    }

    pub fn is_tracking(&self) -> bool {
        self.tracker.is_some()
    }

    pub(crate) fn logger_mut(&mut self) -> &mut dyn PipelineLogger {
        self.logger.as_mut()
    }

    /// Counts an accepted frame and returns its index.
    pub(crate) fn advance(&mut self) -> u64 {
        self.frame_counter += 1;
        self.frame_counter
    }

    pub(crate) fn record_batch(&mut self, batch: DetectionBatch) -> Arc<DetectionBatch> {
        let batch = Arc::new(batch);
        self.last_batch = Some(Arc::clone(&batch));
        batch
    }

    /// Derives a track key for every face region of the current frame.
    ///
    /// Must be called once per processed frame, even without faces, so the
    /// tracker ages its lost tracks. Adapter-supplied ids win; otherwise the
    /// session tracker assigns one. With tracking on, a face the tracker does
    /// not place gets `None` and must not touch the identity cache. With
    /// tracking off every face is keyed by its index in `faces`.
    pub(crate) fn assign_track_keys(&mut self, faces: &[&Region]) -> Vec<Option<TrackKey>> {
        let mut keys: Vec<Option<TrackKey>> = vec![None; faces.len()];
        let mut untracked = Vec::new();
        for (i, face) in faces.iter().enumerate() {
            match face.track_id() {
                Some(id) => keys[i] = Some(TrackKey::External(id)),
                None => untracked.push(i),
            }
        }

        match &mut self.tracker {
            Some(tracker) => {
                let inputs: Vec<TrackInput> = untracked
                    .iter()
                    .map(|&i| TrackInput {
                        bbox: faces[i].bbox(),
                        score: faces[i].confidence(),
                    })
                    .collect();
                let assigned = tracker.update(&inputs);
                for (&i, id) in untracked.iter().zip(assigned) {
                    keys[i] = id.map(TrackKey::Tracked);
                }
                self.cache.retain_tracked(&tracker.known_ids());
            }
            None => {
                for &i in &untracked {
                    keys[i] = Some(TrackKey::Positional(i));
                }
                if !untracked.is_empty() && !self.degraded_warned {
                    log::warn!("[{}] face tracking is disabled", self.id);
                    self.logger.info(
                        "identities are keyed by detection order and reset when faces reorder",
                    );
                    self.degraded_warned = true;
                }
            }
        }
        keys
    }

    /// Emits the session summary; the state is dropped afterwards.
    pub fn close(self) {
        self.logger.summary();
        log::info!(
            "Session {} closed after {} frame(s), {} cached identit(ies)",
            self.id,
            self.frame_counter,
            self.cache.len()
        );
    }
}
