use std::sync::Arc;
use std::time::Instant;

use crate::decoding::frame_decoder::{DecodeError, FrameDecoder};
use crate::detection::domain::detector::Detector;
use crate::detection::infrastructure::bytetrack_tracker::ByteTracker;
use crate::identity::domain::face_recognizer::FaceRecognizer;
use crate::identity::domain::identity_resolver::IdentityResolver;
use crate::shared::constants::{MAX_PAYLOAD_BYTES, RECOGNITION_INTERVAL, TRACKER_MAX_LOST};
use crate::shared::frame::Frame;

use super::detection_aggregator::DetectionAggregator;
use super::detection_batch::DetectionBatch;
use super::pipeline_logger::{NullPipelineLogger, PipelineLogger};
use super::region_filter::LabelSuppression;
use super::session_state::SessionState;

/// Tunables of the per-frame pipeline.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Full recognition runs when `frame_counter % recognition_interval == 0`.
    pub recognition_interval: u64,
    /// Object labels dropped while a face adapter is active.
    pub suppressed_labels: Vec<String>,
    /// Per-session ByteTrack keys; when off, faces are keyed by position.
    pub tracking: bool,
    pub tracker_max_lost: usize,
    pub max_payload_bytes: usize,
    /// Run detector adapters on parallel threads.
    pub concurrent_fan_out: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            recognition_interval: RECOGNITION_INTERVAL,
            suppressed_labels: vec!["person".to_string()],
            tracking: true,
            tracker_max_lost: TRACKER_MAX_LOST,
            max_payload_bytes: MAX_PAYLOAD_BYTES,
            concurrent_fan_out: true,
        }
    }
}

/// Decode, detect, identify: one frame in, one detection batch out.
///
/// A single pipeline is shared by all sessions. Sessions bring their own
/// [`SessionState`] and must feed frames strictly in arrival order.
pub struct FramePipeline {
    config: PipelineConfig,
    decoder: FrameDecoder,
    aggregator: DetectionAggregator,
}

impl FramePipeline {
    pub fn new(
        config: PipelineConfig,
        detectors: Vec<Arc<dyn Detector>>,
        recognizer: Option<Arc<dyn FaceRecognizer>>,
    ) -> Self {
        let resolver =
            recognizer.map(|r| IdentityResolver::new(r, config.recognition_interval));
        let aggregator = DetectionAggregator::new(
            detectors,
            LabelSuppression::new(config.suppressed_labels.iter().cloned()),
            resolver,
            config.concurrent_fan_out,
        );
        Self {
            decoder: FrameDecoder::new(config.max_payload_bytes),
            config,
            aggregator,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn detectors(&self) -> &[Arc<dyn Detector>] {
        self.aggregator.adapters()
    }

    pub fn recognizer_name(&self) -> Option<&str> {
        self.aggregator.resolver().map(|r| r.recognizer_name())
    }

    pub fn decoder(&self) -> &FrameDecoder {
        &self.decoder
    }

    pub fn open_session(
        &self,
        id: impl Into<String>,
        logger: Box<dyn PipelineLogger>,
    ) -> SessionState {
        let tracker = self
            .config
            .tracking
            .then(|| ByteTracker::new(self.config.tracker_max_lost));
        let session = SessionState::new(id, tracker, logger);
        log::debug!("Session {} opened", session.id());
        session
    }

    /// Session for a single explicit request: its first frame is a
    /// recognition frame.
    pub fn one_shot_session(&self) -> SessionState {
        let interval = self.config.recognition_interval.max(1);
        self.open_session("one-shot", Box::new(NullPipelineLogger))
            .with_frame_counter(interval - 1)
    }

    /// Processes one inbound frame envelope.
    ///
    /// An undecodable envelope is reported as an error and leaves the
    /// session exactly as it was; streaming callers drop the frame.
    pub fn process(
        &self,
        session: &mut SessionState,
        envelope: &str,
    ) -> Result<Arc<DetectionBatch>, DecodeError> {
        let started = Instant::now();
        let frame = match self.decoder.decode(envelope) {
            Ok(frame) => frame,
            Err(e) => {
                log::debug!("[{}] dropping frame: {e}", session.id());
                session.logger_mut().metric("dropped_frames", 1.0);
                return Err(e);
            }
        };
        session
            .logger_mut()
            .timing("decode", started.elapsed().as_secs_f64() * 1000.0);
        Ok(self.process_frame(session, &frame))
    }

    /// Processes an already decoded frame.
    pub fn process_frame(&self, session: &mut SessionState, frame: &Frame) -> Arc<DetectionBatch> {
        let frame_index = session.advance();
        let batch = self.aggregator.aggregate(frame, session);
        session.logger_mut().frame_processed(frame_index);
        session.record_batch(batch)
    }

    /// Decodes and processes `envelope` in a throwaway session.
    pub fn detect_once(&self, envelope: &str) -> Result<DetectionBatch, DecodeError> {
        let mut session = self.one_shot_session();
        let batch = self.process(&mut session, envelope)?;
        drop(session);
        Ok(Arc::try_unwrap(batch).unwrap_or_else(|shared| (*shared).clone()))
    }

    pub fn close_session(&self, session: SessionState) {
        session.close();
    }
}
