use std::sync::Arc;
use std::thread;
use std::time::Instant;

use thiserror::Error;

use crate::detection::domain::detector::{BoxError, Detector};
use crate::detection::infrastructure::timeout_detector::DetectorTimeout;
use crate::identity::domain::identity_resolver::IdentityResolver;
use crate::shared::bounded_call::catch_panic;
use crate::shared::constants::UNKNOWN_IDENTITY;
use crate::shared::frame::Frame;
use crate::shared::region::{Region, RegionSource};

use super::detection_batch::DetectionBatch;
use super::region_filter::LabelSuppression;
use super::session_state::SessionState;

/// Why one adapter contributed nothing to a frame.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdapterError {
    #[error("{adapter} failed: {message}")]
    Failed { adapter: String, message: String },
    #[error("{adapter} exceeded {timeout_ms}ms deadline")]
    Timeout { adapter: String, timeout_ms: u128 },
    #[error("{adapter} panicked: {message}")]
    Panicked { adapter: String, message: String },
    #[error("{adapter} returned a region with a non-finite box")]
    InvalidOutput { adapter: String },
}

impl AdapterError {
    fn from_backend(adapter: &str, err: BoxError) -> Self {
        match err.downcast_ref::<DetectorTimeout>() {
            Some(timeout) => AdapterError::Timeout {
                adapter: adapter.to_string(),
                timeout_ms: timeout.timeout_ms,
            },
            None => AdapterError::Failed {
                adapter: adapter.to_string(),
                message: err.to_string(),
            },
        }
    }
}

/// Regions collected from every adapter for one frame.
#[derive(Debug, Default)]
pub struct AdapterRun {
    /// Post-suppression regions, adapters in configured order.
    pub regions: Vec<Region>,
    pub failures: Vec<AdapterError>,
    pub face_adapter_active: bool,
}

/// Fans a frame out to every detector and fuses the results into one batch.
///
/// Holds only shared, read-only collaborators; all per-session state comes
/// in through [`SessionState`].
pub struct DetectionAggregator {
    adapters: Vec<Arc<dyn Detector>>,
    suppression: LabelSuppression,
    resolver: Option<IdentityResolver>,
    concurrent: bool,
}

impl DetectionAggregator {
    pub fn new(
        adapters: Vec<Arc<dyn Detector>>,
        suppression: LabelSuppression,
        resolver: Option<IdentityResolver>,
        concurrent: bool,
    ) -> Self {
        Self {
            adapters,
            suppression,
            resolver,
            concurrent,
        }
    }

    pub fn adapters(&self) -> &[Arc<dyn Detector>] {
        &self.adapters
    }

    pub fn resolver(&self) -> Option<&IdentityResolver> {
        self.resolver.as_ref()
    }

    /// Runs every adapter on `frame`, containing failures per adapter.
    ///
    /// All adapters finish (or fail) before this returns.
    pub fn collect(&self, frame: &Frame) -> AdapterRun {
        let outcomes: Vec<Result<Vec<Region>, AdapterError>> =
            if self.concurrent && self.adapters.len() > 1 {
                thread::scope(|scope| {
                    let handles: Vec<_> = self
                        .adapters
                        .iter()
                        .map(|adapter| scope.spawn(move || invoke(adapter.as_ref(), frame)))
                        .collect();
                    handles
                        .into_iter()
                        .zip(&self.adapters)
                        .map(|(handle, adapter)| {
                            handle.join().unwrap_or_else(|_| {
                                Err(AdapterError::Panicked {
                                    adapter: adapter.name().to_string(),
                                    message: "worker thread died".into(),
                                })
                            })
                        })
                        .collect()
                })
            } else {
                self.adapters
                    .iter()
                    .map(|adapter| invoke(adapter.as_ref(), frame))
                    .collect()
            };

        let mut run = AdapterRun::default();
        let mut regions = Vec::new();
        for (adapter, outcome) in self.adapters.iter().zip(outcomes) {
            match outcome {
                Ok(found) => {
                    if adapter.source() == RegionSource::Face {
                        run.face_adapter_active = true;
                    }
                    regions.extend(found);
                }
                Err(e) => {
                    log::warn!("Adapter contributed nothing this frame: {e}");
                    run.failures.push(e);
                }
            }
        }
        run.regions = self.suppression.apply(regions, run.face_adapter_active);
        run
    }

    /// Produces the detection batch for the session's current frame.
    ///
    /// The session counter must already be advanced to this frame.
    pub fn aggregate(&self, frame: &Frame, session: &mut SessionState) -> DetectionBatch {
        let frame_index = session.frame_counter();

        let started = Instant::now();
        let run = self.collect(frame);
        let logger = session.logger_mut();
        logger.timing("detect", elapsed_ms(started));
        logger.metric("adapter_failures", run.failures.len() as f64);

        let started = Instant::now();
        let face_indices: Vec<usize> = run
            .regions
            .iter()
            .enumerate()
            .filter(|(_, r)| r.source() == RegionSource::Face)
            .map(|(i, _)| i)
            .collect();
        let faces: Vec<&Region> = face_indices.iter().map(|&i| &run.regions[i]).collect();
        let keys = session.assign_track_keys(&faces);

        let mut names: Vec<Option<String>> = vec![None; run.regions.len()];
        for (&idx, key) in face_indices.iter().zip(keys) {
            let region = &run.regions[idx];
            let name = match (&self.resolver, key) {
                (Some(resolver), Some(key)) => {
                    resolver.resolve(session.cache_mut(), key, frame, region, frame_index)
                }
                (Some(resolver), None) => resolver.resolve_unkeyed(frame, region, frame_index),
                (None, _) => UNKNOWN_IDENTITY.to_string(),
            };
            names[idx] = Some(name);
        }
        let logger = session.logger_mut();
        logger.timing("identify", elapsed_ms(started));
        logger.metric("detections", run.regions.len() as f64);

        DetectionBatch::assemble(frame_index, run.regions, names)
    }
}

/// Calls one adapter with panics and invalid output mapped to errors.
fn invoke(adapter: &dyn Detector, frame: &Frame) -> Result<Vec<Region>, AdapterError> {
    let name = adapter.name();
    let regions = match catch_panic(|| adapter.detect(frame)) {
        Ok(Ok(regions)) => regions,
        Ok(Err(e)) => return Err(AdapterError::from_backend(name, e)),
        Err(message) => {
            return Err(AdapterError::Panicked {
                adapter: name.to_string(),
                message,
            })
        }
    };
    if regions
        .iter()
        .any(|r| !r.bbox().iter().all(|v| v.is_finite()))
    {
        return Err(AdapterError::InvalidOutput {
            adapter: name.to_string(),
        });
    }
    Ok(regions)
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::detection::domain::detector::ModelInfo;
    use crate::detection::infrastructure::bytetrack_tracker::ByteTracker;
    use crate::detection::infrastructure::timeout_detector::TimeoutDetector;
    use crate::identity::domain::identity_resolver::tests::{matched, ScriptedRecognizer};
    use crate::identity::domain::track_key::TrackKey;
    use crate::pipeline::pipeline_logger::NullPipelineLogger;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Detector returning a fixed list of regions.
    pub(crate) struct FixedDetector {
        info: ModelInfo,
        regions: Vec<Region>,
    }

    impl FixedDetector {
        pub(crate) fn new(name: &str, source: RegionSource, regions: Vec<Region>) -> Self {
            Self {
                info: ModelInfo {
                    name: name.into(),
                    source,
                    input_size: None,
                    class_names: vec![],
                },
                regions,
            }
        }
    }

    impl Detector for FixedDetector {
        fn info(&self) -> &ModelInfo {
            &self.info
        }

        fn detect(&self, _frame: &Frame) -> Result<Vec<Region>, BoxError> {
            std::thread::sleep(Duration::from_millis(1));
            Ok(self.regions.clone())
        }
    }

    /// Detector that always errors or panics.
    pub(crate) struct BrokenDetector {
        info: ModelInfo,
        panic: bool,
        delay: Duration,
    }

    impl BrokenDetector {
        pub(crate) fn failing(source: RegionSource) -> Self {
            Self::build(source, false, Duration::ZERO)
        }

        pub(crate) fn panicking(source: RegionSource) -> Self {
            Self::build(source, true, Duration::ZERO)
        }

        fn sleeping(delay: Duration) -> Self {
            Self::build(RegionSource::Object, false, delay)
        }

        fn build(source: RegionSource, panic: bool, delay: Duration) -> Self {
            Self {
                info: ModelInfo {
                    name: "broken".into(),
                    source,
                    input_size: None,
                    class_names: vec![],
                },
                panic,
                delay,
            }
        }
    }

    impl Detector for BrokenDetector {
        fn info(&self) -> &ModelInfo {
            &self.info
        }

        fn detect(&self, _frame: &Frame) -> Result<Vec<Region>, BoxError> {
            std::thread::sleep(self.delay);
            if self.panic {
                panic!("model exploded");
            }
            Err("inference failed".into())
        }
    }

    /// Face detector replaying one region list per frame.
    struct SequenceDetector {
        info: ModelInfo,
        frames: Mutex<VecDeque<Vec<Region>>>,
    }

    impl SequenceDetector {
        fn new(frames: Vec<Vec<Region>>) -> Self {
            Self {
                info: ModelInfo {
                    name: "sequence".into(),
                    source: RegionSource::Face,
                    input_size: None,
                    class_names: vec![],
                },
                frames: Mutex::new(frames.into()),
            }
        }
    }

    impl Detector for SequenceDetector {
        fn info(&self) -> &ModelInfo {
            &self.info
        }

        fn detect(&self, _frame: &Frame) -> Result<Vec<Region>, BoxError> {
            Ok(self.frames.lock().unwrap().pop_front().unwrap_or_default())
        }
    }

    pub(crate) fn person() -> Region {
        Region::new([5.0, 5.0, 80.0, 95.0], "person", 0.9, RegionSource::Object)
    }

    pub(crate) fn cup() -> Region {
        Region::new([60.0, 60.0, 70.0, 75.0], "cup", 0.6, RegionSource::Object)
    }

    pub(crate) fn face_at(x: f64) -> Region {
        Region::new([x, 10.0, x + 30.0, 40.0], "face", 0.95, RegionSource::Face)
    }

    fn frame() -> Frame {
        Frame::new(vec![50u8; 100 * 100 * 3], 100, 100, 3)
    }

    fn session() -> SessionState {
        SessionState::new("t", Some(ByteTracker::new(30)), Box::new(NullPipelineLogger))
    }

    fn aggregator(adapters: Vec<Arc<dyn Detector>>, concurrent: bool) -> DetectionAggregator {
        DetectionAggregator::new(adapters, LabelSuppression::new(["person"]), None, concurrent)
    }

    #[rstest::rstest]
    #[case(true)]
    #[case(false)]
    fn test_failing_adapter_does_not_hide_others(#[case] concurrent: bool) {
        let agg = aggregator(
            vec![
                Arc::new(BrokenDetector::failing(RegionSource::Face)),
                Arc::new(FixedDetector::new("objects", RegionSource::Object, vec![cup()])),
            ],
            concurrent,
        );
        let run = agg.collect(&frame());

        assert_eq!(run.regions, vec![cup()]);
        assert_eq!(run.failures.len(), 1);
        assert!(!run.face_adapter_active);
    }

    #[test]
    fn test_panicking_adapter_is_contained() {
        let agg = aggregator(
            vec![
                Arc::new(BrokenDetector::panicking(RegionSource::Object)),
                Arc::new(FixedDetector::new("faces", RegionSource::Face, vec![face_at(10.0)])),
            ],
            true,
        );
        let run = agg.collect(&frame());

        assert_eq!(run.regions.len(), 1);
        assert!(matches!(run.failures[0], AdapterError::Panicked { .. }));
    }

    #[test]
    fn test_timed_out_adapter_reports_timeout() {
        let slow: Arc<dyn Detector> = Arc::new(BrokenDetector::sleeping(Duration::from_millis(300)));
        let agg = aggregator(
            vec![Arc::new(TimeoutDetector::new(slow, Duration::from_millis(10)).unwrap())],
            false,
        );
        let run = agg.collect(&frame());
        assert_eq!(
            run.failures,
            vec![AdapterError::Timeout {
                adapter: "broken".into(),
                timeout_ms: 10
            }]
        );
    }

    #[test]
    fn test_non_finite_output_is_rejected() {
        let bad = Region::new([0.0, 0.0, f64::INFINITY, 1.0], "cup", 0.5, RegionSource::Object);
        let agg = aggregator(
            vec![Arc::new(FixedDetector::new("objects", RegionSource::Object, vec![bad]))],
            false,
        );
        let run = agg.collect(&frame());
        assert!(run.regions.is_empty());
        assert!(matches!(run.failures[0], AdapterError::InvalidOutput { .. }));
    }

    #[test]
    fn test_person_suppressed_when_face_adapter_runs() {
        let agg = aggregator(
            vec![
                Arc::new(FixedDetector::new("objects", RegionSource::Object, vec![person(), cup()])),
                Arc::new(FixedDetector::new("faces", RegionSource::Face, vec![])),
            ],
            true,
        );
        let run = agg.collect(&frame());
        assert_eq!(run.regions, vec![cup()]);
    }

    #[test]
    fn test_batch_preserves_adapter_order_and_counts() {
        let agg = aggregator(
            vec![
                Arc::new(FixedDetector::new("objects", RegionSource::Object, vec![person(), cup()])),
                Arc::new(FixedDetector::new(
                    "faces",
                    RegionSource::Face,
                    vec![face_at(10.0), face_at(50.0)],
                )),
            ],
            true,
        );
        let mut s = session();
        s.advance();
        let batch = agg.aggregate(&frame(), &mut s);

        let labels: Vec<&str> = batch.detections.iter().map(|d| d.region.label()).collect();
        assert_eq!(labels, vec!["cup", "face", "face"]);
        let ids: Vec<u32> = batch.detections.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(batch.detections[0].name, None);
        assert_eq!(batch.detections[1].name.as_deref(), Some(UNKNOWN_IDENTITY));
    }

    #[test]
    fn test_faces_resolved_through_recognizer() {
        let recognizer = Arc::new(ScriptedRecognizer::new(vec![matched("Alice")]));
        let agg = DetectionAggregator::new(
            vec![Arc::new(FixedDetector::new("faces", RegionSource::Face, vec![face_at(10.0)]))],
            LabelSuppression::default(),
            Some(IdentityResolver::new(recognizer.clone(), 1)),
            false,
        );
        let mut s = session();
        s.advance();
        let batch = agg.aggregate(&frame(), &mut s);

        assert_eq!(batch.detections[0].name.as_deref(), Some("Alice"));
        assert_eq!(recognizer.calls(), 1);
        assert_eq!(s.cache().len(), 1);
    }

    #[test]
    fn test_untracked_face_identity_does_not_pass_to_next_face() {
        let weak_a = Region::new([0.0, 0.0, 30.0, 30.0], "face", 0.4, RegionSource::Face);
        let weak_b = Region::new([60.0, 60.0, 95.0, 95.0], "face", 0.4, RegionSource::Face);
        let recognizer = Arc::new(ScriptedRecognizer::new(vec![matched("Alice")]));
        let agg = DetectionAggregator::new(
            vec![Arc::new(SequenceDetector::new(vec![vec![weak_a], vec![weak_b]]))],
            LabelSuppression::default(),
            Some(IdentityResolver::new(recognizer.clone(), 5)),
            false,
        );
        let mut s = session().with_frame_counter(4);

        s.advance();
        let first = agg.aggregate(&frame(), &mut s);
        assert_eq!(first.detections[0].name.as_deref(), Some("Alice"));
        assert!(s.cache().is_empty());

        s.advance();
        let second = agg.aggregate(&frame(), &mut s);
        assert_eq!(second.detections[0].name.as_deref(), Some(UNKNOWN_IDENTITY));
        assert!(s.cache().get(&TrackKey::Positional(0)).is_none());
        assert_eq!(recognizer.calls(), 1);
    }
}
