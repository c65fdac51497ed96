use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::detection::domain::detector::{BoxError, Detector, ModelInfo};
use crate::shared::bounded_call::{BoundedCallError, BoundedWorker, DEFAULT_QUEUE_DEPTH};
use crate::shared::frame::Frame;
use crate::shared::region::Region;

/// Returned (boxed) by [`TimeoutDetector`] so callers can tell a missed
/// deadline apart from a model failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{adapter} exceeded {timeout_ms}ms deadline")]
pub struct DetectorTimeout {
    pub adapter: String,
    pub timeout_ms: u128,
}

/// Decorator that bounds every `detect` call of the wrapped detector.
///
/// Calls run on one worker thread owned by the decorator. A call exceeding
/// the deadline is reported as an error; the inner call finishes on the
/// worker and its result is discarded.
pub struct TimeoutDetector {
    inner: Arc<dyn Detector>,
    worker: BoundedWorker,
}

impl TimeoutDetector {
    pub fn new(inner: Arc<dyn Detector>, timeout: Duration) -> std::io::Result<Self> {
        let worker = BoundedWorker::spawn(inner.name(), timeout, DEFAULT_QUEUE_DEPTH)?;
        Ok(Self { inner, worker })
    }
}

impl Detector for TimeoutDetector {
    fn info(&self) -> &ModelInfo {
        self.inner.info()
    }

    fn detect(&self, frame: &Frame) -> Result<Vec<Region>, BoxError> {
        let inner = Arc::clone(&self.inner);
        let frame = frame.clone();
        match self.worker.call(move || inner.detect(&frame)) {
            Ok(result) => result,
            Err(BoundedCallError::TimedOut) => Err(Box::new(DetectorTimeout {
                adapter: self.inner.name().to_string(),
                timeout_ms: self.worker.timeout().as_millis(),
            })),
            Err(BoundedCallError::Busy) => {
                Err(format!("{} is busy with earlier frames", self.inner.name()).into())
            }
            Err(BoundedCallError::Panicked(msg)) => {
                Err(format!("{} panicked: {msg}", self.inner.name()).into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::region::RegionSource;

    struct SlowDetector {
        info: ModelInfo,
        delay: Duration,
    }

    impl SlowDetector {
        fn new(delay: Duration) -> Self {
            Self {
                info: ModelInfo {
                    name: "slow".into(),
                    source: RegionSource::Object,
                    input_size: None,
                    class_names: vec![],
                },
                delay,
            }
        }
    }

    impl Detector for SlowDetector {
        fn info(&self) -> &ModelInfo {
            &self.info
        }

        fn detect(&self, _frame: &Frame) -> Result<Vec<Region>, BoxError> {
            std::thread::sleep(self.delay);
            Ok(vec![Region::new(
                [0.0, 0.0, 1.0, 1.0],
                "cup",
                0.5,
                RegionSource::Object,
            )])
        }
    }

    fn frame() -> Frame {
        Frame::new(vec![0u8; 4 * 4 * 3], 4, 4, 3)
    }

    #[test]
    fn test_passes_through_fast_results() {
        let detector = TimeoutDetector::new(
            Arc::new(SlowDetector::new(Duration::ZERO)),
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(detector.detect(&frame()).unwrap().len(), 1);
        assert_eq!(detector.name(), "slow");
    }

    #[test]
    fn test_slow_call_becomes_error() {
        let detector = TimeoutDetector::new(
            Arc::new(SlowDetector::new(Duration::from_millis(300))),
            Duration::from_millis(10),
        )
        .unwrap();
        let err = detector.detect(&frame()).unwrap_err();
        let timeout = err.downcast_ref::<DetectorTimeout>().unwrap();
        assert_eq!(timeout.adapter, "slow");
        assert_eq!(timeout.timeout_ms, 10);
    }
}
