use std::sync::Arc;
use std::time::Duration;

use crate::identity::domain::face_recognizer::{FaceRecognizer, IdentityMatch, RecognitionError};
use crate::shared::bounded_call::{BoundedCallError, BoundedWorker, DEFAULT_QUEUE_DEPTH};
use crate::shared::frame::Frame;

/// Decorator that bounds every `recognize` call of the wrapped recognizer.
pub struct TimeoutRecognizer {
    inner: Arc<dyn FaceRecognizer>,
    worker: BoundedWorker,
}

impl TimeoutRecognizer {
    pub fn new(inner: Arc<dyn FaceRecognizer>, timeout: Duration) -> std::io::Result<Self> {
        let worker = BoundedWorker::spawn(inner.name(), timeout, DEFAULT_QUEUE_DEPTH)?;
        Ok(Self { inner, worker })
    }
}

impl FaceRecognizer for TimeoutRecognizer {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn recognize(&self, crop: &Frame) -> Result<Option<IdentityMatch>, RecognitionError> {
        let inner = Arc::clone(&self.inner);
        let crop = crop.clone();
        match self.worker.call(move || inner.recognize(&crop)) {
            Ok(result) => result,
            Err(BoundedCallError::TimedOut) => {
                Err(RecognitionError::Timeout(self.worker.timeout().as_millis()))
            }
            Err(BoundedCallError::Busy) => Err(RecognitionError::Busy),
            Err(BoundedCallError::Panicked(msg)) => Err(RecognitionError::Panicked(msg)),
        }
    }
}
