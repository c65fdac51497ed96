use thiserror::Error;

use crate::shared::frame::Frame;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecognitionError {
    #[error("gallery has no enrolled identities")]
    EmptyGallery,
    #[error("embedding failed: {0}")]
    Embedding(String),
    #[error("gallery unavailable: {0}")]
    Gallery(String),
    #[error("recognition exceeded {0}ms deadline")]
    Timeout(u128),
    #[error("recognizer is busy with earlier calls")]
    Busy,
    #[error("recognizer panicked: {0}")]
    Panicked(String),
}

/// A confident gallery match.
#[derive(Clone, Debug, PartialEq)]
pub struct IdentityMatch {
    pub name: String,
    pub similarity: f64,
}

/// Domain interface for matching a face crop against enrolled identities.
///
/// `Ok(None)` means the gallery was consulted and nothing matched
/// confidently.
pub trait FaceRecognizer: Send + Sync {
    fn name(&self) -> &str;

    fn recognize(&self, crop: &Frame) -> Result<Option<IdentityMatch>, RecognitionError>;
}
