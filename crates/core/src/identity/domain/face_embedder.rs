use crate::detection::domain::detector::BoxError;
use crate::shared::frame::Frame;

/// Domain interface for turning a face crop into an identity embedding.
///
/// Returned vectors are L2-normalized so a dot product is the cosine
/// similarity.
pub trait FaceEmbedder: Send + Sync {
    fn name(&self) -> &str;

    fn embed(&self, crop: &Frame) -> Result<Vec<f32>, BoxError>;
}
