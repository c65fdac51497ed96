use crate::shared::frame::Frame;
use crate::shared::region::{Region, RegionSource};

/// Error type produced by model backends.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Descriptive metadata about a loaded detector model.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelInfo {
    pub name: String,
    pub source: RegionSource,
    pub input_size: Option<u32>,
    pub class_names: Vec<String>,
}

/// Domain interface for a detector adapter.
///
/// Implementations are pure functions of the frame plus their loaded
/// weights, so one instance is shared read-only by every session.
pub trait Detector: Send + Sync {
    fn info(&self) -> &ModelInfo;

    fn detect(&self, frame: &Frame) -> Result<Vec<Region>, BoxError>;

    fn name(&self) -> &str {
        &self.info().name
    }

    fn source(&self) -> RegionSource {
        self.info().source
    }
}
