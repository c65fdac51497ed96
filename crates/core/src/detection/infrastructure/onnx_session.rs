//! ONNX Runtime session construction shared by every model backend.

use std::path::Path;

use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;

/// Loads a model with the platform's preferred execution provider.
///
/// Inter-op parallelism is pinned to one thread.
pub fn load_session(model_path: &Path) -> Result<Session, Box<dyn std::error::Error>> {
    let intra_threads = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let session = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_inter_threads(1)?
        .with_intra_threads(intra_threads)?
        .with_execution_providers(preferred_execution_providers())?
        .commit_from_file(model_path)?;
    Ok(session)
}

/// Human-readable model name derived from its file name.
pub fn model_name(model_path: &Path, fallback: &str) -> String {
    model_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| fallback.to_string())
}

/// An empty list leaves ONNX Runtime on its default CPU provider.
fn preferred_execution_providers() -> Vec<ort::execution_providers::ExecutionProviderDispatch> {
    #[cfg(target_os = "macos")]
    {
        vec![ort::execution_providers::CoreMLExecutionProvider::default().build()]
    }
    #[cfg(target_os = "windows")]
    {
        vec![ort::execution_providers::DirectMLExecutionProvider::default().build()]
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        vec![]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_name_uses_file_stem() {
        assert_eq!(model_name(Path::new("/models/yolov8n.onnx"), "x"), "yolov8n");
    }

    #[test]
    fn test_model_name_fallback() {
        assert_eq!(model_name(Path::new(""), "yolo"), "yolo");
    }

    #[test]
    fn test_load_session_missing_file_errors() {
        assert!(load_session(Path::new("/nonexistent/model.onnx")).is_err());
    }
}
