pub mod gallery_recognizer;
pub mod onnx_arcface_embedder;
pub mod timeout_recognizer;
