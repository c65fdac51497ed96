pub mod bytetrack_tracker;
pub mod coco_labels;
pub mod onnx_session;
pub mod onnx_yolo_face_detector;
pub mod onnx_yolo_object_detector;
pub mod timeout_detector;
mod yolo_common;
