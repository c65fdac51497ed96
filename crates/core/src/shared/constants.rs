pub const FACE_MODEL_NAME: &str = "yolo11n-pose_widerface.onnx";
pub const FACE_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/yolo11n-pose_widerface.onnx";

pub const EMBEDDING_MODEL_NAME: &str = "w600k_r50.onnx";
pub const EMBEDDING_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/w600k_r50.onnx";

/// Generic object model; not downloadable, must be bundled or configured.
pub const OBJECT_MODEL_NAME: &str = "yolov8n.onnx";

/// Frames between full identity-matching attempts for a track.
pub const RECOGNITION_INTERVAL: u64 = 5;

/// Label reported for faces with no confident identity.
pub const UNKNOWN_IDENTITY: &str = "Unknown";

/// Max frames a track can be lost before removal (~1 second at 30 fps).
pub const TRACKER_MAX_LOST: usize = 30;

/// Largest accepted encoded frame payload, in bytes of envelope text.
pub const MAX_PAYLOAD_BYTES: usize = 16 * 1024 * 1024;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];
