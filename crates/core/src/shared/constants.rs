pub const FACE_MODEL_NAME: &str = "face_detection_short_range.onnx";
pub const PALM_MODEL_NAME: &str = "palm_detection.onnx";

pub const FACE_RECOGNITION_CHANNEL: &str = "face-recognition";
pub const PALM_RECOGNITION_CHANNEL: &str = "palm-recognition";
pub const RECOGNITION_ERROR_CHANNEL: &str = "recognition-error";

pub const DEFAULT_PORT: u16 = 3000;

/// Upper bound on a single submitted image blob.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;

/// Delay before retrying a failed media acquisition.
pub const MEDIA_RETRY_DELAY_MS: u64 = 5000;

/// Unsynchronised repaint interval (~30 fps).
pub const DEFAULT_REPAINT_DELAY_MS: u64 = 33;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];
