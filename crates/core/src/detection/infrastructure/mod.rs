pub mod detector_registry;
pub mod model_resolver;
pub mod onnx_blaze_detector;
