pub mod detector_kind;
pub mod object_detector;
