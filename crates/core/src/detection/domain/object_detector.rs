use serde::{Deserialize, Serialize};

use crate::shared::frame::Frame;
use crate::shared::region::{Region, DEFAULT_IOU_THRESHOLD};

/// Domain interface for an object detector (face, palm, ...).
///
/// Implementations own inference sessions that need exclusive access,
/// hence `&mut self`. Returned regions must be ordered by descending
/// confidence.
pub trait ObjectDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Region>, Box<dyn std::error::Error>>;
}

/// Per-request tuning applied around a detector call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectOptions {
    /// Minimum detector confidence (0.0-1.0).
    pub confidence: f64,
    /// Overlap above which a lower-ranked box is dropped.
    pub iou_threshold: f64,
    /// Boxes narrower or shorter than this (pixels) are dropped.
    pub min_size: u32,
    pub max_results: Option<usize>,
}

impl Default for DetectOptions {
    fn default() -> Self {
        Self {
            confidence: 0.5,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            min_size: 0,
            max_results: None,
        }
    }
}

impl DetectOptions {
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(format!(
                "Confidence must be between 0.0 and 1.0, got {}",
                self.confidence
            ));
        }
        if !(0.0..=1.0).contains(&self.iou_threshold) {
            return Err(format!(
                "IoU threshold must be between 0.0 and 1.0, got {}",
                self.iou_threshold
            ));
        }
        if self.max_results == Some(0) {
            return Err("Max results must be at least 1".into());
        }
        Ok(())
    }
}
