use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::detection::domain::detector_kind::DetectorKind;
use crate::detection::domain::object_detector::{DetectOptions, ObjectDetector};
use crate::shared::frame::Frame;
use crate::shared::region::Region;

use super::model_resolver::{ModelResolver, ProgressFn};
use super::onnx_blaze_detector::{BlazeModelSpec, OnnxBlazeDetector};

/// Where to find the model for one detector kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSource {
    /// File name inside the models/cache directory. Defaults to the kind's model name.
    pub file: Option<String>,
    /// Download location used when the file is not present locally.
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub models_dir: Option<PathBuf>,
    pub face: ModelSource,
    pub palm: ModelSource,
}

impl ModelSettings {
    pub fn source(&self, kind: DetectorKind) -> &ModelSource {
        match kind {
            DetectorKind::Face => &self.face,
            DetectorKind::Palm => &self.palm,
        }
    }

    pub fn source_mut(&mut self, kind: DetectorKind) -> &mut ModelSource {
        match kind {
            DetectorKind::Face => &mut self.face,
            DetectorKind::Palm => &mut self.palm,
        }
    }

    pub fn file_name(&self, kind: DetectorKind) -> &str {
        self.source(kind)
            .file
            .as_deref()
            .unwrap_or_else(|| kind.model_name())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DetectorError {
    #[error("{kind} detector unavailable: {reason}")]
    Unavailable { kind: DetectorKind, reason: String },
    #[error("{kind} detector is unusable after a previous panic")]
    Poisoned { kind: DetectorKind },
    #[error("{kind} detection failed: {message}")]
    Failed { kind: DetectorKind, message: String },
}

type SharedDetector = Arc<Mutex<Box<dyn ObjectDetector>>>;

enum DetectorSlot {
    Ready(SharedDetector),
    Unavailable(String),
}

/// One detector per kind, shared by every session.
///
/// Inference sessions need `&mut`, so each detector sits behind its own
/// mutex; frames of different kinds never contend.
pub struct DetectorRegistry {
    slots: HashMap<DetectorKind, DetectorSlot>,
}

impl DetectorRegistry {
    /// Resolves and loads a model for every kind. Kinds whose model cannot
    /// be resolved or loaded are kept as unavailable rather than failing.
    pub fn load(settings: &ModelSettings, options: &DetectOptions) -> Self {
        let mut slots = HashMap::new();
        for &kind in DetectorKind::ALL {
            let slot = match load_detector(settings, kind, options) {
                Ok(detector) => {
                    log::info!("Loaded {kind} detector ({})", settings.file_name(kind));
                    DetectorSlot::Ready(Arc::new(Mutex::new(detector)))
                }
                Err(reason) => {
                    log::warn!("{kind} detector unavailable: {reason}");
                    DetectorSlot::Unavailable(reason)
                }
            };
            slots.insert(kind, slot);
        }
        Self { slots }
    }

    /// Builds a registry from ready detectors; kinds not listed are unavailable.
    pub fn from_detectors(detectors: Vec<(DetectorKind, Box<dyn ObjectDetector>)>) -> Self {
        let mut slots: HashMap<DetectorKind, DetectorSlot> = detectors
            .into_iter()
            .map(|(kind, d)| (kind, DetectorSlot::Ready(Arc::new(Mutex::new(d)))))
            .collect();
        for &kind in DetectorKind::ALL {
            slots
                .entry(kind)
                .or_insert_with(|| DetectorSlot::Unavailable("no detector registered".into()));
        }
        Self { slots }
    }

    pub fn is_available(&self, kind: DetectorKind) -> bool {
        matches!(self.slots.get(&kind), Some(DetectorSlot::Ready(_)))
    }

    pub fn available_kinds(&self) -> Vec<DetectorKind> {
        DetectorKind::ALL
            .iter()
            .copied()
            .filter(|&k| self.is_available(k))
            .collect()
    }

    /// Runs the kind's detector on `frame`, blocking while another frame
    /// of the same kind is in flight.
    pub fn detect(&self, kind: DetectorKind, frame: &Frame) -> Result<Vec<Region>, DetectorError> {
        self.detect_while(kind, frame, &|| true)
            .map(Option::unwrap_or_default)
    }

    /// As [`detect`](Self::detect), but `live` is asked again once the
    /// detector's lock is held. `Ok(None)` means the frame was dropped
    /// without running inference.
    pub fn detect_while(
        &self,
        kind: DetectorKind,
        frame: &Frame,
        live: &dyn Fn() -> bool,
    ) -> Result<Option<Vec<Region>>, DetectorError> {
        let detector = match self.slots.get(&kind) {
            Some(DetectorSlot::Ready(detector)) => detector,
            Some(DetectorSlot::Unavailable(reason)) => {
                return Err(DetectorError::Unavailable {
                    kind,
                    reason: reason.clone(),
                })
            }
            None => {
                return Err(DetectorError::Unavailable {
                    kind,
                    reason: "no detector registered".into(),
                })
            }
        };

        let mut guard = detector
            .lock()
            .map_err(|_| DetectorError::Poisoned { kind })?;
        if !live() {
            return Ok(None);
        }
        guard
            .detect(frame)
            .map(Some)
            .map_err(|e| DetectorError::Failed {
                kind,
                message: e.to_string(),
            })
    }
}

fn load_detector(
    settings: &ModelSettings,
    kind: DetectorKind,
    options: &DetectOptions,
) -> Result<Box<dyn ObjectDetector>, String> {
    let source = settings.source(kind);
    let name = settings.file_name(kind);
    let path = ModelResolver::user_cache()
        .map(|r| r.with_models_dir(settings.models_dir.clone()))
        .and_then(|r| r.resolve(name, source.url.as_deref(), Some(download_progress(name))))
        .map_err(|e| e.to_string())?;

    let detector = OnnxBlazeDetector::new(
        &path,
        BlazeModelSpec::for_kind(kind),
        options.confidence,
        options.iou_threshold,
    )
    .map_err(|e| format!("failed to load {}: {e}", path.display()))?;
    Ok(Box::new(detector))
}

/// Logs download progress in quarter steps.
fn download_progress(name: &str) -> ProgressFn {
    let name = name.to_string();
    let last_quarter = AtomicU64::new(0);
    Box::new(move |done, total| {
        if total == 0 {
            return;
        }
        let quarter = done * 4 / total;
        if quarter > last_quarter.swap(quarter, Ordering::Relaxed) {
            log::info!("{name}: {}% of {} bytes", quarter * 25, total);
        }
    })
}
