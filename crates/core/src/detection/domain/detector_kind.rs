use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::shared::constants::{
    FACE_MODEL_NAME, FACE_RECOGNITION_CHANNEL, PALM_MODEL_NAME, PALM_RECOGNITION_CHANNEL,
};

/// Selects which detector runs on a frame.
///
/// A kind owns both its socket channel name and its model resource, so the
/// two can never disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorKind {
    Face,
    Palm,
}

impl DetectorKind {
    pub const ALL: &'static [DetectorKind] = &[DetectorKind::Face, DetectorKind::Palm];

    pub fn channel(self) -> &'static str {
        match self {
            DetectorKind::Face => FACE_RECOGNITION_CHANNEL,
            DetectorKind::Palm => PALM_RECOGNITION_CHANNEL,
        }
    }

    pub fn from_channel(channel: &str) -> Option<DetectorKind> {
        Self::ALL.iter().copied().find(|k| k.channel() == channel)
    }

    /// Default model file for this kind.
    pub fn model_name(self) -> &'static str {
        match self {
            DetectorKind::Face => FACE_MODEL_NAME,
            DetectorKind::Palm => PALM_MODEL_NAME,
        }
    }
}

impl fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.channel())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown detector kind '{0}' (expected face or palm)")]
pub struct UnknownDetectorKind(pub String);

impl FromStr for DetectorKind {
    type Err = UnknownDetectorKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.to_ascii_lowercase().as_str() {
            "face" => Ok(DetectorKind::Face),
            "palm" | "hand" => Ok(DetectorKind::Palm),
            other => {
                Self::from_channel(other).ok_or_else(|| UnknownDetectorKind(s.to_string()))
            }
        }
    }
}
