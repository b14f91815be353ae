//! Server → client events, sent as JSON text messages:
//!
//! ```text
//! {"event": "face-recognition",  "data": [{"x":..,"y":..,"width":..,"height":..}, ...]}
//! {"event": "recognition-error", "data": {"channel": "face-recognition", "reason": "decode", "message": ".."}}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::detection::domain::detector_kind::DetectorKind;
use crate::shared::constants::RECOGNITION_ERROR_CHANNEL;
use crate::shared::region::Region;

/// Machine-readable cause carried by a `recognition-error` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorReason {
    Decode,
    DetectorUnavailable,
    Detection,
    Malformed,
    UnknownChannel,
    FrameTooLarge,
    UnsupportedMessage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Channel the failed submission arrived on, when it could be read.
    pub channel: Option<String>,
    pub reason: ErrorReason,
    pub message: String,
}

impl ErrorPayload {
    pub fn new(channel: Option<&str>, reason: ErrorReason, message: impl Into<String>) -> Self {
        Self {
            channel: channel.map(str::to_string),
            reason,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    Detections {
        kind: DetectorKind,
        boxes: Vec<Region>,
    },
    RecognitionError(ErrorPayload),
}

#[derive(Error, Debug)]
pub enum EventDecodeError {
    #[error("malformed event: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown event '{0}'")]
    UnknownEvent(String),
}

#[derive(Deserialize)]
struct RawEvent {
    event: String,
    #[serde(default)]
    data: serde_json::Value,
}

impl ServerEvent {
    pub fn error(channel: Option<&str>, reason: ErrorReason, message: impl Into<String>) -> Self {
        ServerEvent::RecognitionError(ErrorPayload::new(channel, reason, message))
    }

    /// Event name on the wire.
    pub fn channel(&self) -> &'static str {
        match self {
            ServerEvent::Detections { kind, .. } => kind.channel(),
            ServerEvent::RecognitionError(_) => RECOGNITION_ERROR_CHANNEL,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let value = match self {
            ServerEvent::Detections { boxes, .. } => json!({
                "event": self.channel(),
                "data": boxes,
            }),
            ServerEvent::RecognitionError(payload) => json!({
                "event": self.channel(),
                "data": payload,
            }),
        };
        serde_json::to_string(&value)
    }

    pub fn from_json(text: &str) -> Result<ServerEvent, EventDecodeError> {
        let raw: RawEvent = serde_json::from_str(text)?;
        if raw.event == RECOGNITION_ERROR_CHANNEL {
            let payload: ErrorPayload = serde_json::from_value(raw.data)?;
            return Ok(ServerEvent::RecognitionError(payload));
        }
        let kind =
            DetectorKind::from_channel(&raw.event).ok_or(EventDecodeError::UnknownEvent(raw.event))?;
        let boxes: Vec<Region> = serde_json::from_value(raw.data)?;
        Ok(ServerEvent::Detections { kind, boxes })
    }
}
