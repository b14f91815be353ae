//! Client-side capture/render loop.
//!
//! The recogniser never touches the socket: it hands back submissions to
//! send and consumes the events that arrive, which keeps it testable
//! without a server.
//!
//! Every frame is scaled to the size reported at acquisition before it is
//! drawn or submitted, so returned boxes always match the canvas.

use std::time::Duration;

use image::imageops::{self, FilterType};
use thiserror::Error;

use recognition_core::detection::domain::detector_kind::DetectorKind;
use recognition_core::imaging::image_blob_codec::encode_png;
use recognition_core::protocol::dispatcher::EventDispatcher;
use recognition_core::protocol::envelope::{encode_submission, ProtocolError};
use recognition_core::protocol::server_event::ServerEvent;
use recognition_core::shared::constants::{DEFAULT_REPAINT_DELAY_MS, RECOGNITION_ERROR_CHANNEL};
use recognition_core::shared::frame::Frame;
use recognition_core::shared::region::Region;

use crate::capture::{CaptureError, FrameSource};
use crate::surface::Surface;

#[derive(Error, Debug)]
pub enum RecogniserError {
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error("failed to encode frame: {0}")]
    Encode(String),
    #[error("failed to draw: {0}")]
    Render(String),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("recogniser has not been started")]
    NotStarted,
}

impl RecogniserError {
    /// Failures tied to one frame; the next frame may well succeed.
    fn is_per_frame(&self) -> bool {
        matches!(
            self,
            RecogniserError::Capture(_) | RecogniserError::Encode(_) | RecogniserError::Render(_)
        )
    }
}

/// Unusable frames skipped in a row before giving up on a submission.
const MAX_SKIPPED_FRAMES: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecogniserOptions {
    /// Render only when a reply arrives. When false a timer repaints
    /// between replies.
    pub synchronise: bool,
    pub repaint_delay: Duration,
    pub kind: DetectorKind,
}

impl Default for RecogniserOptions {
    fn default() -> Self {
        Self {
            synchronise: true,
            repaint_delay: Duration::from_millis(DEFAULT_REPAINT_DELAY_MS),
            kind: DetectorKind::Face,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Listener {
    Detections,
    Error,
}

pub struct ObjectsRecogniser<S: FrameSource, P: Surface> {
    source: S,
    surface: P,
    options: RecogniserOptions,
    current: DetectorKind,
    listeners: EventDispatcher<Listener>,
    boxes: Vec<Region>,
    /// Canvas size; `None` until started.
    size: Option<(u32, u32)>,
    errors: u64,
}

impl<S: FrameSource, P: Surface> ObjectsRecogniser<S, P> {
    pub fn new(source: S, surface: P, options: RecogniserOptions) -> Self {
        Self {
            source,
            surface,
            options,
            current: options.kind,
            listeners: EventDispatcher::new(),
            boxes: Vec::new(),
            size: None,
            errors: 0,
        }
    }

    pub fn current_kind(&self) -> DetectorKind {
        self.current
    }

    pub fn errors(&self) -> u64 {
        self.errors
    }

    pub fn options(&self) -> &RecogniserOptions {
        &self.options
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Called once media is acquired. Returns the first submission.
    pub fn start(&mut self, width: u32, height: u32) -> Result<Vec<u8>, RecogniserError> {
        self.surface.resize(width, height);
        self.listeners.on(RECOGNITION_ERROR_CHANNEL, Listener::Error);
        self.listeners.on(self.current.channel(), Listener::Detections);
        self.size = Some((width, height));
        log::info!("Recognising on {} at {width}x{height}", self.current);
        self.next_submission()
    }

    /// Draws the current frame, packs it for the current kind, then
    /// overlays the latest boxes.
    pub fn submit_next(&mut self) -> Result<Vec<u8>, RecogniserError> {
        let frame = self.capture()?;
        self.surface
            .draw_frame(&frame)
            .map_err(|e| RecogniserError::Render(e.to_string()))?;
        let blob = encode_png(&frame).map_err(|e| RecogniserError::Encode(e.to_string()))?;
        let message = encode_submission(self.current.channel(), &blob)?;
        self.draw_boxes()?;
        Ok(message)
    }

    /// [`submit_next`](Self::submit_next), skipping frames that cannot be
    /// read, drawn or encoded.
    pub fn next_submission(&mut self) -> Result<Vec<u8>, RecogniserError> {
        let mut skipped = 0;
        loop {
            match self.submit_next() {
                Err(e) if e.is_per_frame() && skipped < MAX_SKIPPED_FRAMES => {
                    log::warn!("Skipping frame: {e}");
                    skipped += 1;
                }
                result => return result,
            }
        }
    }

    /// Applies one server event. Returns the next submission when the
    /// event was for us; events on channels nobody listens to are dropped.
    pub fn handle_event(&mut self, event: &ServerEvent) -> Result<Option<Vec<u8>>, RecogniserError> {
        let Some(&listener) = self.listeners.listeners(event.channel()).first() else {
            log::debug!("Dropping {} event with no listener", event.channel());
            return Ok(None);
        };

        match (listener, event) {
            (Listener::Detections, ServerEvent::Detections { boxes, .. }) => {
                log::debug!("{}: {} box(es)", self.current, boxes.len());
                self.boxes.clone_from(boxes);
            }
            (Listener::Error, ServerEvent::RecognitionError(payload)) => {
                self.errors += 1;
                log::error!(
                    "Recognition error on {}: {}",
                    payload.channel.as_deref().unwrap_or("<unknown>"),
                    payload.message
                );
            }
            _ => return Ok(None),
        }

        self.next_submission().map(Some)
    }

    /// Draws the current frame with the latest boxes, without submitting.
    /// A frame that cannot be shown is logged and skipped.
    pub fn repaint(&mut self) {
        if self.size.is_none() {
            return;
        }
        let drawn = self.capture().and_then(|frame| {
            self.surface
                .draw_frame(&frame)
                .map_err(|e| RecogniserError::Render(e.to_string()))?;
            self.draw_boxes()
        });
        if let Err(e) = drawn {
            log::warn!("Skipping repaint: {e}");
        }
    }

    /// Switches detector kind. Does nothing before start or when `kind` is
    /// already current; otherwise returns a submission for the new kind.
    pub fn change_recogniser(&mut self, kind: DetectorKind) -> Result<Option<Vec<u8>>, RecogniserError> {
        if self.size.is_none() || kind == self.current {
            return Ok(None);
        }
        self.listeners.off(self.current.channel());
        self.current = kind;
        self.listeners.on(self.current.channel(), Listener::Detections);
        log::info!("Switched to {kind}");
        self.next_submission().map(Some)
    }

    /// Grabs the next frame at canvas size.
    fn capture(&mut self) -> Result<Frame, RecogniserError> {
        let (width, height) = self.size.ok_or(RecogniserError::NotStarted)?;
        let frame = self.source.next_frame()?;
        fit_to(frame, width, height)
    }

    fn draw_boxes(&mut self) -> Result<(), RecogniserError> {
        self.surface
            .draw_boxes(&self.boxes)
            .map_err(|e| RecogniserError::Render(e.to_string()))
    }
}

/// Stretches `frame` to `width × height`, as a canvas `drawImage` would.
fn fit_to(frame: Frame, width: u32, height: u32) -> Result<Frame, RecogniserError> {
    if frame.width() == width && frame.height() == height {
        return Ok(frame);
    }
    let sequence = frame.sequence();
    let (src_w, src_h) = (frame.width(), frame.height());
    let image = image::RgbImage::from_raw(src_w, src_h, frame.data().to_vec())
        .ok_or_else(|| RecogniserError::Render(format!("{src_w}x{src_h} frame is not RGB")))?;
    let scaled = imageops::resize(&image, width, height, FilterType::Triangle);
    Ok(Frame::new(scaled.into_raw(), width, height, 3, sequence))
}
