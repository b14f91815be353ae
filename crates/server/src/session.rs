//! One relay session per connected socket.
//!
//! Submissions are decoded on the socket task and detections run on the
//! blocking pool, so a slow frame never holds up the next one. Replies go
//! out through an event channel in completion order, which may differ from
//! submission order. Frames still queued for a detector when the socket
//! closes are dropped before inference.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use recognition_core::detection::domain::detector_kind::DetectorKind;
use recognition_core::pipeline::recognise_frame_use_case::RecogniseFrameUseCase;
use recognition_core::protocol::dispatcher::EventDispatcher;
use recognition_core::protocol::envelope::decode_submission;
use recognition_core::protocol::server_event::{ErrorReason, ServerEvent};
use recognition_core::shared::constants::DEFAULT_MAX_FRAME_BYTES;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionLimits {
    pub max_frame_bytes: usize,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

/// Outbound half shared with in-flight detections. `None` once the
/// session is gone; the lock makes "check connected, then send" atomic
/// with respect to disconnect.
type EventSink = Arc<Mutex<Option<mpsc::UnboundedSender<ServerEvent>>>>;

pub struct RelaySession {
    id: u64,
    handlers: EventDispatcher<DetectorKind>,
    use_case: Arc<RecogniseFrameUseCase>,
    sink: EventSink,
    in_flight: Arc<AtomicUsize>,
    limits: SessionLimits,
}

impl RelaySession {
    /// Opens a session with a handler for every detector channel. The
    /// receiver yields every reply destined for this socket.
    pub fn connect(
        id: u64,
        use_case: Arc<RecogniseFrameUseCase>,
        limits: SessionLimits,
    ) -> (Self, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut handlers = EventDispatcher::new();
        for &kind in DetectorKind::ALL {
            handlers.on(kind.channel(), kind);
        }
        let session = Self {
            id,
            handlers,
            use_case,
            sink: Arc::new(Mutex::new(Some(tx))),
            in_flight: Arc::new(AtomicUsize::new(0)),
            limits,
        };
        (session, rx)
    }

    pub fn is_connected(&self) -> bool {
        !self.handlers.is_closed()
    }

    /// Detections started but not yet finished.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Handles one binary message. Must be called inside a Tokio runtime.
    ///
    /// Every accepted message produces exactly one reply: the boxes on the
    /// submission's channel or a `recognition-error`.
    pub fn submit(&self, message: &[u8]) {
        if !self.is_connected() {
            log::debug!("Session {}: ignoring submission after disconnect", self.id);
            return;
        }

        let submission = match decode_submission(message) {
            Ok(submission) => submission,
            Err(e) => {
                log::warn!("Session {}: malformed submission: {e}", self.id);
                self.emit(ServerEvent::error(None, ErrorReason::Malformed, e.to_string()));
                return;
            }
        };

        let Some(&kind) = self.handlers.listeners(submission.channel).first() else {
            log::warn!(
                "Session {}: no handler for channel '{}'",
                self.id,
                submission.channel
            );
            self.emit(ServerEvent::error(
                Some(submission.channel),
                ErrorReason::UnknownChannel,
                format!("unknown channel '{}'", submission.channel),
            ));
            return;
        };

        if submission.blob.len() > self.limits.max_frame_bytes {
            self.emit(ServerEvent::error(
                Some(submission.channel),
                ErrorReason::FrameTooLarge,
                format!(
                    "frame of {} bytes exceeds limit of {} bytes",
                    submission.blob.len(),
                    self.limits.max_frame_bytes
                ),
            ));
            return;
        }

        self.spawn_detection(kind, submission.blob.to_vec());
    }

    /// Replies to a message type the relay does not accept (e.g. text).
    pub fn reject(&self, message: impl Into<String>) {
        self.emit(ServerEvent::error(
            None,
            ErrorReason::UnsupportedMessage,
            message,
        ));
    }

    /// Drops every handler and discards results of detections still running.
    pub fn disconnect(&mut self) {
        if self.handlers.is_closed() {
            return;
        }
        self.handlers.remove_all();
        if let Ok(mut sink) = self.sink.lock() {
            sink.take();
        }
        log::debug!(
            "Session {}: closed with {} detection(s) in flight",
            self.id,
            self.in_flight()
        );
    }

    fn spawn_detection(&self, kind: DetectorKind, blob: Vec<u8>) {
        let id = self.id;
        let use_case = Arc::clone(&self.use_case);
        let sink = Arc::clone(&self.sink);
        let in_flight = Arc::clone(&self.in_flight);
        in_flight.fetch_add(1, Ordering::SeqCst);

        tokio::spawn(async move {
            let live_sink = Arc::clone(&sink);
            let joined = tokio::task::spawn_blocking(move || {
                use_case.execute_while(kind, &blob, &|| is_open(&live_sink))
            })
            .await;
            in_flight.fetch_sub(1, Ordering::SeqCst);

            let event = match joined {
                Ok(Some(event)) => event,
                Ok(None) => {
                    log::debug!("Session {id}: skipped queued {kind} frame after disconnect");
                    return;
                }
                Err(e) => {
                    log::error!("Session {id}: {kind} detection task failed: {e}");
                    ServerEvent::error(
                        Some(kind.channel()),
                        ErrorReason::Detection,
                        "detection task failed",
                    )
                }
            };

            if !send(&sink, event) {
                log::debug!("Session {id}: dropped {kind} result after disconnect");
            }
        });
    }

    fn emit(&self, event: ServerEvent) {
        send(&self.sink, event);
    }
}

impl Drop for RelaySession {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn is_open(sink: &EventSink) -> bool {
    sink.lock().map(|guard| guard.is_some()).unwrap_or(false)
}

fn send(sink: &EventSink, event: ServerEvent) -> bool {
    match sink.lock() {
        Ok(guard) => guard.as_ref().is_some_and(|tx| tx.send(event).is_ok()),
        Err(_) => false,
    }
}
