use thiserror::Error;

use crate::detection::domain::detector_kind::DetectorKind;
use crate::detection::domain::object_detector::DetectOptions;
use crate::detection::infrastructure::detector_registry::{DetectorError, DetectorRegistry};
use crate::imaging::frame_decoder::FrameDecoder;
use crate::imaging::image_blob_codec::DecodeError;
use crate::pipeline::region_filter::apply_options;
use crate::protocol::server_event::{ErrorPayload, ErrorReason, ServerEvent};
use crate::shared::region::Region;

#[derive(Error, Debug)]
pub enum RecognitionError {
    #[error("could not decode frame: {0}")]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Detector(#[from] DetectorError),
}

impl RecognitionError {
    pub fn reason(&self) -> ErrorReason {
        match self {
            RecognitionError::Decode(_) => ErrorReason::Decode,
            RecognitionError::Detector(DetectorError::Unavailable { .. }) => {
                ErrorReason::DetectorUnavailable
            }
            RecognitionError::Detector(_) => ErrorReason::Detection,
        }
    }
}

/// Decodes one submitted blob, runs the kind's detector and shapes the
/// single reply event.
///
/// Blocking: callers on an async runtime run it on the blocking pool.
pub struct RecogniseFrameUseCase {
    decoder: Box<dyn FrameDecoder>,
    registry: DetectorRegistry,
    options: DetectOptions,
}

impl RecogniseFrameUseCase {
    pub fn new(
        decoder: Box<dyn FrameDecoder>,
        registry: DetectorRegistry,
        options: DetectOptions,
    ) -> Self {
        Self {
            decoder,
            registry,
            options,
        }
    }

    /// Always yields exactly one event: the boxes on the kind's channel,
    /// or a `recognition-error`.
    pub fn execute(&self, kind: DetectorKind, blob: &[u8]) -> ServerEvent {
        reply(kind, self.detect(kind, blob))
    }

    /// As [`execute`](Self::execute) for a requester that may go away.
    /// `live` is checked before decoding and again once the detector is
    /// free; `None` means the frame was dropped without running inference.
    pub fn execute_while(
        &self,
        kind: DetectorKind,
        blob: &[u8],
        live: &dyn Fn() -> bool,
    ) -> Option<ServerEvent> {
        if !live() {
            return None;
        }
        self.detect_while(kind, blob, live)
            .transpose()
            .map(|result| reply(kind, result))
    }

    pub fn detect(&self, kind: DetectorKind, blob: &[u8]) -> Result<Vec<Region>, RecognitionError> {
        self.detect_while(kind, blob, &|| true)
            .map(Option::unwrap_or_default)
    }

    fn detect_while(
        &self,
        kind: DetectorKind,
        blob: &[u8],
        live: &dyn Fn() -> bool,
    ) -> Result<Option<Vec<Region>>, RecognitionError> {
        let frame = self.decoder.decode(blob)?;
        let regions = self.registry.detect_while(kind, &frame, live)?;
        Ok(regions.map(|r| apply_options(&r, &self.options)))
    }
}

fn reply(kind: DetectorKind, result: Result<Vec<Region>, RecognitionError>) -> ServerEvent {
    match result {
        Ok(boxes) => {
            log::debug!("{kind}: {} box(es)", boxes.len());
            ServerEvent::Detections { kind, boxes }
        }
        Err(err) => {
            log::warn!("{kind}: {err}");
            ServerEvent::RecognitionError(ErrorPayload::new(
                Some(kind.channel()),
                err.reason(),
                err.to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::object_detector::ObjectDetector;
    use crate::imaging::image_blob_codec::{encode_png, ImageBlobDecoder};
    use crate::shared::frame::Frame;

    /// Reports one box covering the top-left quarter of whatever it sees.
    struct QuarterDetector;

    impl ObjectDetector for QuarterDetector {
        fn detect(&mut self, frame: &Frame) -> Result<Vec<Region>, Box<dyn std::error::Error>> {
            Ok(vec![Region::new(
                0,
                0,
                frame.width() as i32 / 2,
                frame.height() as i32 / 2,
            )])
        }
    }

    struct EmptyDetector;

    impl ObjectDetector for EmptyDetector {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<Region>, Box<dyn std::error::Error>> {
            Ok(vec![])
        }
    }

    struct BrokenDetector;

    impl ObjectDetector for BrokenDetector {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<Region>, Box<dyn std::error::Error>> {
            Err("session lost".into())
        }
    }

    fn use_case(detectors: Vec<(DetectorKind, Box<dyn ObjectDetector>)>) -> RecogniseFrameUseCase {
        RecogniseFrameUseCase::new(
            Box::new(ImageBlobDecoder::new()),
            DetectorRegistry::from_detectors(detectors),
            DetectOptions::default(),
        )
    }

    fn blank_png(width: u32, height: u32) -> Vec<u8> {
        encode_png(&Frame::blank(width, height, 0)).unwrap()
    }

    #[test]
    fn test_boxes_are_in_submitted_image_space() {
        let uc = use_case(vec![(DetectorKind::Face, Box::new(QuarterDetector))]);
        let event = uc.execute(DetectorKind::Face, &blank_png(640, 480));
        assert_eq!(
            event,
            ServerEvent::Detections {
                kind: DetectorKind::Face,
                boxes: vec![Region::new(0, 0, 320, 240)]
            }
        );
    }

    #[test]
    fn test_blank_frame_yields_empty_list() {
        let uc = use_case(vec![(DetectorKind::Face, Box::new(EmptyDetector))]);
        let event = uc.execute(DetectorKind::Face, &blank_png(640, 480));
        assert_eq!(
            event,
            ServerEvent::Detections {
                kind: DetectorKind::Face,
                boxes: vec![]
            }
        );
    }

    #[test]
    fn test_undecodable_blob_is_decode_error() {
        let uc = use_case(vec![(DetectorKind::Face, Box::new(EmptyDetector))]);
        let event = uc.execute(DetectorKind::Face, b"\x00\x01garbage");
        match event {
            ServerEvent::RecognitionError(payload) => {
                assert_eq!(payload.reason, ErrorReason::Decode);
                assert_eq!(payload.channel.as_deref(), Some("face-recognition"));
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_detector_is_unavailable_error() {
        let uc = use_case(vec![(DetectorKind::Face, Box::new(EmptyDetector))]);
        let event = uc.execute(DetectorKind::Palm, &blank_png(32, 32));
        assert!(matches!(
            event,
            ServerEvent::RecognitionError(ErrorPayload { reason: ErrorReason::DetectorUnavailable, .. })
        ));
    }

    #[test]
    fn test_detector_failure_is_detection_error() {
        let uc = use_case(vec![(DetectorKind::Palm, Box::new(BrokenDetector))]);
        let event = uc.execute(DetectorKind::Palm, &blank_png(32, 32));
        match event {
            ServerEvent::RecognitionError(payload) => {
                assert_eq!(payload.reason, ErrorReason::Detection);
                assert!(payload.message.contains("session lost"));
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn test_options_are_applied() {
        let uc = RecogniseFrameUseCase::new(
            Box::new(ImageBlobDecoder::new()),
            DetectorRegistry::from_detectors(vec![(DetectorKind::Face, Box::new(QuarterDetector))]),
            DetectOptions {
                min_size: 100,
                ..Default::default()
            },
        );
        let boxes = uc.detect(DetectorKind::Face, &blank_png(64, 64)).unwrap();
        assert!(boxes.is_empty());
    }

    #[test]
    fn test_execute_while_drops_frame_when_not_live() {
        let uc = use_case(vec![(DetectorKind::Face, Box::new(BrokenDetector))]);
        assert_eq!(uc.execute_while(DetectorKind::Face, b"garbage", &|| false), None);
    }

    #[test]
    fn test_execute_while_live_matches_execute() {
        let uc = use_case(vec![(DetectorKind::Face, Box::new(QuarterDetector))]);
        let blob = blank_png(64, 64);
        assert_eq!(
            uc.execute_while(DetectorKind::Face, &blob, &|| true),
            Some(uc.execute(DetectorKind::Face, &blob))
        );
    }

    #[test]
    fn test_requester_gone_after_decode_skips_detector() {
        use std::cell::Cell;

        let uc = use_case(vec![(DetectorKind::Face, Box::new(BrokenDetector))]);
        let checks = Cell::new(0);
        // Live for the first check only, as if the socket closed while the
        // frame waited for the detector.
        let live = || {
            checks.set(checks.get() + 1);
            checks.get() == 1
        };
        assert_eq!(uc.execute_while(DetectorKind::Face, &blank_png(16, 16), &live), None);
        assert_eq!(checks.get(), 2);
    }
}
