use crate::shared::frame::Frame;

use super::image_blob_codec::DecodeError;

/// Turns an encoded image blob received over the socket into a [`Frame`].
pub trait FrameDecoder: Send + Sync {
    fn decode(&self, blob: &[u8]) -> Result<Frame, DecodeError>;
}
