use std::io::Cursor;

use thiserror::Error;

use crate::shared::frame::Frame;

use super::frame_decoder::FrameDecoder;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("image blob is empty")]
    Empty,
    #[error("image has zero width or height")]
    ZeroSized,
    #[error("unrecognised image data: {0}")]
    Image(#[from] image::ImageError),
}

/// Decodes any format the `image` crate recognises into an RGB frame.
pub fn decode_blob(blob: &[u8]) -> Result<Frame, DecodeError> {
    if blob.is_empty() {
        return Err(DecodeError::Empty);
    }
    let rgb = image::load_from_memory(blob)?.into_rgb8();
    let (width, height) = rgb.dimensions();
    if width == 0 || height == 0 {
        return Err(DecodeError::ZeroSized);
    }
    Ok(Frame::new(rgb.into_raw(), width, height, 3, 0))
}

/// Serialises a frame as PNG, the default blob format of a canvas capture.
pub fn encode_png(frame: &Frame) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let img = image::RgbImage::from_raw(frame.width(), frame.height(), frame.data().to_vec())
        .ok_or("Failed to create image from frame data")?;
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(buf)
}

/// [`FrameDecoder`] backed by the `image` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageBlobDecoder;

impl ImageBlobDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl FrameDecoder for ImageBlobDecoder {
    fn decode(&self, blob: &[u8]) -> Result<Frame, DecodeError> {
        decode_blob(blob)
    }
}
