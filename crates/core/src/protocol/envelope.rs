//! Client → server frame submission.
//!
//! Binary layout:
//!   name_len(1) + channel name (UTF-8, name_len bytes) + image blob

use thiserror::Error;

/// Longest channel name that fits the one-byte length prefix.
pub const MAX_CHANNEL_NAME_LEN: usize = u8::MAX as usize;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("empty message")]
    Empty,
    #[error("channel name is empty")]
    EmptyChannel,
    #[error("channel name length {declared} exceeds message body of {available} bytes")]
    Truncated { declared: usize, available: usize },
    #[error("channel name is not valid UTF-8")]
    InvalidChannel,
    #[error("channel name longer than 255 bytes")]
    ChannelTooLong,
}

/// A decoded submission borrowing from the received message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submission<'a> {
    pub channel: &'a str,
    pub blob: &'a [u8],
}

pub fn encode_submission(channel: &str, blob: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let name = channel.as_bytes();
    if name.is_empty() {
        return Err(ProtocolError::EmptyChannel);
    }
    if name.len() > MAX_CHANNEL_NAME_LEN {
        return Err(ProtocolError::ChannelTooLong);
    }
    let mut buf = Vec::with_capacity(1 + name.len() + blob.len());
    buf.push(name.len() as u8);
    buf.extend_from_slice(name);
    buf.extend_from_slice(blob);
    Ok(buf)
}

pub fn decode_submission(message: &[u8]) -> Result<Submission<'_>, ProtocolError> {
    let (&name_len, rest) = message.split_first().ok_or(ProtocolError::Empty)?;
    let name_len = name_len as usize;
    if name_len == 0 {
        return Err(ProtocolError::EmptyChannel);
    }
    if name_len > rest.len() {
        return Err(ProtocolError::Truncated {
            declared: name_len,
            available: rest.len(),
        });
    }
    let (name, blob) = rest.split_at(name_len);
    let channel = std::str::from_utf8(name).map_err(|_| ProtocolError::InvalidChannel)?;
    Ok(Submission { channel, blob })
}
