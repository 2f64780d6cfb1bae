//! Length-prefixed framing for byte-stream transports.
//!
//! Layout: `[u32 big-endian length][message bytes]`. The length covers the
//! message only.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

pub const LENGTH_FIELD_LEN: usize = 4;
pub const MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("invalid frame length: {0}")]
    InvalidLength(u32),

    #[error("frame too large: {0} bytes")]
    FrameTooLarge(u32),

    #[error("payload too large: {0} bytes")]
    PayloadTooLarge(usize),
}

/// Encode one message into the provided buffer.
#[inline(always)]
pub fn encode_frame(message: &[u8], dst: &mut BytesMut) -> Result<(), FrameError> {
    let len = message.len();
    if len == 0 {
        return Err(FrameError::InvalidLength(0));
    }
    if len > MAX_FRAME_SIZE as usize {
        return Err(FrameError::PayloadTooLarge(len));
    }

    dst.reserve(LENGTH_FIELD_LEN + len);
    dst.put_u32(len as u32);
    dst.put_slice(message);
    Ok(())
}

/// Encode one message into a standalone frame, ready to be shared between peers.
pub fn to_frame(message: &[u8]) -> Result<Bytes, FrameError> {
    let mut buf = BytesMut::with_capacity(LENGTH_FIELD_LEN + message.len());
    encode_frame(message, &mut buf)?;
    Ok(buf.freeze())
}

/// Try to decode a single message from the buffer.
///
/// Returns `Ok(None)` if there is not yet enough data to decode a full frame.
#[inline(always)]
pub fn try_decode_frame(src: &mut BytesMut) -> Result<Option<Bytes>, FrameError> {
    if src.len() < LENGTH_FIELD_LEN {
        return Ok(None);
    }

    let mut length_bytes = &src[..LENGTH_FIELD_LEN];
    let frame_len = length_bytes.get_u32();

    if frame_len == 0 {
        return Err(FrameError::InvalidLength(frame_len));
    }

    if frame_len > MAX_FRAME_SIZE {
        return Err(FrameError::FrameTooLarge(frame_len));
    }

    let total = LENGTH_FIELD_LEN + frame_len as usize;
    if src.len() < total {
        src.reserve(total - src.len());
        return Ok(None);
    }

    let mut frame_bytes = src.split_to(total);
    frame_bytes.advance(LENGTH_FIELD_LEN);
    Ok(Some(frame_bytes.freeze()))
}
