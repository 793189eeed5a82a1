//! Wire-level types for the framecast pixel stream.
//!
//! The wire format is deliberately trivial: a server→client message is the raw
//! RGBA8 pixel buffer of one full frame, row-major, top-to-bottom, with no
//! header and no compression. Width and height are agreed out-of-band (both
//! sides are configured with the same values), so the only validation possible
//! on either end is the exact payload length.

#![forbid(unsafe_code)]

use bytes::Bytes;
use thiserror::Error;

/// Bytes per pixel (RGBA8).
pub const BYTES_PER_PIXEL: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DimensionsError {
    #[error("frame dimensions must be nonzero, got {width}x{height}")]
    Zero { width: u32, height: u32 },
    #[error("frame dimensions {width}x{height} overflow the addressable byte length")]
    Overflow { width: u32, height: u32 },
}

/// A produced frame's byte length does not match the configured dimensions.
///
/// Such a frame must never reach a connection; the stream has no framing
/// header, so a short or long payload would silently corrupt every client's
/// canvas reconstruction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("frame payload is {actual} bytes, expected {expected} ({width}x{height}x4)")]
pub struct MalformedFrame {
    pub width: u32,
    pub height: u32,
    pub expected: usize,
    pub actual: usize,
}

/// Fixed frame dimensions, agreed out-of-band with every client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    width: u32,
    height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Result<Self, DimensionsError> {
        if width == 0 || height == 0 {
            return Err(DimensionsError::Zero { width, height });
        }
        let pixels = (width as u64).checked_mul(height as u64);
        let bytes = pixels.and_then(|p| p.checked_mul(BYTES_PER_PIXEL as u64));
        match bytes {
            Some(len) if len <= usize::MAX as u64 => Ok(Self { width, height }),
            _ => Err(DimensionsError::Overflow { width, height }),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Exact payload length of one frame at these dimensions.
    pub fn byte_len(&self) -> usize {
        // Checked in `new`.
        self.width as usize * self.height as usize * BYTES_PER_PIXEL
    }

    fn check(&self, payload_len: usize) -> Result<(), MalformedFrame> {
        let expected = self.byte_len();
        if payload_len != expected {
            return Err(MalformedFrame {
                width: self.width,
                height: self.height,
                expected,
                actual: payload_len,
            });
        }
        Ok(())
    }
}

impl std::fmt::Display for Dimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Validate a raw RGBA buffer and produce the binary message payload.
///
/// The encoding is the identity: on success the returned `Bytes` are the input
/// bytes verbatim (same allocation, no copy).
pub fn encode_frame(dims: Dimensions, payload: Bytes) -> Result<Bytes, MalformedFrame> {
    dims.check(payload.len())?;
    Ok(payload)
}

/// Validate a received binary message payload as one full frame.
///
/// Mirror of [`encode_frame`]; receivers with their own local dimensions use
/// this to drop truncated or oversized messages instead of rendering garbage.
pub fn decode_frame(dims: Dimensions, payload: Bytes) -> Result<Bytes, MalformedFrame> {
    dims.check(payload.len())?;
    Ok(payload)
}
