//! Video decoder boundary
//!
//! The actual codec lives outside this crate. Whatever wraps it must expose
//! the push/pull contract below: `push_compressed` may report a full
//! internal buffer, in which case pending pictures have to be pulled before
//! the push is retried.

use crate::error::MediaError;

/// Result of pushing one compressed frame into the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushStatus {
    Accepted,
    /// The decoder's internal buffer is full; pull pending output, then retry
    BufferFull,
}

/// One decoded picture in planar YUV 4:2:0, with per-plane strides.
#[derive(Debug, Clone)]
pub struct DecodedPicture {
    pub width: u32,
    pub height: u32,
    /// Y, U, V plane data; U and V are quarter-size
    pub planes: [Vec<u8>; 3],
    /// Bytes per row of each plane; may exceed the visible width
    pub strides: [usize; 3],
}

impl DecodedPicture {
    /// Visible width of plane `i` in bytes.
    pub fn plane_width(&self, i: usize) -> usize {
        if i == 0 {
            self.width as usize
        } else {
            self.width as usize / 2
        }
    }

    /// Row count of plane `i`.
    pub fn plane_height(&self, i: usize) -> usize {
        if i == 0 {
            self.height as usize
        } else {
            self.height as usize / 2
        }
    }
}

/// Streaming video decoder contract.
pub trait VideoDecoder: Send {
    fn push_compressed(&mut self, data: &[u8]) -> Result<PushStatus, MediaError>;
    fn pull_decoded(&mut self) -> Result<Option<DecodedPicture>, MediaError>;
}
