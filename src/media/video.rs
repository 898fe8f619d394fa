//! Video decode stage
//!
//! Runs on the session's network thread. Each compressed frame is pushed
//! into the decoder with a bounded drain-and-retry loop; decoded pictures
//! are packed (stride removed) into the frame swap for the render thread.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::constants::DECODER_PUSH_RETRIES;
use crate::error::MediaError;
use crate::media::decoder::{DecodedPicture, PushStatus, VideoDecoder};
use crate::media::swap::{FrameBuffer, FrameSwap};

pub struct VideoStage {
    decoder: Box<dyn VideoDecoder>,
    swap: Arc<FrameSwap>,
    dimensions: Option<(u32, u32)>,
    frames_published: u64,
    frames_dropped: u64,
}

impl VideoStage {
    pub fn new(decoder: Box<dyn VideoDecoder>, swap: Arc<FrameSwap>) -> Self {
        Self {
            decoder,
            swap,
            dimensions: None,
            frames_published: 0,
            frames_dropped: 0,
        }
    }

    /// Feed one compressed frame through the decoder.
    ///
    /// A decoder that reports a full buffer gets its pending output drained
    /// before the push is retried, at most [`DECODER_PUSH_RETRIES`] times;
    /// if it still refuses, the frame is dropped and the stream continues.
    /// Only pipeline shutdown is surfaced as an error.
    pub fn handle_frame(&mut self, data: &[u8]) -> Result<(), MediaError> {
        let mut accepted = false;
        for _ in 0..DECODER_PUSH_RETRIES {
            match self.decoder.push_compressed(data) {
                Ok(PushStatus::Accepted) => {
                    accepted = true;
                    break;
                }
                Ok(PushStatus::BufferFull) => {
                    self.drain_pending()?;
                }
                Err(e) => {
                    warn!("decoder rejected frame: {}", e);
                    self.frames_dropped += 1;
                    return Ok(());
                }
            }
        }

        if !accepted {
            warn!(
                attempts = DECODER_PUSH_RETRIES,
                "decoder made no progress, dropping frame"
            );
            self.frames_dropped += 1;
            return Ok(());
        }

        self.drain_pending()
    }

    pub fn frames_published(&self) -> u64 {
        self.frames_published
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped
    }

    /// Pull every picture the decoder has ready and publish each one.
    fn drain_pending(&mut self) -> Result<(), MediaError> {
        loop {
            match self.decoder.pull_decoded() {
                Ok(Some(picture)) => self.publish(picture)?,
                Ok(None) => return Ok(()),
                Err(e) => {
                    // one bad picture, not a dead stream
                    warn!("failed to pull decoded picture: {}", e);
                    return Ok(());
                }
            }
        }
    }

    fn publish(&mut self, picture: DecodedPicture) -> Result<(), MediaError> {
        let dims = (picture.width, picture.height);
        if self.dimensions != Some(dims) {
            info!(
                width = picture.width,
                height = picture.height,
                "video dimensions changed"
            );
            self.dimensions = Some(dims);
        }

        self.swap.publish(|buf| pack_picture(&picture, buf))?;
        self.frames_published += 1;
        if self.frames_published <= 3 {
            debug!(frame = self.frames_published, "published decoded frame");
        }
        Ok(())
    }
}

/// Copy a decoded picture into a frame slot, dropping any stride padding.
fn pack_picture(picture: &DecodedPicture, buf: &mut FrameBuffer) {
    buf.width = picture.width;
    buf.height = picture.height;

    for i in 0..3 {
        let width = picture.plane_width(i);
        let height = picture.plane_height(i);
        let stride = picture.strides[i];
        let plane = &mut buf.planes[i];

        plane.clear();
        plane.reserve(width * height);
        if stride == width {
            plane.extend_from_slice(&picture.planes[i][..width * height]);
        } else {
            for row in 0..height {
                let start = row * stride;
                plane.extend_from_slice(&picture.planes[i][start..start + width]);
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::time::Duration;

    /// Scriptable decoder: a queue of push outcomes plus a queue of pictures
    /// that `pull_decoded` hands out.
    pub(crate) struct ScriptedDecoder {
        pub pushes: VecDeque<PushStatus>,
        pub pictures: VecDeque<DecodedPicture>,
    }

    impl ScriptedDecoder {
        pub fn accepting() -> Self {
            Self {
                pushes: VecDeque::new(),
                pictures: VecDeque::new(),
            }
        }
    }

    impl VideoDecoder for ScriptedDecoder {
        fn push_compressed(&mut self, _data: &[u8]) -> Result<PushStatus, MediaError> {
            Ok(self.pushes.pop_front().unwrap_or(PushStatus::Accepted))
        }

        fn pull_decoded(&mut self) -> Result<Option<DecodedPicture>, MediaError> {
            Ok(self.pictures.pop_front())
        }
    }

    pub(crate) fn picture(width: u32, height: u32) -> DecodedPicture {
        let (w, h) = (width as usize, height as usize);
        DecodedPicture {
            width,
            height,
            planes: [vec![0; w * h], vec![0; w * h / 4], vec![0; w * h / 4]],
            strides: [w, w / 2, w / 2],
        }
    }

    #[test]
    fn accepted_frame_is_published() {
        let mut decoder = ScriptedDecoder::accepting();
        decoder.pictures.push_back(picture(64, 32));

        let swap = Arc::new(FrameSwap::new());
        let mut stage = VideoStage::new(Box::new(decoder), swap.clone());
        stage.handle_frame(b"frame").unwrap();

        let dims = swap
            .consume(Duration::from_secs(1), |f| (f.width, f.height))
            .unwrap();
        assert_eq!(dims, Some((64, 32)));
        assert_eq!(stage.frames_published(), 1);
    }

    #[test]
    fn buffer_full_drains_then_retries() {
        let mut decoder = ScriptedDecoder::accepting();
        decoder.pushes.push_back(PushStatus::BufferFull);
        decoder.pushes.push_back(PushStatus::Accepted);
        decoder.pictures.push_back(picture(64, 32));

        let swap = Arc::new(FrameSwap::new());
        let mut stage = VideoStage::new(Box::new(decoder), swap.clone());
        stage.handle_frame(b"frame").unwrap();

        assert_eq!(stage.frames_published(), 1);
        assert_eq!(stage.frames_dropped(), 0);
    }

    #[test]
    fn stalled_decoder_drops_frame_and_pipeline_survives() {
        let mut decoder = ScriptedDecoder::accepting();
        for _ in 0..DECODER_PUSH_RETRIES + 2 {
            decoder.pushes.push_back(PushStatus::BufferFull);
        }

        let swap = Arc::new(FrameSwap::new());
        let mut stage = VideoStage::new(Box::new(decoder), swap.clone());

        stage.handle_frame(b"stalled").unwrap();
        assert_eq!(stage.frames_dropped(), 1);
        assert_eq!(stage.frames_published(), 0);

        // The next frame goes through the (now accepting) decoder unharmed
        stage.handle_frame(b"next").unwrap();
        assert_eq!(stage.frames_dropped(), 1);
    }

    #[test]
    fn stride_padding_is_removed() {
        let mut pic = picture(4, 2);
        // Widen the Y stride by 2 bytes of padding per row
        pic.strides[0] = 6;
        pic.planes[0] = vec![
            1, 1, 1, 1, 9, 9, //
            2, 2, 2, 2, 9, 9,
        ];

        let mut buf = FrameBuffer::default();
        pack_picture(&pic, &mut buf);
        assert_eq!(buf.planes[0], vec![1, 1, 1, 1, 2, 2, 2, 2]);
    }
}
