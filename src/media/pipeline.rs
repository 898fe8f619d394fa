//! The assembled media pipeline
//!
//! One instance per streaming session, shared between the session transport
//! (network thread, video/audio entry points) and the presentation thread
//! (render stage via the frame swap). Teardown is two-phase so the decode
//! thread can never deadlock on the handoff: `begin_shutdown` unblocks the
//! swap before the transport threads are joined, `finish_shutdown` releases
//! the audio device afterwards.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::error;

use crate::error::{AudioError, MediaError};
use crate::media::audio::{AudioFormat, AudioPlayback};
use crate::media::decoder::VideoDecoder;
use crate::media::swap::FrameSwap;
use crate::media::video::VideoStage;

pub struct MediaPipeline {
    video: Mutex<VideoStage>,
    audio: Mutex<AudioPlayback>,
    swap: Arc<FrameSwap>,
    /// First fatal error seen by a callback; polled by the presentation side
    fault: Mutex<Option<AudioError>>,
}

impl MediaPipeline {
    pub fn new(decoder: Box<dyn VideoDecoder>) -> Self {
        let swap = Arc::new(FrameSwap::new());
        Self {
            video: Mutex::new(VideoStage::new(decoder, swap.clone())),
            audio: Mutex::new(AudioPlayback::new()),
            swap,
            fault: Mutex::new(None),
        }
    }

    /// Handoff handle for building the render stage.
    pub fn swap(&self) -> Arc<FrameSwap> {
        self.swap.clone()
    }

    /// Network-thread entry: one compressed video frame.
    pub fn video_frame(&self, data: &[u8]) {
        match self.video.lock().handle_frame(data) {
            Ok(()) => {}
            Err(MediaError::ShutDown) => {} // teardown raced a late frame
            Err(e) => error!("video stage failed: {}", e),
        }
    }

    /// Network-thread entry: the stream's audio format header.
    ///
    /// Device-open failure is fatal to the audio stage; it is recorded and
    /// surfaced through [`take_fault`](Self::take_fault), audio stays silent.
    pub fn audio_format(&self, channels: u16, sample_rate: u32) {
        let format = AudioFormat {
            channels,
            sample_rate,
        };
        if let Err(e) = self.audio.lock().open(format) {
            error!("failed to open audio playback: {}", e);
            self.fault.lock().get_or_insert(e);
        }
    }

    /// Network-thread entry: decoded interleaved PCM. Never blocks.
    pub fn queue_samples(&self, samples: &[i16]) {
        self.audio.lock().queue_samples(samples);
    }

    /// First fatal resource error seen by the pipeline, if any.
    pub fn take_fault(&self) -> Option<AudioError> {
        self.fault.lock().take()
    }

    /// Phase one of teardown: unblock the frame handoff so a decode thread
    /// waiting for a free slot can finish. Must run before the transport
    /// threads are joined.
    pub fn begin_shutdown(&self) {
        self.swap.shutdown();
    }

    /// Phase two of teardown: release the playback device. Must run after
    /// the transport threads are joined, while the decoder is dropped with
    /// the pipeline itself.
    pub fn finish_shutdown(&self) {
        self.audio.lock().close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::video::tests::{picture, ScriptedDecoder};
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn shutdown_releases_a_blocked_decode_thread() {
        let mut decoder = ScriptedDecoder::accepting();
        for _ in 0..8 {
            decoder.pictures.push_back(picture(32, 16));
        }
        let pipeline = Arc::new(MediaPipeline::new(Box::new(decoder)));

        // No consumer: the second picture blocks the decode thread on the swap
        let decode_pipeline = pipeline.clone();
        let decode = thread::spawn(move || {
            decode_pipeline.video_frame(b"frame");
        });

        thread::sleep(Duration::from_millis(50));
        assert!(!decode.is_finished(), "decode thread should be backpressured");

        let start = Instant::now();
        pipeline.begin_shutdown();
        decode.join().unwrap();
        pipeline.finish_shutdown();
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn late_frames_after_shutdown_are_ignored() {
        let pipeline = MediaPipeline::new(Box::new(ScriptedDecoder::accepting()));
        pipeline.begin_shutdown();
        pipeline.finish_shutdown();
        // Must neither panic nor deadlock
        pipeline.video_frame(b"late");
        pipeline.queue_samples(&[0; 32]);
    }
}
