//! Audio playback stage
//!
//! The playback device runs on its own thread (cpal streams are not `Send`);
//! the network thread only ever pushes samples into a lock-free queue, so
//! audio never blocks the decode path. Queue overflow is counted and logged,
//! not fatal. The compressed audio stream is Opus; [`StreamAudioDecoder`]
//! turns packets into interleaved PCM.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam::queue::ArrayQueue;
use crossbeam_channel::bounded;
use opus::{Channels, Decoder};
use tracing::{info, warn};

use crate::constants::AUDIO_QUEUE_MS;
use crate::error::AudioError;

/// Stream audio format announced by the session's audio header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub channels: u16,
    pub sample_rate: u32,
}

/// Playback device wrapper. One device at a time; `open` is idempotent for
/// an unchanged format and rebuilds the stream when the format changes.
pub struct AudioPlayback {
    format: Option<AudioFormat>,
    queue: Option<Arc<ArrayQueue<i16>>>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    overflowed: Arc<AtomicU64>,
}

impl AudioPlayback {
    pub fn new() -> Self {
        Self {
            format: None,
            queue: None,
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
            overflowed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Open the playback device for the given format.
    ///
    /// A failure to open the device is fatal to the audio stage and is
    /// returned to the caller; there is no retry here.
    pub fn open(&mut self, format: AudioFormat) -> Result<(), AudioError> {
        if self.format == Some(format) && self.running.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.close();

        let capacity =
            (format.sample_rate as usize * format.channels as usize * AUDIO_QUEUE_MS as usize)
                / 1000;
        let queue = Arc::new(ArrayQueue::<i16>::new(capacity.max(1)));

        let running = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = bounded::<Result<(), AudioError>>(1);

        let thread = {
            let queue = queue.clone();
            let running = running.clone();
            thread::Builder::new()
                .name("audio-playback".into())
                .spawn(move || playback_thread(format, queue, running, ready_tx))
                .map_err(|e| AudioError::StreamError(e.to_string()))?
        };

        match ready_rx.recv_timeout(Duration::from_secs(2)) {
            Ok(Ok(())) => {
                info!(
                    channels = format.channels,
                    sample_rate = format.sample_rate,
                    "audio playback device opened"
                );
                self.format = Some(format);
                self.queue = Some(queue);
                self.running = running;
                self.thread = Some(thread);
                Ok(())
            }
            Ok(Err(e)) => {
                running.store(false, Ordering::SeqCst);
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                running.store(false, Ordering::SeqCst);
                let _ = thread.join();
                Err(AudioError::StreamError(
                    "playback device did not come up in time".into(),
                ))
            }
        }
    }

    /// Enqueue interleaved PCM. Never blocks; overflow drops the excess
    /// samples and bumps a counter.
    pub fn queue_samples(&self, samples: &[i16]) {
        let Some(queue) = &self.queue else {
            return; // device not open, nothing to do with these
        };

        let mut dropped = 0u64;
        for &sample in samples {
            if queue.push(sample).is_err() {
                dropped += 1;
            }
        }
        if dropped > 0 {
            let total = self.overflowed.fetch_add(dropped, Ordering::Relaxed) + dropped;
            if total == dropped || total % 4800 < dropped {
                warn!(dropped, total, "audio queue overflow");
            }
        }
    }

    pub fn format(&self) -> Option<AudioFormat> {
        self.format
    }

    pub fn samples_overflowed(&self) -> u64 {
        self.overflowed.load(Ordering::Relaxed)
    }

    pub fn close(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
        self.format = None;
        self.queue = None;
    }
}

impl Default for AudioPlayback {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AudioPlayback {
    fn drop(&mut self) {
        self.close();
    }
}

fn playback_thread(
    format: AudioFormat,
    queue: Arc<ArrayQueue<i16>>,
    running: Arc<AtomicBool>,
    ready_tx: crossbeam_channel::Sender<Result<(), AudioError>>,
) {
    let host = cpal::default_host();
    let device = match host.default_output_device() {
        Some(device) => device,
        None => {
            let _ = ready_tx.send(Err(AudioError::DeviceNotFound(
                "no default output device".into(),
            )));
            return;
        }
    };

    let config = cpal::StreamConfig {
        channels: format.channels,
        sample_rate: cpal::SampleRate(format.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let stream = device.build_output_stream(
        &config,
        move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
            for slot in data.iter_mut() {
                // zero-fill on underrun; silence beats blocking
                *slot = queue.pop().unwrap_or(0);
            }
        },
        |err| {
            warn!("audio stream error: {}", err);
        },
        None,
    );

    match stream {
        Ok(stream) => {
            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(AudioError::StreamError(e.to_string())));
                return;
            }
            let _ = ready_tx.send(Ok(()));

            // Keep the stream alive until the stage is closed
            while running.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_millis(10));
            }
        }
        Err(e) => {
            let _ = ready_tx.send(Err(AudioError::StreamError(e.to_string())));
        }
    }
}

/// Opus decoder for the session's compressed audio stream.
pub struct StreamAudioDecoder {
    decoder: Decoder,
    channels: u16,
    /// Reused between packets to avoid per-packet allocation
    pcm: Vec<i16>,
}

impl StreamAudioDecoder {
    pub fn new(sample_rate: u32, channels: u16) -> Result<Self, AudioError> {
        let opus_channels = match channels {
            1 => Channels::Mono,
            2 => Channels::Stereo,
            _ => {
                return Err(AudioError::UnsupportedFormat(format!(
                    "{channels} channels"
                )))
            }
        };
        let decoder = Decoder::new(sample_rate, opus_channels)
            .map_err(|e| AudioError::DecoderInit(e.to_string()))?;

        // 120 ms at 48 kHz stereo is the largest packet Opus can produce
        let pcm = vec![0i16; 48000 * 2 * 120 / 1000];
        Ok(Self {
            decoder,
            channels,
            pcm,
        })
    }

    /// Decode one packet to interleaved PCM.
    pub fn decode(&mut self, packet: &[u8]) -> Result<&[i16], AudioError> {
        let samples = self
            .decoder
            .decode(packet, &mut self.pcm, false)
            .map_err(|e| AudioError::DecodingFailed(e.to_string()))?;
        Ok(&self.pcm[..samples * self.channels as usize])
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoder_rejects_odd_channel_counts() {
        assert!(StreamAudioDecoder::new(48000, 2).is_ok());
        assert!(StreamAudioDecoder::new(48000, 6).is_err());
    }

    #[test]
    fn queue_samples_without_device_is_a_no_op() {
        let playback = AudioPlayback::new();
        playback.queue_samples(&[1, 2, 3]);
        assert_eq!(playback.samples_overflowed(), 0);
    }

    #[test]
    fn open_tolerates_missing_device() {
        // CI machines may have no audio device; either outcome must be
        // clean, never a hang or panic.
        let mut playback = AudioPlayback::new();
        match playback.open(AudioFormat {
            channels: 2,
            sample_rate: 48000,
        }) {
            Ok(()) => {
                playback.queue_samples(&[0; 960]);
                playback.close();
            }
            Err(e) => {
                tracing::debug!("no audio device in test environment: {}", e);
            }
        }
    }
}
