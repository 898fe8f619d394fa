//! Realtime media pipeline
//!
//! Two independent stages feed one presentation surface. The video stage
//! runs on the session's network thread: compressed frames go through the
//! opaque [`VideoDecoder`], decoded pictures are packed into the two-slot
//! [`FrameSwap`] handoff. The audio stage decodes the compressed audio
//! stream and queues PCM to the playback device without ever blocking. The
//! render stage runs on the presentation thread, one tick per frame.

pub mod audio;
pub mod decoder;
pub mod pipeline;
pub mod render;
pub mod swap;
pub mod video;

pub use audio::{AudioFormat, AudioPlayback, StreamAudioDecoder};
pub use decoder::{DecodedPicture, PushStatus, VideoDecoder};
pub use pipeline::MediaPipeline;
pub use render::{fit_viewport, RenderStage, VideoSurface, Viewport};
pub use swap::{FrameBuffer, FrameSwap};
pub use video::VideoStage;
