//! # LAN Remote Play
//!
//! Low-latency remote-play client core for streaming consoles on the local
//! network: discovery, pairing, session lifecycle and the realtime
//! decode/render pipeline.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                             CONSOLE (LAN)                            │
//! │        UDP discovery replies          compressed A/V + session       │
//! └───────────────┬──────────────────────────────┬───────────────────────┘
//!                 │                              │
//!                 ▼                              ▼
//! ┌───────────────────────────┐   ┌──────────────────────────────────────┐
//! │ DiscoveryService          │   │ SessionTransport (opaque)            │
//! │  probe / wakeup sender    │   │  network worker thread               │
//! │  listener thread          │   │    │ video bytes    │ opus packets   │
//! └───────────┬───────────────┘   │    ▼                ▼                │
//!             │ partial updates   │ ┌────────────┐  ┌───────────────┐    │
//!             ▼                   │ │ VideoStage │  │ Opus decode   │    │
//! ┌───────────────────────────┐   │ │ push/drain │  │ → sample queue│    │
//! │ ConsoleRegistry           │   │ └─────┬──────┘  └──────┬────────┘    │
//! │  name → Console record    │   └───────┼────────────────┼─────────────┘
//! │  (credentials, prefs)     │           ▼                ▼
//! └───────────┬───────────────┘   ┌────────────┐  ┌────────────────┐
//!             │                   │ FrameSwap  │  │ cpal playback  │
//!    PairingController           │ two slots  │  │ device thread  │
//!    (PIN → credential triple)   └─────┬──────┘  └────────────────┘
//!                                       │ readable slot
//!                                       ▼
//!                           ┌──────────────────────────┐
//!                           │ RenderStage (presentation│
//!                           │ thread): resize → draw,  │
//!                           │ InputSampler → tick()    │
//!                           └──────────────────────────┘
//! ```
//!
//! The crate is transport- and renderer-agnostic: the streaming protocol,
//! the video codec and the presentation surface are reached through the
//! [`session::SessionTransport`], [`media::VideoDecoder`] and
//! [`media::VideoSurface`] traits.

pub mod config;
pub mod console;
pub mod discovery;
pub mod error;
pub mod input;
pub mod media;
pub mod pairing;
pub mod session;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    use std::time::Duration;

    /// Well-known UDP port consoles listen on for discovery requests
    pub const DISCOVERY_PORT: u16 = 987;

    /// TCP port of the console's registration service
    pub const REGIST_PORT: u16 = 9295;

    /// Maximum size of a discovery datagram
    pub const MAX_DISCOVERY_PACKET: usize = 1472; // MTU - IP/UDP headers

    /// Poll interval of the discovery listener's read timeout
    pub const LISTENER_POLL: Duration = Duration::from_millis(250);

    /// How long a pairing exchange may run before it is failed
    pub const REGIST_TIMEOUT: Duration = Duration::from_secs(30);

    /// Number of digits in a registration PIN
    pub const PIN_DIGITS: usize = 8;

    /// Bounded retry budget for a decoder push that reports a full buffer
    pub const DECODER_PUSH_RETRIES: usize = 4;

    /// How long the render stage waits for a frame before ticking anyway
    pub const FRAME_WAIT: Duration = Duration::from_millis(100);

    /// Playback sample queue depth in milliseconds of audio
    pub const AUDIO_QUEUE_MS: u32 = 250;

    /// Default audio format until the stream header arrives
    pub const DEFAULT_SAMPLE_RATE: u32 = 48000;
    pub const DEFAULT_CHANNELS: u16 = 2;
}
