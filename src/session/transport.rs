//! Opaque session transport boundary
//!
//! The wire protocol, crypto and packet pacing live in an external library.
//! This crate only needs: connect with credentials, register callbacks,
//! start the worker threads, send feedback, stop. Callbacks are owned
//! closures handed over at connect time; they run on the transport's
//! network thread.

use std::net::IpAddr;

use bytes::Bytes;

use crate::console::PairingCredentials;
use crate::error::SessionError;

/// Negotiated stream parameters derived from the console's preferences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoProfile {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

/// Out-of-band notifications from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Handshake finished, media callbacks will start firing
    Connected,
    /// The session is over; `reason` is human-readable
    Ended { reason: String },
}

/// Callbacks the transport invokes on its network thread.
pub struct SessionCallbacks {
    /// One compressed video frame
    pub video_frame: Box<dyn FnMut(Bytes) + Send>,
    /// Audio stream header: channel count and sample rate
    pub audio_header: Box<dyn FnMut(u16, u32) + Send>,
    /// One compressed audio packet
    pub audio_packet: Box<dyn FnMut(&[u8]) + Send>,
    /// Connection lifecycle notifications
    pub event: Box<dyn FnMut(TransportEvent) + Send>,
}

/// A connected session: worker control and the feedback uplink.
pub trait SessionHandle: Send {
    /// Start the transport's worker thread(s). Call once, after connect.
    fn start(&mut self) -> Result<(), SessionError>;

    /// Queue one feedback message; must not block on the network.
    fn send_feedback(&mut self, payload: Bytes) -> Result<(), SessionError>;

    /// Tear down the connection and join the worker thread(s). Idempotent.
    fn stop(&mut self);
}

/// Factory for connected sessions.
pub trait SessionTransport {
    type Handle: SessionHandle;

    fn connect(
        &self,
        addr: IpAddr,
        credentials: &PairingCredentials,
        profile: VideoProfile,
        callbacks: SessionCallbacks,
    ) -> Result<Self::Handle, SessionError>;
}
