//! Streaming session lifecycle
//!
//! One [`SessionController`] owns one active session against one paired,
//! powered-on console. The streaming protocol itself is opaque behind the
//! [`SessionTransport`]/[`SessionHandle`] traits; this module wires the
//! transport's callbacks into the media pipeline, ships controller feedback
//! upstream once per render tick, and sequences teardown so no thread can
//! deadlock on the frame handoff.

pub mod controller;
pub mod transport;

pub use controller::{run_presentation_loop, SessionController, SessionEvent, SessionState};
pub use transport::{
    SessionCallbacks, SessionHandle, SessionTransport, TransportEvent, VideoProfile,
};
