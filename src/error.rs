//! Error types for the remote-play client

use thiserror::Error;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    #[error("Discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("Pairing error: {0}")]
    Pairing(#[from] PairingError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Discovery subsystem errors
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Failed to resolve host {0}")]
    Resolve(String),

    #[error("Socket bind failed: {0}")]
    BindFailed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Malformed discovery reply: {0}")]
    MalformedReply(String),

    #[error("Console {0} is not paired, cannot wake it")]
    NotPaired(String),

    #[error("Unknown console: {0}")]
    UnknownConsole(String),
}

/// Pairing (registration) errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PairingError {
    #[error("PIN must be exactly {expected} digits")]
    InvalidPin { expected: usize },

    #[error("Console is not powered on and ready")]
    NotReady,

    #[error("Console is not reachable: {0}")]
    Unreachable(String),

    #[error("Registration exchange timed out")]
    TimedOut,

    #[error("A registration exchange is already in flight")]
    AlreadyInFlight,

    #[error("Console rejected the registration: {0}")]
    Rejected(String),

    #[error("Unknown console: {0}")]
    UnknownConsole(String),
}

/// Streaming session errors
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Console is not paired")]
    NotPaired,

    #[error("Console is not powered on and ready")]
    NotReady,

    #[error("Session transport error: {0}")]
    Transport(String),

    #[error("Session is not connected")]
    NotConnected,

    #[error("A session is already active")]
    AlreadyActive,
}

/// Video pipeline errors
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Decoder initialization failed: {0}")]
    DecoderInit(String),

    #[error("Decoding failed: {0}")]
    DecodeFailed(String),

    #[error("Presentation surface error: {0}")]
    Surface(String),

    #[error("Pipeline is shut down")]
    ShutDown,
}

/// Audio playback errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("No playback device available: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open stream: {0}")]
    StreamError(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Audio decoder initialization failed: {0}")]
    DecoderInit(String),

    #[error("Audio decoding failed: {0}")]
    DecodingFailed(String),
}

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, Error>;
