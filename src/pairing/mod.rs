//! PIN-based console registration
//!
//! Registration is a one-time exchange: the user reads a short numeric code
//! off the console's screen, we send it with our device identity to the
//! console's registration service, and a successful reply carries the
//! long-lived credential triple (registration key, session key, key type).
//!
//! The exchange itself is an opaque library boundary behind
//! [`RegistExchange`]; this module owns PIN validation, the per-attempt
//! state machine, the completion timeout and the atomic credential write.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError};
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::console::{PairingCredentials, PowerState, SharedRegistry};
use crate::constants::{PIN_DIGITS, REGIST_PORT, REGIST_TIMEOUT};
use crate::error::PairingError;

/// A validated fixed-length numeric registration code.
#[derive(Clone, PartialEq, Eq)]
pub struct PinCode(String);

impl PinCode {
    pub fn parse(input: &str) -> Result<Self, PairingError> {
        if input.len() != PIN_DIGITS || !input.chars().all(|c| c.is_ascii_digit()) {
            return Err(PairingError::InvalidPin {
                expected: PIN_DIGITS,
            });
        }
        Ok(Self(input.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// The PIN is short-lived but still a shared secret while the console shows it.
impl fmt::Debug for PinCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PinCode(<redacted>)")
    }
}

/// Everything the opaque exchange needs to talk to one console.
#[derive(Debug, Clone)]
pub struct RegistRequest {
    pub target: SocketAddr,
    pub pin: PinCode,
    /// Local device identity presented to the console
    pub device_id: String,
}

/// The opaque registration exchange.
///
/// Implementations block until the console answers or the attempt fails;
/// the controller enforces the overall timeout around the call.
pub trait RegistExchange: Send + Sync {
    fn exchange(&self, request: RegistRequest) -> Result<PairingCredentials, PairingError>;
}

/// Where one registration attempt currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PairingState {
    #[default]
    Idle,
    AwaitingPinEntry,
    KeyExchangeInFlight,
    Paired,
    Failed,
}

/// Drives registration attempts against consoles in the registry.
///
/// One attempt per call: retry policy (e.g. re-prompting for a mistyped
/// PIN) belongs to the caller.
pub struct PairingController {
    registry: SharedRegistry,
    exchange: Arc<dyn RegistExchange>,
    device_id: String,
    timeout: Duration,
    state: Mutex<PairingState>,
}

impl PairingController {
    pub fn new(
        registry: SharedRegistry,
        exchange: Arc<dyn RegistExchange>,
        device_id: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            exchange,
            device_id: device_id.into(),
            timeout: REGIST_TIMEOUT,
            state: Mutex::new(PairingState::Idle),
        }
    }

    /// Override the exchange timeout (mainly for tests).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn state(&self) -> PairingState {
        *self.state.lock()
    }

    /// Run one registration attempt against the named console.
    ///
    /// Blocks until the exchange completes or the timeout elapses. On
    /// success the credential triple is written to the console record in one
    /// step; on any failure the record is left exactly as it was. Persisting
    /// the updated record is the caller's responsibility.
    pub fn begin_registration(&self, name: &str, pin: &str) -> Result<(), PairingError> {
        {
            let mut state = self.state.lock();
            if matches!(
                *state,
                PairingState::AwaitingPinEntry | PairingState::KeyExchangeInFlight
            ) {
                return Err(PairingError::AlreadyInFlight);
            }
            *state = PairingState::AwaitingPinEntry;
        }

        let result = self.run_attempt(name, pin);

        *self.state.lock() = match result {
            Ok(()) => PairingState::Paired,
            Err(_) => PairingState::Failed,
        };
        result
    }

    fn run_attempt(&self, name: &str, pin: &str) -> Result<(), PairingError> {
        let pin = PinCode::parse(pin)?;

        // Preconditions checked under the registry lock, released before any
        // network work.
        let target = {
            let registry = self.registry.lock();
            let console = registry
                .find(name)
                .ok_or_else(|| PairingError::UnknownConsole(name.to_string()))?;
            if console.power_state() != PowerState::Ready {
                return Err(PairingError::NotReady);
            }
            let addr = console
                .addr()
                .ok_or_else(|| PairingError::Unreachable(format!("{name} has no known address")))?;
            SocketAddr::new(addr, REGIST_PORT)
        };

        *self.state.lock() = PairingState::KeyExchangeInFlight;
        info!(console = name, %target, "starting registration exchange");

        let request = RegistRequest {
            target,
            pin,
            device_id: self.device_id.clone(),
        };

        // The exchange runs on a worker so a hung console cannot wedge the
        // caller past the timeout; completion is signaled over a bounded
        // channel instead of polling.
        let (done_tx, done_rx) = bounded(1);
        let exchange = self.exchange.clone();
        let worker = thread::Builder::new()
            .name("regist-exchange".into())
            .spawn(move || {
                let _ = done_tx.send(exchange.exchange(request));
            })
            .map_err(|e| PairingError::Unreachable(e.to_string()))?;

        let credentials = match done_rx.recv_timeout(self.timeout) {
            Ok(Ok(credentials)) => {
                let _ = worker.join();
                credentials
            }
            Ok(Err(e)) => {
                let _ = worker.join();
                warn!(console = name, "registration failed: {}", e);
                return Err(e);
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                // The worker is left to finish on its own; its late result is
                // discarded with the channel.
                warn!(console = name, "registration timed out");
                return Err(PairingError::TimedOut);
            }
        };

        let mut registry = self.registry.lock();
        let console = registry
            .find_mut(name)
            .ok_or_else(|| PairingError::UnknownConsole(name.to_string()))?;
        console.set_credentials(credentials);
        info!(console = name, "registration complete, credentials stored");
        Ok(())
    }
}
