//! Known-console bookkeeping
//!
//! A [`Console`] is one streaming target on the LAN; the [`ConsoleRegistry`]
//! is the in-memory table of all of them, keyed by name.

pub mod record;
pub mod registry;

pub use record::{
    Console, FpsTier, MediaPrefs, PairingCredentials, PowerState, RegistKey, ResolutionTier,
    SessionKey,
};
pub use registry::{shared_registry, ConsoleRegistry, SharedRegistry};
