//! Console discovery over UDP
//!
//! A discovery exchange is one datagram each way: the client sends a search
//! (or wakeup) request to a well-known port, consoles answer with a flat
//! key/value status report. Replies arrive asynchronously on a background
//! listener thread and are folded into the [`ConsoleRegistry`](crate::console)
//! as partial updates.

pub mod service;
pub mod wire;

pub use service::{DiscoveryConfig, DiscoveryService};
pub use wire::DiscoveryReply;
