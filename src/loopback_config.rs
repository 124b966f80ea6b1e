//! Per-instance loopback transport configuration.
//!
//! All settings are optional and fixed at construction time. None of them
//! changes the lifecycle rules; they only affect diagnostics and how faithfully
//! a delivered message mimics one that crossed a real wire.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which side of the pair a transport plays.
///
/// Used only to tag diagnostic output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerRole {
    /// The side driven by a protocol client.
    Client,

    /// The side driven by a protocol server.
    Server,

    /// No role given.
    #[default]
    Unknown,
}

impl fmt::Display for PeerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PeerRole::Client => "client",
            PeerRole::Server => "server",
            PeerRole::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Loopback transport configuration.
///
/// # Example
///
/// ```
/// use loopback_transport::{LoopbackConfig, PeerRole};
///
/// let config = LoopbackConfig::client()
///     .with_debug(true)
///     .with_stringify_messages(true);
///
/// assert_eq!(config.name, PeerRole::Client);
/// assert!(config.stringify_messages);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopbackConfig {
    // ---
    /// Role tag included in diagnostic output.
    pub name: PeerRole,

    /// Emit per-instance trace events (connect, start, send, close).
    ///
    /// Output goes through the crate's `tracing` integration at debug level
    /// and is advisory text, not a stable interface.
    pub debug: bool,

    /// Pass every outgoing message through a JSON encode/decode round trip.
    ///
    /// The receiver then observes a structurally equal but independent copy,
    /// and values that could not cross a real wire fail at `send()` with
    /// [`TransportError::Serialization`](crate::TransportError::Serialization).
    /// Costs one encode and one decode per message.
    pub stringify_messages: bool,
}

impl LoopbackConfig {
    /// Config for the client side of a pair.
    pub fn client() -> Self {
        Self::named(PeerRole::Client)
    }

    /// Config for the server side of a pair.
    pub fn server() -> Self {
        Self::named(PeerRole::Server)
    }

    /// Config tagged with the given role; both flags off.
    pub fn named(name: PeerRole) -> Self {
        Self {
            name,
            debug: false,
            stringify_messages: false,
        }
    }

    /// Enable or disable the per-instance debug trace.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Enable or disable the serialization round trip on send.
    pub fn with_stringify_messages(mut self, stringify: bool) -> Self {
        self.stringify_messages = stringify;
        self
    }
}
