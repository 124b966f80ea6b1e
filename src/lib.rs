//! In-process loopback transport for message-oriented protocols
//!
//! Connects two endpoints, conventionally a client and a server, inside a
//! single process with no socket and no wire format in between. A protocol
//! engine on each side registers its callbacks, then exchanges requests,
//! responses and notifications exactly as it would over a real transport.
//! The main use is testing protocol logic without standing up real I/O.
//!
//! ```
//! use loopback_transport::{connected_pair, LoopbackConfig, LoopbackTransport, Transport};
//!
//! let (client, server): (LoopbackTransport, LoopbackTransport) =
//!     connected_pair(LoopbackConfig::client(), LoopbackConfig::server()).unwrap();
//!
//! assert!(client.is_connected());
//! assert_eq!(client.session_id(), server.session_id());
//! ```

// Import all sub modules once...
mod macros;

mod domain;
mod transport;

mod error;
mod loopback_config;
mod session;

pub(crate) use macros::{log_debug, log_warn};

// Re-export main types
pub use transport::{connected_pair, LoopbackTransport};

pub use loopback_config::{LoopbackConfig, PeerRole};

pub use error::{Result, TransportError};
pub use session::{generate_session_id, generate_session_id_with, SessionId};

// --- public re-exports
pub use domain::{
    //
    CloseHandler,
    ErrorHandler,
    MessageHandler,
    Transport,
    TransportPtr,
};
