//! Domain layer public interface.
//!
//! Abstractions shared by every transport, independent of how messages are
//! actually moved. Consumers import these through this module, not through
//! the individual files.

mod transport;

// --- Transport domain re-exports ---

pub use transport::{
    //
    CloseHandler,
    ErrorHandler,
    MessageHandler,
    Transport,
    TransportPtr,
};
