//! Transport implementations.
//!
//! Concrete implementations of the domain-level `Transport` trait. Domain
//! code must not depend on anything in here beyond what `lib.rs` re-exports.

mod loopback;

pub use loopback::{connected_pair, LoopbackTransport};
