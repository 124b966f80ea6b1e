// src/domain/transport.rs

//! Transport domain abstractions.
//!
//! This module defines the capability contract between a transport and the
//! protocol engine that drives it. The engine registers its callbacks in the
//! handler slots, then uses `start()`, `send()` and `close()`; the transport
//! moves opaque messages and reports lifecycle events back through the slots.
//!
//! Nothing here refers to a concrete transport or to any message schema.
//! Concrete implementations live under `src/transport/`.
use crate::{Result, SessionId, TransportError};
use std::sync::Arc;

/// Callback invoked with each message delivered to a transport.
pub type MessageHandler<M> = Arc<dyn Fn(M) + Send + Sync>;

/// Callback invoked once when a transport is torn down.
pub type CloseHandler = Arc<dyn Fn() + Send + Sync>;

/// Callback invoked with side-channel errors raised by a transport.
///
/// The same error is also returned to the caller of the failing operation.
pub type ErrorHandler = Arc<dyn Fn(&TransportError) + Send + Sync>;

/// Transport abstraction.
///
/// A `Transport` carries messages of type `M` to exactly one remote end. The
/// handler slots start empty and may be set, replaced or cleared at any time;
/// every call site checks them, so an unset slot is never an error on its own.
///
/// Implementations must ensure that:
/// - `send()` never runs the receiver's message handler before it returns.
/// - Messages sent in one direction are handled in send order.
/// - `close()` always succeeds and may be called any number of times.
///
/// # Notes
///
/// This trait uses `async_trait`; the expanded documentation may show explicit
/// lifetimes and a boxed `Future`. Treat the methods as normal `async fn`s.
#[async_trait::async_trait]
pub trait Transport<M>: Send + Sync
where
    M: Send + 'static,
{
    // ---
    /// Session id shared with the peer, present only while connected.
    fn session_id(&self) -> Option<SessionId>;

    /// Set or clear the message-received slot.
    fn set_on_message(&self, handler: Option<MessageHandler<M>>);

    /// Set or clear the closed slot.
    fn set_on_close(&self, handler: Option<CloseHandler>);

    /// Set or clear the error slot.
    fn set_on_error(&self, handler: Option<ErrorHandler>);

    /// Check that the transport is ready to exchange messages.
    ///
    /// Transmits nothing and changes no state.
    async fn start(&self) -> Result<()>;

    /// Hand `message` to the remote end for deferred delivery.
    async fn send(&self, message: M) -> Result<()>;

    /// Tear down the connection and notify both ends.
    async fn close(&self) -> Result<()>;
}

/// Shared, type-erased transport pointer.
///
/// `.clone()` only bumps a reference count; every clone drives the same
/// underlying transport.
pub type TransportPtr<M = serde_json::Value> = Arc<dyn Transport<M>>;
