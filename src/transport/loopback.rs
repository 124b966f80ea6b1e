// src/transport/loopback.rs

//! Loopback transport implementation.
//!
//! Two `LoopbackTransport` instances are created and cross-connected; each one
//! plays one side of the connection and hands messages straight to the other.
//! There is no broker, no socket and no channel object between them, only a
//! weak back-reference from each side to the other.
//!
//! ## Semantics
//!
//! - `connect()` pairs two unconnected instances and gives both the same
//!   freshly minted [`SessionId`].
//! - `send()` queues the message on the peer; the peer's message handler runs
//!   later on a Tokio task, never inside `send()`.
//! - Messages sent in one direction are handled in send order.
//! - `close()` on either side detaches both sides and fires both close
//!   handlers. Closing again is a no-op.
//!
//! ## Non-Goals
//!
//! - Real I/O, authentication, or a wire format
//! - More than one peer per instance
//! - Backpressure or flow control

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::{
    // ---
    log_debug,
    log_warn,
    CloseHandler,
    ErrorHandler,
    LoopbackConfig,
    MessageHandler,
    Result,
    SessionId,
    Transport,
    TransportError,
};

/// In-process transport endpoint.
///
/// Cloning yields another handle to the same endpoint. The handler slots are
/// assigned after construction, usually by the protocol engine that takes
/// ownership of this side of the pair.
///
/// `send()` spawns the delivery task on the current Tokio runtime the first
/// time a message is queued for a peer. Outside a runtime that first send
/// fails with [`TransportError::NoRuntime`].
///
/// # Example
///
/// ```
/// use loopback_transport::{LoopbackConfig, LoopbackTransport, Transport};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> loopback_transport::Result<()> {
/// let client = LoopbackTransport::<serde_json::Value>::new(LoopbackConfig::client());
/// let server = LoopbackTransport::new(LoopbackConfig::server());
///
/// client.connect(&server)?;
/// assert_eq!(client.session_id(), server.session_id());
///
/// let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
/// server.on_message(move |msg| {
///     let _ = tx.send(msg);
/// });
/// client.on_message(|_| {});
///
/// client.start().await?;
/// client.send(serde_json::json!({"jsonrpc": "2.0", "method": "ping"})).await?;
///
/// let received = rx.recv().await.unwrap();
/// assert_eq!(received["method"], "ping");
///
/// client.close().await?;
/// assert!(!server.is_connected());
/// # Ok(())
/// # }
/// ```
pub struct LoopbackTransport<M = serde_json::Value> {
    inner: Arc<Inner<M>>,
}

struct Inner<M> {
    config: LoopbackConfig,
    state: Mutex<State<M>>,
}

struct State<M> {
    // Non-owning; both sides point at each other or neither does.
    peer: Option<Weak<Inner<M>>>,
    session_id: Option<SessionId>,
    // Set while the close handler runs; a nested close is then a no-op.
    closing: bool,

    on_message: Option<MessageHandler<M>>,
    on_close: Option<CloseHandler>,
    on_error: Option<ErrorHandler>,

    // Sending half of this instance's delivery queue, created on first use.
    inbox: Option<mpsc::UnboundedSender<M>>,
}

impl<M> State<M> {
    fn live_peer(&self) -> Option<Arc<Inner<M>>> {
        self.peer.as_ref().and_then(Weak::upgrade)
    }

    // Checks without upgrading, so no peer `Arc` is dropped under this lock.
    fn has_live_peer(&self) -> bool {
        self.peer.as_ref().is_some_and(|p| p.strong_count() > 0)
    }
}

/// Acquire mutex guard, ignoring poisoning
fn lock_ignore_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Lock two instances in address order so concurrent pairings cannot deadlock.
fn lock_pair<'a, M>(
    a: &'a Arc<Inner<M>>,
    b: &'a Arc<Inner<M>>,
) -> (MutexGuard<'a, State<M>>, MutexGuard<'a, State<M>>) {
    // ---
    if Arc::as_ptr(a) < Arc::as_ptr(b) {
        let first = lock_ignore_poison(&a.state);
        let second = lock_ignore_poison(&b.state);
        (first, second)
    } else {
        let second = lock_ignore_poison(&b.state);
        let first = lock_ignore_poison(&a.state);
        (first, second)
    }
}

impl<M> Inner<M> {
    // ---
    fn lock(&self) -> MutexGuard<'_, State<M>> {
        lock_ignore_poison(&self.state)
    }

    fn trace(&self, _event: fmt::Arguments<'_>) {
        if self.config.debug {
            log_debug!(role = %self.config.name, "LoopbackTransport {_event}");
        }
    }

    /// Detach from the peer and run the close handler.
    ///
    /// Returns the former peer if it is still alive, `None` if there was
    /// nothing to tear down.
    fn tear_down(&self) -> Option<Arc<Inner<M>>> {
        // ---
        let on_close = {
            let mut state = self.lock();
            if state.closing || state.peer.is_none() {
                self.trace(format_args!("close called, but already closed"));
                return None;
            }
            state.closing = true;
            self.trace(format_args!("closing session {:?}", state.session_id));
            state.on_close.clone()
        };

        // Session id and peer are still set while the handler runs.
        if let Some(on_close) = on_close {
            on_close();
        }

        let peer = {
            let mut state = self.lock();
            state.closing = false;
            state.session_id = None;
            state.peer.take()
        };
        peer.and_then(|p| p.upgrade())
    }
}

impl<M> Drop for Inner<M> {
    fn drop(&mut self) {
        // A dropped endpoint counts as closed: release the survivor too.
        let state = match self.state.get_mut() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(peer) = state.peer.take().and_then(|p| p.upgrade()) {
            peer.tear_down();
        }
    }
}

impl<M> Inner<M>
where
    M: Send + 'static,
{
    /// Queue `message` for this instance's message handler.
    ///
    /// Starting the delivery task needs a Tokio runtime; without one the
    /// message is not queued and [`TransportError::NoRuntime`] is returned.
    fn enqueue(self: &Arc<Self>, message: M) -> Result<()> {
        // ---
        let mut state = self.lock();

        let message = match state.inbox.as_ref() {
            Some(tx) => match tx.send(message) {
                Ok(()) => return Ok(()),
                // Delivery task is gone (its runtime shut down); start over.
                Err(mpsc::error::SendError(message)) => message,
            },
            None => message,
        };

        let runtime = Handle::try_current().map_err(|_| TransportError::NoRuntime)?;

        let (tx, rx) = mpsc::unbounded_channel();
        // Cannot fail: `rx` is alive.
        let _ = tx.send(message);
        state.inbox = Some(tx);
        drop(state);

        runtime.spawn(deliver(Arc::downgrade(self), rx));
        Ok(())
    }
}

/// Delivery loop for one receiving instance.
///
/// The handler is looked up at delivery time, so replacing it after a send
/// redirects messages that are still queued. A panicking handler is logged
/// and the loop moves on to the next message. Ends when the receiving
/// instance is dropped.
async fn deliver<M>(receiver: Weak<Inner<M>>, mut inbox: mpsc::UnboundedReceiver<M>)
where
    M: Send + 'static,
{
    // ---
    while let Some(message) = inbox.recv().await {
        let Some(inner) = receiver.upgrade() else {
            break;
        };

        let handler = inner.lock().on_message.clone();
        match handler {
            Some(handler) => {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(message)));
                if let Err(_payload) = outcome {
                    let _reason = _payload
                        .downcast_ref::<&str>()
                        .copied()
                        .or_else(|| _payload.downcast_ref::<String>().map(String::as_str))
                        .unwrap_or("unknown panic payload");
                    log_warn!(
                        role = %inner.config.name,
                        "message handler panicked: {_reason}"
                    );
                }
            }
            None => {
                log_warn!(
                    role = %inner.config.name,
                    "message dropped: no onmessage handler set at delivery time"
                );
            }
        }
    }
}

/// Encode and decode `message` the way a wire transport would.
fn round_trip<M>(message: &M) -> Result<M>
where
    M: Serialize + DeserializeOwned,
{
    let wire = serde_json::to_vec(message)?;
    Ok(serde_json::from_slice(&wire)?)
}

impl<M> LoopbackTransport<M>
where
    M: Serialize + DeserializeOwned + Send + 'static,
{
    // ---
    /// Create an unconnected transport with empty handler slots.
    pub fn new(config: LoopbackConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(State {
                    peer: None,
                    session_id: None,
                    closing: false,
                    on_message: None,
                    on_close: None,
                    on_error: None,
                    inbox: None,
                }),
            }),
        }
    }

    /// Establish a bidirectional binding with `peer`.
    ///
    /// Both sides get the same new session id and a reference to each other.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidArgument`] if `peer` is this very
    /// instance.
    ///
    /// Returns [`TransportError::AlreadyConnected`] if either side already has
    /// a peer. Neither side is modified in that case.
    pub fn connect(&self, peer: &LoopbackTransport<M>) -> Result<()> {
        // ---
        self.inner
            .trace(format_args!("connect to {}", peer.inner.config.name));

        if Arc::ptr_eq(&self.inner, &peer.inner) {
            return Err(TransportError::InvalidArgument(
                "a transport cannot be connected to itself".into(),
            ));
        }

        let (mut mine, mut theirs) = lock_pair(&self.inner, &peer.inner);

        if mine.has_live_peer() || theirs.has_live_peer() {
            return Err(TransportError::AlreadyConnected);
        }

        let session_id = SessionId::generate();
        self.inner
            .trace(format_args!("connected, session {session_id}"));

        mine.session_id = Some(session_id.clone());
        theirs.session_id = Some(session_id);
        mine.peer = Some(Arc::downgrade(&peer.inner));
        theirs.peer = Some(Arc::downgrade(&self.inner));

        Ok(())
    }

    /// Configuration this transport was created with.
    pub fn config(&self) -> &LoopbackConfig {
        &self.inner.config
    }

    /// Whether this transport currently has a live peer.
    pub fn is_connected(&self) -> bool {
        self.inner.lock().has_live_peer()
    }

    /// Handle to the connected peer, if any.
    pub fn peer(&self) -> Option<LoopbackTransport<M>> {
        let inner = self.inner.lock().live_peer()?;
        Some(LoopbackTransport { inner })
    }

    /// Whether `other` is a handle to this same endpoint.
    pub fn is_same(&self, other: &LoopbackTransport<M>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Whether a message handler is currently registered.
    pub fn has_message_handler(&self) -> bool {
        self.inner.lock().on_message.is_some()
    }

    /// Register `handler` in the message-received slot.
    pub fn on_message<F>(&self, handler: F)
    where
        F: Fn(M) + Send + Sync + 'static,
    {
        self.set_on_message(Some(Arc::new(handler)));
    }

    /// Register `handler` in the closed slot.
    pub fn on_close<F>(&self, handler: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.set_on_close(Some(Arc::new(handler)));
    }

    /// Register `handler` in the error slot.
    pub fn on_error<F>(&self, handler: F)
    where
        F: Fn(&TransportError) + Send + Sync + 'static,
    {
        self.set_on_error(Some(Arc::new(handler)));
    }
}

#[async_trait::async_trait]
impl<M> Transport<M> for LoopbackTransport<M>
where
    M: Serialize + DeserializeOwned + Send + 'static,
{
    // ---
    fn session_id(&self) -> Option<SessionId> {
        self.inner.lock().session_id.clone()
    }

    fn set_on_message(&self, handler: Option<MessageHandler<M>>) {
        self.inner.lock().on_message = handler;
    }

    fn set_on_close(&self, handler: Option<CloseHandler>) {
        self.inner.lock().on_close = handler;
    }

    fn set_on_error(&self, handler: Option<ErrorHandler>) {
        self.inner.lock().on_error = handler;
    }

    /// Check readiness: a message handler must be registered, then a peer
    /// must be connected. The first unmet condition is reported.
    async fn start(&self) -> Result<()> {
        // ---
        self.inner.trace(format_args!("start"));

        let state = self.inner.lock();
        if state.on_message.is_none() {
            return Err(TransportError::NotRegistered);
        }
        if !state.has_live_peer() {
            return Err(TransportError::NotConnected);
        }
        Ok(())
    }

    /// Queue `message` for the peer's message handler.
    ///
    /// With `stringify_messages` set, the peer receives a copy produced by a
    /// JSON round trip instead of `message` itself.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::PeerUnavailable`] if there is no peer or the
    /// peer has no message handler.
    ///
    /// Returns [`TransportError::Serialization`] if the round trip fails. The
    /// error handler of this instance sees the error first.
    ///
    /// Returns [`TransportError::NoRuntime`] if the delivery task has to be
    /// started and there is no Tokio runtime to start it on.
    async fn send(&self, message: M) -> Result<()> {
        // ---
        self.inner.trace(format_args!("send"));

        let peer = self.inner.lock().live_peer();
        let peer = match peer {
            Some(peer) if peer.lock().on_message.is_some() => peer,
            _ => return Err(TransportError::PeerUnavailable),
        };

        let message = if self.inner.config.stringify_messages {
            match round_trip(&message) {
                Ok(copy) => copy,
                Err(err) => {
                    log_warn!(role = %self.inner.config.name, "send failed: {err}");
                    let on_error = self.inner.lock().on_error.clone();
                    if let Some(on_error) = on_error {
                        on_error(&err);
                    }
                    return Err(err);
                }
            }
        } else {
            message
        };

        peer.enqueue(message)
    }

    /// Close this side and propagate the close to the peer.
    ///
    /// Runs this side's close handler while the session is still set, then
    /// detaches and closes the peer. Does nothing if this side is not
    /// connected or is already running its close handler.
    async fn close(&self) -> Result<()> {
        // ---
        self.inner.trace(format_args!("close"));

        if let Some(peer) = self.inner.tear_down() {
            peer.tear_down();
        }
        Ok(())
    }
}

impl<M> Clone for LoopbackTransport<M> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<M> Default for LoopbackTransport<M>
where
    M: Serialize + DeserializeOwned + Send + 'static,
{
    fn default() -> Self {
        Self::new(LoopbackConfig::default())
    }
}

impl<M> fmt::Debug for LoopbackTransport<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("LoopbackTransport")
            .field("name", &self.inner.config.name)
            .field("session_id", &state.session_id)
            .field("connected", &state.has_live_peer())
            .finish()
    }
}

/// Create a client/server pair that is already connected.
///
/// # Errors
///
/// Propagates [`LoopbackTransport::connect`] errors, which cannot occur for
/// two freshly created transports.
pub fn connected_pair<M>(
    client: LoopbackConfig,
    server: LoopbackConfig,
) -> Result<(LoopbackTransport<M>, LoopbackTransport<M>)>
where
    M: Serialize + DeserializeOwned + Send + 'static,
{
    // ---
    let client = LoopbackTransport::new(client);
    let server = LoopbackTransport::new(server);
    client.connect(&server)?;
    Ok((client, server))
}
