use thiserror::Error;

/// Errors that can occur during loopback transport operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The peer handed to `connect()` cannot be paired with this transport
    #[error("invalid peer argument: {0}")]
    InvalidArgument(String),

    /// Either side of a `connect()` call already has a peer
    #[error("one of the transports is already connected")]
    AlreadyConnected,

    /// `start()` was called before a message handler was registered
    #[error("cannot start without being registered to a protocol")]
    NotRegistered,

    /// `start()` was called before the transport was connected
    #[error("cannot start without connect")]
    NotConnected,

    /// There is no peer, or the peer has no message handler registered.
    ///
    /// Usually means the receiving protocol engine was never attached to its
    /// side of the pair.
    #[error("peer transport has no onmessage handler set")]
    PeerUnavailable,

    /// `send()` had to start the peer's delivery task outside a Tokio runtime
    #[error("send requires a running Tokio runtime")]
    NoRuntime,

    /// The message failed the serialize/deserialize round trip
    #[error("error stringifying message: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        // ---
        TransportError::Serialization(err.to_string())
    }
}

/// Result type alias for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;
