use std::fmt;

use thiserror::Error;

/// Receives the body of every frame delivered to a subscription.
pub type FrameHandler = Box<dyn FnMut(String) + Send>;

/// Connection-time metadata. The token is carried here, never in message bodies.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectCredentials {
    pub token: String,
    pub user_id: i64,
    pub nickname: String,
}

impl fmt::Debug for ConnectCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectCredentials")
            .field("token", &"[REDACTED]")
            .field("user_id", &self.user_id)
            .field("nickname", &self.nickname)
            .finish()
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("broker rejected the request: {0}")]
    Rejected(String),
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
    #[error("transport is not connected")]
    NotConnected,
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// One bidirectional broker connection. Implementations block until each call
/// has been acknowledged as far as the protocol allows.
pub trait BrokerTransport: Send {
    /// Opens the connection and completes the authenticated handshake.
    fn connect(&mut self, credentials: &ConnectCredentials) -> Result<(), TransportError>;

    /// Subscribes to `destination`; returns once the broker confirmed it.
    fn subscribe(&mut self, destination: &str, handler: FrameHandler)
        -> Result<(), TransportError>;

    fn send(&mut self, destination: &str, body: &str) -> Result<(), TransportError>;

    /// Tears the connection down. Must be safe to call more than once.
    fn disconnect(&mut self);

    /// Transport-level liveness; may lag behind a silent network drop.
    fn is_connected(&self) -> bool;
}

/// Produces a fresh transport for every session.
pub trait TransportFactory {
    fn create(&self) -> Result<Box<dyn BrokerTransport>, TransportError>;
}

impl<T: TransportFactory + ?Sized> TransportFactory for Box<T> {
    fn create(&self) -> Result<Box<dyn BrokerTransport>, TransportError> {
        (**self).create()
    }
}
