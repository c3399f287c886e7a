//! Real-time broker layer: STOMP framing, sessions, and inbound normalization.

pub mod frame;
pub mod health;
pub mod normalizer;
pub mod payload;
pub mod publisher;
pub mod session_manager;
pub mod transport;
pub mod websocket;

/// Returns the broker module name for smoke checks.
pub fn module_name() -> &'static str {
    "broker"
}
