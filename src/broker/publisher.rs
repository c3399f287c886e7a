//! Outgoing chat messages over the active session.

use thiserror::Error;

use crate::domain::message::MessageKind;

use super::{
    payload::{OutboundEvent, OutboundType},
    session_manager::SessionManager,
    transport::{TransportError, TransportFactory},
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SendFailure {
    #[error("no connected chat session")]
    NotConnected,
    #[error("could not encode outbound event: {0}")]
    Encode(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Publishes a MESSAGE event on the active session.
///
/// Sender id and nickname always come from the session binding. Without a
/// connected session this fails with [`SendFailure::NotConnected`] and the
/// caller is expected to fall back to the REST send.
pub fn publish<F: TransportFactory>(
    sessions: &mut SessionManager<F>,
    content: &str,
    kind: MessageKind,
) -> Result<(), SendFailure> {
    let event = match sessions.binding() {
        Some(binding) => OutboundEvent::new(binding, OutboundType::Message, kind, content),
        None => return Err(SendFailure::NotConnected),
    };

    sessions.send_event(&event)
}
