//! Use case for sending a message to the open room.
//!
//! The live session is tried first. Without one (or when the broker refuses the
//! frame) the message goes through the REST collaborator instead, and the
//! created message is inserted into the store here because no echo will
//! arrive.

use crate::{
    broker::{
        publisher::{self, SendFailure},
        session_manager::SessionManager,
        transport::TransportFactory,
    },
    domain::{
        message::{ChatMessage, MessageKind},
        message_store::{AppendOutcome, MessageStore},
    },
};

const SEND_FELL_BACK_TO_REST: &str = "CHAT_SEND_REST_FALLBACK";

/// Command to send a message to a specific room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendMessageCommand {
    pub room_id: i64,
    pub content: String,
    pub kind: MessageKind,
}

impl SendMessageCommand {
    pub fn text(room_id: i64, content: impl Into<String>) -> Self {
        Self {
            room_id,
            content: content.into(),
            kind: MessageKind::Text,
        }
    }
}

/// Errors that can occur at the source level (REST API).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendMessageSourceError {
    /// User is not authorized.
    Unauthorized,
    /// Target room or message was not found or is not accessible.
    NotFound,
    /// Service is temporarily unavailable.
    Unavailable,
    /// The response could not be understood.
    InvalidData,
}

/// Why a send (or edit/delete) did not go through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendMessageFailure {
    /// Message text is empty after trimming whitespace.
    EmptyMessage,
    Unauthorized,
    NotFound,
    TemporarilyUnavailable,
    DataContractViolation,
}

/// A failed send. Carries the original text so the caller can restore it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendMessageError {
    pub failure: SendMessageFailure,
    pub unsent: String,
}

/// How a message left the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Published on the live session; the broker echo will deliver it.
    Published,
    /// Sent through REST and already applied to the store.
    Stored {
        message: ChatMessage,
        outcome: AppendOutcome,
    },
}

/// REST-side write operations on messages.
pub trait MessageWriter {
    /// Creates a message and returns it as stored by the server.
    fn send_message(
        &self,
        room_id: i64,
        content: &str,
        kind: MessageKind,
    ) -> Result<ChatMessage, SendMessageSourceError>;

    fn edit_message(
        &self,
        message_id: i64,
        content: &str,
    ) -> Result<ChatMessage, SendMessageSourceError>;

    fn delete_message(&self, message_id: i64) -> Result<(), SendMessageSourceError>;
}

impl<T: MessageWriter + ?Sized> MessageWriter for &T {
    fn send_message(
        &self,
        room_id: i64,
        content: &str,
        kind: MessageKind,
    ) -> Result<ChatMessage, SendMessageSourceError> {
        (*self).send_message(room_id, content, kind)
    }

    fn edit_message(
        &self,
        message_id: i64,
        content: &str,
    ) -> Result<ChatMessage, SendMessageSourceError> {
        (*self).edit_message(message_id, content)
    }

    fn delete_message(&self, message_id: i64) -> Result<(), SendMessageSourceError> {
        (*self).delete_message(message_id)
    }
}

/// Sends a message to the room in `command`.
///
/// Text is trimmed and must not be empty. The session is used only when it is
/// connected and bound to the same room.
///
/// # Errors
/// Returns [`SendMessageError`] with the untrimmed text when both routes fail.
pub fn send_message<F: TransportFactory>(
    sessions: &mut SessionManager<F>,
    writer: &dyn MessageWriter,
    store: &mut MessageStore,
    viewer_id: i64,
    command: SendMessageCommand,
) -> Result<SendOutcome, SendMessageError> {
    let content = command.content.trim();
    if content.is_empty() {
        return Err(SendMessageError {
            failure: SendMessageFailure::EmptyMessage,
            unsent: command.content,
        });
    }

    if sessions.status().is_connected() && sessions.bound_room() == Some(command.room_id) {
        match publisher::publish(sessions, content, command.kind) {
            Ok(()) => return Ok(SendOutcome::Published),
            Err(error) => log_fallback(command.room_id, &error),
        }
    }

    let mut message = writer
        .send_message(command.room_id, content, command.kind)
        .map_err(|error| SendMessageError {
            failure: map_source_error(error),
            unsent: command.content.clone(),
        })?;

    if message.room_id == 0 {
        message.room_id = command.room_id;
    }
    message.resolve_ownership(viewer_id);
    let outcome = store.append(command.room_id, message.clone());

    Ok(SendOutcome::Stored { message, outcome })
}

pub(crate) fn map_source_error(error: SendMessageSourceError) -> SendMessageFailure {
    match error {
        SendMessageSourceError::Unauthorized => SendMessageFailure::Unauthorized,
        SendMessageSourceError::NotFound => SendMessageFailure::NotFound,
        SendMessageSourceError::Unavailable => SendMessageFailure::TemporarilyUnavailable,
        SendMessageSourceError::InvalidData => SendMessageFailure::DataContractViolation,
    }
}

fn log_fallback(room_id: i64, error: &SendFailure) {
    tracing::warn!(
        code = SEND_FELL_BACK_TO_REST,
        room_id,
        error = %error,
        "live publish failed; sending through REST"
    );
}
