//! Turns raw inbound payloads into canonical [`ChatMessage`] changes.
//!
//! Classification order: DELETE, then USER_JOIN/USER_LEAVE, then EDIT, then
//! ordinary messages. Ownership (`is_mine`) is always recomputed from the
//! session's user id; a peer-supplied `isMyMessage` is ignored.

use crate::domain::message::{ChatMessage, FileMeta, MessageKind, DELETED_PLACEHOLDER, UNKNOWN_SENDER};

use super::{
    payload::{coerce_bool, coerce_id, coerce_timestamp_ms, coerce_u64, InboundPayload, InboundType},
    session_manager::SessionBinding,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalized {
    /// A new message to append.
    Append(ChatMessage),
    /// A system notice about someone joining (`true`) or leaving.
    Membership { message: ChatMessage, joined: bool },
    /// Soft-delete of an existing message, matched by id.
    Tombstone(ChatMessage),
    /// In-place content change of an existing message, matched by id.
    Edit(ChatMessage),
}

impl Normalized {
    pub fn message(&self) -> &ChatMessage {
        match self {
            Self::Append(message)
            | Self::Tombstone(message)
            | Self::Edit(message)
            | Self::Membership { message, .. } => message,
        }
    }
}

/// Normalizes one payload received on `binding`'s session, or suppresses it.
pub fn normalize(
    payload: &InboundPayload,
    binding: &SessionBinding,
    now_ms: i64,
) -> Option<Normalized> {
    let payload_room = coerce_id(payload.chat_room_id.as_ref());
    if payload_room != 0 && payload_room != binding.room_id {
        tracing::debug!(
            payload_room,
            session_room = binding.room_id,
            "suppressing inbound event for another room"
        );
        return None;
    }

    let mut message = message_from_payload(payload, binding.room_id, now_ms);

    match payload.kind() {
        InboundType::Delete => {
            message.tombstone();
            message.is_mine = false;
            Some(Normalized::Tombstone(message))
        }
        kind @ (InboundType::UserJoin | InboundType::UserLeave) => {
            let joined = kind == InboundType::UserJoin;
            message.kind = MessageKind::System;
            message.is_mine = false;
            if message.content.is_empty() {
                let verb = if joined { "joined" } else { "left" };
                message.content = format!("{} {verb} the room.", message.sender_name);
            }
            Some(Normalized::Membership { message, joined })
        }
        InboundType::Edit => {
            message.is_edited = true;
            message.edited_at_ms = message.edited_at_ms.or(Some(now_ms));
            message.resolve_ownership(binding.user_id);
            Some(Normalized::Edit(message))
        }
        InboundType::Message => {
            message.resolve_ownership(binding.user_id);
            Some(Normalized::Append(message))
        }
        InboundType::ClientSignal => None,
        InboundType::Unknown(kind) => {
            tracing::debug!(kind, "suppressing inbound event of unknown type");
            None
        }
    }
}

/// Builds a message from payload fields alone, applying the missing-field
/// defaults. Ownership is left unset.
pub fn message_from_payload(payload: &InboundPayload, fallback_room: i64, now_ms: i64) -> ChatMessage {
    let room_id = match coerce_id(payload.chat_room_id.as_ref()) {
        0 => fallback_room,
        room_id => room_id,
    };

    let sender_name = payload
        .sender_nickname
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(UNKNOWN_SENDER)
        .to_owned();

    let file = if payload.file_name.is_some() || payload.file_path.is_some() {
        Some(FileMeta {
            name: payload.file_name.clone(),
            size: coerce_u64(payload.file_size.as_ref()),
            path: payload.file_path.clone(),
        })
    } else {
        None
    };

    let is_deleted = coerce_bool(payload.is_deleted.as_ref()).unwrap_or(false);
    let content = if is_deleted {
        DELETED_PLACEHOLDER.to_owned()
    } else {
        payload.content.clone().unwrap_or_default()
    };

    ChatMessage {
        id: coerce_id(payload.message_id.as_ref()),
        room_id,
        sender_id: coerce_id(payload.sender_id.as_ref()),
        sender_name,
        sender_active: coerce_bool(payload.sender_active.as_ref()).unwrap_or(true),
        kind: payload
            .message_type
            .as_deref()
            .map(MessageKind::from_wire)
            .unwrap_or_default(),
        content,
        created_at_ms: coerce_timestamp_ms(payload.created_at.as_ref()).unwrap_or(now_ms),
        is_edited: coerce_bool(payload.is_edited.as_ref()).unwrap_or(false),
        edited_at_ms: coerce_timestamp_ms(payload.edited_at.as_ref()),
        is_deleted,
        is_mine: false,
        file,
    }
}
