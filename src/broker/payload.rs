//! JSON payloads exchanged over the room channel.
//!
//! Inbound payloads are decoded leniently: every field is optional and ids or
//! timestamps may arrive as numbers, numeric strings, ISO-8601 strings or
//! `[y, m, d, h, mi, s, nanos]` arrays. The normalizer decides what a missing
//! field means.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::message::MessageKind;

use super::session_manager::SessionBinding;

/// Values below this are treated as seconds rather than milliseconds.
const SECONDS_EPOCH_CEILING: i64 = 100_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboundType {
    Join,
    Message,
    Leave,
}

impl OutboundType {
    pub fn as_wire(self) -> &'static str {
        match self {
            Self::Join => "JOIN",
            Self::Message => "MESSAGE",
            Self::Leave => "LEAVE",
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OutboundEvent {
    #[serde(rename = "type")]
    pub event_type: &'static str,
    pub chat_room_id: i64,
    pub sender_id: i64,
    pub sender_nickname: String,
    pub message_type: &'static str,
    pub content: String,
}

impl OutboundEvent {
    /// Builds an event whose sender fields come from the session binding only.
    pub fn new(
        binding: &SessionBinding,
        event_type: OutboundType,
        kind: MessageKind,
        content: impl Into<String>,
    ) -> Self {
        Self {
            event_type: event_type.as_wire(),
            chat_room_id: binding.room_id,
            sender_id: binding.user_id,
            sender_nickname: binding.user_name.clone(),
            message_type: kind.as_wire(),
            content: content.into(),
        }
    }

    pub fn join(binding: &SessionBinding) -> Self {
        let content = format!("{} joined the room.", binding.user_name);
        Self::new(binding, OutboundType::Join, MessageKind::System, content)
    }

    pub fn leave(binding: &SessionBinding) -> Self {
        let content = format!("{} left the room.", binding.user_name);
        Self::new(binding, OutboundType::Leave, MessageKind::System, content)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Inbound event kinds, classified from the `type` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundType {
    Message,
    Delete,
    Edit,
    UserJoin,
    UserLeave,
    /// Client-originated signals echoed back by the broker.
    ClientSignal,
    Unknown(String),
}

impl InboundType {
    fn parse(value: Option<&str>) -> Self {
        let Some(value) = value else {
            return Self::Message;
        };
        match value.trim().to_ascii_uppercase().as_str() {
            "" | "MESSAGE" | "CHAT" | "TALK" => Self::Message,
            "DELETE" => Self::Delete,
            "EDIT" | "UPDATE" => Self::Edit,
            "USER_JOIN" => Self::UserJoin,
            "USER_LEAVE" => Self::UserLeave,
            "JOIN" | "LEAVE" => Self::ClientSignal,
            other => Self::Unknown(other.to_owned()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct InboundPayload {
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    #[serde(alias = "id")]
    pub message_id: Option<Value>,
    #[serde(alias = "roomId")]
    pub chat_room_id: Option<Value>,
    pub sender_id: Option<Value>,
    #[serde(alias = "senderName", alias = "nickname")]
    pub sender_nickname: Option<String>,
    #[serde(alias = "isSenderActive")]
    pub sender_active: Option<Value>,
    pub message_type: Option<String>,
    pub content: Option<String>,
    pub created_at: Option<Value>,
    #[serde(alias = "edited")]
    pub is_edited: Option<Value>,
    pub edited_at: Option<Value>,
    #[serde(alias = "deleted")]
    pub is_deleted: Option<Value>,
    pub file_name: Option<String>,
    pub file_size: Option<Value>,
    #[serde(alias = "fileUrl")]
    pub file_path: Option<String>,
    /// Present on some broadcasts; never trusted.
    pub is_my_message: Option<Value>,
    pub unread_count: Option<Value>,
}

impl InboundPayload {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn kind(&self) -> InboundType {
        InboundType::parse(self.event_type.as_deref())
    }
}

/// Coerces a wire id to an integer; anything missing or non-numeric is `0`.
pub fn coerce_id(value: Option<&Value>) -> i64 {
    match value {
        Some(Value::Number(number)) => number
            .as_i64()
            .or_else(|| number.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
            .unwrap_or(0),
        Some(Value::String(text)) => text.trim().parse::<i64>().unwrap_or(0),
        _ => 0,
    }
}

pub fn coerce_u64(value: Option<&Value>) -> Option<u64> {
    match value {
        Some(Value::Number(number)) => number.as_u64(),
        Some(Value::String(text)) => text.trim().parse().ok(),
        _ => None,
    }
}

pub fn coerce_bool(value: Option<&Value>) -> Option<bool> {
    match value {
        Some(Value::Bool(flag)) => Some(*flag),
        Some(Value::Number(number)) => number.as_i64().map(|n| n != 0),
        Some(Value::String(text)) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "y" => Some(true),
            "false" | "0" | "n" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Parses a wire timestamp into unix milliseconds. Naive date-times are UTC.
pub fn coerce_timestamp_ms(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|f| f as i64))
            .map(scale_epoch),
        Value::String(text) => parse_timestamp_text(text.trim()),
        Value::Array(parts) => parse_timestamp_parts(parts),
        _ => None,
    }
}

fn scale_epoch(value: i64) -> i64 {
    if value.unsigned_abs() < SECONDS_EPOCH_CEILING.unsigned_abs() {
        value.checked_mul(1_000).unwrap_or(value)
    } else {
        value
    }
}

fn parse_timestamp_text(text: &str) -> Option<i64> {
    if text.is_empty() {
        return None;
    }
    if let Ok(number) = text.parse::<i64>() {
        return Some(scale_epoch(number));
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.timestamp_millis());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map(|naive| naive.and_utc().timestamp_millis())
}

fn parse_timestamp_parts(parts: &[Value]) -> Option<i64> {
    let part = |index: usize| -> Option<u32> {
        match parts.get(index) {
            Some(value) => value.as_u64().and_then(|n| u32::try_from(n).ok()),
            None => Some(0),
        }
    };

    let year = i32::try_from(parts.first()?.as_i64()?).ok()?;
    let date = NaiveDate::from_ymd_opt(year, part(1)?, part(2)?)?;
    let time = date.and_hms_nano_opt(part(3)?, part(4)?, part(5)?, part(6)?)?;
    Some(time.and_utc().timestamp_millis())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn binding() -> SessionBinding {
        SessionBinding {
            room_id: 7,
            user_id: 42,
            user_name: "neo".to_owned(),
        }
    }

    #[test]
    fn outbound_message_serializes_with_wire_names() {
        let event = OutboundEvent::new(
            &binding(),
            OutboundType::Message,
            MessageKind::Text,
            "hello",
        );

        let value: Value =
            serde_json::from_str(&event.to_json().expect("serialize")).expect("json");

        assert_eq!(
            value,
            json!({
                "type": "MESSAGE",
                "chatRoomId": 7,
                "senderId": 42,
                "senderNickname": "neo",
                "messageType": "TEXT",
                "content": "hello"
            })
        );
    }

    #[test]
    fn join_and_leave_are_system_signals() {
        let join = OutboundEvent::join(&binding());
        let leave = OutboundEvent::leave(&binding());

        assert_eq!(join.event_type, "JOIN");
        assert_eq!(join.message_type, "SYSTEM");
        assert_eq!(leave.event_type, "LEAVE");
        assert!(leave.content.contains("neo"));
    }

    #[test]
    fn extreme_timestamps_pass_through_unscaled() {
        assert_eq!(coerce_timestamp_ms(Some(&json!(i64::MIN))), Some(i64::MIN));
        assert_eq!(coerce_timestamp_ms(Some(&json!(i64::MAX))), Some(i64::MAX));
        assert_eq!(coerce_timestamp_ms(Some(&json!(-9e18))), Some(-9_000_000_000_000_000_000));
        assert_eq!(coerce_timestamp_ms(Some(&json!(-5))), Some(-5_000));
    }

    #[test]
    fn inbound_accepts_aliases_and_missing_fields() {
        let payload = InboundPayload::from_json(
            r#"{"type":"DELETE","id":"15","roomId":7,"senderName":"trinity"}"#,
        )
        .expect("payload should decode");

        assert_eq!(payload.kind(), InboundType::Delete);
        assert_eq!(coerce_id(payload.message_id.as_ref()), 15);
        assert_eq!(coerce_id(payload.chat_room_id.as_ref()), 7);
        assert_eq!(payload.sender_nickname.as_deref(), Some("trinity"));
        assert!(payload.created_at.is_none());
    }

    #[test]
    fn inbound_type_classification() {
        assert_eq!(InboundType::parse(None), InboundType::Message);
        assert_eq!(InboundType::parse(Some("user_join")), InboundType::UserJoin);
        assert_eq!(InboundType::parse(Some("USER_LEAVE")), InboundType::UserLeave);
        assert_eq!(InboundType::parse(Some("JOIN")), InboundType::ClientSignal);
        assert_eq!(InboundType::parse(Some("UPDATE")), InboundType::Edit);
        assert_eq!(
            InboundType::parse(Some("TYPING")),
            InboundType::Unknown("TYPING".to_owned())
        );
    }

    #[test]
    fn ids_coerce_to_zero_when_unusable() {
        assert_eq!(coerce_id(Some(&json!("42"))), 42);
        assert_eq!(coerce_id(Some(&json!(42))), 42);
        assert_eq!(coerce_id(Some(&json!("abc"))), 0);
        assert_eq!(coerce_id(Some(&json!(null))), 0);
        assert_eq!(coerce_id(None), 0);
    }

    #[test]
    fn timestamps_accept_every_wire_shape() {
        let expected = 1_718_000_000_000;

        assert_eq!(coerce_timestamp_ms(Some(&json!(expected))), Some(expected));
        assert_eq!(
            coerce_timestamp_ms(Some(&json!(1_718_000_000))),
            Some(expected)
        );
        assert_eq!(
            coerce_timestamp_ms(Some(&json!("2024-06-10T06:13:20Z"))),
            Some(expected)
        );
        assert_eq!(
            coerce_timestamp_ms(Some(&json!("2024-06-10T06:13:20"))),
            Some(expected)
        );
        assert_eq!(
            coerce_timestamp_ms(Some(&json!("2024-06-10T15:13:20+09:00"))),
            Some(expected)
        );
        assert_eq!(
            coerce_timestamp_ms(Some(&json!([2024, 6, 10, 6, 13, 20]))),
            Some(expected)
        );
        assert_eq!(coerce_timestamp_ms(Some(&json!("yesterday"))), None);
        assert_eq!(coerce_timestamp_ms(None), None);
    }

    #[test]
    fn bools_accept_strings_and_numbers() {
        assert_eq!(coerce_bool(Some(&json!(true))), Some(true));
        assert_eq!(coerce_bool(Some(&json!("false"))), Some(false));
        assert_eq!(coerce_bool(Some(&json!(1))), Some(true));
        assert_eq!(coerce_bool(Some(&json!("maybe"))), None);
    }
}
