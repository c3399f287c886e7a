//! REST backend adapter.
//!
//! Every call blocks on the shared tokio runtime. Responses may be bare JSON or
//! wrapped as `{ "data": ... }`; both are accepted.

use std::{sync::Arc, time::Duration};

use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::runtime::Runtime;

use crate::{
    broker::{
        normalizer::message_from_payload,
        payload::{coerce_id, coerce_timestamp_ms, coerce_u64, InboundPayload},
    },
    domain::{
        chat_room::{ChatRoom, RoomStatus},
        message::{ChatMessage, MessageKind},
        status::now_unix_ms,
    },
    infra::{config::ApiConfig, error::AppError, secrets::sanitize_error_code},
    usecases::{
        list_rooms::{RoomsSource, RoomsSourceError},
        load_messages::{MessagesSource, MessagesSourceError},
        mark_read::{ReadTrackingSink, ReadTrackingSourceError},
        send_message::{MessageWriter, SendMessageSourceError},
    },
};

const HTTP_REQUEST_FAILED: &str = "CHAT_HTTP_REQUEST_FAILED";
const HTTP_STATUS_REJECTED: &str = "CHAT_HTTP_STATUS_REJECTED";
const HTTP_BODY_INVALID: &str = "CHAT_HTTP_BODY_INVALID";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HttpFailure {
    Unauthorized,
    NotFound,
    Unavailable,
    InvalidData,
}

impl From<HttpFailure> for RoomsSourceError {
    fn from(failure: HttpFailure) -> Self {
        match failure {
            HttpFailure::Unauthorized => Self::Unauthorized,
            HttpFailure::NotFound => Self::NotFound,
            HttpFailure::Unavailable => Self::Unavailable,
            HttpFailure::InvalidData => Self::InvalidData,
        }
    }
}

impl From<HttpFailure> for MessagesSourceError {
    fn from(failure: HttpFailure) -> Self {
        match failure {
            HttpFailure::Unauthorized => Self::Unauthorized,
            HttpFailure::NotFound => Self::RoomNotFound,
            HttpFailure::Unavailable => Self::Unavailable,
            HttpFailure::InvalidData => Self::InvalidData,
        }
    }
}

impl From<HttpFailure> for SendMessageSourceError {
    fn from(failure: HttpFailure) -> Self {
        match failure {
            HttpFailure::Unauthorized => Self::Unauthorized,
            HttpFailure::NotFound => Self::NotFound,
            HttpFailure::Unavailable => Self::Unavailable,
            HttpFailure::InvalidData => Self::InvalidData,
        }
    }
}

impl From<HttpFailure> for ReadTrackingSourceError {
    fn from(failure: HttpFailure) -> Self {
        match failure {
            HttpFailure::Unauthorized => Self::Unauthorized,
            HttpFailure::NotFound => Self::RoomNotFound,
            HttpFailure::Unavailable | HttpFailure::InvalidData => Self::Unavailable,
        }
    }
}

pub struct HttpChatApi {
    client: Client,
    base_url: String,
    token: String,
    runtime: Arc<Runtime>,
}

impl std::fmt::Debug for HttpChatApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpChatApi")
            .field("base_url", &self.base_url)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl HttpChatApi {
    pub fn new(config: &ApiConfig, token: String, runtime: Arc<Runtime>) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(AppError::HttpClient)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            token,
            runtime,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
    }

    /// Sends the request and returns the unwrapped JSON body (`Null` if empty).
    fn execute(&self, request: RequestBuilder) -> Result<Value, HttpFailure> {
        self.runtime.block_on(async move {
            let response = request.send().await.map_err(|error| {
                tracing::warn!(
                    code = HTTP_REQUEST_FAILED,
                    error = %error.without_url(),
                    "chat API request failed"
                );
                HttpFailure::Unavailable
            })?;

            let status = response.status();
            let body = response.bytes().await.map_err(|_| HttpFailure::Unavailable)?;

            if !status.is_success() {
                let server_code = serde_json::from_slice::<Value>(&body)
                    .ok()
                    .and_then(|value| value.get("code").and_then(Value::as_str).map(sanitize_error_code));
                tracing::warn!(
                    code = HTTP_STATUS_REJECTED,
                    status = status.as_u16(),
                    server_code = server_code.as_deref().unwrap_or("NONE"),
                    "chat API rejected request"
                );
                return Err(classify_status(status));
            }

            if body.iter().all(u8::is_ascii_whitespace) {
                return Ok(Value::Null);
            }
            serde_json::from_slice::<Value>(&body)
                .map(unwrap_envelope)
                .map_err(|error| {
                    tracing::warn!(code = HTTP_BODY_INVALID, error = %error, "chat API body is not JSON");
                    HttpFailure::InvalidData
                })
        })
    }
}

impl RoomsSource for HttpChatApi {
    fn list_my_rooms(&self) -> Result<Vec<ChatRoom>, RoomsSourceError> {
        let body = self.execute(self.request(Method::GET, "/api/chat/rooms/my"))?;
        Ok(rooms_from_value(body)?)
    }

    fn room_for_performance(&self, performance_id: i64) -> Result<ChatRoom, RoomsSourceError> {
        let path = format!("/api/chat/rooms/performance/{performance_id}");
        let body = self.execute(self.request(Method::GET, &path))?;
        Ok(room_from_value(body)?)
    }

    fn join_room(&self, room_id: i64) -> Result<ChatRoom, RoomsSourceError> {
        let path = format!("/api/chat/rooms/{room_id}/join");
        let body = self.execute(self.request(Method::POST, &path))?;
        Ok(room_from_value(body)?)
    }
}

impl MessagesSource for HttpChatApi {
    fn list_messages(
        &self,
        room_id: i64,
        page: u32,
        size: usize,
    ) -> Result<Vec<ChatMessage>, MessagesSourceError> {
        let path = format!("/api/chat/rooms/{room_id}/messages");
        let request = self
            .request(Method::GET, &path)
            .query(&[("page", page.to_string()), ("size", size.to_string())]);
        let body = self.execute(request)?;
        Ok(messages_from_value(body, room_id, now_unix_ms())?)
    }
}

impl MessageWriter for HttpChatApi {
    fn send_message(
        &self,
        room_id: i64,
        content: &str,
        kind: MessageKind,
    ) -> Result<ChatMessage, SendMessageSourceError> {
        let path = format!("/api/chat/rooms/{room_id}/messages");
        let request = self
            .request(Method::POST, &path)
            .json(&json!({ "content": content, "messageType": kind.as_wire() }));
        let body = self.execute(request)?;
        Ok(message_from_value(body, room_id, now_unix_ms())?)
    }

    fn edit_message(
        &self,
        message_id: i64,
        content: &str,
    ) -> Result<ChatMessage, SendMessageSourceError> {
        let path = format!("/api/chat/messages/{message_id}");
        let request = self
            .request(Method::PUT, &path)
            .json(&json!({ "content": content }));
        let body = self.execute(request)?;
        Ok(message_from_value(body, 0, now_unix_ms())?)
    }

    fn delete_message(&self, message_id: i64) -> Result<(), SendMessageSourceError> {
        let path = format!("/api/chat/messages/{message_id}");
        self.execute(self.request(Method::DELETE, &path))?;
        Ok(())
    }
}

impl ReadTrackingSink for HttpChatApi {
    fn mark_read(
        &self,
        room_id: i64,
        last_read_message_id: i64,
    ) -> Result<(), ReadTrackingSourceError> {
        let path = format!("/api/chat/rooms/{room_id}/read");
        let request = self
            .request(Method::PATCH, &path)
            .json(&json!({ "lastReadMessageId": last_read_message_id }));
        self.execute(request)?;
        Ok(())
    }

    fn unread_count(&self, room_id: i64) -> Result<u32, ReadTrackingSourceError> {
        let path = format!("/api/chat/rooms/{room_id}/unread-count");
        let body = self.execute(self.request(Method::GET, &path))?;
        Ok(unread_from_value(&body).ok_or(HttpFailure::InvalidData)?)
    }
}

fn classify_status(status: StatusCode) -> HttpFailure {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => HttpFailure::Unauthorized,
        StatusCode::NOT_FOUND => HttpFailure::NotFound,
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => HttpFailure::InvalidData,
        _ => HttpFailure::Unavailable,
    }
}

fn unwrap_envelope(value: Value) -> Value {
    match value {
        Value::Object(mut object) if object.contains_key("data") => {
            object.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// Items of a list response: a bare array, or a page object carrying `content`.
fn list_items(value: Value) -> Result<Vec<Value>, HttpFailure> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Null => Ok(Vec::new()),
        Value::Object(mut object) => match object.remove("content").or_else(|| object.remove("messages")) {
            Some(Value::Array(items)) => Ok(items),
            _ => Err(HttpFailure::InvalidData),
        },
        _ => Err(HttpFailure::InvalidData),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RoomDto {
    #[serde(alias = "id", alias = "roomId")]
    chat_room_id: Option<Value>,
    #[serde(alias = "roomName", alias = "title")]
    name: Option<String>,
    #[serde(alias = "currentParticipants")]
    participant_count: Option<Value>,
    max_participants: Option<Value>,
    status: Option<String>,
    #[serde(alias = "lastMessageContent")]
    last_message: Option<String>,
    #[serde(alias = "lastMessageTime")]
    last_message_at: Option<Value>,
    #[serde(alias = "unreadCount")]
    unread_message_count: Option<Value>,
}

impl RoomDto {
    fn into_room(self) -> Result<ChatRoom, HttpFailure> {
        let room_id = coerce_id(self.chat_room_id.as_ref());
        if room_id <= 0 {
            return Err(HttpFailure::InvalidData);
        }

        let name = self
            .name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| format!("Room {room_id}"));
        let mut room = ChatRoom::new(room_id, name);
        room.participant_count = count(self.participant_count.as_ref()).unwrap_or(0);
        room.max_participants = count(self.max_participants.as_ref()).unwrap_or(0);
        room.unread_count = count(self.unread_message_count.as_ref());
        if matches!(
            self.status.as_deref().map(str::to_ascii_uppercase).as_deref(),
            Some("INACTIVE" | "CLOSED")
        ) {
            room.status = RoomStatus::Inactive;
        }
        if let Some(preview) = self.last_message {
            room.set_preview(&preview, coerce_timestamp_ms(self.last_message_at.as_ref()));
        }
        Ok(room)
    }
}

fn count(value: Option<&Value>) -> Option<u32> {
    coerce_u64(value).map(|count| u32::try_from(count).unwrap_or(u32::MAX))
}

fn room_from_value(value: Value) -> Result<ChatRoom, HttpFailure> {
    serde_json::from_value::<RoomDto>(value)
        .map_err(|_| HttpFailure::InvalidData)?
        .into_room()
}

fn rooms_from_value(value: Value) -> Result<Vec<ChatRoom>, HttpFailure> {
    list_items(value)?.into_iter().map(room_from_value).collect()
}

fn message_from_value(value: Value, room_id: i64, now_ms: i64) -> Result<ChatMessage, HttpFailure> {
    let payload: InboundPayload =
        serde_json::from_value(value).map_err(|_| HttpFailure::InvalidData)?;
    Ok(message_from_payload(&payload, room_id, now_ms))
}

fn messages_from_value(value: Value, room_id: i64, now_ms: i64) -> Result<Vec<ChatMessage>, HttpFailure> {
    list_items(value)?
        .into_iter()
        .map(|item| message_from_value(item, room_id, now_ms))
        .collect()
}

fn unread_from_value(value: &Value) -> Option<u32> {
    match value {
        Value::Object(object) => ["unreadCount", "count", "unreadMessageCount"]
            .iter()
            .find_map(|key| count(object.get(*key))),
        other => count(Some(other)),
    }
}
