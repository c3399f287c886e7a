use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use serde_json::{json, Value};

use crate::{
    broker::transport::{
        BrokerTransport, ConnectCredentials, FrameHandler, TransportError, TransportFactory,
    },
    domain::{
        chat_room::ChatRoom,
        message::{ChatMessage, MessageKind},
        status::now_unix_ms,
    },
    usecases::{
        list_rooms::{RoomsSource, RoomsSourceError},
        load_messages::{MessagesSource, MessagesSourceError},
        mark_read::{ReadTrackingSink, ReadTrackingSourceError},
        send_message::{MessageWriter, SendMessageSourceError},
    },
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Connect {
        token: String,
        user_id: i64,
        nickname: String,
    },
    Subscribe(String),
    Send {
        destination: String,
        body: String,
    },
    Disconnect,
}

struct Subscription {
    id: u64,
    transport: u64,
    destination: String,
    handler: Option<FrameHandler>,
}

#[derive(Default)]
struct FakeBrokerState {
    calls: Vec<TransportCall>,
    connect_failure: Option<TransportError>,
    subscribe_failure: Option<TransportError>,
    send_failure: Option<TransportError>,
    subscriptions: Vec<Subscription>,
    live_transport: Option<u64>,
    next_transport: u64,
    next_subscription: u64,
    echo: bool,
    next_echo_id: i64,
}

/// In-memory broker. Every transport it creates records its calls here, and
/// tests can push inbound frames to live subscriptions.
#[derive(Clone, Default)]
pub struct FakeBroker {
    state: Arc<Mutex<FakeBrokerState>>,
}

impl FakeBroker {
    /// Echoes every published MESSAGE back to the room topic with a fresh id,
    /// the way the real broker does.
    pub fn with_echo() -> Self {
        let broker = Self::default();
        {
            let mut state = broker.lock();
            state.echo = true;
            state.next_echo_id = 500;
        }
        broker
    }

    fn lock(&self) -> MutexGuard<'_, FakeBrokerState> {
        self.state.lock().expect("fake broker lock")
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.lock().calls.clone()
    }

    /// Calls as short strings, e.g. `SEND JOIN /app/chat/7`.
    pub fn call_kinds(&self) -> Vec<String> {
        self.calls()
            .iter()
            .map(|call| match call {
                TransportCall::Connect { .. } => "CONNECT".to_owned(),
                TransportCall::Subscribe(destination) => format!("SUBSCRIBE {destination}"),
                TransportCall::Send { destination, body } => {
                    let kind = serde_json::from_str::<Value>(body)
                        .ok()
                        .and_then(|value| value["type"].as_str().map(str::to_owned))
                        .unwrap_or_else(|| "?".to_owned());
                    format!("SEND {kind} {destination}")
                }
                TransportCall::Disconnect => "DISCONNECT".to_owned(),
            })
            .collect()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn last_sent_body(&self) -> Option<String> {
        self.lock().calls.iter().rev().find_map(|call| match call {
            TransportCall::Send { body, .. } => Some(body.clone()),
            _ => None,
        })
    }

    pub fn fail_next_connect(&self, error: TransportError) {
        self.lock().connect_failure = Some(error);
    }

    pub fn fail_next_subscribe(&self, error: TransportError) {
        self.lock().subscribe_failure = Some(error);
    }

    /// Makes every following send fail until [`Self::accept_sends`].
    pub fn fail_sends(&self, error: TransportError) {
        self.lock().send_failure = Some(error);
    }

    pub fn accept_sends(&self) {
        self.lock().send_failure = None;
    }

    /// Simulates a silent network drop: no callback, no frames.
    pub fn drop_connection(&self) {
        self.lock().live_transport = None;
    }

    /// Delivers `body` to every live subscription on `destination`.
    pub fn deliver(&self, destination: &str, body: &str) {
        let mut taken = Vec::new();
        {
            let mut state = self.lock();
            let live = state.live_transport;
            for subscription in &mut state.subscriptions {
                if Some(subscription.transport) == live && subscription.destination == destination
                {
                    if let Some(handler) = subscription.handler.take() {
                        taken.push((subscription.id, handler));
                    }
                }
            }
        }

        for (_, handler) in &mut taken {
            handler(body.to_owned());
        }

        let mut state = self.lock();
        for (id, handler) in taken {
            if let Some(subscription) = state.subscriptions.iter_mut().find(|sub| sub.id == id) {
                subscription.handler = Some(handler);
            }
        }
    }

    fn echo_for(&self, destination: &str, body: &str) -> Option<(String, String)> {
        let mut state = self.lock();
        if !state.echo {
            return None;
        }
        let sent: Value = serde_json::from_str(body).ok()?;
        if sent["type"] != "MESSAGE" {
            return None;
        }

        state.next_echo_id += 1;
        let echo = json!({
            "type": "MESSAGE",
            "messageId": state.next_echo_id,
            "chatRoomId": sent["chatRoomId"],
            "senderId": sent["senderId"],
            "senderNickname": sent["senderNickname"],
            "messageType": sent["messageType"],
            "content": sent["content"],
            "createdAt": now_unix_ms(),
        });
        Some((
            destination.replacen("/app/chat/", "/topic/chatroom/", 1),
            echo.to_string(),
        ))
    }
}

impl TransportFactory for FakeBroker {
    fn create(&self) -> Result<Box<dyn BrokerTransport>, TransportError> {
        let id = {
            let mut state = self.lock();
            state.next_transport += 1;
            state.next_transport
        };
        Ok(Box::new(FakeTransport {
            broker: self.clone(),
            id,
            connected: false,
        }))
    }
}

struct FakeTransport {
    broker: FakeBroker,
    id: u64,
    connected: bool,
}

impl BrokerTransport for FakeTransport {
    fn connect(&mut self, credentials: &ConnectCredentials) -> Result<(), TransportError> {
        let mut state = self.broker.lock();
        state.calls.push(TransportCall::Connect {
            token: credentials.token.clone(),
            user_id: credentials.user_id,
            nickname: credentials.nickname.clone(),
        });
        if let Some(error) = state.connect_failure.take() {
            return Err(error);
        }
        self.connected = true;
        state.live_transport = Some(self.id);
        Ok(())
    }

    fn subscribe(&mut self, destination: &str, handler: FrameHandler) -> Result<(), TransportError> {
        let mut state = self.broker.lock();
        state.calls.push(TransportCall::Subscribe(destination.to_owned()));
        if let Some(error) = state.subscribe_failure.take() {
            return Err(error);
        }
        state.next_subscription += 1;
        let id = state.next_subscription;
        state.subscriptions.push(Subscription {
            id,
            transport: self.id,
            destination: destination.to_owned(),
            handler: Some(handler),
        });
        Ok(())
    }

    fn send(&mut self, destination: &str, body: &str) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        {
            let mut state = self.broker.lock();
            if let Some(error) = state.send_failure.clone() {
                return Err(error);
            }
            state.calls.push(TransportCall::Send {
                destination: destination.to_owned(),
                body: body.to_owned(),
            });
        }

        if let Some((topic, echo)) = self.broker.echo_for(destination, body) {
            self.broker.deliver(&topic, &echo);
        }
        Ok(())
    }

    fn disconnect(&mut self) {
        if !self.connected {
            return;
        }
        self.connected = false;

        let mut state = self.broker.lock();
        state.calls.push(TransportCall::Disconnect);
        if state.live_transport == Some(self.id) {
            state.live_transport = None;
        }
        let id = self.id;
        state.subscriptions.retain(|subscription| subscription.transport != id);
    }

    fn is_connected(&self) -> bool {
        self.connected && self.broker.lock().live_transport == Some(self.id)
    }
}

#[derive(Default)]
struct FakeChatApiState {
    rooms: Vec<ChatRoom>,
    history: HashMap<i64, Vec<ChatMessage>>,
    unread: HashMap<i64, u32>,
    history_failure: Option<MessagesSourceError>,
    send_failure: Option<SendMessageSourceError>,
    mark_read_failure: Option<ReadTrackingSourceError>,
    history_requests: Vec<(i64, u32, usize)>,
    sent: Vec<(i64, String)>,
    marked: Vec<(i64, i64)>,
    deleted: Vec<i64>,
    next_id: i64,
}

/// In-memory REST backend acting as the viewer `user_id`/`nickname`.
#[derive(Clone)]
pub struct FakeChatApi {
    user_id: i64,
    nickname: String,
    state: Arc<Mutex<FakeChatApiState>>,
}

impl FakeChatApi {
    pub fn new(user_id: i64, nickname: &str) -> Self {
        Self {
            user_id,
            nickname: nickname.to_owned(),
            state: Arc::new(Mutex::new(FakeChatApiState {
                next_id: 1_000,
                ..FakeChatApiState::default()
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FakeChatApiState> {
        self.state.lock().expect("fake api lock")
    }

    pub fn add_room(&self, room: ChatRoom) {
        self.lock().rooms.push(room);
    }

    /// Stores a room's history, oldest first.
    pub fn set_history(&self, room_id: i64, messages: Vec<ChatMessage>) {
        self.lock().history.insert(room_id, messages);
    }

    pub fn set_unread(&self, room_id: i64, count: u32) {
        self.lock().unread.insert(room_id, count);
    }

    pub fn fail_history(&self, error: Option<MessagesSourceError>) {
        self.lock().history_failure = error;
    }

    pub fn fail_sends(&self, error: Option<SendMessageSourceError>) {
        self.lock().send_failure = error;
    }

    pub fn fail_mark_read(&self, error: Option<ReadTrackingSourceError>) {
        self.lock().mark_read_failure = error;
    }

    pub fn history_requests(&self) -> Vec<(i64, u32, usize)> {
        self.lock().history_requests.clone()
    }

    pub fn sent(&self) -> Vec<(i64, String)> {
        self.lock().sent.clone()
    }

    pub fn marked(&self) -> Vec<(i64, i64)> {
        self.lock().marked.clone()
    }

    pub fn deleted(&self) -> Vec<i64> {
        self.lock().deleted.clone()
    }

    fn find_message(state: &mut FakeChatApiState, message_id: i64) -> Option<&mut ChatMessage> {
        state
            .history
            .values_mut()
            .flat_map(|messages| messages.iter_mut())
            .find(|message| message.id == message_id)
    }
}

impl RoomsSource for FakeChatApi {
    fn list_my_rooms(&self) -> Result<Vec<ChatRoom>, RoomsSourceError> {
        Ok(self.lock().rooms.clone())
    }

    fn room_for_performance(&self, performance_id: i64) -> Result<ChatRoom, RoomsSourceError> {
        self.lock()
            .rooms
            .iter()
            .find(|room| room.room_id * 100 == performance_id)
            .cloned()
            .ok_or(RoomsSourceError::NotFound)
    }

    fn join_room(&self, room_id: i64) -> Result<ChatRoom, RoomsSourceError> {
        let mut state = self.lock();
        let room = state
            .rooms
            .iter_mut()
            .find(|room| room.room_id == room_id)
            .ok_or(RoomsSourceError::NotFound)?;
        room.participant_count += 1;
        Ok(room.clone())
    }
}

impl MessagesSource for FakeChatApi {
    fn list_messages(
        &self,
        room_id: i64,
        page: u32,
        size: usize,
    ) -> Result<Vec<ChatMessage>, MessagesSourceError> {
        let mut state = self.lock();
        state.history_requests.push((room_id, page, size));
        if let Some(error) = state.history_failure.clone() {
            return Err(error);
        }

        let history = state.history.get(&room_id).cloned().unwrap_or_default();
        let end = history.len().saturating_sub(page as usize * size);
        let start = end.saturating_sub(size);
        Ok(history[start..end].to_vec())
    }
}

impl MessageWriter for FakeChatApi {
    fn send_message(
        &self,
        room_id: i64,
        content: &str,
        kind: MessageKind,
    ) -> Result<ChatMessage, SendMessageSourceError> {
        let mut state = self.lock();
        if let Some(error) = state.send_failure.clone() {
            return Err(error);
        }
        state.next_id += 1;
        state.sent.push((room_id, content.to_owned()));

        let message = ChatMessage {
            id: state.next_id,
            room_id,
            sender_id: self.user_id,
            sender_name: self.nickname.clone(),
            sender_active: true,
            kind,
            content: content.to_owned(),
            created_at_ms: now_unix_ms(),
            is_edited: false,
            edited_at_ms: None,
            is_deleted: false,
            is_mine: false,
            file: None,
        };
        state.history.entry(room_id).or_default().push(message.clone());
        Ok(message)
    }

    fn edit_message(
        &self,
        message_id: i64,
        content: &str,
    ) -> Result<ChatMessage, SendMessageSourceError> {
        let mut state = self.lock();
        if let Some(error) = state.send_failure.clone() {
            return Err(error);
        }
        let message =
            Self::find_message(&mut state, message_id).ok_or(SendMessageSourceError::NotFound)?;
        message.content = content.to_owned();
        message.is_edited = true;
        message.edited_at_ms = Some(now_unix_ms());
        Ok(message.clone())
    }

    fn delete_message(&self, message_id: i64) -> Result<(), SendMessageSourceError> {
        let mut state = self.lock();
        if let Some(error) = state.send_failure.clone() {
            return Err(error);
        }
        let message =
            Self::find_message(&mut state, message_id).ok_or(SendMessageSourceError::NotFound)?;
        message.tombstone();
        state.deleted.push(message_id);
        Ok(())
    }
}

impl ReadTrackingSink for FakeChatApi {
    fn mark_read(
        &self,
        room_id: i64,
        last_read_message_id: i64,
    ) -> Result<(), ReadTrackingSourceError> {
        let mut state = self.lock();
        if let Some(error) = state.mark_read_failure.clone() {
            return Err(error);
        }
        state.marked.push((room_id, last_read_message_id));
        state.unread.insert(room_id, 0);
        Ok(())
    }

    fn unread_count(&self, room_id: i64) -> Result<u32, ReadTrackingSourceError> {
        Ok(self.lock().unread.get(&room_id).copied().unwrap_or(0))
    }
}

/// A plain text message from `sender_id` in `room_id`.
pub fn text_message(id: i64, room_id: i64, sender_id: i64, content: &str, created_at_ms: i64) -> ChatMessage {
    ChatMessage {
        id,
        room_id,
        sender_id,
        sender_name: format!("user-{sender_id}"),
        sender_active: true,
        kind: MessageKind::Text,
        content: content.to_owned(),
        created_at_ms,
        is_edited: false,
        edited_at_ms: None,
        is_deleted: false,
        is_mine: false,
        file: None,
    }
}
