//! The chat controller: owns the session, the message store, the unread
//! tracker and the room list for one signed-in viewer.
//!
//! Inbound broker frames never touch this state directly. The session callback
//! only enqueues them; [`ChatController::pump`] drains the queue on the owning
//! thread, so a publish can never re-enter the store through its own echo.

use std::{
    collections::BTreeMap,
    sync::mpsc::{self, Receiver, Sender},
};

use thiserror::Error;

use crate::{
    broker::{
        normalizer::{normalize, Normalized},
        payload::InboundPayload,
        session_manager::{ConnectionFailure, HealthCheck, SessionManager},
        transport::TransportFactory,
    },
    domain::{
        chat_room::ChatRoom,
        events::ChatEvent,
        message::ChatMessage,
        message_store::{AppendOutcome, MessageStore, MutationOutcome, PageOutcome, RoomTimeline},
        read_state::UnreadTracker,
        status::{now_unix_ms, ConnectionStatus},
    },
};

use super::{
    contracts::ChatApi,
    event_bus::ChatEventBus,
    list_rooms::{self, ListRoomsError},
    load_messages::{load_page, LoadMessagesError, LoadMessagesQuery},
    mark_read::{hydrate_unread, mark_read, MarkReadError},
    send_message::{
        map_source_error, send_message, SendMessageCommand, SendMessageError,
        SendMessageFailure, SendOutcome,
    },
};

const HISTORY_LOAD_FAILED: &str = "CHAT_HISTORY_LOAD_FAILED";
const STALE_INBOUND_DISCARDED: &str = "CHAT_STALE_INBOUND_DISCARDED";
const ROOM_OPEN_FAILED: &str = "CHAT_ROOM_OPEN_FAILED";

/// The signed-in user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewer {
    pub user_id: i64,
    pub nickname: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ControllerError {
    #[error("no room is open")]
    NoActiveRoom,
    #[error(transparent)]
    Connection(#[from] ConnectionFailure),
    #[error("room list unavailable: {0:?}")]
    Rooms(ListRoomsError),
    #[error("history load failed: {0:?}")]
    History(LoadMessagesError),
    #[error("message not sent: {:?}", .0.failure)]
    Send(SendMessageError),
    #[error("read position not saved: {0:?}")]
    ReadTracking(MarkReadError),
    #[error("message {0} is not in the open room")]
    UnknownMessage(i64),
    #[error("message {0} belongs to someone else")]
    NotOwnMessage(i64),
}

struct Inbound {
    generation: u64,
    payload: InboundPayload,
}

pub struct ChatController<A: ChatApi, F: TransportFactory> {
    api: A,
    sessions: SessionManager<F>,
    viewer: Viewer,
    page_size: usize,
    rooms: BTreeMap<i64, ChatRoom>,
    store: MessageStore,
    tracker: UnreadTracker,
    bus: ChatEventBus,
    inbound_tx: Sender<Inbound>,
    inbound_rx: Receiver<Inbound>,
    generation: u64,
    active_room: Option<i64>,
}

impl<A: ChatApi, F: TransportFactory> ChatController<A, F> {
    pub fn new(api: A, sessions: SessionManager<F>, viewer: Viewer, page_size: usize) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel();
        Self {
            api,
            sessions,
            viewer,
            page_size,
            rooms: BTreeMap::new(),
            store: MessageStore::new(),
            tracker: UnreadTracker::new(),
            bus: ChatEventBus::new(),
            inbound_tx,
            inbound_rx,
            generation: 0,
            active_room: None,
        }
    }

    pub fn subscribe(&self) -> Receiver<ChatEvent> {
        self.bus.subscribe()
    }

    pub fn viewer(&self) -> &Viewer {
        &self.viewer
    }

    pub fn active_room(&self) -> Option<i64> {
        self.active_room
    }

    pub fn status(&self) -> ConnectionStatus {
        self.sessions.status()
    }

    pub fn room(&self, room_id: i64) -> Option<&ChatRoom> {
        self.rooms.get(&room_id)
    }

    /// Known rooms, most recently active first.
    pub fn rooms(&self) -> Vec<&ChatRoom> {
        let mut rooms: Vec<&ChatRoom> = self.rooms.values().collect();
        rooms.sort_by(|left, right| {
            right
                .last_message_at_ms
                .cmp(&left.last_message_at_ms)
                .then_with(|| left.room_id.cmp(&right.room_id))
        });
        rooms
    }

    pub fn messages(&self, room_id: i64) -> &[ChatMessage] {
        self.store.messages(room_id)
    }

    pub fn has_more(&self, room_id: i64) -> bool {
        self.store.has_more(room_id)
    }

    pub fn unread(&self, room_id: i64) -> u32 {
        self.tracker.unread(room_id)
    }

    pub fn total_unread(&self) -> u32 {
        self.tracker.total()
    }

    /// Re-fetches the room list. Server unread counts replace local estimates;
    /// rooms without one are hydrated once.
    pub fn refresh_rooms(&mut self) -> Result<Vec<ChatRoom>, ControllerError> {
        let listed = list_rooms::list_rooms(&self.api).map_err(ControllerError::Rooms)?;

        for room in &listed {
            self.tracker.set_server_count(room.room_id, room.unread_count);
            if room.unread_count.is_none() {
                hydrate_unread(&self.api, &mut self.tracker, room.room_id);
            }
            self.merge_room(room.clone());
        }

        self.bus.publish(ChatEvent::RoomListChanged);
        Ok(listed)
    }

    pub fn room_for_performance(&mut self, performance_id: i64) -> Result<ChatRoom, ControllerError> {
        let room = list_rooms::find_room_for_performance(&self.api, performance_id)
            .map_err(ControllerError::Rooms)?;
        self.merge_room(room.clone());
        self.bus.publish(ChatEvent::RoomListChanged);
        Ok(room)
    }

    pub fn join_room(&mut self, room_id: i64) -> Result<ChatRoom, ControllerError> {
        let room = list_rooms::join_room(&self.api, room_id).map_err(ControllerError::Rooms)?;
        self.merge_room(room.clone());
        self.bus.publish(ChatEvent::RoomListChanged);
        Ok(room)
    }

    /// Makes `room_id` the open room: connects its live session and loads the
    /// newest history page.
    ///
    /// A failed connection does not stop the history load; the room stays open
    /// and sends go through REST until [`Self::reconnect`] succeeds. The first
    /// error is returned.
    pub fn open_room(&mut self, room_id: i64) -> Result<(), ControllerError> {
        if self.active_room.is_some_and(|previous| previous != room_id) {
            self.close_room();
        }

        self.active_room = Some(room_id);
        self.tracker.focus(Some(room_id));
        hydrate_unread(&self.api, &mut self.tracker, room_id);
        self.rooms
            .entry(room_id)
            .or_insert_with(|| ChatRoom::new(room_id, format!("Room {room_id}")));

        self.generation += 1;
        let generation = self.generation;
        let inbound_tx = self.inbound_tx.clone();
        self.bus
            .publish(ChatEvent::ConnectionChanged(ConnectionStatus::Connecting));
        let connection = self.sessions.open_session(
            room_id,
            self.viewer.user_id,
            &self.viewer.nickname,
            Box::new(move |payload| {
                let _ = inbound_tx.send(Inbound {
                    generation,
                    payload,
                });
            }),
        );
        self.bus
            .publish(ChatEvent::ConnectionChanged(self.sessions.status()));

        let history = self.load_history(LoadMessagesQuery::initial(room_id, self.page_size));

        let unread = self.tracker.unread(room_id);
        if unread > 0 {
            self.tracker.decrement(room_id, unread);
            self.publish_unread(room_id);
        }

        if let Err(error) = &connection {
            tracing::warn!(code = ROOM_OPEN_FAILED, room_id, error = %error, "room opened without live session");
        }
        connection?;
        history?;
        Ok(())
    }

    /// Re-opens the session of the open room and re-fetches its newest page.
    pub fn reconnect(&mut self) -> Result<(), ControllerError> {
        let room_id = self.active_room.ok_or(ControllerError::NoActiveRoom)?;
        self.open_room(room_id)
    }

    /// Marks the open room read through its newest message and closes the
    /// session. A no-op without an open room.
    pub fn close_room(&mut self) {
        let Some(room_id) = self.active_room.take() else {
            return;
        };

        if let Some(through) = self.store.timeline(room_id).and_then(RoomTimeline::last_message_id) {
            let _ = mark_read(&self.api, &mut self.tracker, room_id, through, now_unix_ms());
            self.publish_unread(room_id);
        }

        self.sessions.close_session();
        self.generation += 1;
        self.tracker.focus(None);
        self.bus
            .publish(ChatEvent::ConnectionChanged(self.sessions.status()));
    }

    /// Applies every queued inbound event of the current session. Returns how
    /// many changed the store.
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;

        while let Ok(inbound) = self.inbound_rx.try_recv() {
            if inbound.generation != self.generation {
                tracing::debug!(
                    code = STALE_INBOUND_DISCARDED,
                    generation = inbound.generation,
                    "discarding event from a closed session"
                );
                continue;
            }
            let Some(binding) = self.sessions.binding().cloned() else {
                continue;
            };
            let Some(normalized) = normalize(&inbound.payload, &binding, now_unix_ms()) else {
                continue;
            };
            if self.apply(binding.room_id, normalized) {
                applied += 1;
            }
        }

        applied
    }

    /// Sends text to the open room, live when possible, else through REST.
    pub fn send(&mut self, content: &str) -> Result<SendOutcome, ControllerError> {
        let room_id = self.active_room.ok_or(ControllerError::NoActiveRoom)?;

        let outcome = send_message(
            &mut self.sessions,
            &self.api,
            &mut self.store,
            self.viewer.user_id,
            SendMessageCommand::text(room_id, content),
        )
        .map_err(ControllerError::Send)?;

        if let SendOutcome::Stored {
            message,
            outcome: AppendOutcome::Inserted,
        } = &outcome
        {
            if let Some(room) = self.rooms.get_mut(&room_id) {
                room.observe_message(message);
            }
            self.bus.publish(ChatEvent::MessageAppended {
                room_id,
                message: message.clone(),
            });
        }

        Ok(outcome)
    }

    /// Loads the next older page of the open room, if there is one.
    pub fn load_older(&mut self) -> Result<PageOutcome, ControllerError> {
        let room_id = self.active_room.ok_or(ControllerError::NoActiveRoom)?;
        if !self.store.has_more(room_id) {
            return Ok(PageOutcome {
                added: 0,
                has_more: false,
            });
        }

        let page = self.store.timeline(room_id).map_or(0, RoomTimeline::next_page);
        self.load_history(LoadMessagesQuery::older(room_id, page, self.page_size))
    }

    pub fn edit_message(&mut self, message_id: i64, content: &str) -> Result<(), ControllerError> {
        let room_id = self.active_room.ok_or(ControllerError::NoActiveRoom)?;
        self.own_message(room_id, message_id)?;

        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err(ControllerError::Send(SendMessageError {
                failure: SendMessageFailure::EmptyMessage,
                unsent: content.to_owned(),
            }));
        }

        let mut edited = self
            .api
            .edit_message(message_id, trimmed)
            .map_err(|error| {
                ControllerError::Send(SendMessageError {
                    failure: map_source_error(error),
                    unsent: content.to_owned(),
                })
            })?;
        edited.id = message_id;
        edited.edited_at_ms = edited.edited_at_ms.or(Some(now_unix_ms()));
        edited.resolve_ownership(self.viewer.user_id);

        if self.store.apply_edit(room_id, edited) == MutationOutcome::Updated {
            self.publish_updated(room_id, message_id);
        }
        Ok(())
    }

    pub fn delete_message(&mut self, message_id: i64) -> Result<(), ControllerError> {
        let room_id = self.active_room.ok_or(ControllerError::NoActiveRoom)?;
        let existing = self.own_message(room_id, message_id)?;

        self.api.delete_message(message_id).map_err(|error| {
            ControllerError::Send(SendMessageError {
                failure: map_source_error(error),
                unsent: String::new(),
            })
        })?;

        if self.store.apply_tombstone(room_id, existing) == MutationOutcome::Updated {
            self.publish_updated(room_id, message_id);
        }
        Ok(())
    }

    /// Marks the open room read through its newest message.
    pub fn mark_read(&mut self) -> Result<(), ControllerError> {
        let room_id = self.active_room.ok_or(ControllerError::NoActiveRoom)?;
        let Some(through) = self.store.timeline(room_id).and_then(RoomTimeline::last_message_id)
        else {
            return Ok(());
        };

        let result = mark_read(&self.api, &mut self.tracker, room_id, through, now_unix_ms());
        self.publish_unread(room_id);
        result.map_err(ControllerError::ReadTracking)
    }

    /// Polls the session; a silent drop is reported as `Disconnected`.
    pub fn check_health(&mut self) -> HealthCheck {
        let health = self.sessions.check_health();
        if matches!(health, HealthCheck::Dropped { .. }) {
            self.bus
                .publish(ChatEvent::ConnectionChanged(ConnectionStatus::Disconnected));
        }
        health
    }

    pub fn shutdown(&mut self) {
        self.pump();
        self.close_room();
    }

    fn own_message(&self, room_id: i64, message_id: i64) -> Result<ChatMessage, ControllerError> {
        let message = self
            .store
            .message(room_id, message_id)
            .ok_or(ControllerError::UnknownMessage(message_id))?;
        if !message.is_mine {
            return Err(ControllerError::NotOwnMessage(message_id));
        }
        Ok(message.clone())
    }

    fn load_history(&mut self, query: LoadMessagesQuery) -> Result<PageOutcome, ControllerError> {
        let room_id = query.room_id;
        let outcome = load_page(&self.api, &mut self.store, self.viewer.user_id, query)
            .map_err(|error| {
                tracing::warn!(
                    code = HISTORY_LOAD_FAILED,
                    room_id,
                    error = ?error,
                    "history page could not be loaded"
                );
                ControllerError::History(error)
            })?;

        if let (Some(room), Some(newest)) = (
            self.rooms.get_mut(&room_id),
            self.store.messages(room_id).last(),
        ) {
            room.observe_message(newest);
        }

        self.bus.publish(ChatEvent::HistoryLoaded {
            room_id,
            added: outcome.added,
            has_more: outcome.has_more,
        });
        Ok(outcome)
    }

    fn merge_room(&mut self, mut room: ChatRoom) {
        if let Some(known) = self.rooms.get(&room.room_id) {
            if known.last_message_at_ms > room.last_message_at_ms {
                room.last_message_at_ms = known.last_message_at_ms;
                room.last_message_preview = known.last_message_preview.clone();
            }
        }
        self.rooms.insert(room.room_id, room);
    }

    fn apply(&mut self, room_id: i64, normalized: Normalized) -> bool {
        match normalized {
            Normalized::Append(message) => self.apply_append(room_id, message, None),
            Normalized::Membership { message, joined } => {
                self.apply_append(room_id, message, Some(joined))
            }
            Normalized::Tombstone(message) => {
                let message_id = message.id;
                match self.store.apply_tombstone(room_id, message) {
                    MutationOutcome::Updated | MutationOutcome::PlaceholderInserted => {
                        self.publish_updated(room_id, message_id);
                        true
                    }
                    MutationOutcome::Unchanged | MutationOutcome::NotFound => false,
                }
            }
            Normalized::Edit(message) => {
                let message_id = message.id;
                match self.store.apply_edit(room_id, message) {
                    MutationOutcome::Updated => {
                        self.publish_updated(room_id, message_id);
                        true
                    }
                    _ => false,
                }
            }
        }
    }

    fn apply_append(&mut self, room_id: i64, message: ChatMessage, membership: Option<bool>) -> bool {
        match self.store.append(room_id, message.clone()) {
            AppendOutcome::Inserted => {
                if let Some(room) = self.rooms.get_mut(&room_id) {
                    match membership {
                        Some(joined) => room.observe_membership(joined),
                        None => room.observe_message(&message),
                    }
                }
                if membership.is_none() && self.tracker.counts_as_unread(room_id, message.is_mine) {
                    self.tracker.increment(room_id, 1);
                    self.publish_unread(room_id);
                }

                self.bus.publish(ChatEvent::MessageAppended { room_id, message });
                if membership.is_some() {
                    self.bus.publish(ChatEvent::RoomListChanged);
                }
                true
            }
            AppendOutcome::DuplicateContent => {
                // The optimistic entry may have adopted the echo's id.
                if message.has_server_id() {
                    self.publish_updated(room_id, message.id);
                }
                false
            }
            AppendOutcome::DuplicateId => false,
        }
    }

    fn publish_updated(&self, room_id: i64, message_id: i64) {
        if let Some(message) = self.store.message(room_id, message_id) {
            self.bus.publish(ChatEvent::MessageUpdated {
                room_id,
                message: message.clone(),
            });
        }
    }

    fn publish_unread(&self, room_id: i64) {
        self.bus.publish(ChatEvent::UnreadChanged {
            room_id,
            unread: self.tracker.unread(room_id),
            total: self.tracker.total(),
        });
    }
}
