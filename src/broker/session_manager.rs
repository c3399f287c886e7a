//! Owns the one real-time session that may exist at a time.
//!
//! Transitions:
//!
//! ```text
//! disconnected -> connecting -> connected -> disconnected   (close / drop)
//! connecting -> error -> disconnected                       (handshake or subscribe failure)
//! ```
//!
//! Opening a session always closes the previous one first, so switching rooms
//! publishes the old room's LEAVE before the new room's JOIN.

use thiserror::Error;

use crate::domain::status::ConnectionStatus;

use super::{
    payload::{InboundPayload, OutboundEvent},
    publisher::SendFailure,
    transport::{BrokerTransport, ConnectCredentials, FrameHandler, TransportError, TransportFactory},
};

const SESSION_OPENED: &str = "CHAT_SESSION_OPENED";
const SESSION_OPEN_FAILED: &str = "CHAT_SESSION_OPEN_FAILED";
const SESSION_CLOSED: &str = "CHAT_SESSION_CLOSED";
const SESSION_LEAVE_FAILED: &str = "CHAT_SESSION_LEAVE_FAILED";
const SESSION_JOIN_FAILED: &str = "CHAT_SESSION_JOIN_FAILED";
const SESSION_TRANSPORT_DROPPED: &str = "CHAT_SESSION_TRANSPORT_DROPPED";
const INBOUND_DECODE_FAILED: &str = "CHAT_INBOUND_DECODE_FAILED";

/// Receives every decoded inbound payload of the active session.
pub type MessageCallback = Box<dyn FnMut(InboundPayload) + Send>;

/// Room and identity a session is scoped to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionBinding {
    pub room_id: i64,
    pub user_id: i64,
    pub user_name: String,
}

/// Broker destinations for a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelLayout {
    pub topic_prefix: String,
    pub publish_prefix: String,
}

impl Default for ChannelLayout {
    fn default() -> Self {
        Self {
            topic_prefix: "/topic/chatroom/".to_owned(),
            publish_prefix: "/app/chat/".to_owned(),
        }
    }
}

impl ChannelLayout {
    pub fn topic(&self, room_id: i64) -> String {
        format!("{}{}", self.topic_prefix, room_id)
    }

    pub fn publish_destination(&self, room_id: i64) -> String {
        format!("{}{}", self.publish_prefix, room_id)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectionFailure {
    #[error("could not create broker transport: {0}")]
    Transport(#[source] TransportError),
    #[error("broker handshake failed: {0}")]
    Handshake(#[source] TransportError),
    #[error("subscription to {destination} failed: {source}")]
    Subscribe {
        destination: String,
        #[source]
        source: TransportError,
    },
}

/// Result of a periodic liveness poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthCheck {
    /// No session is open.
    Idle,
    Healthy,
    /// The transport went away silently; the session was torn down.
    Dropped { room_id: i64 },
}

struct ActiveSession {
    binding: SessionBinding,
    transport: Box<dyn BrokerTransport>,
}

pub struct SessionManager<F: TransportFactory> {
    factory: F,
    layout: ChannelLayout,
    token: String,
    status: ConnectionStatus,
    active: Option<ActiveSession>,
}

impl<F: TransportFactory> SessionManager<F> {
    pub fn new(factory: F, layout: ChannelLayout, token: impl Into<String>) -> Self {
        Self {
            factory,
            layout,
            token: token.into(),
            status: ConnectionStatus::Disconnected,
            active: None,
        }
    }

    /// Synchronous status read. A transport that died without telling us is
    /// reported as disconnected even before [`Self::check_health`] runs.
    pub fn status(&self) -> ConnectionStatus {
        match (&self.active, self.status) {
            (Some(active), ConnectionStatus::Connected) if !active.transport.is_connected() => {
                ConnectionStatus::Disconnected
            }
            (_, status) => status,
        }
    }

    pub fn binding(&self) -> Option<&SessionBinding> {
        self.active.as_ref().map(|active| &active.binding)
    }

    pub fn bound_room(&self) -> Option<i64> {
        self.binding().map(|binding| binding.room_id)
    }

    /// Closes any prior session, then connects, subscribes to the room topic
    /// and announces the viewer. Returns once the subscription is active.
    pub fn open_session(
        &mut self,
        room_id: i64,
        user_id: i64,
        user_name: &str,
        on_message: MessageCallback,
    ) -> Result<(), ConnectionFailure> {
        self.close_session();

        let binding = SessionBinding {
            room_id,
            user_id,
            user_name: user_name.to_owned(),
        };
        self.status = ConnectionStatus::Connecting;

        let mut transport = match self.factory.create() {
            Ok(transport) => transport,
            Err(error) => return Err(self.fail_open(room_id, ConnectionFailure::Transport(error))),
        };

        let credentials = ConnectCredentials {
            token: self.token.clone(),
            user_id,
            nickname: binding.user_name.clone(),
        };
        if let Err(error) = transport.connect(&credentials) {
            transport.disconnect();
            return Err(self.fail_open(room_id, ConnectionFailure::Handshake(error)));
        }

        let destination = self.layout.topic(room_id);
        if let Err(source) = transport.subscribe(&destination, decode_frames(room_id, on_message))
        {
            transport.disconnect();
            return Err(self.fail_open(
                room_id,
                ConnectionFailure::Subscribe {
                    destination,
                    source,
                },
            ));
        }

        self.active = Some(ActiveSession { binding, transport });
        self.status = ConnectionStatus::Connected;
        tracing::info!(code = SESSION_OPENED, room_id, user_id, "chat session opened");

        let join = self.binding().map(OutboundEvent::join);
        if let Some(join) = join {
            if let Err(error) = self.send_event(&join) {
                tracing::warn!(
                    code = SESSION_JOIN_FAILED,
                    room_id,
                    error = %error,
                    "join signal could not be published"
                );
            }
        }

        Ok(())
    }

    /// Publishes a best-effort LEAVE and tears the transport down. Idempotent.
    pub fn close_session(&mut self) {
        let Some(mut active) = self.active.take() else {
            self.status = ConnectionStatus::Disconnected;
            return;
        };

        if self.status == ConnectionStatus::Connected && active.transport.is_connected() {
            let room_id = active.binding.room_id;
            let destination = self.layout.publish_destination(room_id);
            let leave = OutboundEvent::leave(&active.binding);
            let sent = leave
                .to_json()
                .map_err(|error| TransportError::Protocol(error.to_string()))
                .and_then(|body| active.transport.send(&destination, &body));
            if let Err(error) = sent {
                tracing::debug!(
                    code = SESSION_LEAVE_FAILED,
                    room_id,
                    error = %error,
                    "leave signal not delivered; closing anyway"
                );
            }
        }

        active.transport.disconnect();
        self.status = ConnectionStatus::Disconnected;
        tracing::info!(
            code = SESSION_CLOSED,
            room_id = active.binding.room_id,
            "chat session closed"
        );
    }

    /// Detects a silently lost transport and resets the session so the caller
    /// can re-open it.
    pub fn check_health(&mut self) -> HealthCheck {
        let Some(active) = self.active.as_ref() else {
            return HealthCheck::Idle;
        };

        if self.status == ConnectionStatus::Connected && active.transport.is_connected() {
            return HealthCheck::Healthy;
        }

        let room_id = active.binding.room_id;
        if let Some(mut active) = self.active.take() {
            active.transport.disconnect();
        }
        self.status = ConnectionStatus::Disconnected;
        tracing::warn!(
            code = SESSION_TRANSPORT_DROPPED,
            room_id,
            "chat transport dropped; session reset"
        );

        HealthCheck::Dropped { room_id }
    }

    /// Sends an event on the active room's publish destination.
    pub(super) fn send_event(&mut self, event: &OutboundEvent) -> Result<(), SendFailure> {
        if self.status() != ConnectionStatus::Connected {
            return Err(SendFailure::NotConnected);
        }
        let Some(active) = self.active.as_mut() else {
            return Err(SendFailure::NotConnected);
        };

        let body = event
            .to_json()
            .map_err(|error| SendFailure::Encode(error.to_string()))?;
        let destination = self.layout.publish_destination(active.binding.room_id);
        active.transport.send(&destination, &body)?;
        Ok(())
    }

    fn fail_open(&mut self, room_id: i64, failure: ConnectionFailure) -> ConnectionFailure {
        self.status = ConnectionStatus::Error;
        tracing::warn!(
            code = SESSION_OPEN_FAILED,
            room_id,
            error = %failure,
            "chat session could not be opened"
        );
        self.status = ConnectionStatus::Disconnected;
        failure
    }
}

impl<F: TransportFactory> Drop for SessionManager<F> {
    fn drop(&mut self) {
        self.close_session();
    }
}

fn decode_frames(room_id: i64, mut on_message: MessageCallback) -> FrameHandler {
    Box::new(move |body: String| match InboundPayload::from_json(&body) {
        Ok(payload) => on_message(payload),
        Err(error) => {
            tracing::warn!(
                code = INBOUND_DECODE_FAILED,
                room_id,
                error = %error,
                "dropping undecodable inbound frame"
            );
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::test_support::{FakeBroker, TransportCall};

    fn manager(broker: &FakeBroker) -> SessionManager<FakeBroker> {
        SessionManager::new(broker.clone(), ChannelLayout::default(), "token-1")
    }

    fn noop() -> MessageCallback {
        Box::new(|_| {})
    }

    #[test]
    fn open_connects_subscribes_then_joins() {
        let broker = FakeBroker::default();
        let mut sessions = manager(&broker);

        sessions
            .open_session(7, 42, "neo", noop())
            .expect("session should open");

        assert_eq!(sessions.status(), ConnectionStatus::Connected);
        assert_eq!(sessions.bound_room(), Some(7));
        assert_eq!(
            broker.call_kinds(),
            vec![
                "CONNECT".to_owned(),
                "SUBSCRIBE /topic/chatroom/7".to_owned(),
                "SEND JOIN /app/chat/7".to_owned(),
            ]
        );
    }

    #[test]
    fn handshake_carries_token_and_identity() {
        let broker = FakeBroker::default();
        let mut sessions = manager(&broker);

        sessions
            .open_session(7, 42, "neo", noop())
            .expect("session should open");

        assert_eq!(
            broker.calls().first(),
            Some(&TransportCall::Connect {
                token: "token-1".to_owned(),
                user_id: 42,
                nickname: "neo".to_owned(),
            })
        );
    }

    #[test]
    fn switching_rooms_leaves_before_joining() {
        let broker = FakeBroker::default();
        let mut sessions = manager(&broker);
        sessions
            .open_session(1, 42, "neo", noop())
            .expect("room A should open");
        broker.clear_calls();

        sessions
            .open_session(2, 42, "neo", noop())
            .expect("room B should open");

        assert_eq!(
            broker.call_kinds(),
            vec![
                "SEND LEAVE /app/chat/1".to_owned(),
                "DISCONNECT".to_owned(),
                "CONNECT".to_owned(),
                "SUBSCRIBE /topic/chatroom/2".to_owned(),
                "SEND JOIN /app/chat/2".to_owned(),
            ]
        );
        assert_eq!(sessions.bound_room(), Some(2));
    }

    #[test]
    fn handshake_failure_leaves_session_disconnected() {
        let broker = FakeBroker::default();
        broker.fail_next_connect(TransportError::Rejected("bad token".to_owned()));
        let mut sessions = manager(&broker);

        let error = sessions
            .open_session(7, 42, "neo", noop())
            .expect_err("open must fail");

        assert!(matches!(error, ConnectionFailure::Handshake(_)));
        assert_eq!(sessions.status(), ConnectionStatus::Disconnected);
        assert_eq!(sessions.bound_room(), None);
        assert!(!broker
            .call_kinds()
            .iter()
            .any(|call| call.starts_with("SUBSCRIBE") || call.starts_with("SEND")));
    }

    #[test]
    fn subscribe_failure_disconnects_transport() {
        let broker = FakeBroker::default();
        broker.fail_next_subscribe(TransportError::Timeout("subscription receipt"));
        let mut sessions = manager(&broker);

        let error = sessions
            .open_session(7, 42, "neo", noop())
            .expect_err("open must fail");

        assert!(matches!(error, ConnectionFailure::Subscribe { .. }));
        assert_eq!(sessions.status(), ConnectionStatus::Disconnected);
        assert_eq!(broker.call_kinds().last().map(String::as_str), Some("DISCONNECT"));
    }

    #[test]
    fn close_is_idempotent() {
        let broker = FakeBroker::default();
        let mut sessions = manager(&broker);
        sessions
            .open_session(7, 42, "neo", noop())
            .expect("session should open");
        broker.clear_calls();

        sessions.close_session();
        sessions.close_session();

        assert_eq!(
            broker.call_kinds(),
            vec!["SEND LEAVE /app/chat/7".to_owned(), "DISCONNECT".to_owned()]
        );
        assert_eq!(sessions.status(), ConnectionStatus::Disconnected);
    }

    #[test]
    fn leave_failure_is_swallowed() {
        let broker = FakeBroker::default();
        let mut sessions = manager(&broker);
        sessions
            .open_session(7, 42, "neo", noop())
            .expect("session should open");
        broker.fail_sends(TransportError::NotConnected);

        sessions.close_session();

        assert_eq!(sessions.status(), ConnectionStatus::Disconnected);
        assert_eq!(broker.call_kinds().last().map(String::as_str), Some("DISCONNECT"));
    }

    #[test]
    fn inbound_frames_reach_callback_and_garbage_is_dropped() {
        let broker = FakeBroker::default();
        let mut sessions = manager(&broker);
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        sessions
            .open_session(
                7,
                42,
                "neo",
                Box::new(move |payload| sink.lock().expect("sink lock").push(payload)),
            )
            .expect("session should open");

        broker.deliver("/topic/chatroom/7", r#"{"type":"MESSAGE","messageId":1,"content":"hi"}"#);
        broker.deliver("/topic/chatroom/7", "not json");

        let received = received.lock().expect("received lock");
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].content.as_deref(), Some("hi"));
    }

    #[test]
    fn health_check_detects_silent_drop_without_leave() {
        let broker = FakeBroker::default();
        let mut sessions = manager(&broker);
        sessions
            .open_session(7, 42, "neo", noop())
            .expect("session should open");
        assert_eq!(sessions.check_health(), HealthCheck::Healthy);
        broker.clear_calls();

        broker.drop_connection();

        assert_eq!(sessions.status(), ConnectionStatus::Disconnected);
        assert_eq!(sessions.check_health(), HealthCheck::Dropped { room_id: 7 });
        assert_eq!(sessions.check_health(), HealthCheck::Idle);
        assert!(!broker.call_kinds().iter().any(|call| call.contains("LEAVE")));
    }

    #[test]
    fn send_without_session_is_rejected() {
        let broker = FakeBroker::default();
        let mut sessions = manager(&broker);
        let binding = SessionBinding {
            room_id: 7,
            user_id: 42,
            user_name: "neo".to_owned(),
        };

        let result = sessions.send_event(&OutboundEvent::join(&binding));

        assert_eq!(result, Err(SendFailure::NotConnected));
    }

    #[test]
    fn dropping_manager_closes_session() {
        let broker = FakeBroker::default();
        {
            let mut sessions = manager(&broker);
            sessions
                .open_session(7, 42, "neo", noop())
                .expect("session should open");
        }

        assert_eq!(broker.call_kinds().last().map(String::as_str), Some("DISCONNECT"));
        assert!(broker.call_kinds().iter().any(|call| call.contains("LEAVE")));
    }
}
