use super::{message::ChatMessage, status::ConnectionStatus};

/// Inputs driving the terminal loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    Tick,
    HealthCheck,
    QuitRequested,
    InputLine(String),
}

/// Typed notifications published by the chat controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    RoomListChanged,
    MessageAppended {
        room_id: i64,
        message: ChatMessage,
    },
    MessageUpdated {
        room_id: i64,
        message: ChatMessage,
    },
    HistoryLoaded {
        room_id: i64,
        added: usize,
        has_more: bool,
    },
    UnreadChanged {
        room_id: i64,
        unread: u32,
        total: u32,
    },
    ConnectionChanged(ConnectionStatus),
}
