use unicode_width::UnicodeWidthChar;

use super::message::ChatMessage;

/// Maximum display width of the denormalized last-message preview.
const PREVIEW_MAX_WIDTH: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoomStatus {
    #[default]
    Active,
    Inactive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRoom {
    pub room_id: i64,
    pub name: String,
    pub participant_count: u32,
    pub max_participants: u32,
    pub status: RoomStatus,
    pub last_message_preview: Option<String>,
    pub last_message_at_ms: Option<i64>,
    /// Server-reported unread count; authoritative when present.
    pub unread_count: Option<u32>,
}

impl ChatRoom {
    pub fn new(room_id: i64, name: impl Into<String>) -> Self {
        Self {
            room_id,
            name: name.into(),
            participant_count: 0,
            max_participants: 0,
            status: RoomStatus::Active,
            last_message_preview: None,
            last_message_at_ms: None,
            unread_count: None,
        }
    }

    /// Refreshes the preview from a message that was just applied to this room.
    pub fn observe_message(&mut self, message: &ChatMessage) {
        let is_newer = self
            .last_message_at_ms
            .map_or(true, |at| message.created_at_ms >= at);
        if !is_newer {
            return;
        }

        self.last_message_preview = Some(truncate_preview(&message.display_content()));
        self.last_message_at_ms = Some(message.created_at_ms);
    }

    /// Sets the preview as reported by the room listing.
    pub fn set_preview(&mut self, text: &str, at_ms: Option<i64>) {
        self.last_message_preview = Some(truncate_preview(text));
        self.last_message_at_ms = at_ms;
    }

    /// Adjusts the participant count for a system join/leave notice.
    pub fn observe_membership(&mut self, joined: bool) {
        if joined {
            let next = self.participant_count.saturating_add(1);
            self.participant_count = if self.max_participants > 0 {
                next.min(self.max_participants)
            } else {
                next
            };
        } else {
            self.participant_count = self.participant_count.saturating_sub(1);
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == RoomStatus::Active
    }
}

fn truncate_preview(text: &str) -> String {
    let single_line: String = text
        .chars()
        .map(|ch| if ch.is_control() { ' ' } else { ch })
        .collect();

    let mut width = 0;
    let mut out = String::new();
    for ch in single_line.chars() {
        let ch_width = ch.width().unwrap_or(0);
        if width + ch_width > PREVIEW_MAX_WIDTH {
            out.push('…');
            return out;
        }
        width += ch_width;
        out.push(ch);
    }
    out
}
