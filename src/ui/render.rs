//! Plain-text rendering of rooms, messages, and controller events.
//!
//! Timelines are grouped the way a chat window shows them: a date separator
//! whenever the local day changes, and the sender name only when it differs
//! from the previous line.

use chrono::{Local, TimeZone};

use crate::domain::{chat_room::ChatRoom, events::ChatEvent, message::ChatMessage};

const EDITED_MARKER: &str = " (edited)";
const PENDING_ID: &str = "#-";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimelineElement {
    DateSeparator(String),
    Message {
        time: String,
        id: String,
        sender: Option<String>,
        content: String,
    },
}

pub fn build_timeline(messages: &[ChatMessage]) -> Vec<TimelineElement> {
    let mut elements = Vec::new();
    let mut prev_date: Option<chrono::NaiveDate> = None;
    let mut prev_sender: Option<i64> = None;

    for message in messages {
        let date = timestamp_to_date(message.created_at_ms);
        if prev_date != Some(date) {
            elements.push(TimelineElement::DateSeparator(format_date(date)));
            prev_sender = None;
        }

        let sender = (prev_sender != Some(message.sender_id)).then(|| sender_label(message));
        elements.push(TimelineElement::Message {
            time: format_time(message.created_at_ms),
            id: id_label(message),
            sender,
            content: content_label(message),
        });

        prev_date = Some(date);
        prev_sender = Some(message.sender_id);
    }

    elements
}

pub fn timeline_lines(messages: &[ChatMessage]) -> Vec<String> {
    build_timeline(messages)
        .into_iter()
        .map(|element| match element {
            TimelineElement::DateSeparator(date) => format!("--- {date} ---"),
            TimelineElement::Message {
                time,
                id,
                sender: Some(sender),
                content,
            } => format!("{time} {id:>6} {sender}: {content}"),
            TimelineElement::Message {
                time,
                id,
                sender: None,
                content,
            } => format!("{time} {id:>6}   {content}"),
        })
        .collect()
}

/// A single message outside of a timeline, as printed for live events.
pub fn message_line(message: &ChatMessage) -> String {
    format!(
        "{} {:>6} {}: {}",
        format_time(message.created_at_ms),
        id_label(message),
        sender_label(message),
        content_label(message)
    )
}

pub fn room_line(room: &ChatRoom, unread: u32) -> String {
    let mut line = format!("{:>6}  {}", room.room_id, room.name);
    if room.max_participants > 0 {
        line.push_str(&format!(
            "  [{}/{}]",
            room.participant_count, room.max_participants
        ));
    }
    if !room.is_active() {
        line.push_str("  (closed)");
    }
    if unread > 0 {
        line.push_str(&format!("  ({unread} unread)"));
    }
    if let Some(preview) = &room.last_message_preview {
        line.push_str(&format!("  {preview}"));
    }
    line
}

/// Renders a controller notification, or `None` when it has no visible effect.
pub fn event_line(event: &ChatEvent) -> Option<String> {
    match event {
        ChatEvent::MessageAppended { message, .. } => Some(message_line(message)),
        ChatEvent::MessageUpdated { message, .. } => Some(format!("~ {}", message_line(message))),
        ChatEvent::HistoryLoaded { added, has_more, .. } => Some(if *has_more {
            format!("({added} messages loaded, /older for more)")
        } else {
            format!("({added} messages loaded, start of history)")
        }),
        ChatEvent::UnreadChanged { room_id, unread, total } if *unread > 0 => Some(format!(
            "(room {room_id}: {unread} unread, {total} total)"
        )),
        ChatEvent::ConnectionChanged(status) => Some(format!("* {}", status.as_label())),
        ChatEvent::UnreadChanged { .. } | ChatEvent::RoomListChanged => None,
    }
}

fn sender_label(message: &ChatMessage) -> String {
    if message.is_mine {
        format!("{} [me]", message.sender_name)
    } else if !message.sender_active {
        format!("{} (left)", message.sender_name)
    } else {
        message.sender_name.clone()
    }
}

fn id_label(message: &ChatMessage) -> String {
    if message.has_server_id() {
        format!("#{}", message.id)
    } else {
        PENDING_ID.to_owned()
    }
}

fn content_label(message: &ChatMessage) -> String {
    let content = message.display_content().replace('\n', " / ");
    if message.is_edited && !message.is_deleted {
        format!("{content}{EDITED_MARKER}")
    } else {
        content
    }
}

fn timestamp_to_date(timestamp_ms: i64) -> chrono::NaiveDate {
    match Local.timestamp_millis_opt(timestamp_ms) {
        chrono::LocalResult::Single(dt) => dt.date_naive(),
        chrono::LocalResult::Ambiguous(dt, _) => dt.date_naive(),
        chrono::LocalResult::None => Local::now().date_naive(),
    }
}

fn format_date(date: chrono::NaiveDate) -> String {
    date.format("%-d %b %Y").to_string()
}

fn format_time(timestamp_ms: i64) -> String {
    match Local.timestamp_millis_opt(timestamp_ms) {
        chrono::LocalResult::Single(dt) => dt.format("%H:%M").to_string(),
        chrono::LocalResult::Ambiguous(dt, _) => dt.format("%H:%M").to_string(),
        chrono::LocalResult::None => "??:??".to_owned(),
    }
}
