//! Per-room message timelines with duplicate suppression.
//!
//! Every room keeps its messages sorted ascending by `(created_at_ms, id)`.
//! Live appends run two duplicate detectors in order:
//!
//! 1. identifier match against an existing entry (only for server-assigned ids),
//! 2. content match: identical `content` created within [`CONTENT_DEDUP_WINDOW_MS`].
//!
//! The second detector exists because an optimistic local entry and its broker
//! echo can carry different transient ids before the authoritative one is known.

use std::collections::{HashMap, HashSet};

use super::message::ChatMessage;

/// Two messages with the same content closer than this are the same message.
pub const CONTENT_DEDUP_WINDOW_MS: i64 = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Inserted,
    DuplicateId,
    DuplicateContent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    /// An existing entry was changed in place.
    Updated,
    /// The target was already in the requested state.
    Unchanged,
    /// No entry matched; a placeholder was recorded at the event's position.
    PlaceholderInserted,
    /// No entry matched and nothing was recorded.
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageOutcome {
    pub added: usize,
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomTimeline {
    messages: Vec<ChatMessage>,
    has_more: bool,
    last_page: Option<u32>,
}

impl Default for RoomTimeline {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            has_more: true,
            last_page: None,
        }
    }
}

impl RoomTimeline {
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    /// Index of the next history page to request.
    pub fn next_page(&self) -> u32 {
        self.last_page.map_or(0, |page| page + 1)
    }

    pub fn last_message_id(&self) -> Option<i64> {
        self.messages
            .iter()
            .rev()
            .find(|message| message.has_server_id())
            .map(|message| message.id)
    }

    fn position_of(&self, id: i64) -> Option<usize> {
        if id == 0 {
            return None;
        }
        self.messages.iter().position(|message| message.id == id)
    }

    fn content_duplicate_of(&self, candidate: &ChatMessage) -> Option<usize> {
        self.messages.iter().position(|existing| {
            existing.content == candidate.content
                && existing.created_at_ms.abs_diff(candidate.created_at_ms)
                    < CONTENT_DEDUP_WINDOW_MS.unsigned_abs()
        })
    }

    fn sort(&mut self) {
        self.messages.sort_by(|left, right| {
            left.created_at_ms
                .cmp(&right.created_at_ms)
                .then(left.id.cmp(&right.id))
        });
    }
}

#[derive(Debug, Clone, Default)]
pub struct MessageStore {
    rooms: HashMap<i64, RoomTimeline>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeline(&self, room_id: i64) -> Option<&RoomTimeline> {
        self.rooms.get(&room_id)
    }

    pub fn messages(&self, room_id: i64) -> &[ChatMessage] {
        self.rooms
            .get(&room_id)
            .map(RoomTimeline::messages)
            .unwrap_or_default()
    }

    pub fn has_more(&self, room_id: i64) -> bool {
        self.rooms.get(&room_id).map_or(true, RoomTimeline::has_more)
    }

    pub fn message(&self, room_id: i64, message_id: i64) -> Option<&ChatMessage> {
        let timeline = self.rooms.get(&room_id)?;
        timeline
            .position_of(message_id)
            .map(|index| &timeline.messages[index])
    }

    /// Inserts a live message unless it duplicates an existing entry.
    pub fn append(&mut self, room_id: i64, message: ChatMessage) -> AppendOutcome {
        let timeline = self.rooms.entry(room_id).or_default();

        if timeline.position_of(message.id).is_some() {
            return AppendOutcome::DuplicateId;
        }

        if let Some(index) = timeline.content_duplicate_of(&message) {
            let existing = &mut timeline.messages[index];
            if !existing.has_server_id() && message.has_server_id() {
                existing.id = message.id;
                timeline.sort();
            }
            return AppendOutcome::DuplicateContent;
        }

        timeline.messages.push(message);
        timeline.sort();
        AppendOutcome::Inserted
    }

    /// Applies a delete by id. An unknown id still leaves a placeholder so a late
    /// original cannot resurrect the content.
    pub fn apply_tombstone(&mut self, room_id: i64, tombstone: ChatMessage) -> MutationOutcome {
        let timeline = self.rooms.entry(room_id).or_default();

        match timeline.position_of(tombstone.id) {
            Some(index) => {
                let existing = &mut timeline.messages[index];
                if existing.is_deleted {
                    return MutationOutcome::Unchanged;
                }
                existing.tombstone();
                MutationOutcome::Updated
            }
            None if tombstone.has_server_id() => {
                let mut placeholder = tombstone;
                placeholder.tombstone();
                timeline.messages.push(placeholder);
                timeline.sort();
                MutationOutcome::PlaceholderInserted
            }
            None => MutationOutcome::NotFound,
        }
    }

    /// Applies an edit by id; edits for unknown ids are ignored.
    pub fn apply_edit(&mut self, room_id: i64, edit: ChatMessage) -> MutationOutcome {
        let Some(timeline) = self.rooms.get_mut(&room_id) else {
            return MutationOutcome::NotFound;
        };
        let Some(index) = timeline.position_of(edit.id) else {
            return MutationOutcome::NotFound;
        };

        let existing = &mut timeline.messages[index];
        if existing.is_deleted {
            return MutationOutcome::Unchanged;
        }
        if existing.content == edit.content && existing.is_edited {
            return MutationOutcome::Unchanged;
        }

        existing.content = edit.content;
        existing.is_edited = true;
        existing.edited_at_ms = edit.edited_at_ms.or(Some(edit.created_at_ms));
        MutationOutcome::Updated
    }

    /// Merges one page of history.
    ///
    /// `append == false` replaces the timeline (initial load). `append == true`
    /// adds only messages whose ids are not already present. A page shorter than
    /// `page_size` is the last one.
    pub fn apply_page(
        &mut self,
        room_id: i64,
        page_index: u32,
        page_size: usize,
        page: Vec<ChatMessage>,
        append: bool,
    ) -> PageOutcome {
        let timeline = self.rooms.entry(room_id).or_default();
        let has_more = page.len() >= page_size && page_size > 0;

        let added = if append {
            let known: HashSet<i64> = timeline
                .messages
                .iter()
                .filter(|message| message.has_server_id())
                .map(|message| message.id)
                .collect();
            let fresh: Vec<ChatMessage> = page
                .into_iter()
                .filter(|message| !message.has_server_id() || !known.contains(&message.id))
                .collect();
            let added = fresh.len();
            timeline.messages.extend(fresh);
            added
        } else {
            let mut seen = HashSet::new();
            timeline.messages = page
                .into_iter()
                .filter(|message| !message.has_server_id() || seen.insert(message.id))
                .collect();
            timeline.messages.len()
        };

        timeline.sort();
        timeline.has_more = has_more;
        timeline.last_page = Some(page_index);

        PageOutcome { added, has_more }
    }

    /// Drops a room's timeline, e.g. before a reconnect re-fetch.
    pub fn reset_room(&mut self, room_id: i64) {
        self.rooms.remove(&room_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::message::{MessageKind, DELETED_PLACEHOLDER};

    const ROOM: i64 = 11;

    fn message(id: i64, content: &str, created_at_ms: i64) -> ChatMessage {
        ChatMessage {
            id,
            room_id: ROOM,
            sender_id: 1,
            sender_name: "morpheus".to_owned(),
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

    fn ids(store: &MessageStore) -> Vec<i64> {
        store.messages(ROOM).iter().map(|m| m.id).collect()
    }

    fn assert_sorted(store: &MessageStore) {
        let messages = store.messages(ROOM);
        assert!(messages
            .windows(2)
            .all(|pair| pair[0].created_at_ms <= pair[1].created_at_ms));
    }

    #[test]
    fn repeated_ids_are_stored_once() {
        let mut store = MessageStore::new();

        assert_eq!(
            store.append(ROOM, message(1, "a", 100)),
            AppendOutcome::Inserted
        );
        assert_eq!(
            store.append(ROOM, message(2, "b", 5_000)),
            AppendOutcome::Inserted
        );
        assert_eq!(
            store.append(ROOM, message(1, "a again", 9_000)),
            AppendOutcome::DuplicateId
        );
        assert_eq!(
            store.append(ROOM, message(2, "b", 5_000)),
            AppendOutcome::DuplicateId
        );

        assert_eq!(ids(&store), vec![1, 2]);
    }

    #[test]
    fn same_content_within_window_is_suppressed_without_ids() {
        let mut store = MessageStore::new();

        store.append(ROOM, message(0, "see you at gate 3", 10_000));
        let outcome = store.append(ROOM, message(0, "see you at gate 3", 10_400));

        assert_eq!(outcome, AppendOutcome::DuplicateContent);
        assert_eq!(store.messages(ROOM).len(), 1);
    }

    #[test]
    fn same_content_two_seconds_apart_is_kept() {
        let mut store = MessageStore::new();

        store.append(ROOM, message(0, "clap", 10_000));
        let outcome = store.append(ROOM, message(0, "clap", 12_000));

        assert_eq!(outcome, AppendOutcome::Inserted);
        assert_eq!(store.messages(ROOM).len(), 2);
    }

    #[test]
    fn far_apart_extreme_timestamps_are_not_content_duplicates() {
        let mut store = MessageStore::new();

        store.append(ROOM, message(0, "encore", i64::MIN));
        let outcome = store.append(ROOM, message(0, "encore", i64::MAX));

        assert_eq!(outcome, AppendOutcome::Inserted);
        assert_eq!(store.messages(ROOM).len(), 2);
        assert_sorted(&store);
    }

    #[test]
    fn missing_ids_never_match_each_other_by_identifier() {
        let mut store = MessageStore::new();

        store.append(ROOM, message(0, "first", 1_000));
        let outcome = store.append(ROOM, message(0, "second", 1_100));

        assert_eq!(outcome, AppendOutcome::Inserted);
        assert_eq!(store.messages(ROOM).len(), 2);
    }

    #[test]
    fn optimistic_entry_adopts_echo_id() {
        let mut store = MessageStore::new();

        store.append(ROOM, message(0, "hello", 50_000));
        let outcome = store.append(ROOM, message(77, "hello", 50_300));

        assert_eq!(outcome, AppendOutcome::DuplicateContent);
        assert_eq!(ids(&store), vec![77]);
        assert_eq!(
            store.append(ROOM, message(77, "hello", 50_300)),
            AppendOutcome::DuplicateId
        );
    }

    #[test]
    fn appends_keep_ascending_order_with_id_tiebreak() {
        let mut store = MessageStore::new();

        store.append(ROOM, message(5, "c", 3_000));
        store.append(ROOM, message(4, "b", 2_000));
        store.append(ROOM, message(9, "x", 2_000));
        store.append(ROOM, message(3, "a", 1_000));

        assert_eq!(ids(&store), vec![3, 4, 9, 5]);
        assert_sorted(&store);
    }

    #[test]
    fn tombstone_is_idempotent() {
        let mut store = MessageStore::new();
        store.append(ROOM, message(1, "oops", 1_000));
        store.append(ROOM, message(2, "next", 2_000));

        assert_eq!(
            store.apply_tombstone(ROOM, message(1, "", 0)),
            MutationOutcome::Updated
        );
        assert_eq!(
            store.apply_tombstone(ROOM, message(1, "", 0)),
            MutationOutcome::Unchanged
        );

        let deleted: Vec<_> = store.messages(ROOM).iter().filter(|m| m.id == 1).collect();
        assert_eq!(deleted.len(), 1);
        assert!(deleted[0].is_deleted);
        assert_eq!(deleted[0].content, DELETED_PLACEHOLDER);
        assert_eq!(ids(&store), vec![1, 2]);
    }

    #[test]
    fn tombstone_before_original_records_placeholder() {
        let mut store = MessageStore::new();

        let outcome = store.apply_tombstone(ROOM, message(8, "", 4_000));
        assert_eq!(outcome, MutationOutcome::PlaceholderInserted);

        assert_eq!(
            store.append(ROOM, message(8, "late original", 3_900)),
            AppendOutcome::DuplicateId
        );
        let stored = store.message(ROOM, 8).expect("placeholder should exist");
        assert!(stored.is_deleted);
        assert_eq!(stored.content, DELETED_PLACEHOLDER);
    }

    #[test]
    fn edit_updates_in_place_and_ignores_unknown_ids() {
        let mut store = MessageStore::new();
        store.append(ROOM, message(1, "draft", 1_000));

        let mut edit = message(1, "final", 9_000);
        edit.edited_at_ms = Some(9_000);
        assert_eq!(store.apply_edit(ROOM, edit), MutationOutcome::Updated);
        assert_eq!(
            store.apply_edit(ROOM, message(99, "ghost", 9_000)),
            MutationOutcome::NotFound
        );

        let stored = store.message(ROOM, 1).expect("message should exist");
        assert_eq!(stored.content, "final");
        assert!(stored.is_edited);
        assert_eq!(stored.edited_at_ms, Some(9_000));
        assert_eq!(stored.created_at_ms, 1_000);
    }

    #[test]
    fn initial_page_replaces_and_sorts() {
        let mut store = MessageStore::new();
        store.append(ROOM, message(100, "stale live", 100));

        let outcome = store.apply_page(
            ROOM,
            0,
            3,
            vec![
                message(3, "c", 300),
                message(1, "a", 100),
                message(2, "b", 200),
            ],
            false,
        );

        assert_eq!(outcome.added, 3);
        assert!(outcome.has_more);
        assert_eq!(ids(&store), vec![1, 2, 3]);
    }

    #[test]
    fn older_page_prepends_only_unknown_ids() {
        let mut store = MessageStore::new();
        store.apply_page(
            ROOM,
            0,
            2,
            vec![message(3, "c", 300), message(4, "d", 400)],
            false,
        );

        let outcome = store.apply_page(
            ROOM,
            1,
            2,
            vec![message(2, "b", 200), message(3, "c-dup", 300)],
            true,
        );

        assert_eq!(outcome.added, 1);
        assert_eq!(ids(&store), vec![2, 3, 4]);
        assert_eq!(store.message(ROOM, 3).map(|m| m.content.as_str()), Some("c"));
        assert_sorted(&store);
    }

    #[test]
    fn short_page_marks_history_exhausted() {
        let mut store = MessageStore::new();
        let page: Vec<_> = (1..=14).map(|id| message(id, "m", id * 10)).collect();

        let outcome = store.apply_page(ROOM, 0, 20, page, false);

        assert!(!outcome.has_more);
        assert!(!store.has_more(ROOM));
        assert_eq!(store.timeline(ROOM).map(RoomTimeline::next_page), Some(1));
    }

    #[test]
    fn unknown_room_reports_more_history() {
        let store = MessageStore::new();

        assert!(store.has_more(ROOM));
        assert!(store.messages(ROOM).is_empty());
    }

    #[test]
    fn last_message_id_skips_unconfirmed_entries() {
        let mut store = MessageStore::new();
        store.append(ROOM, message(5, "confirmed", 1_000));
        store.append(ROOM, message(0, "pending", 2_000));

        assert_eq!(
            store.timeline(ROOM).and_then(RoomTimeline::last_message_id),
            Some(5)
        );
    }
}
