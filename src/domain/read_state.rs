use std::collections::HashMap;

/// Client-side read position for one room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReadState {
    pub last_read_message_id: Option<i64>,
    pub last_read_at_ms: Option<i64>,
    pub unread_count: u32,
}

/// Unread bookkeeping across every room the viewer has observed.
///
/// Each room carries a client estimate ([`ReadState::unread_count`]) and, when the
/// backend has reported one, a server count. The server count wins.
#[derive(Debug, Clone, Default)]
pub struct UnreadTracker {
    states: HashMap<i64, ReadState>,
    server_counts: HashMap<i64, u32>,
    focused_room: Option<i64>,
}

impl UnreadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the room's read state on first sight, seeding the client estimate.
    /// Returns true if the room was not known before.
    pub fn observe_room(&mut self, room_id: i64, initial_unread: u32) -> bool {
        if self.states.contains_key(&room_id) {
            return false;
        }
        self.states.insert(
            room_id,
            ReadState {
                unread_count: initial_unread,
                ..ReadState::default()
            },
        );
        true
    }

    pub fn is_observed(&self, room_id: i64) -> bool {
        self.states.contains_key(&room_id)
    }

    pub fn read_state(&self, room_id: i64) -> Option<&ReadState> {
        self.states.get(&room_id)
    }

    /// Records (or clears) the server-reported count for a room.
    pub fn set_server_count(&mut self, room_id: i64, count: Option<u32>) {
        match count {
            Some(count) => {
                self.server_counts.insert(room_id, count);
            }
            None => {
                self.server_counts.remove(&room_id);
            }
        }
    }

    pub fn focus(&mut self, room_id: Option<i64>) {
        self.focused_room = room_id;
    }

    pub fn focused_room(&self) -> Option<i64> {
        self.focused_room
    }

    /// Whether an incoming message should bump the room's unread count.
    pub fn counts_as_unread(&self, room_id: i64, from_viewer: bool) -> bool {
        !from_viewer && self.focused_room != Some(room_id)
    }

    /// Moves the read pointer and zeroes the room's count.
    pub fn record_read(&mut self, room_id: i64, through_message_id: i64, at_ms: i64) {
        let state = self.states.entry(room_id).or_default();
        if state
            .last_read_message_id
            .map_or(true, |current| through_message_id >= current)
        {
            state.last_read_message_id = Some(through_message_id);
            state.last_read_at_ms = Some(at_ms);
        }
        state.unread_count = 0;

        if let Some(server) = self.server_counts.get_mut(&room_id) {
            *server = 0;
        }
    }

    pub fn increment(&mut self, room_id: i64, delta: u32) -> u32 {
        let state = self.states.entry(room_id).or_default();
        state.unread_count = state.unread_count.saturating_add(delta);

        if let Some(server) = self.server_counts.get_mut(&room_id) {
            *server = server.saturating_add(delta);
        }
        self.unread(room_id)
    }

    /// Reduces the count, clamping at zero.
    pub fn decrement(&mut self, room_id: i64, delta: u32) -> u32 {
        if let Some(state) = self.states.get_mut(&room_id) {
            state.unread_count = state.unread_count.saturating_sub(delta);
        }
        if let Some(server) = self.server_counts.get_mut(&room_id) {
            *server = server.saturating_sub(delta);
        }
        self.unread(room_id)
    }

    /// Effective count for one room: server value when present, else the estimate.
    pub fn unread(&self, room_id: i64) -> u32 {
        self.server_counts.get(&room_id).copied().unwrap_or_else(|| {
            self.states
                .get(&room_id)
                .map(|state| state.unread_count)
                .unwrap_or(0)
        })
    }

    pub fn total(&self) -> u32 {
        let mut total: u32 = 0;
        for (room_id, count) in &self.server_counts {
            if !self.states.contains_key(room_id) {
                total = total.saturating_add(*count);
            }
        }
        for room_id in self.states.keys() {
            total = total.saturating_add(self.unread(*room_id));
        }
        total
    }
}
