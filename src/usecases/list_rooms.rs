use crate::domain::chat_room::ChatRoom;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomsSourceError {
    Unauthorized,
    Unavailable,
    InvalidData,
    NotFound,
}

pub trait RoomsSource {
    /// Rooms the viewer is a member of.
    fn list_my_rooms(&self) -> Result<Vec<ChatRoom>, RoomsSourceError>;

    fn room_for_performance(&self, performance_id: i64) -> Result<ChatRoom, RoomsSourceError>;

    fn join_room(&self, room_id: i64) -> Result<ChatRoom, RoomsSourceError>;
}

impl<T> RoomsSource for &T
where
    T: RoomsSource + ?Sized,
{
    fn list_my_rooms(&self) -> Result<Vec<ChatRoom>, RoomsSourceError> {
        (*self).list_my_rooms()
    }

    fn room_for_performance(&self, performance_id: i64) -> Result<ChatRoom, RoomsSourceError> {
        (*self).room_for_performance(performance_id)
    }

    fn join_room(&self, room_id: i64) -> Result<ChatRoom, RoomsSourceError> {
        (*self).join_room(room_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListRoomsError {
    Unauthorized,
    TemporarilyUnavailable,
    DataContractViolation,
    RoomNotFound,
}

/// Lists the viewer's rooms, most recently active first. Rooms without any
/// message sort last, by id.
pub fn list_rooms(source: &dyn RoomsSource) -> Result<Vec<ChatRoom>, ListRoomsError> {
    let mut rooms = source.list_my_rooms().map_err(map_source_error)?;

    if rooms.iter().any(|room| room.room_id <= 0) {
        return Err(ListRoomsError::DataContractViolation);
    }

    rooms.sort_by(|left, right| {
        right
            .last_message_at_ms
            .cmp(&left.last_message_at_ms)
            .then_with(|| left.room_id.cmp(&right.room_id))
    });
    Ok(rooms)
}

pub fn find_room_for_performance(
    source: &dyn RoomsSource,
    performance_id: i64,
) -> Result<ChatRoom, ListRoomsError> {
    source
        .room_for_performance(performance_id)
        .map_err(map_source_error)
}

pub fn join_room(source: &dyn RoomsSource, room_id: i64) -> Result<ChatRoom, ListRoomsError> {
    source.join_room(room_id).map_err(map_source_error)
}

fn map_source_error(error: RoomsSourceError) -> ListRoomsError {
    match error {
        RoomsSourceError::Unauthorized => ListRoomsError::Unauthorized,
        RoomsSourceError::Unavailable => ListRoomsError::TemporarilyUnavailable,
        RoomsSourceError::InvalidData => ListRoomsError::DataContractViolation,
        RoomsSourceError::NotFound => ListRoomsError::RoomNotFound,
    }
}
