use crate::domain::{
    message::ChatMessage,
    message_store::{MessageStore, PageOutcome},
};

pub const DEFAULT_PAGE_SIZE: usize = 20;
const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadMessagesQuery {
    pub room_id: i64,
    pub page: u32,
    pub size: usize,
    /// `false` replaces the room's timeline; `true` merges older history.
    pub append: bool,
}

impl LoadMessagesQuery {
    pub fn initial(room_id: i64, size: usize) -> Self {
        Self {
            room_id,
            page: 0,
            size,
            append: false,
        }
    }

    pub fn older(room_id: i64, page: u32, size: usize) -> Self {
        Self {
            room_id,
            page,
            size,
            append: true,
        }
    }

    fn normalized_size(&self) -> usize {
        match self.size {
            0 => DEFAULT_PAGE_SIZE,
            value if value > MAX_PAGE_SIZE => MAX_PAGE_SIZE,
            value => value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessagesSourceError {
    Unauthorized,
    Unavailable,
    InvalidData,
    RoomNotFound,
}

pub trait MessagesSource {
    /// One page of a room's history; page 0 holds the newest messages.
    fn list_messages(
        &self,
        room_id: i64,
        page: u32,
        size: usize,
    ) -> Result<Vec<ChatMessage>, MessagesSourceError>;
}

impl<T> MessagesSource for &T
where
    T: MessagesSource + ?Sized,
{
    fn list_messages(
        &self,
        room_id: i64,
        page: u32,
        size: usize,
    ) -> Result<Vec<ChatMessage>, MessagesSourceError> {
        (*self).list_messages(room_id, page, size)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadMessagesError {
    Unauthorized,
    TemporarilyUnavailable,
    DataContractViolation,
    RoomNotFound,
}

/// Fetches one page and merges it into `store`.
///
/// Ownership is recomputed against `viewer_id` for every fetched message. On a
/// source error the store is left exactly as it was.
pub fn load_page(
    source: &dyn MessagesSource,
    store: &mut MessageStore,
    viewer_id: i64,
    query: LoadMessagesQuery,
) -> Result<PageOutcome, LoadMessagesError> {
    let size = query.normalized_size();
    let mut page = source
        .list_messages(query.room_id, query.page, size)
        .map_err(map_source_error)?;

    for message in &mut page {
        if message.room_id == 0 {
            message.room_id = query.room_id;
        }
        message.resolve_ownership(viewer_id);
    }

    if page.iter().any(|message| message.room_id != query.room_id) {
        tracing::warn!(
            room_id = query.room_id,
            page = query.page,
            "history page contains messages from another room"
        );
        return Err(LoadMessagesError::DataContractViolation);
    }

    Ok(store.apply_page(query.room_id, query.page, size, page, query.append))
}

fn map_source_error(error: MessagesSourceError) -> LoadMessagesError {
    match error {
        MessagesSourceError::Unauthorized => LoadMessagesError::Unauthorized,
        MessagesSourceError::Unavailable => LoadMessagesError::TemporarilyUnavailable,
        MessagesSourceError::InvalidData => LoadMessagesError::DataContractViolation,
        MessagesSourceError::RoomNotFound => LoadMessagesError::RoomNotFound,
    }
}
