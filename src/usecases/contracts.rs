use anyhow::Result;

use crate::domain::events::AppEvent;

use super::{
    list_rooms::RoomsSource, load_messages::MessagesSource, mark_read::ReadTrackingSink,
    send_message::MessageWriter,
};

/// Everything the controller needs from the REST backend.
pub trait ChatApi: RoomsSource + MessagesSource + MessageWriter + ReadTrackingSink {}

impl<T> ChatApi for T where T: RoomsSource + MessagesSource + MessageWriter + ReadTrackingSink {}

pub trait AppEventSource {
    fn next_event(&mut self) -> Result<Option<AppEvent>>;
}
