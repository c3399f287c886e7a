//! Domain layer: core entities and business rules.

pub mod chat_room;
pub mod events;
pub mod message;
pub mod message_store;
pub mod read_state;
pub mod status;

/// Returns the domain module name for smoke checks.
pub fn module_name() -> &'static str {
    "domain"
}
