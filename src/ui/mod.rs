//! UI layer: the line-oriented chat shell.

mod event_source;
mod input;
mod render;
pub mod shell;

pub(crate) use render::room_line;

/// Returns the UI module name for smoke checks.
pub fn module_name() -> &'static str {
    "ui"
}
