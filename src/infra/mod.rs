//! Infrastructure layer: config, logging, secrets, and the REST adapter.

pub mod config;
pub mod error;
pub mod http_api;
pub mod logging;
pub mod secrets;

/// Returns the infra module name for smoke checks.
pub fn module_name() -> &'static str {
    "infra"
}
