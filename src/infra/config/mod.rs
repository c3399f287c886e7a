mod app_config;
mod file_config;
mod loader;

pub use app_config::{ApiConfig, AppConfig, AuthConfig, BrokerConfig, ChatConfig, LogConfig};
pub use loader::load;
