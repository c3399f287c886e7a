use std::{fmt, path::PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AppConfig {
    pub logging: LogConfig,
    pub api: ApiConfig,
    pub broker: BrokerConfig,
    pub chat: ChatConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogConfig {
    pub level: String,
    /// When set, logs go to this file instead of stderr.
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiConfig {
    pub base_url: String,
    pub request_timeout_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_owned(),
            request_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BrokerConfig {
    pub endpoint: String,
    pub topic_prefix: String,
    pub publish_prefix: String,
    pub connect_timeout_ms: u64,
    pub health_interval_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://localhost:8080/ws-stomp".to_owned(),
            topic_prefix: "/topic/chatroom/".to_owned(),
            publish_prefix: "/app/chat/".to_owned(),
            connect_timeout_ms: 10_000,
            health_interval_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatConfig {
    pub page_size: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self { page_size: 20 }
    }
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AuthConfig {
    pub user_id: i64,
    pub nickname: String,
    #[serde(skip_serializing)]
    pub token: Option<String>,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("user_id", &self.user_id)
            .field("nickname", &self.nickname)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}
