use std::path::PathBuf;

use serde::Deserialize;

use crate::infra::config::{ApiConfig, AppConfig, AuthConfig, BrokerConfig, ChatConfig, LogConfig};

#[derive(Debug, Deserialize, Default)]
pub struct FileConfig {
    pub logging: Option<FileLogConfig>,
    pub api: Option<FileApiConfig>,
    pub broker: Option<FileBrokerConfig>,
    pub chat: Option<FileChatConfig>,
    pub auth: Option<FileAuthConfig>,
}

impl FileConfig {
    pub fn merge_into(self, config: &mut AppConfig) {
        if let Some(logging) = self.logging {
            logging.merge_into(&mut config.logging);
        }

        if let Some(api) = self.api {
            api.merge_into(&mut config.api);
        }

        if let Some(broker) = self.broker {
            broker.merge_into(&mut config.broker);
        }

        if let Some(chat) = self.chat {
            chat.merge_into(&mut config.chat);
        }

        if let Some(auth) = self.auth {
            auth.merge_into(&mut config.auth);
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileLogConfig {
    pub level: Option<String>,
    pub file: Option<PathBuf>,
}

impl FileLogConfig {
    fn merge_into(self, config: &mut LogConfig) {
        if let Some(level) = self.level {
            config.level = level;
        }

        if let Some(file) = self.file {
            config.file = Some(file);
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileApiConfig {
    pub base_url: Option<String>,
    pub request_timeout_ms: Option<u64>,
}

impl FileApiConfig {
    fn merge_into(self, config: &mut ApiConfig) {
        if let Some(base_url) = self.base_url {
            config.base_url = base_url.trim_end_matches('/').to_owned();
        }

        if let Some(timeout_ms) = self.request_timeout_ms {
            config.request_timeout_ms = timeout_ms;
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileBrokerConfig {
    pub endpoint: Option<String>,
    pub topic_prefix: Option<String>,
    pub publish_prefix: Option<String>,
    pub connect_timeout_ms: Option<u64>,
    pub health_interval_ms: Option<u64>,
}

impl FileBrokerConfig {
    fn merge_into(self, config: &mut BrokerConfig) {
        if let Some(endpoint) = self.endpoint {
            config.endpoint = endpoint;
        }

        if let Some(prefix) = self.topic_prefix {
            config.topic_prefix = prefix;
        }

        if let Some(prefix) = self.publish_prefix {
            config.publish_prefix = prefix;
        }

        if let Some(timeout_ms) = self.connect_timeout_ms {
            config.connect_timeout_ms = timeout_ms;
        }

        if let Some(interval_ms) = self.health_interval_ms {
            config.health_interval_ms = interval_ms;
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileChatConfig {
    pub page_size: Option<usize>,
}

impl FileChatConfig {
    fn merge_into(self, config: &mut ChatConfig) {
        if let Some(page_size) = self.page_size {
            config.page_size = page_size;
        }
    }
}

#[derive(Deserialize, Default)]
pub struct FileAuthConfig {
    pub user_id: Option<i64>,
    pub nickname: Option<String>,
    pub token: Option<String>,
}

impl std::fmt::Debug for FileAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileAuthConfig")
            .field("user_id", &self.user_id)
            .field("nickname", &self.nickname)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl FileAuthConfig {
    fn merge_into(self, config: &mut AuthConfig) {
        if let Some(user_id) = self.user_id {
            config.user_id = user_id;
        }

        if let Some(nickname) = self.nickname {
            config.nickname = nickname;
        }

        if let Some(token) = self.token.filter(|token| !token.trim().is_empty()) {
            config.token = Some(token);
        }
    }
}
