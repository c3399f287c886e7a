use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to read config file at {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file at {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to initialize logging: {0}")]
    LoggingInit(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
    #[error("failed to open log file at {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("[auth] user_id and nickname must be configured; nickname may not contain control characters")]
    MissingIdentity,
    #[error("no access token: set [auth] token, CHATSYNC_TOKEN, or run from a terminal")]
    MissingToken,
    #[error("failed to read token from terminal: {0}")]
    TokenPrompt(#[source] std::io::Error),
    #[error("failed to start async runtime: {0}")]
    Runtime(#[source] std::io::Error),
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
}
