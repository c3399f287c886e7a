use std::time::Duration;

use tracing_appender::non_blocking::WorkerGuard;

use crate::{
    broker::websocket::WebSocketTransportFactory,
    infra::{config::AppConfig, http_api::HttpChatApi},
    usecases::controller::ChatController,
};

pub type LiveController = ChatController<HttpChatApi, WebSocketTransportFactory>;

pub struct AppContext {
    pub config: AppConfig,
    pub controller: LiveController,
    /// Flushes file logging on drop; declared last so it outlives the controller.
    _log_guard: Option<WorkerGuard>,
}

impl AppContext {
    pub fn new(config: AppConfig, controller: LiveController, log_guard: Option<WorkerGuard>) -> Self {
        Self {
            config,
            controller,
            _log_guard: log_guard,
        }
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_millis(self.config.broker.health_interval_ms)
    }
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("config", &self.config)
            .field("viewer", self.controller.viewer())
            .field("status", &self.controller.status())
            .finish()
    }
}
