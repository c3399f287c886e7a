use std::{env, path::Path, sync::Arc, time::Duration};

use tokio::runtime::{Builder, Runtime};

use crate::{
    broker::{
        session_manager::{ChannelLayout, SessionManager},
        websocket::WebSocketTransportFactory,
    },
    infra::{
        self,
        config::{AppConfig, AuthConfig, BrokerConfig},
        error::AppError,
        http_api::HttpChatApi,
        secrets::{resolve_token, TerminalPrompt, TOKEN_ENV_VAR},
    },
    usecases::{
        context::{AppContext, LiveController},
        controller::{ChatController, Viewer},
    },
};

const RUNTIME_THREAD_NAME: &str = "chatsync-io";

pub fn bootstrap(config_path: Option<&Path>) -> Result<AppContext, AppError> {
    let config = infra::config::load(config_path)?;
    let log_guard = infra::logging::init(&config.logging)?;

    let viewer = viewer_from(&config.auth)?;
    let token = resolve_token(
        config.auth.token.as_deref(),
        env::var(TOKEN_ENV_VAR).ok(),
        &mut TerminalPrompt,
    )?;

    let controller = assemble(&config, viewer, token)?;
    tracing::info!(
        api = %config.api.base_url,
        broker = %config.broker.endpoint,
        user_id = controller.viewer().user_id,
        "chat client assembled"
    );

    Ok(AppContext::new(config, controller, log_guard))
}

fn viewer_from(auth: &AuthConfig) -> Result<Viewer, AppError> {
    let nickname = auth.nickname.trim();
    // Sent verbatim as a CONNECT header, which STOMP does not escape.
    if auth.user_id <= 0 || nickname.is_empty() || nickname.chars().any(char::is_control) {
        return Err(AppError::MissingIdentity);
    }

    Ok(Viewer {
        user_id: auth.user_id,
        nickname: nickname.to_owned(),
    })
}

fn channel_layout(broker: &BrokerConfig) -> ChannelLayout {
    ChannelLayout {
        topic_prefix: broker.topic_prefix.clone(),
        publish_prefix: broker.publish_prefix.clone(),
    }
}

fn build_runtime() -> Result<Arc<Runtime>, AppError> {
    Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name(RUNTIME_THREAD_NAME)
        .enable_all()
        .build()
        .map(Arc::new)
        .map_err(AppError::Runtime)
}

fn assemble(config: &AppConfig, viewer: Viewer, token: String) -> Result<LiveController, AppError> {
    let runtime = build_runtime()?;

    let api = HttpChatApi::new(&config.api, token.clone(), Arc::clone(&runtime))?;
    let factory = WebSocketTransportFactory::new(
        config.broker.endpoint.clone(),
        runtime,
        Duration::from_millis(config.broker.connect_timeout_ms),
    );
    let sessions = SessionManager::new(factory, channel_layout(&config.broker), token);

    Ok(ChatController::new(api, sessions, viewer, config.chat.page_size))
}
