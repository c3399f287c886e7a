use std::{
    io::{self, IsTerminal},
    panic,
};

use crate::infra::error::AppError;

const REDACTED: &str = "[REDACTED]";

pub const TOKEN_ENV_VAR: &str = "CHATSYNC_TOKEN";

const SENSITIVE_MARKERS: [&str; 5] = ["password", "secret", "token", "bearer", "authorization"];

pub fn redact_text(input: &str) -> String {
    input
        .split_whitespace()
        .map(redact_chunk)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Passes through well-formed upper-case codes from the backend; anything else
/// may carry user data and is replaced.
pub fn sanitize_error_code(code: &str) -> String {
    let valid = !code.is_empty()
        && code.len() <= 64
        && code
            .chars()
            .all(|ch| ch.is_ascii_uppercase() || ch.is_ascii_digit() || ch == '_' || ch == '-');

    if valid {
        code.to_owned()
    } else {
        "UNKNOWN".to_owned()
    }
}

pub fn install_panic_redaction_hook() {
    panic::set_hook(Box::new(|panic_info| {
        let payload = panic_info
            .payload()
            .downcast_ref::<&str>()
            .map(ToString::to_string)
            .or_else(|| panic_info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "panic payload omitted".to_owned());

        let scrubbed = redact_text(&payload);

        if let Some(location) = panic_info.location() {
            eprintln!(
                "chatsync panic: {} at {}:{}:{}",
                scrubbed,
                location.file(),
                location.line(),
                location.column()
            );
        } else {
            eprintln!("chatsync panic: {}", scrubbed);
        }
    }));
}

/// Source of an interactively entered token.
pub trait TokenPrompt {
    fn is_interactive(&self) -> bool;
    fn read_token(&mut self, prompt: &str) -> io::Result<String>;
}

/// Hidden-input prompt on the controlling terminal.
#[derive(Debug, Default)]
pub struct TerminalPrompt;

impl TokenPrompt for TerminalPrompt {
    fn is_interactive(&self) -> bool {
        io::stdin().is_terminal()
    }

    fn read_token(&mut self, prompt: &str) -> io::Result<String> {
        rpassword::prompt_password(prompt)
    }
}

/// Picks the bearer token: environment first, then the config file, then an
/// interactive prompt.
pub fn resolve_token(
    configured: Option<&str>,
    env_value: Option<String>,
    prompt: &mut dyn TokenPrompt,
) -> Result<String, AppError> {
    let non_blank = |value: &str| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_owned())
    };

    if let Some(token) = env_value.as_deref().and_then(non_blank) {
        return Ok(token);
    }
    if let Some(token) = configured.and_then(non_blank) {
        return Ok(token);
    }
    if !prompt.is_interactive() {
        return Err(AppError::MissingToken);
    }

    let entered = prompt
        .read_token("Access token: ")
        .map_err(AppError::TokenPrompt)?;
    non_blank(&entered).ok_or(AppError::MissingToken)
}

fn redact_chunk(chunk: &str) -> String {
    let lowered = chunk.to_ascii_lowercase();
    if SENSITIVE_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
        || looks_like_secret_value(chunk)
    {
        REDACTED.to_owned()
    } else {
        chunk.to_owned()
    }
}

fn looks_like_secret_value(value: &str) -> bool {
    let cleaned = value.trim_matches(|ch: char| !ch.is_ascii_alphanumeric());

    let is_jwt = cleaned.starts_with("eyJ") || {
        let segments: Vec<&str> = cleaned.split('.').collect();
        segments.len() == 3 && segments.iter().all(|segment| segment.len() >= 8)
    };

    let has_mixed = cleaned.chars().any(|ch| ch.is_ascii_alphabetic())
        && cleaned.chars().any(|ch| ch.is_ascii_digit());
    let is_long_opaque = cleaned.len() >= 24
        && has_mixed
        && cleaned
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'));

    is_jwt || is_long_opaque
}
