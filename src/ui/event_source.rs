use std::{
    io::{self, BufRead},
    sync::mpsc::{Receiver, RecvTimeoutError, Sender},
    thread,
    time::Duration,
};

use anyhow::{Context, Result};

use crate::{domain::events::AppEvent, usecases::contracts::AppEventSource};

const EVENT_POLL_TIMEOUT: Duration = Duration::from_millis(100);
const STDIN_READ_FAILED: &str = "CHAT_STDIN_READ_FAILED";

/// Merges stdin lines and health ticks into one stream. Yields `Tick` when
/// nothing arrived within the poll timeout so inbound frames keep flowing.
pub struct ChannelEventSource {
    events: Receiver<AppEvent>,
}

impl ChannelEventSource {
    pub fn new(events: Receiver<AppEvent>) -> Self {
        Self { events }
    }
}

impl AppEventSource for ChannelEventSource {
    fn next_event(&mut self) -> Result<Option<AppEvent>> {
        match self.events.recv_timeout(EVENT_POLL_TIMEOUT) {
            Ok(event) => Ok(Some(event)),
            Err(RecvTimeoutError::Timeout) => Ok(Some(AppEvent::Tick)),
            Err(RecvTimeoutError::Disconnected) => Ok(Some(AppEvent::QuitRequested)),
        }
    }
}

/// Forwards stdin lines as [`AppEvent::InputLine`]; end of input becomes
/// [`AppEvent::QuitRequested`]. The thread is detached since a blocking read
/// cannot be interrupted.
pub fn spawn_stdin_reader(event_tx: Sender<AppEvent>) -> Result<()> {
    thread::Builder::new()
        .name("chatsync-stdin".to_owned())
        .spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(line) => {
                        if event_tx.send(AppEvent::InputLine(line)).is_err() {
                            return;
                        }
                    }
                    Err(error) => {
                        tracing::warn!(code = STDIN_READ_FAILED, error = %error, "stdin read failed");
                        break;
                    }
                }
            }
            let _ = event_tx.send(AppEvent::QuitRequested);
        })
        .context("failed to spawn stdin reader")?;

    Ok(())
}

#[cfg(test)]
pub struct MockEventSource {
    queue: std::collections::VecDeque<AppEvent>,
}

#[cfg(test)]
impl MockEventSource {
    pub fn from(events: Vec<AppEvent>) -> Self {
        Self {
            queue: events.into(),
        }
    }
}

#[cfg(test)]
impl AppEventSource for MockEventSource {
    fn next_event(&mut self) -> Result<Option<AppEvent>> {
        Ok(self.queue.pop_front())
    }
}
