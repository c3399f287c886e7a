use std::{
    sync::mpsc::{self, RecvTimeoutError, Sender},
    thread::{self, JoinHandle},
    time::Duration,
};

use crate::domain::events::AppEvent;

const HEALTH_MONITOR_SHUTDOWN_FAILED: &str = "CHAT_HEALTH_MONITOR_SHUTDOWN_FAILED";
const HEALTH_MONITOR_STOPPED: &str = "CHAT_HEALTH_MONITOR_STOPPED";

/// Emits [`AppEvent::HealthCheck`] at a fixed interval so the UI thread can poll
/// the session status; some transports never report a silent disconnect.
#[derive(Debug)]
pub struct HealthMonitor {
    stop_tx: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl HealthMonitor {
    pub fn start(interval: Duration, event_tx: Sender<AppEvent>) -> Result<Self, HealthMonitorStartError> {
        if interval.is_zero() {
            return Err(HealthMonitorStartError::ZeroInterval);
        }

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let worker = thread::Builder::new()
            .name("chatsync-health".to_owned())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        if event_tx.send(AppEvent::HealthCheck).is_err() {
                            return;
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                        tracing::debug!(code = HEALTH_MONITOR_STOPPED, "health monitor stopped");
                        return;
                    }
                }
            })
            .map_err(HealthMonitorStartError::WorkerSpawn)?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            worker: Some(worker),
        })
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }

        if let Some(worker) = self.worker.take() {
            if let Err(error) = worker.join() {
                tracing::warn!(
                    code = HEALTH_MONITOR_SHUTDOWN_FAILED,
                    error = ?error,
                    "health monitor worker panicked on shutdown"
                );
            }
        }
    }
}

#[derive(Debug)]
pub enum HealthMonitorStartError {
    ZeroInterval,
    WorkerSpawn(std::io::Error),
}

impl std::fmt::Display for HealthMonitorStartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ZeroInterval => f.write_str("health interval must be positive"),
            Self::WorkerSpawn(source) => write!(f, "worker spawn failed: {source}"),
        }
    }
}

impl std::error::Error for HealthMonitorStartError {}
