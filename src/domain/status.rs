use std::time::{SystemTime, UNIX_EPOCH};

/// State of the single real-time session, as shown by the connection indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionStatus {
    pub fn as_label(self) -> &'static str {
        match self {
            Self::Disconnected => "CONNECTION_DISCONNECTED",
            Self::Connecting => "CONNECTION_CONNECTING",
            Self::Connected => "CONNECTION_CONNECTED",
            Self::Error => "CONNECTION_ERROR",
        }
    }

    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

pub fn now_unix_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_status_is_disconnected() {
        assert_eq!(ConnectionStatus::default(), ConnectionStatus::Disconnected);
        assert!(!ConnectionStatus::default().is_connected());
    }

    #[test]
    fn labels_are_stable_codes() {
        assert_eq!(
            ConnectionStatus::Connected.as_label(),
            "CONNECTION_CONNECTED"
        );
        assert_eq!(ConnectionStatus::Error.as_label(), "CONNECTION_ERROR");
    }

    #[test]
    fn clock_is_after_2020() {
        assert!(now_unix_ms() > 1_577_836_800_000);
    }
}
