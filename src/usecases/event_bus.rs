//! Typed publish/subscribe for controller notifications.
//!
//! Every subscriber owns its own receiver. A subscriber whose receiver was
//! dropped is pruned on the next publish.

use std::sync::{mpsc, Arc, Mutex};

use crate::domain::events::ChatEvent;

#[derive(Clone, Debug, Default)]
pub struct ChatEventBus {
    inner: Arc<Mutex<Vec<mpsc::Sender<ChatEvent>>>>,
}

impl ChatEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> mpsc::Receiver<ChatEvent> {
        let (tx, rx) = mpsc::channel();
        if let Ok(mut subscribers) = self.inner.lock() {
            subscribers.push(tx);
        }
        rx
    }

    pub fn publish(&self, event: ChatEvent) {
        if let Ok(mut subscribers) = self.inner.lock() {
            subscribers.retain(|subscriber| subscriber.send(event.clone()).is_ok());
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .lock()
            .map(|subscribers| subscribers.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::status::ConnectionStatus;

    #[test]
    fn every_subscriber_receives_published_events() {
        let bus = ChatEventBus::new();
        let first = bus.subscribe();
        let second = bus.subscribe();

        bus.publish(ChatEvent::RoomListChanged);

        assert_eq!(first.try_recv(), Ok(ChatEvent::RoomListChanged));
        assert_eq!(second.try_recv(), Ok(ChatEvent::RoomListChanged));
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let bus = ChatEventBus::new();
        let kept = bus.subscribe();
        drop(bus.subscribe());

        bus.publish(ChatEvent::ConnectionChanged(ConnectionStatus::Connected));

        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(
            kept.try_recv(),
            Ok(ChatEvent::ConnectionChanged(ConnectionStatus::Connected))
        );
    }

    #[test]
    fn late_subscribers_miss_earlier_events() {
        let bus = ChatEventBus::new();
        bus.publish(ChatEvent::RoomListChanged);

        let late = bus.subscribe();

        assert!(late.try_recv().is_err());
    }
}
