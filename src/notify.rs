use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// Downstream consumer of engine events (e.g. the email service).
///
/// Called after the event is durable. Delivery is fire-and-forget: an `Err`
/// is logged and counted, never reported back to the operation's caller.
/// Implementations that do I/O should hand off to their own task.
pub trait NotificationSink: Send + Sync {
    fn name(&self) -> &str;
    fn deliver(&self, event: &Event) -> Result<(), String>;
}

/// Broadcast hub: per-owner subscriptions plus registered sinks.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<Event>>,
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
            sinks: Vec::new(),
        }
    }

    pub fn with_sinks(sinks: Vec<Arc<dyn NotificationSink>>) -> Self {
        Self {
            channels: DashMap::new(),
            sinks,
        }
    }

    /// Subscribe to events concerning one owner's vehicles and bookings.
    pub fn subscribe(&self, owner_id: Ulid) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(owner_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Publish an event. Never fails; sink errors are logged. An owner
    /// channel whose receivers are all gone is dropped here.
    pub fn send(&self, event: &Event) {
        if let Some(owner_id) = event.owner_id() {
            let delivered = self
                .channels
                .get(&owner_id)
                .map(|sender| sender.send(event.clone()).is_ok());
            if delivered == Some(false) {
                self.remove(&owner_id);
            }
        }
        for sink in &self.sinks {
            if let Err(e) = sink.deliver(event) {
                tracing::warn!("notification sink {} failed on {}: {e}", sink.name(), event.label());
                metrics::counter!(crate::observability::NOTIFY_FAILURES_TOTAL, "sink" => sink.name().to_string())
                    .increment(1);
            }
        }
    }

    /// Drop an owner's channel once nobody listens.
    fn remove(&self, owner_id: &Ulid) {
        self.channels
            .remove_if(owner_id, |_, sender| sender.receiver_count() == 0);
    }
}

/// Sink that writes each event to the log. Installed by default so events
/// are visible without an external consumer.
pub struct LogSink;

impl NotificationSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    fn deliver(&self, event: &Event) -> Result<(), String> {
        tracing::debug!("event: {}", event.label());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingSink {
        calls: AtomicUsize,
    }

    impl NotificationSink for FailingSink {
        fn name(&self) -> &str {
            "failing"
        }

        fn deliver(&self, _event: &Event) -> Result<(), String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err("smtp down".into())
        }
    }

    fn removed(owner_id: Ulid) -> Event {
        Event::VehicleRemoved {
            id: Ulid::new(),
            owner_id,
        }
    }

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = NotifyHub::new();
        let owner = Ulid::new();
        let mut rx = hub.subscribe(owner);

        let event = removed(owner);
        hub.send(&event);

        let received = tokio_test::assert_ok!(rx.recv().await);
        assert_eq!(received, event);
    }

    #[tokio::test]
    async fn other_owners_do_not_hear_it() {
        let hub = NotifyHub::new();
        let mut rx = hub.subscribe(Ulid::new());
        hub.send(&removed(Ulid::new()));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn send_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        hub.send(&removed(Ulid::new()));
    }

    #[test]
    fn failing_sink_is_swallowed() {
        let sink = Arc::new(FailingSink {
            calls: AtomicUsize::new(0),
        });
        let sinks: Vec<Arc<dyn NotificationSink>> = vec![sink.clone(), Arc::new(LogSink)];
        let hub = NotifyHub::with_sinks(sinks);
        hub.send(&removed(Ulid::new()));
        hub.send(&removed(Ulid::new()));
        assert_eq!(sink.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn remove_keeps_live_channels() {
        let hub = NotifyHub::new();
        let owner = Ulid::new();
        let rx = hub.subscribe(owner);
        hub.remove(&owner);
        assert!(hub.channels.contains_key(&owner));
        drop(rx);
        hub.remove(&owner);
        assert!(!hub.channels.contains_key(&owner));
    }

    #[tokio::test]
    async fn abandoned_channel_is_pruned_on_send() {
        let hub = NotifyHub::new();
        let owner = Ulid::new();
        drop(hub.subscribe(owner));
        assert!(hub.channels.contains_key(&owner));

        hub.send(&removed(owner));
        assert!(!hub.channels.contains_key(&owner));

        let mut rx = hub.subscribe(owner);
        let event = removed(owner);
        hub.send(&event);
        assert_eq!(tokio_test::assert_ok!(rx.recv().await), event);
        assert!(hub.channels.contains_key(&owner));
    }
}
