use std::time::Duration;

use blescan_domain::{Address, Measurement};
use tokio::sync::broadcast;

/// Events the gateway surfaces to the outer application. Published on a
/// bounded broadcast channel so a slow subscriber drops events rather than
/// stalling the scan loop or a session (§9).
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    ScanStarted { prefixes: Vec<String>, duration: Duration },
    ScanCompleted { prefixes: Vec<String>, count: usize, duration: Duration },
    DeviceDiscovered { address: Address, name: Option<String>, matched_prefix: String },
    /// A measurement decoded straight from an advertisement payload, with
    /// no connection and no session involved (§2 data flow).
    MeasurementObserved { address: Address, measurement: Measurement },
    Connected { address: Address },
    Disconnected { address: Address },
    RequestFailed { address: Address, kind: String, detail: String },
    DeviceFailed { address: Address, reason: String },
}

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Thin wrapper around a `tokio::sync::broadcast` channel carrying
/// [`GatewayEvent`]s. Cloning an `EventBus` shares the same channel; each
/// `subscribe()` call gets its own lagging-tolerant receiver.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<GatewayEvent>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _receiver) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        EventBus { sender }
    }

    /// Publishes an event. Never blocks: with no subscribers this is a
    /// no-op, and a subscriber that falls behind loses its oldest events
    /// rather than applying backpressure here.
    pub fn publish(&self, event: GatewayEvent) {
        let _ = self.sender.send(event);
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn a_slow_subscriber_cannot_stall_publishing() {
        let bus = EventBus::new();
        let mut slow_subscriber = bus.subscribe();

        for i in 0..(EVENT_CHANNEL_CAPACITY * 2) {
            bus.publish(GatewayEvent::ScanStarted {
                prefixes: vec![format!("dev{i}")],
                duration: Duration::from_secs(1),
            });
        }

        // The slow subscriber lagged and must be told so, rather than the
        // publisher having blocked waiting for it to keep up.
        let result = slow_subscriber.try_recv();
        assert!(matches!(result, Err(broadcast::error::TryRecvError::Lagged(_))));
    }

    #[tokio::test]
    async fn publishing_with_no_subscribers_does_not_panic() {
        let bus = EventBus::new();
        bus.publish(GatewayEvent::ScanCompleted {
            prefixes: vec![],
            count: 0,
            duration: Duration::from_secs(1),
        });
    }
}
