//! Events flowing from the core to whatever presents them

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast;

use super::codec::ColorReading;
use super::connection::ConnectionState;
use super::logger::LogEntry;
use super::poller::PollerState;

/// Sensor events
#[derive(Debug, Clone, PartialEq)]
pub enum SensorEvent {
    /// Timestamped activity message
    Log(LogEntry),
    /// A validated reading
    Reading(ColorReading),
    /// Connection opened or closed
    ConnectionChanged(ConnectionState),
    /// Periodic polling started or stopped
    PollingChanged(PollerState),
}

/// Consumer of sensor events
pub trait EventSink: Send {
    /// Deliver one event
    fn emit(&mut self, event: SensorEvent);
}

impl EventSink for broadcast::Sender<SensorEvent> {
    fn emit(&mut self, event: SensorEvent) {
        // No subscribers is fine
        let _ = self.send(event);
    }
}

/// Collects events behind a cloneable handle, for callers that poll
/// instead of subscribing
#[derive(Debug, Clone, Default)]
pub struct SharedSink(Arc<Mutex<Vec<SensorEvent>>>);

impl SharedSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything collected so far
    pub fn events(&self) -> Vec<SensorEvent> {
        self.0.lock().clone()
    }

    /// Drain everything collected so far
    pub fn take(&self) -> Vec<SensorEvent> {
        std::mem::take(&mut *self.0.lock())
    }
}

impl EventSink for SharedSink {
    fn emit(&mut self, event: SensorEvent) {
        self.0.lock().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_without_subscribers() {
        let (mut tx, _) = broadcast::channel::<SensorEvent>(4);
        tx.emit(SensorEvent::Reading(ColorReading::new(1, 2, 3)));

        let mut rx = tx.subscribe();
        tx.emit(SensorEvent::ConnectionChanged(ConnectionState::Open));
        assert_eq!(
            rx.try_recv().ok(),
            Some(SensorEvent::ConnectionChanged(ConnectionState::Open))
        );
    }

    #[test]
    fn test_shared_sink_clones_share_events() {
        let sink = SharedSink::new();
        let mut writer = sink.clone();
        writer.emit(SensorEvent::PollingChanged(PollerState::Active));

        assert_eq!(sink.events().len(), 1);
        assert_eq!(sink.take(), vec![SensorEvent::PollingChanged(PollerState::Active)]);
        assert!(sink.events().is_empty());
    }
}
