//! Pub/sub fan-out for internal event distribution.
//!
//! Subscribers register per event type (or the `*` wildcard) and receive
//! events over bounded channels. Publishing never blocks: a slow subscriber
//! whose queue is full loses the event, and only that subscriber does.

use crate::event::types::{Event, EventType};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use thiserror::Error;

/// Capacity of each subscriber's queue.
const SUBSCRIBER_QUEUE_CAPACITY: usize = 100;

/// Wildcard topic receiving every published event.
const WILDCARD: &str = "*";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BusError {
    #[error("event bus is closed")]
    Closed,
}

struct BusInner {
    subscribers: HashMap<String, Vec<Sender<Event>>>,
    closed: bool,
}

/// Fan-out event bus keyed by event type.
pub struct EventBus {
    inner: Mutex<BusInner>,
    dropped: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(BusInner {
                subscribers: HashMap::new(),
                closed: false,
            }),
            dropped: AtomicU64::new(0),
        }
    }

    /// Subscribe to events of one type.
    ///
    /// Returns `None` if the bus is already closed.
    pub fn subscribe(&self, event_type: EventType) -> Option<Receiver<Event>> {
        self.subscribe_topic(event_type.as_str())
    }

    /// Subscribe to every published event regardless of type.
    pub fn subscribe_all(&self) -> Option<Receiver<Event>> {
        self.subscribe_topic(WILDCARD)
    }

    fn subscribe_topic(&self, topic: &str) -> Option<Receiver<Event>> {
        let mut inner = self.inner.lock().expect("bus lock poisoned");
        if inner.closed {
            return None;
        }

        let (tx, rx) = bounded(SUBSCRIBER_QUEUE_CAPACITY);
        inner
            .subscribers
            .entry(topic.to_string())
            .or_default()
            .push(tx);
        Some(rx)
    }

    /// Fan an event out to all matching subscribers.
    ///
    /// Delivery is best-effort per subscriber: a full queue drops the event
    /// for that subscriber only. Subscribers whose receiver has been dropped
    /// are pruned as they are discovered.
    pub fn publish(&self, event: &Event) -> Result<(), BusError> {
        let mut inner = self.inner.lock().expect("bus lock poisoned");
        if inner.closed {
            return Err(BusError::Closed);
        }

        let mut dropped = 0;
        for topic in [event.event_type.as_str(), WILDCARD] {
            if let Some(senders) = inner.subscribers.get_mut(topic) {
                senders.retain(|tx| match tx.try_send(event.clone()) {
                    Ok(()) => true,
                    Err(TrySendError::Full(_)) => {
                        dropped += 1;
                        true
                    }
                    Err(TrySendError::Disconnected(_)) => false,
                });
            }
        }

        if dropped > 0 {
            self.dropped.fetch_add(dropped, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Close the bus. Idempotent.
    ///
    /// Drops every subscriber sender so blocked readers observe
    /// end-of-stream. Subsequent publishes fail with [`BusError::Closed`].
    pub fn close(&self) {
        let mut inner = self.inner.lock().expect("bus lock poisoned");
        if inner.closed {
            return;
        }
        inner.closed = true;
        inner.subscribers.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().expect("bus lock poisoned").closed
    }

    /// Number of registered subscriber queues.
    pub fn subscriber_count(&self) -> usize {
        let inner = self.inner.lock().expect("bus lock poisoned");
        inner.subscribers.values().map(Vec::len).sum()
    }

    /// Events dropped because a subscriber queue was full.
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
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
    use crate::event::types::EventType;

    #[test]
    fn test_fan_out_by_type_and_wildcard() {
        let bus = EventBus::new();
        let cpu_rx = bus.subscribe(EventType::CpuWarning).unwrap();
        let idle_rx = bus.subscribe(EventType::IdleStart).unwrap();
        let all_rx = bus.subscribe_all().unwrap();

        let event = Event::new(EventType::CpuWarning, "test", 0.75);
        bus.publish(&event).unwrap();

        assert_eq!(cpu_rx.try_recv().unwrap().id, event.id);
        assert_eq!(all_rx.try_recv().unwrap().id, event.id);
        assert!(idle_rx.try_recv().is_err());
    }

    #[test]
    fn test_full_subscriber_drops_without_blocking() {
        let bus = EventBus::new();
        let rx = bus.subscribe(EventType::SystemLoad).unwrap();

        for _ in 0..SUBSCRIBER_QUEUE_CAPACITY + 5 {
            bus.publish(&Event::new(EventType::SystemLoad, "test", 0.5))
                .unwrap();
        }

        assert_eq!(bus.dropped_events(), 5);
        let mut received = 0;
        while rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, SUBSCRIBER_QUEUE_CAPACITY);
    }

    #[test]
    fn test_publish_after_close_fails() {
        let bus = EventBus::new();
        let rx = bus.subscribe(EventType::GitCommit).unwrap();

        bus.close();
        bus.close(); // idempotent

        let err = bus
            .publish(&Event::new(EventType::GitCommit, "test", 1.0))
            .unwrap_err();
        assert_eq!(err, BusError::Closed);

        // Closed bus drops all senders: readers observe end-of-stream.
        assert!(rx.recv().is_err());
        assert!(bus.subscribe(EventType::GitCommit).is_none());
    }

    #[test]
    fn test_disconnected_subscriber_is_pruned() {
        let bus = EventBus::new();
        let rx = bus.subscribe(EventType::MouseRapid).unwrap();
        assert_eq!(bus.subscriber_count(), 1);

        drop(rx);
        bus.publish(&Event::new(EventType::MouseRapid, "test", 0.3))
            .unwrap();
        assert_eq!(bus.subscriber_count(), 0);
    }
}
