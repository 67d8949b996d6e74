//! Event persistence contract.
//!
//! The engine only depends on this trait; real storage backends live outside
//! the core. [`MemoryEventStore`] is the in-process implementation used by
//! the CLI run loop and tests.

use crate::event::types::{Event, EventType};
use chrono::{DateTime, Utc};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("event not found: {0}")]
    NotFound(String),
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Persistence contract consumed by the core.
pub trait EventStore: Send + Sync {
    fn save(&self, event: &Event) -> Result<(), StoreError>;
    fn get_by_id(&self, id: &str) -> Result<Event, StoreError>;
    fn get_by_type(&self, event_type: EventType, limit: usize) -> Result<Vec<Event>, StoreError>;
    fn get_by_time_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Event>, StoreError>;
    fn get_recent(&self, limit: usize) -> Result<Vec<Event>, StoreError>;
    /// Delete events older than `before`; returns how many were removed.
    fn delete_before(&self, before: DateTime<Utc>) -> Result<usize, StoreError>;
}

/// In-memory store: a flat chronological list behind a mutex.
pub struct MemoryEventStore {
    events: Mutex<Vec<Event>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.events.lock().expect("store lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EventStore for MemoryEventStore {
    fn save(&self, event: &Event) -> Result<(), StoreError> {
        let mut events = self.events.lock().expect("store lock poisoned");
        events.push(event.clone());
        Ok(())
    }

    fn get_by_id(&self, id: &str) -> Result<Event, StoreError> {
        let events = self.events.lock().expect("store lock poisoned");
        events
            .iter()
            .find(|e| e.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn get_by_type(&self, event_type: EventType, limit: usize) -> Result<Vec<Event>, StoreError> {
        let events = self.events.lock().expect("store lock poisoned");
        Ok(events
            .iter()
            .rev()
            .filter(|e| e.event_type == event_type)
            .take(limit)
            .cloned()
            .collect())
    }

    fn get_by_time_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Event>, StoreError> {
        let events = self.events.lock().expect("store lock poisoned");
        Ok(events
            .iter()
            .filter(|e| e.timestamp >= start && e.timestamp < end)
            .cloned()
            .collect())
    }

    fn get_recent(&self, limit: usize) -> Result<Vec<Event>, StoreError> {
        let events = self.events.lock().expect("store lock poisoned");
        Ok(events.iter().rev().take(limit).cloned().collect())
    }

    fn delete_before(&self, before: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut events = self.events.lock().expect("store lock poisoned");
        let initial = events.len();
        events.retain(|e| e.timestamp >= before);
        Ok(initial - events.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_save_and_lookup() {
        let store = MemoryEventStore::new();
        let event = Event::new(EventType::BuildFailed, "ci_watcher", 1.0);
        store.save(&event).unwrap();

        let found = store.get_by_id(&event.id).unwrap();
        assert_eq!(found.event_type, EventType::BuildFailed);
        assert!(store.get_by_id("evt_missing").is_err());
    }

    #[test]
    fn test_get_by_type_respects_limit() {
        let store = MemoryEventStore::new();
        for _ in 0..5 {
            store
                .save(&Event::new(EventType::GitCommit, "git_watcher", 1.0))
                .unwrap();
        }
        store
            .save(&Event::new(EventType::GitReset, "git_watcher", 0.8))
            .unwrap();

        let commits = store.get_by_type(EventType::GitCommit, 3).unwrap();
        assert_eq!(commits.len(), 3);
        assert!(commits.iter().all(|e| e.event_type == EventType::GitCommit));
    }

    #[test]
    fn test_delete_before_returns_count() {
        let store = MemoryEventStore::new();
        let mut old = Event::new(EventType::IdleStart, "idle_watcher", 0.0);
        old.timestamp = Utc::now() - Duration::hours(2);
        store.save(&old).unwrap();
        store
            .save(&Event::new(EventType::IdleEnd, "idle_watcher", 0.0))
            .unwrap();

        let removed = store.delete_before(Utc::now() - Duration::hours(1)).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_time_range_query() {
        let store = MemoryEventStore::new();
        let event = Event::new(EventType::SystemLoad, "cpu_sensor", 0.4);
        store.save(&event).unwrap();

        let hits = store
            .get_by_time_range(Utc::now() - Duration::minutes(1), Utc::now() + Duration::minutes(1))
            .unwrap();
        assert_eq!(hits.len(), 1);

        let misses = store
            .get_by_time_range(Utc::now() + Duration::hours(1), Utc::now() + Duration::hours(2))
            .unwrap();
        assert!(misses.is_empty());
    }
}
