//! Event model and distribution.
//!
//! The unified [`Event`] schema, severity classification, the pub/sub
//! [`EventBus`], and the [`EventStore`] persistence contract.

pub mod bus;
pub mod store;
pub mod types;

pub use bus::{BusError, EventBus};
pub use store::{EventStore, MemoryEventStore, StoreError};
pub use types::{determine_severity, Event, EventType, Metadata, MetadataValue, Severity};
