//! Vigil Agent - behavioral monitoring and intervention engine.
//!
//! This library watches heterogeneous system and behavioral signals (CPU
//! load, keyboard bursts, idle transitions, version-control activity),
//! evaluates them against a rule-based planner, and decides whether a
//! corrective intervention is warranted. Decisions are deterministic and
//! threshold-based; there is no learned scoring anywhere in the pipeline.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Vigil Agent                           │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌──────────┐    ┌───────────┐    ┌─────────────────────┐   │
//! │  │  Sensor  │───▶│ Event Bus │───▶│       Engine        │   │
//! │  │  (CPU)   │    │ (fan-out) │    │  batch -> analyze   │   │
//! │  └──────────┘    └───────────┘    │  -> plan -> execute │   │
//! │       │                           └─────────────────────┘   │
//! │       ▼                                      │               │
//! │  ┌──────────┐    ┌───────────┐               ▼               │
//! │  │ Platform │    │  Planner  │        ┌────────────┐        │
//! │  │  Reader  │    │ (rules +  │        │  Outcomes  │        │
//! │  │          │    │  cache)   │        │  (stream)  │        │
//! │  └──────────┘    └───────────┘        └────────────┘        │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Workers communicate exclusively over bounded channels and producers
//! never block: full queues drop (and count) rather than stall.
//!
//! # Example
//!
//! ```no_run
//! use vigil_agent::config::AgentConfig;
//! use vigil_agent::engine::Engine;
//! use vigil_agent::event::{Event, EventType};
//!
//! let engine = Engine::with_defaults(AgentConfig::default());
//! engine.start().expect("failed to start engine");
//!
//! engine
//!     .submit_event(Event::new(EventType::CpuWarning, "cpu_sensor", 0.85))
//!     .expect("failed to submit");
//!
//! // Outcomes arrive on a bounded stream as batches complete.
//! if let Ok(outcome) = engine.outcomes().recv() {
//!     println!("{}: {}", outcome.decision, outcome.reason);
//! }
//! ```

pub mod config;
pub mod engine;
pub mod event;
pub mod planner;
pub mod sensor;

// Re-export key types at crate root for convenience
pub use config::{AgentConfig, CpuSensorConfig, PrivacyLevel};
pub use engine::{
    ContextListener, Decision, Engine, EngineError, ExecutorManager, Intervention,
    InterventionType, ListenerManager, LoggingExecutor, Outcome, PlannerManager,
    RulePlannerManager, Timing, Urgency,
};
pub use event::{
    determine_severity, Event, EventBus, EventStore, EventType, MemoryEventStore, Metadata,
    MetadataValue, Severity,
};
pub use planner::{
    default_rules, CompareOp, Condition, Plan, PlanContext, Planner, Rule, RuleSet, TtlCache,
};
pub use sensor::{default_reader, CpuSensor, CpuStats, FallbackReader, PlatformReader};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
