//! Event model: the unified schema for any observed signal.
//!
//! Every signal flowing through the pipeline - system metrics, user behavior,
//! development activity, affect proxies - is normalized into an [`Event`].
//! Severity is never set by producers directly; it is derived from the event
//! type and value by [`determine_severity`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Classification of an observed signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    // System monitoring
    CpuWarning,
    CpuCritical,
    MemoryHigh,
    DiskFull,
    SystemLoad,

    // User behavior
    KeyboardBurst,
    MouseRapid,
    IdleStart,
    IdleEnd,

    // Development activity
    GitReset,
    GitCommit,
    BuildFailed,
    TestFailed,
    CompileError,

    // Affect proxies
    MoodDrop,
    StressHigh,
    FocusLost,
    AnxietyHigh,

    // Intervention feedback
    InterventionSuccess,
    InterventionFailed,
    InterventionIgnored,
}

impl EventType {
    /// The wire name of this event type (snake_case).
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::CpuWarning => "cpu_warning",
            EventType::CpuCritical => "cpu_critical",
            EventType::MemoryHigh => "memory_high",
            EventType::DiskFull => "disk_full",
            EventType::SystemLoad => "system_load",
            EventType::KeyboardBurst => "keyboard_burst",
            EventType::MouseRapid => "mouse_rapid",
            EventType::IdleStart => "idle_start",
            EventType::IdleEnd => "idle_end",
            EventType::GitReset => "git_reset",
            EventType::GitCommit => "git_commit",
            EventType::BuildFailed => "build_failed",
            EventType::TestFailed => "test_failed",
            EventType::CompileError => "compile_error",
            EventType::MoodDrop => "mood_drop",
            EventType::StressHigh => "stress_high",
            EventType::FocusLost => "focus_lost",
            EventType::AnxietyHigh => "anxiety_high",
            EventType::InterventionSuccess => "intervention_success",
            EventType::InterventionFailed => "intervention_failed",
            EventType::InterventionIgnored => "intervention_ignored",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cpu_warning" => Ok(EventType::CpuWarning),
            "cpu_critical" => Ok(EventType::CpuCritical),
            "memory_high" => Ok(EventType::MemoryHigh),
            "disk_full" => Ok(EventType::DiskFull),
            "system_load" => Ok(EventType::SystemLoad),
            "keyboard_burst" => Ok(EventType::KeyboardBurst),
            "mouse_rapid" => Ok(EventType::MouseRapid),
            "idle_start" => Ok(EventType::IdleStart),
            "idle_end" => Ok(EventType::IdleEnd),
            "git_reset" => Ok(EventType::GitReset),
            "git_commit" => Ok(EventType::GitCommit),
            "build_failed" => Ok(EventType::BuildFailed),
            "test_failed" => Ok(EventType::TestFailed),
            "compile_error" => Ok(EventType::CompileError),
            "mood_drop" => Ok(EventType::MoodDrop),
            "stress_high" => Ok(EventType::StressHigh),
            "focus_lost" => Ok(EventType::FocusLost),
            "anxiety_high" => Ok(EventType::AnxietyHigh),
            "intervention_success" => Ok(EventType::InterventionSuccess),
            "intervention_failed" => Ok(EventType::InterventionFailed),
            "intervention_ignored" => Ok(EventType::InterventionIgnored),
            other => Err(format!("unknown event type: {other}")),
        }
    }
}

/// Ordered severity classification.
///
/// Derives `Ord` so that `Severity::Critical > Severity::High` holds; the
/// variant order is significant.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// A typed metadata value.
///
/// Replaces the open `anything` maps of loosely-typed event payloads with a
/// small closed union, while keeping the "arbitrary extra attributes"
/// capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Number(f64),
    String(String),
    Map(BTreeMap<String, MetadataValue>),
}

impl MetadataValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetadataValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetadataValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, MetadataValue>> {
        match self {
            MetadataValue::Map(m) => Some(m),
            _ => None,
        }
    }
}

impl From<bool> for MetadataValue {
    fn from(b: bool) -> Self {
        MetadataValue::Bool(b)
    }
}

impl From<f64> for MetadataValue {
    fn from(n: f64) -> Self {
        MetadataValue::Number(n)
    }
}

impl From<i64> for MetadataValue {
    fn from(n: i64) -> Self {
        MetadataValue::Number(n as f64)
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        MetadataValue::String(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        MetadataValue::String(s)
    }
}

/// Open key-value attributes attached to events and interventions.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// A normalized record of one observed signal.
///
/// Events are treated as immutable once queued; only the engine flips
/// `processed` before publishing the outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub source: String,
    pub value: f64,
    pub metadata: Metadata,
    pub timestamp: DateTime<Utc>,
    pub processed: bool,
    pub confidence: f64,
    pub severity: Severity,
}

impl Event {
    /// Create a new event with a generated id and derived severity.
    pub fn new(event_type: EventType, source: impl Into<String>, value: f64) -> Self {
        Self {
            id: generate_event_id(),
            event_type,
            source: source.into(),
            value,
            metadata: Metadata::new(),
            timestamp: Utc::now(),
            processed: false,
            confidence: 0.9,
            severity: determine_severity(event_type, value),
        }
    }

    /// Attach a metadata attribute.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Override the default confidence.
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }
}

/// Generate a process-unique event id: timestamp plus a random suffix.
fn generate_event_id() -> String {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let suffix = Uuid::new_v4().simple().to_string();
    format!("evt_{}_{}", nanos, &suffix[..16])
}

/// Derive severity from an event's type and value.
///
/// Pure and total: the same `(event_type, value)` pair always yields the same
/// severity, whether computed at construction time or recomputed later.
pub fn determine_severity(event_type: EventType, value: f64) -> Severity {
    match event_type {
        EventType::CpuCritical | EventType::StressHigh => Severity::Critical,
        EventType::CpuWarning | EventType::MoodDrop => {
            if value >= 0.8 {
                Severity::High
            } else {
                Severity::Medium
            }
        }
        EventType::KeyboardBurst | EventType::GitReset => {
            if value >= 0.7 {
                Severity::Medium
            } else {
                Severity::Low
            }
        }
        _ => Severity::Info,
    }
}
