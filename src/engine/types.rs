//! Decisions and interventions: what the pipeline produces per event.

use crate::event::{Metadata, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// What the planner decided to do about an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Execute,
    Ignore,
    Defer,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Decision::Execute => "execute",
            Decision::Ignore => "ignore",
            Decision::Defer => "defer",
        };
        f.write_str(s)
    }
}

/// How pressing a proposed intervention is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    Medium,
    High,
    Critical,
}

impl From<Severity> for Urgency {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Critical => Urgency::Critical,
            Severity::High => Urgency::High,
            Severity::Medium => Urgency::Medium,
            Severity::Low | Severity::Info => Urgency::Low,
        }
    }
}

/// When a proposed intervention should happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timing {
    #[default]
    Immediate,
    Delayed,
    Scheduled,
}

impl FromStr for Timing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "immediate" => Ok(Timing::Immediate),
            "delayed" => Ok(Timing::Delayed),
            "scheduled" => Ok(Timing::Scheduled),
            other => Err(format!("unknown timing: {other}")),
        }
    }
}

/// The corrective actions this agent knows how to propose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterventionType {
    SuggestBreathingExercise,
    SuggestScreamSession,
    AskCognitiveQuestion,
    ShowMotivationalQuote,
}

impl InterventionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InterventionType::SuggestBreathingExercise => "suggest_breathing_exercise",
            InterventionType::SuggestScreamSession => "suggest_scream_session",
            InterventionType::AskCognitiveQuestion => "ask_cognitive_question",
            InterventionType::ShowMotivationalQuote => "show_motivational_quote",
        }
    }
}

impl fmt::Display for InterventionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InterventionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "suggest_breathing_exercise" => Ok(InterventionType::SuggestBreathingExercise),
            "suggest_scream_session" => Ok(InterventionType::SuggestScreamSession),
            "ask_cognitive_question" => Ok(InterventionType::AskCognitiveQuestion),
            "show_motivational_quote" => Ok(InterventionType::ShowMotivationalQuote),
            other => Err(format!("unknown intervention type: {other}")),
        }
    }
}

/// A proposed corrective action. The planner proposes; an executor owns it
/// from there.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intervention {
    pub id: String,
    #[serde(rename = "type")]
    pub intervention_type: InterventionType,
    pub urgency: Urgency,
    pub timing: Timing,
    pub parameters: Metadata,
    pub predicted_effectiveness: f64,
    pub context: Metadata,
}

impl Intervention {
    pub fn new(intervention_type: InterventionType, urgency: Urgency) -> Self {
        Self {
            id: format!("int_{}", Uuid::new_v4().simple()),
            intervention_type,
            urgency,
            timing: Timing::default(),
            parameters: Metadata::new(),
            predicted_effectiveness: 0.5,
            context: Metadata::new(),
        }
    }
}

/// One processing outcome per analyzed event, no-ops included.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    pub event_id: String,
    pub intervention: Option<Intervention>,
    pub decision: Decision,
    pub reason: String,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
}

impl Outcome {
    /// An ignore outcome with the given reason.
    pub fn ignore(event_id: impl Into<String>, reason: impl Into<String>, confidence: f64) -> Self {
        Self {
            event_id: event_id.into(),
            intervention: None,
            decision: Decision::Ignore,
            reason: reason.into(),
            confidence,
            timestamp: Utc::now(),
        }
    }
}
