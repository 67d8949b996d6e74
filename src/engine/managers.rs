//! Manager contracts the engine composes, plus the in-crate defaults.
//!
//! The engine only knows these traits. The default implementations here are
//! enough to run a working agent: a listener that flattens events into plan
//! contexts, a planner manager that adapts the rule planner, and an executor
//! that records what it would have done.

use crate::engine::types::{Decision, Intervention, InterventionType, Outcome, Timing, Urgency};
use crate::engine::EngineError;
use crate::event::Event;
use crate::planner::{PlanContext, Planner};
use chrono::Utc;
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Turns a raw event into a richer context object for planning.
pub trait ListenerManager: Send + Sync {
    fn start(&self) -> Result<(), EngineError>;
    fn stop(&self) -> Result<(), EngineError>;
    fn analyze(&self, event: &Event) -> Result<PlanContext, EngineError>;
    fn stats(&self) -> Value;
}

/// Decides what, if anything, to do about an analyzed event.
pub trait PlannerManager: Send + Sync {
    fn plan(&self, event: &Event, ctx: &PlanContext) -> Result<Outcome, EngineError>;
    fn stats(&self) -> Value;
}

/// Carries out interventions the engine hands off.
pub trait ExecutorManager: Send + Sync {
    fn start(&self) -> Result<(), EngineError>;
    fn stop(&self) -> Result<(), EngineError>;
    fn execute(&self, intervention: &Intervention) -> Result<(), EngineError>;
    fn stats(&self) -> Value;
}

/// Default listener: flattens the event into a plan context.
#[derive(Default)]
pub struct ContextListener {
    analyzed: AtomicU64,
}

impl ContextListener {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ListenerManager for ContextListener {
    fn start(&self) -> Result<(), EngineError> {
        Ok(())
    }

    fn stop(&self) -> Result<(), EngineError> {
        Ok(())
    }

    fn analyze(&self, event: &Event) -> Result<PlanContext, EngineError> {
        self.analyzed.fetch_add(1, Ordering::Relaxed);

        // Start from the event's own metadata; the canonical fields win on
        // key collisions.
        let mut ctx = event.metadata.clone();
        ctx.insert("type".to_string(), event.event_type.as_str().into());
        ctx.insert("source".to_string(), event.source.clone().into());
        ctx.insert("severity".to_string(), event.severity.to_string().into());
        ctx.insert("value".to_string(), event.value.into());
        ctx.insert("confidence".to_string(), event.confidence.into());
        ctx.insert(
            "timestamp".to_string(),
            event.timestamp.to_rfc3339().into(),
        );
        Ok(ctx)
    }

    fn stats(&self) -> Value {
        json!({
            "events_analyzed": self.analyzed.load(Ordering::Relaxed),
        })
    }
}

/// Default planner manager: adapts the rule [`Planner`] to the engine.
pub struct RulePlannerManager {
    planner: Arc<Planner>,
    plans_made: AtomicU64,
    rules_matched: AtomicU64,
}

impl RulePlannerManager {
    pub fn new(planner: Arc<Planner>) -> Self {
        Self {
            planner,
            plans_made: AtomicU64::new(0),
            rules_matched: AtomicU64::new(0),
        }
    }

    pub fn with_default_rules() -> Self {
        Self::new(Arc::new(Planner::with_default_rules()))
    }

    /// Shared handle to the underlying planner, for rule management.
    pub fn planner(&self) -> Arc<Planner> {
        Arc::clone(&self.planner)
    }

    fn build_intervention(&self, event: &Event, plan: &crate::planner::Plan) -> Option<Intervention> {
        let intervention_type = match InterventionType::from_str(&plan.action) {
            Ok(t) => t,
            Err(_) => return None,
        };

        let timing = plan
            .params
            .get("timing")
            .and_then(|v| v.as_str())
            .and_then(|s| Timing::from_str(s).ok())
            .unwrap_or_default();
        let predicted_effectiveness = plan
            .params
            .get("predicted_effectiveness")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.6);

        let mut intervention =
            Intervention::new(intervention_type, Urgency::from(event.severity));
        intervention.timing = timing;
        intervention.predicted_effectiveness = predicted_effectiveness;
        intervention.parameters = plan.params.clone();
        intervention
            .context
            .insert("event_id".to_string(), event.id.clone().into());
        intervention
            .context
            .insert("event_type".to_string(), event.event_type.as_str().into());
        intervention
            .context
            .insert("event_value".to_string(), event.value.into());
        Some(intervention)
    }
}

impl PlannerManager for RulePlannerManager {
    fn plan(&self, event: &Event, ctx: &PlanContext) -> Result<Outcome, EngineError> {
        self.plans_made.fetch_add(1, Ordering::Relaxed);

        let plan = self
            .planner
            .plan(ctx)
            .map_err(|e| EngineError::Plan(e.to_string()))?;

        if plan.is_noop() {
            let reason = plan
                .params
                .get("reason")
                .and_then(|v| v.as_str())
                .unwrap_or("no matching rule")
                .to_string();
            return Ok(Outcome::ignore(event.id.clone(), reason, event.confidence));
        }

        self.rules_matched.fetch_add(1, Ordering::Relaxed);
        let rule_name = plan.rule.clone().unwrap_or_default();

        let (decision, intervention, reason) = match plan.action.as_str() {
            "ignore" => (
                Decision::Ignore,
                None,
                format!("rule '{rule_name}' chose to ignore"),
            ),
            "defer" => (
                Decision::Defer,
                None,
                format!("rule '{rule_name}' deferred the decision"),
            ),
            action => match self.build_intervention(event, &plan) {
                Some(intervention) => (
                    Decision::Execute,
                    Some(intervention),
                    format!("rule '{rule_name}' matched"),
                ),
                None => {
                    warn!(action, rule = %rule_name, "rule names an unknown action");
                    (
                        Decision::Ignore,
                        None,
                        format!("rule '{rule_name}' names unknown action '{action}'"),
                    )
                }
            },
        };

        Ok(Outcome {
            event_id: event.id.clone(),
            intervention,
            decision,
            reason,
            confidence: event.confidence,
            timestamp: Utc::now(),
        })
    }

    fn stats(&self) -> Value {
        json!({
            "plans_made": self.plans_made.load(Ordering::Relaxed),
            "rules_matched": self.rules_matched.load(Ordering::Relaxed),
            "rule_count": self.planner.rule_count(),
        })
    }
}

/// Default executor: logs the proposal. Real execution is an external
/// collaborator's job.
#[derive(Default)]
pub struct LoggingExecutor {
    executed: AtomicU64,
}

impl LoggingExecutor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ExecutorManager for LoggingExecutor {
    fn start(&self) -> Result<(), EngineError> {
        Ok(())
    }

    fn stop(&self) -> Result<(), EngineError> {
        Ok(())
    }

    fn execute(&self, intervention: &Intervention) -> Result<(), EngineError> {
        self.executed.fetch_add(1, Ordering::Relaxed);
        info!(
            id = %intervention.id,
            kind = %intervention.intervention_type,
            urgency = ?intervention.urgency,
            "intervention proposed"
        );
        Ok(())
    }

    fn stats(&self) -> Value {
        json!({
            "interventions_executed": self.executed.load(Ordering::Relaxed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventType;

    #[test]
    fn test_context_listener_flattens_event() {
        let listener = ContextListener::new();
        let event = Event::new(EventType::CpuWarning, "cpu_sensor", 0.82)
            .with_metadata("threshold", 0.7);

        let ctx = listener.analyze(&event).unwrap();
        assert_eq!(ctx["type"].as_str(), Some("cpu_warning"));
        assert_eq!(ctx["severity"].as_str(), Some("high"));
        assert_eq!(ctx["value"].as_f64(), Some(0.82));
        assert_eq!(ctx["threshold"].as_f64(), Some(0.7));
        assert!(ctx.contains_key("timestamp"));

        assert_eq!(listener.stats()["events_analyzed"].as_u64(), Some(1));
    }

    #[test]
    fn test_rule_planner_manager_executes_on_critical() {
        let manager = RulePlannerManager::with_default_rules();
        let listener = ContextListener::new();
        let event = Event::new(EventType::StressHigh, "affect_probe", 0.95);

        let ctx = listener.analyze(&event).unwrap();
        let outcome = manager.plan(&event, &ctx).unwrap();

        assert_eq!(outcome.decision, Decision::Execute);
        assert_eq!(outcome.event_id, event.id);
        let intervention = outcome.intervention.unwrap();
        assert_eq!(
            intervention.intervention_type,
            InterventionType::SuggestBreathingExercise
        );
        assert_eq!(intervention.urgency, Urgency::Critical);
        assert_eq!(intervention.timing, Timing::Immediate);
        assert_eq!(intervention.predicted_effectiveness, 0.7);
        assert_eq!(
            intervention.context["event_id"].as_str(),
            Some(event.id.as_str())
        );
    }

    #[test]
    fn test_rule_planner_manager_noop_for_unmatched() {
        let manager = RulePlannerManager::with_default_rules();
        let listener = ContextListener::new();
        let event = Event::new(EventType::GitCommit, "git_watcher", 1.0);

        let ctx = listener.analyze(&event).unwrap();
        let outcome = manager.plan(&event, &ctx).unwrap();

        assert_eq!(outcome.decision, Decision::Ignore);
        assert!(outcome.intervention.is_none());
        assert_eq!(outcome.reason, "no matching rule");
    }

    #[test]
    fn test_rule_planner_manager_ignore_action() {
        let manager = RulePlannerManager::with_default_rules();
        let listener = ContextListener::new();
        let event = Event::new(EventType::IdleEnd, "idle_watcher", 0.0);

        let ctx = listener.analyze(&event).unwrap();
        let outcome = manager.plan(&event, &ctx).unwrap();

        assert_eq!(outcome.decision, Decision::Ignore);
        assert!(outcome.reason.contains("idle_end_no_action"));
    }

    #[test]
    fn test_logging_executor_counts() {
        let executor = LoggingExecutor::new();
        let intervention =
            Intervention::new(InterventionType::ShowMotivationalQuote, Urgency::Low);
        executor.execute(&intervention).unwrap();
        executor.execute(&intervention).unwrap();
        assert_eq!(
            executor.stats()["interventions_executed"].as_u64(),
            Some(2)
        );
    }
}
