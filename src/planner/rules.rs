//! Ordered rule collections and the built-in intervention policy.

use crate::planner::condition::{CompareOp, Condition};
use crate::planner::{PlanContext, PlannerError};
use crate::event::Metadata;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;

/// One condition-to-action mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    /// Unique key within a rule set.
    pub name: String,
    pub description: String,
    /// Higher priority wins; ties resolve in insertion order.
    pub priority: i32,
    pub condition: Condition,
    pub action: String,
    pub params: Metadata,
}

/// An ordered collection of rules keyed by name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn add(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    /// Remove a rule by name; returns whether one was removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let initial = self.rules.len();
        self.rules.retain(|r| r.name != name);
        self.rules.len() != initial
    }

    pub fn get(&self, name: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.name == name)
    }

    pub fn rules(&self) -> Vec<Rule> {
        self.rules.clone()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn clear(&mut self) {
        self.rules.clear();
    }

    /// All rules whose condition holds, sorted by descending priority.
    ///
    /// A condition evaluation failure aborts the whole match: a faulty
    /// rule's match result cannot be trusted.
    pub fn match_all(&self, ctx: &PlanContext) -> Result<Vec<&Rule>, PlannerError> {
        let mut matched = Vec::new();
        for rule in &self.rules {
            let holds = rule.condition.evaluate(ctx).map_err(|e| {
                PlannerError::Evaluation {
                    rule: rule.name.clone(),
                    message: e.to_string(),
                }
            })?;
            if holds {
                matched.push(rule);
            }
        }

        // Stable sort preserves insertion order among equal priorities.
        matched.sort_by_key(|r| Reverse(r.priority));
        Ok(matched)
    }

    /// The highest-priority matching rule, if any.
    pub fn match_first(&self, ctx: &PlanContext) -> Result<Option<&Rule>, PlannerError> {
        Ok(self.match_all(ctx)?.into_iter().next())
    }
}

fn compare(field: &str, op: CompareOp, value: impl Into<crate::event::MetadataValue>) -> Condition {
    Condition::Compare {
        field: field.to_string(),
        op,
        value: value.into(),
    }
}

/// The built-in intervention policy.
pub fn default_rules() -> RuleSet {
    let mut rules = RuleSet::new();

    rules.add(Rule {
        name: "critical_severity_breathing".to_string(),
        description: "Any critical signal earns an immediate breathing exercise".to_string(),
        priority: 100,
        condition: compare("severity", CompareOp::Eq, "critical"),
        action: "suggest_breathing_exercise".to_string(),
        params: [
            ("duration_secs".to_string(), 60.0.into()),
            ("pattern".to_string(), "4-7-8".into()),
            ("timing".to_string(), "immediate".into()),
            ("predicted_effectiveness".to_string(), 0.7.into()),
        ]
        .into_iter()
        .collect(),
    });

    rules.add(Rule {
        name: "cpu_pressure_break".to_string(),
        description: "Sustained CPU pressure suggests stepping away briefly".to_string(),
        priority: 80,
        condition: Condition::All(vec![
            compare("type", CompareOp::Eq, "cpu_warning"),
            compare("value", CompareOp::Gte, 0.7),
        ]),
        action: "suggest_breathing_exercise".to_string(),
        params: [
            ("duration_secs".to_string(), 30.0.into()),
            ("timing".to_string(), "delayed".into()),
            ("predicted_effectiveness".to_string(), 0.55.into()),
        ]
        .into_iter()
        .collect(),
    });

    rules.add(Rule {
        name: "keyboard_burst_check_in".to_string(),
        description: "Frantic typing triggers a cognitive check-in".to_string(),
        priority: 60,
        condition: Condition::All(vec![
            compare("type", CompareOp::Eq, "keyboard_burst"),
            compare("value", CompareOp::Gte, 0.7),
        ]),
        action: "ask_cognitive_question".to_string(),
        params: [("timing".to_string(), "immediate".into())]
            .into_iter()
            .collect(),
    });

    rules.add(Rule {
        name: "mood_drop_quote".to_string(),
        description: "A mood dip gets a motivational nudge".to_string(),
        priority: 50,
        condition: compare("type", CompareOp::Eq, "mood_drop"),
        action: "show_motivational_quote".to_string(),
        params: [("timing".to_string(), "delayed".into())]
            .into_iter()
            .collect(),
    });

    rules.add(Rule {
        name: "repeated_git_reset_vent".to_string(),
        description: "Fighting the repository hard enough warrants venting".to_string(),
        priority: 40,
        condition: Condition::All(vec![
            compare("type", CompareOp::Eq, "git_reset"),
            compare("value", CompareOp::Gte, 0.7),
        ]),
        action: "suggest_scream_session".to_string(),
        params: [
            ("timing".to_string(), "scheduled".into()),
            ("predicted_effectiveness".to_string(), 0.4.into()),
        ]
        .into_iter()
        .collect(),
    });

    rules.add(Rule {
        name: "idle_end_no_action".to_string(),
        description: "Returning from idle needs no intervention".to_string(),
        priority: 10,
        condition: compare("type", CompareOp::Eq, "idle_end"),
        action: "ignore".to_string(),
        params: Metadata::new(),
    });

    rules
}
