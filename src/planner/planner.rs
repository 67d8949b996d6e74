//! Rule-based planning over an atomically swappable rule set.

use crate::event::Metadata;
use crate::planner::cache::TtlCache;
use crate::planner::rules::{default_rules, Rule, RuleSet};
use crate::planner::{PlanContext, PlannerError};
use serde::{Deserialize, Serialize};
use std::sync::RwLock;
use std::time::Duration;
use tracing::{debug, info};

/// Action chosen when no rule matches.
pub const NOOP_ACTION: &str = "noop";

/// The outcome of rule matching: an action plus its parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub action: String,
    pub params: Metadata,
    /// Name of the matched rule; `None` for the no-match plan.
    pub rule: Option<String>,
}

impl Plan {
    fn noop() -> Self {
        let mut params = Metadata::new();
        params.insert("reason".to_string(), "no matching rule".into());
        Self {
            action: NOOP_ACTION.to_string(),
            params,
            rule: None,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.action == NOOP_ACTION
    }
}

/// Rule-based planner.
///
/// Matching takes the read lock and may run concurrently from several
/// engine instances; mutation takes the write lock and swaps or edits the
/// collection atomically with respect to in-flight matches.
pub struct Planner {
    rules: RwLock<RuleSet>,
    cache: TtlCache<Plan>,
}

impl Planner {
    pub fn new(rules: RuleSet, cache_ttl: Duration) -> Self {
        Self {
            rules: RwLock::new(rules),
            cache: TtlCache::new(cache_ttl),
        }
    }

    /// A planner loaded with the built-in intervention policy.
    pub fn with_default_rules() -> Self {
        Self::new(default_rules(), Duration::from_secs(30))
    }

    /// Evaluate the active rule set against a context.
    ///
    /// No matching rule is not an error; the returned plan carries the
    /// `noop` action with a reason.
    pub fn plan(&self, ctx: &PlanContext) -> Result<Plan, PlannerError> {
        let rules = self.rules.read().expect("rule set lock poisoned");
        match rules.match_first(ctx)? {
            Some(rule) => {
                debug!(rule = %rule.name, action = %rule.action, "rule matched");
                Ok(Plan {
                    action: rule.action.clone(),
                    params: rule.params.clone(),
                    rule: Some(rule.name.clone()),
                })
            }
            None => {
                debug!("no matching rule");
                Ok(Plan::noop())
            }
        }
    }

    /// Like [`Planner::plan`], memoized under a caller-supplied key.
    pub fn plan_cached(&self, key: &str, ctx: &PlanContext) -> Result<Plan, PlannerError> {
        if let Some(plan) = self.cache.get(key) {
            return Ok(plan);
        }
        let plan = self.plan(ctx)?;
        self.cache.set(key, plan.clone());
        Ok(plan)
    }

    /// Add a rule; fails when a rule of the same name exists.
    pub fn add_rule(&self, rule: Rule) -> Result<(), PlannerError> {
        let mut rules = self.rules.write().expect("rule set lock poisoned");
        if rules.get(&rule.name).is_some() {
            return Err(PlannerError::DuplicateRule(rule.name));
        }
        debug!(rule = %rule.name, "added rule");
        rules.add(rule);
        Ok(())
    }

    /// Remove a rule by name; returns whether one was removed.
    pub fn remove_rule(&self, name: &str) -> bool {
        let mut rules = self.rules.write().expect("rule set lock poisoned");
        let removed = rules.remove(name);
        if removed {
            debug!(rule = %name, "removed rule");
        }
        removed
    }

    pub fn clear(&self) {
        let mut rules = self.rules.write().expect("rule set lock poisoned");
        rules.clear();
        debug!("cleared all rules");
    }

    /// Atomically replace the whole rule collection.
    pub fn reload(&self, new_rules: Vec<Rule>) {
        let mut replacement = RuleSet::new();
        for rule in new_rules {
            replacement.add(rule);
        }
        let count = replacement.len();
        *self.rules.write().expect("rule set lock poisoned") = replacement;
        info!(count, "reloaded rules");
    }

    pub fn rule_count(&self) -> usize {
        self.rules.read().expect("rule set lock poisoned").len()
    }

    pub fn rules(&self) -> Vec<Rule> {
        self.rules.read().expect("rule set lock poisoned").rules()
    }

    pub fn get_rule(&self, name: &str) -> Option<Rule> {
        self.rules
            .read()
            .expect("rule set lock poisoned")
            .get(name)
            .cloned()
    }
}
