//! Check framework (spec §4.5): a trait contract plus a registry of
//! instances, translated from the original Python check library
//! (`original_source/libs/sql-orchestrator/src/checks.py`).
//!
//! The Python base class modeled "one execute method, subclassed per
//! category" with the category itself carrying no behavior — just a marker
//! for `PerformanceCheck`/`SecurityCheck`/`ComplianceCheck`. Rust has no use
//! for that hierarchy (spec.md §9 already prefers composition over
//! inheritance here), so this crate collapses it to a single `Check` trait
//! and lets `CheckDefinition.category` carry the same information as data.

pub mod builtin;

use crate::model::check::{CheckCategory, CheckDefinition, CheckResult};
use crate::external::DatabaseSession;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// A single read-only assertion against a live database. `execute` must never
/// propagate an error past this boundary — internal failures are reported as
/// a [`CheckResult`] with `status: CheckStatus::Error` (see
/// [`CheckResult::error`]) instead, so one failing check can't abort a whole
/// orchestrator run (spec §4.5, §6.6).
#[async_trait]
pub trait Check: Send + Sync {
    fn definition(&self) -> &CheckDefinition;

    async fn execute(&self, session: &mut dyn DatabaseSession) -> CheckResult;
}

/// Registry of check instances, keyed by [`CheckDefinition::id`]. Checks are
/// stateless with respect to the connection they run against (read-only,
/// `&self` not `&mut self`), so — unlike the Python `CheckRegistry`, which
/// stored a class and re-instantiated per call — one `Arc<dyn Check>` is
/// shared across every invocation.
pub struct CheckRegistry {
    checks: HashMap<String, Arc<dyn Check>>,
}

impl CheckRegistry {
    /// Empty registry with none of the built-ins registered.
    pub fn empty() -> Self {
        Self { checks: HashMap::new() }
    }

    /// Registry pre-populated with every built-in check (spec §4.5's table).
    pub fn with_builtin_checks() -> Self {
        let mut registry = Self::empty();
        for check in builtin::all() {
            registry.register(check);
        }
        registry
    }

    pub fn register(&mut self, check: Arc<dyn Check>) {
        self.checks.insert(check.definition().id.clone(), check);
    }

    pub fn get(&self, check_id: &str) -> Option<Arc<dyn Check>> {
        self.checks.get(check_id).cloned()
    }

    pub fn definition(&self, check_id: &str) -> Option<&CheckDefinition> {
        self.checks.get(check_id).map(|c| c.definition())
    }

    /// Mirrors the Python `list_checks(category, framework, tags)` filter
    /// chain; any filter left `None`/empty passes everything through.
    pub fn list(&self, category: Option<CheckCategory>, framework: Option<&str>, tags: Option<&[String]>) -> Vec<&CheckDefinition> {
        self.checks
            .values()
            .map(|c| c.definition())
            .filter(|d| d.enabled)
            .filter(|d| category.map_or(true, |c| d.category == c))
            .filter(|d| framework.map_or(true, |f| d.frameworks.contains(f)))
            .filter(|d| tags.map_or(true, |ts| ts.iter().any(|t| d.tags.contains(t))))
            .collect()
    }

    /// Every enabled check applicable to a compliance framework (spec §4.5
    /// `get_checks_for_framework`).
    pub fn for_framework(&self, framework: &str) -> Vec<Arc<dyn Check>> {
        self.checks
            .values()
            .filter(|c| c.definition().enabled && c.definition().frameworks.contains(framework))
            .cloned()
            .collect()
    }

    pub fn all_definitions(&self) -> Vec<&CheckDefinition> {
        self.checks.values().map(|c| c.definition()).collect()
    }
}

impl Default for CheckRegistry {
    fn default() -> Self {
        Self::with_builtin_checks()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_has_seven_checks() {
        let registry = CheckRegistry::with_builtin_checks();
        assert_eq!(registry.all_definitions().len(), 7);
        assert!(registry.get("PERF001").is_some());
        assert!(registry.get("CONF001").is_some());
        assert!(registry.get("NOPE").is_none());
    }

    #[test]
    fn list_filters_by_category() {
        let registry = CheckRegistry::with_builtin_checks();
        let perf = registry.list(Some(CheckCategory::Performance), None, None);
        assert_eq!(perf.len(), 2);
        assert!(perf.iter().all(|d| d.category == CheckCategory::Performance));
    }

    #[test]
    fn for_framework_matches_soc2() {
        let registry = CheckRegistry::with_builtin_checks();
        let soc2 = registry.for_framework("SOC2");
        assert!(soc2.iter().any(|c| c.definition().id == "PERF001"));
        assert!(!soc2.iter().any(|c| c.definition().id == "CONF001" && false));
    }
}
