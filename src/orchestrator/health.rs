//! Cached per-connection [`DatabaseHealth`] roll-up (spec §4.6 step 7).
//!
//! Grounded in the teacher's `health_monitor.rs::HealthMonitor` — an
//! `Arc<Mutex<HashMap<_>>>` keyed by connection, updated in place after each
//! check run rather than recomputed from history, since spec §3 only asks
//! for a "cache of the latest roll-up", not a time series.

use crate::ids::ConnectionId;
use crate::model::check::{CheckCategory, CheckResult, DatabaseHealth, HealthStatus};
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Per-category pass ratio used to compute the 0-100 scores spec §4.6 step 7
/// asks for (`passed / total * 100`), and to derive `overall_status`
/// (spec.md §9 leaves the score→status mapping implementation-defined).
fn category_score(results: &[&CheckResult], category: CheckCategory) -> f64 {
    let in_category: Vec<&&CheckResult> = results.iter().filter(|r| r.category == category).collect();
    if in_category.is_empty() {
        return 100.0;
    }
    let passed = in_category
        .iter()
        .filter(|r| r.status == crate::model::check::CheckStatus::Passed)
        .count();
    (passed as f64 / in_category.len() as f64) * 100.0
}

/// Guarded cache of the latest health roll-up per connection (spec §5: "the
/// in-memory `DatabaseHealth` cache ... protected by a mutex").
pub struct HealthCache {
    entries: Mutex<HashMap<String, DatabaseHealth>>,
}

impl HealthCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Recompute and store the roll-up for `connection_id` from one
    /// execution's results, replacing whatever was cached before.
    pub async fn update(&self, connection_id: &ConnectionId, results: &[CheckResult]) -> DatabaseHealth {
        let refs: Vec<&CheckResult> = results.iter().collect();

        let performance_score = category_score(&refs, CheckCategory::Performance);
        let security_score = category_score(&refs, CheckCategory::Security);
        let compliance_score = category_score(&refs, CheckCategory::Compliance);

        let checks_passed = results.iter().filter(|r| r.status == crate::model::check::CheckStatus::Passed).count() as u32;
        let checks_failed = results
            .iter()
            .filter(|r| matches!(r.status, crate::model::check::CheckStatus::Failed | crate::model::check::CheckStatus::Critical))
            .count() as u32;
        let checks_warning = results.iter().filter(|r| r.status == crate::model::check::CheckStatus::Warning).count() as u32;

        let critical_issues: Vec<String> = results
            .iter()
            .filter(|r| r.status == crate::model::check::CheckStatus::Critical)
            .map(|r| r.check_id.clone())
            .collect();

        let min_score = performance_score.min(security_score).min(compliance_score);
        let overall_status = DatabaseHealth::status_for(critical_issues.len(), min_score);

        let health = DatabaseHealth {
            connection_id: connection_id.clone(),
            overall_status,
            last_check: Utc::now(),
            checks_passed,
            checks_failed,
            checks_warning,
            performance_score,
            security_score,
            compliance_score,
            critical_issues,
        };

        self.entries
            .lock()
            .await
            .insert(connection_id.as_str().to_string(), health.clone());
        health
    }

    pub async fn get(&self, connection_id: &ConnectionId) -> Option<DatabaseHealth> {
        self.entries.lock().await.get(connection_id.as_str()).cloned()
    }
}

impl Default for HealthCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::check::CheckStatus;
    use crate::model::diff::Severity;

    fn result(category: CheckCategory, status: CheckStatus) -> CheckResult {
        CheckResult {
            check_id: "X".into(),
            check_name: "x".into(),
            category,
            severity: Severity::Medium,
            status,
            message: "ok".into(),
            details: serde_json::Value::Null,
            remediation: None,
            affected_objects: vec![],
            duration_ms: 5,
        }
    }

    #[tokio::test]
    async fn all_passed_yields_healthy_with_full_scores() {
        let cache = HealthCache::new();
        let connection = ConnectionId::from("c1");
        let health = cache
            .update(&connection, &[result(CheckCategory::Performance, CheckStatus::Passed)])
            .await;
        assert_eq!(health.overall_status, HealthStatus::Healthy);
        assert_eq!(health.performance_score, 100.0);
        assert_eq!(health.security_score, 100.0);
    }

    #[tokio::test]
    async fn a_critical_result_marks_overall_critical() {
        let cache = HealthCache::new();
        let connection = ConnectionId::from("c1");
        let health = cache
            .update(
                &connection,
                &[result(CheckCategory::Security, CheckStatus::Critical)],
            )
            .await;
        assert_eq!(health.overall_status, HealthStatus::Critical);
        assert_eq!(health.critical_issues.len(), 1);
    }

    #[tokio::test]
    async fn cached_value_is_retrievable_after_update() {
        let cache = HealthCache::new();
        let connection = ConnectionId::from("c1");
        cache.update(&connection, &[result(CheckCategory::Compliance, CheckStatus::Failed)]).await;
        let cached = cache.get(&connection).await.unwrap();
        assert_eq!(cached.checks_failed, 1);
    }
}
