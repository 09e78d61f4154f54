//! Types shared by [`crate::checks`] and [`crate::orchestrator`].

use crate::ids::{ConnectionId, ExecutionId, TenantId};
use crate::model::diff::Severity;
use crate::model::schema::DatabaseSchema;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckCategory {
    Performance,
    Security,
    Compliance,
    Configuration,
}

impl CheckCategory {
    pub const ALL: [CheckCategory; 4] = [
        CheckCategory::Performance,
        CheckCategory::Security,
        CheckCategory::Compliance,
        CheckCategory::Configuration,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Passed,
    Warning,
    Failed,
    Critical,
    Error,
}

impl CheckStatus {
    /// Precedence used for aggregation: `error > failed > warning > passed`.
    /// `critical` is treated as a flavor of `failed` for aggregation purposes
    /// (the spec's precedence rule only names four tiers) but keeps its own
    /// tag on the individual `CheckResult`.
    fn precedence(self) -> u8 {
        match self {
            CheckStatus::Error => 3,
            CheckStatus::Failed | CheckStatus::Critical => 2,
            CheckStatus::Warning => 1,
            CheckStatus::Passed => 0,
        }
    }

    pub fn aggregate(statuses: impl IntoIterator<Item = CheckStatus>) -> CheckStatus {
        statuses
            .into_iter()
            .max_by_key(|s| s.precedence())
            .unwrap_or(CheckStatus::Passed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: CheckCategory,
    pub default_severity: Severity,
    pub frameworks: HashSet<String>,
    pub tags: HashSet<String>,
    pub parameters: HashMap<String, serde_json::Value>,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub check_id: String,
    pub check_name: String,
    pub category: CheckCategory,
    pub severity: Severity,
    pub status: CheckStatus,
    pub message: String,
    pub details: serde_json::Value,
    pub remediation: Option<String>,
    pub affected_objects: Vec<String>,
    pub duration_ms: u64,
}

impl CheckResult {
    pub fn error(check_id: impl Into<String>, check_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            check_id: check_id.into(),
            check_name: check_name.into(),
            category: CheckCategory::Configuration,
            severity: Severity::Medium,
            status: CheckStatus::Error,
            message: message.into(),
            details: serde_json::Value::Null,
            remediation: None,
            affected_objects: Vec::new(),
            duration_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    OnDemand,
    Scheduled,
    Deployment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckExecution {
    pub id: ExecutionId,
    pub tenant_id: TenantId,
    pub connection_id: ConnectionId,
    pub trigger_type: TriggerType,
    pub trigger_source: Option<String>,
    pub status: CheckStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub results: Vec<CheckResult>,
    pub before_snapshot: Option<DatabaseSchema>,
}

impl CheckExecution {
    pub fn new(tenant_id: TenantId, connection_id: ConnectionId, trigger_type: TriggerType, trigger_source: Option<String>) -> Self {
        Self {
            id: ExecutionId::new(),
            tenant_id,
            connection_id,
            trigger_type,
            trigger_source,
            status: CheckStatus::Passed,
            started_at: Utc::now(),
            completed_at: None,
            results: Vec::new(),
            before_snapshot: None,
        }
    }

    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|r| r.status == CheckStatus::Passed).count()
    }

    pub fn failed_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.status, CheckStatus::Failed | CheckStatus::Critical))
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.results.iter().filter(|r| r.status == CheckStatus::Warning).count()
    }

    pub fn critical_count(&self) -> usize {
        self.results.iter().filter(|r| r.status == CheckStatus::Critical).count()
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.completed_at.map(|end| (end - self.started_at).num_milliseconds())
    }

    /// Finalize the execution: sort results by `check_id` for reproducibility
    /// and aggregate the overall status.
    pub fn finish(&mut self) {
        self.results.sort_by(|a, b| a.check_id.cmp(&b.check_id));
        self.status = CheckStatus::aggregate(self.results.iter().map(|r| r.status));
        self.completed_at = Some(Utc::now());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseHealth {
    pub connection_id: ConnectionId,
    pub overall_status: HealthStatus,
    pub last_check: DateTime<Utc>,
    pub checks_passed: u32,
    pub checks_failed: u32,
    pub checks_warning: u32,
    pub performance_score: f64,
    pub security_score: f64,
    pub compliance_score: f64,
    pub critical_issues: Vec<String>,
}

impl DatabaseHealth {
    /// Per-category score is `(passed / total) * 100`, `100.0` when the
    /// category had no results at all (nothing to fail). Status mapping is
    /// implementation-defined per spec.md §9's open question: this crate maps
    /// any critical result to `critical`, any failed/warning result with an
    /// average category score below 70 to `degraded`, else `healthy`.
    pub fn status_for(critical_issues: usize, min_score: f64) -> HealthStatus {
        if critical_issues > 0 {
            HealthStatus::Critical
        } else if min_score < 70.0 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregation_follows_documented_precedence() {
        assert_eq!(
            CheckStatus::aggregate([CheckStatus::Passed, CheckStatus::Warning]),
            CheckStatus::Warning
        );
        assert_eq!(
            CheckStatus::aggregate([CheckStatus::Warning, CheckStatus::Failed]),
            CheckStatus::Failed
        );
        assert_eq!(
            CheckStatus::aggregate([CheckStatus::Failed, CheckStatus::Error]),
            CheckStatus::Error
        );
        assert_eq!(CheckStatus::aggregate([]), CheckStatus::Passed);
    }

    #[test]
    fn finish_sorts_results_by_check_id() {
        let mut exec = CheckExecution::new(
            TenantId::from("t1"),
            ConnectionId::from("c1"),
            TriggerType::OnDemand,
            None,
        );
        exec.results.push(CheckResult {
            status: CheckStatus::Passed,
            ..CheckResult::error("ZCHECK", "z", "ok")
        });
        exec.results.push(CheckResult {
            status: CheckStatus::Passed,
            ..CheckResult::error("ACHECK", "a", "ok")
        });
        exec.finish();
        assert_eq!(exec.results[0].check_id, "ACHECK");
        assert_eq!(exec.results[1].check_id, "ZCHECK");
        assert!(exec.completed_at.is_some());
    }
}
