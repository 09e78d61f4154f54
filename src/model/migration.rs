//! [`Migration`] and [`MigrationStep`] — the output of
//! [`crate::migration::generator::MigrationGenerator`] and the input to
//! [`crate::migration::executor::MigrationExecutor`].

use crate::ids::MigrationId;
use crate::model::diff::BreakingChange;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    SqlServer,
    Postgres,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    Pending,
    Applied,
    Failed,
    RolledBack,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationStep {
    pub order: u32,
    pub description: String,
    pub forward_sql: String,
    pub rollback_sql: Option<String>,
    pub requires_lock: bool,
    pub estimated_duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Migration {
    pub id: MigrationId,
    pub name: String,
    pub version: String,
    pub description: String,
    pub dialect: Dialect,
    pub steps: Vec<MigrationStep>,
    pub dependencies: Vec<MigrationId>,
    pub breaking_changes: Vec<BreakingChange>,
    pub status: MigrationStatus,
    pub applied_at: Option<DateTime<Utc>>,
    pub applied_by: Option<String>,
}

impl Migration {
    /// SHA-256 over a canonicalized rendering of the ordered steps. Computed
    /// fresh every call (not cached) so that mutating `steps` is reflected
    /// immediately — callers that need stability call this once and store the
    /// result on the ledger row.
    pub fn compute_checksum(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.id.as_str().as_bytes());
        hasher.update(self.version.as_bytes());
        for step in &self.steps {
            hasher.update(step.order.to_le_bytes());
            hasher.update(step.forward_sql.as_bytes());
            if let Some(rollback) = &step.rollback_sql {
                hasher.update(rollback.as_bytes());
            }
        }
        format!("{:x}", hasher.finalize())
    }

    pub fn stored_checksum_matches(&self, stored: &str) -> bool {
        self.compute_checksum() == stored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_migration() -> Migration {
        Migration {
            id: MigrationId::from("m-1"),
            name: "add_last_login".into(),
            version: "1".into(),
            description: "add nullable column".into(),
            dialect: Dialect::SqlServer,
            steps: vec![MigrationStep {
                order: 1,
                description: "add column".into(),
                forward_sql: "ALTER TABLE dbo.Users ADD LastLogin DATETIME2 NULL;".into(),
                rollback_sql: Some("ALTER TABLE dbo.Users DROP COLUMN LastLogin;".into()),
                requires_lock: false,
                estimated_duration_ms: 50,
            }],
            dependencies: vec![],
            breaking_changes: vec![],
            status: MigrationStatus::Pending,
            applied_at: None,
            applied_by: None,
        }
    }

    #[test]
    fn checksum_is_stable_across_calls() {
        let migration = sample_migration();
        assert_eq!(migration.compute_checksum(), migration.compute_checksum());
        assert_eq!(migration.compute_checksum().len(), 64);
    }

    #[test]
    fn checksum_changes_with_step_sql() {
        let mut migration = sample_migration();
        let original = migration.compute_checksum();
        migration.steps[0].forward_sql.push_str(" -- tweak");
        assert_ne!(original, migration.compute_checksum());
    }
}
