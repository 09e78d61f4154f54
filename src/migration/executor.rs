//! [`MigrationExecutor`] — apply or roll back a [`Migration`] against a live
//! session, with ledger tracking, validation, and transactional safety
//! (spec §4.4).

use crate::config::ExecutorOptions;
use crate::error::{MigrationError, ValidationError};
use crate::external::DatabaseSession;
use crate::model::migration::{Dialect, Migration, MigrationStatus};
use regex::Regex;
use tracing::{info, warn};

/// DDL patterns the validator refuses to let through unless
/// `ExecutorOptions::allow_truncate` is set for the `TRUNCATE` case (spec
/// §4.4 validation).
const DENYLIST: &[&str] = &["DROP DATABASE", "XP_", "SP_CONFIGURE"];

pub struct MigrationExecutor {
    options: ExecutorOptions,
}

#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub applied: bool,
    pub steps_executed: u32,
    pub duration_ms: u64,
    /// Set when a step's own statement committed but the ledger insert that
    /// should have recorded it failed — spec.md §9's open question. The
    /// executor does not attempt a compensating rollback (the DDL already
    /// happened); it surfaces the discrepancy for manual reconciliation.
    pub ledger_discrepancy: bool,
}

#[derive(Debug, Clone)]
pub struct RollbackResult {
    pub steps_rolled_back: u32,
    pub steps_skipped_without_rollback: Vec<u32>,
}

const LEDGER_TABLE: &str = "__migrations";

impl MigrationExecutor {
    pub fn new(options: ExecutorOptions) -> Self {
        Self { options }
    }

    /// Idempotently create the `__migrations` ledger table (spec §6.5).
    async fn ensure_ledger(&self, session: &mut dyn DatabaseSession, dialect: Dialect) -> Result<(), MigrationError> {
        let ddl = match dialect {
            Dialect::SqlServer => format!(
                "IF OBJECT_ID('{table}', 'U') IS NULL \
                 CREATE TABLE {table} ( \
                   id VARCHAR(64) PRIMARY KEY, \
                   name VARCHAR(255) NOT NULL, \
                   version VARCHAR(64) NOT NULL, \
                   checksum CHAR(64) NOT NULL, \
                   applied_at DATETIMEOFFSET NOT NULL, \
                   applied_by VARCHAR(255) NULL, \
                   duration_ms INT NOT NULL, \
                   status VARCHAR(32) NOT NULL \
                 );",
                table = LEDGER_TABLE
            ),
            Dialect::Postgres => format!(
                "CREATE TABLE IF NOT EXISTS {table} ( \
                   id VARCHAR(64) PRIMARY KEY, \
                   name VARCHAR(255) NOT NULL, \
                   version VARCHAR(64) NOT NULL, \
                   checksum CHAR(64) NOT NULL, \
                   applied_at TIMESTAMPTZ NOT NULL, \
                   applied_by VARCHAR(255) NULL, \
                   duration_ms INTEGER NOT NULL, \
                   status VARCHAR(32) NOT NULL \
                 );",
                table = LEDGER_TABLE
            ),
        };
        session
            .execute(&ddl, &[])
            .await
            .map_err(|e| MigrationError::LedgerError(e.to_string()))?;
        Ok(())
    }

    async fn ledger_status(&self, session: &mut dyn DatabaseSession, migration_id: &str) -> Result<Option<String>, MigrationError> {
        let cursor = session
            .execute(
                &format!("SELECT status FROM {} WHERE id = $1", LEDGER_TABLE),
                &[serde_json::Value::String(migration_id.to_string())],
            )
            .await
            .map_err(|e| MigrationError::LedgerError(e.to_string()))?;
        Ok(cursor
            .rows
            .first()
            .and_then(|row| row.get(0))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()))
    }

    /// Validate `migration` per spec §4.4: non-empty steps, checksum match,
    /// non-empty forward SQL per step, no denylisted patterns.
    pub fn validate(&self, migration: &Migration, stored_checksum: Option<&str>) -> Result<(), ValidationError> {
        let mut errors = Vec::new();

        if migration.steps.is_empty() {
            errors.push("migration has no steps".to_string());
        }
        if let Some(stored) = stored_checksum {
            if !migration.stored_checksum_matches(stored) {
                errors.push("checksum mismatch against stored migration".to_string());
            }
        }
        for step in &migration.steps {
            if step.forward_sql.trim().is_empty() {
                errors.push(format!("step {} has empty forward_sql", step.order));
            }
            let upper = step.forward_sql.to_uppercase();
            for pattern in DENYLIST {
                if upper.contains(pattern) {
                    errors.push(format!("step {} contains denylisted pattern '{}'", step.order, pattern));
                }
            }
            if upper.contains("TRUNCATE") && !self.options.allow_truncate {
                errors.push(format!("step {} uses TRUNCATE which is not allowed", step.order));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::Failed(errors))
        }
    }

    /// Apply `migration` per the contract in spec §4.4.
    pub async fn execute(
        &self,
        session: &mut dyn DatabaseSession,
        migration: &mut Migration,
        applied_by: Option<String>,
    ) -> Result<ExecutionResult, MigrationError> {
        self.ensure_ledger(session, migration.dialect).await?;

        if let Some(status) = self.ledger_status(session, migration.id.as_str()).await? {
            if status.eq_ignore_ascii_case("applied") {
                return Err(MigrationError::AlreadyApplied(migration.id.as_str().to_string()));
            }
        }

        self.validate(migration, None)?;

        let start = std::time::Instant::now();
        let mut steps_executed = 0u32;

        if self.options.dry_run {
            info!(migration_id = %migration.id, steps = migration.steps.len(), "dry-run: skipping statement execution");
            return Ok(ExecutionResult {
                applied: true,
                steps_executed: migration.steps.len() as u32,
                duration_ms: start.elapsed().as_millis() as u64,
                ledger_discrepancy: false,
            });
        }

        let mut ordered = migration.steps.clone();
        ordered.sort_by_key(|s| s.order);

        for step in &ordered {
            let statements = split_statements(&step.forward_sql, migration.dialect);
            let mut step_failed = None;
            for statement in &statements {
                if statement.trim().is_empty() {
                    continue;
                }
                if let Err(e) = session.execute(statement, &[]).await {
                    step_failed = Some(e);
                    break;
                }
            }

            if let Some(cause) = step_failed {
                if !self.options.transaction_per_step {
                    let _ = session.rollback().await;
                } else {
                    warn!(migration_id = %migration.id, order = step.order, "step failed; prior committed steps are not retroactively undone");
                }
                return Err(MigrationError::step_failed(step.order, anyhow::anyhow!(cause.to_string())));
            }

            if self.options.transaction_per_step {
                session
                    .commit()
                    .await
                    .map_err(|e| MigrationError::TransactionFailed(e.to_string()))?;
            }
            steps_executed += 1;
        }

        if !self.options.transaction_per_step {
            session
                .commit()
                .await
                .map_err(|e| MigrationError::TransactionFailed(e.to_string()))?;
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        let checksum = migration.compute_checksum();
        let insert = format!(
            "INSERT INTO {} (id, name, version, checksum, applied_at, applied_by, duration_ms, status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, 'applied')",
            LEDGER_TABLE
        );
        let ledger_discrepancy = session
            .execute(
                &insert,
                &[
                    serde_json::Value::String(migration.id.as_str().to_string()),
                    serde_json::Value::String(migration.name.clone()),
                    serde_json::Value::String(migration.version.clone()),
                    serde_json::Value::String(checksum),
                    serde_json::Value::String(chrono::Utc::now().to_rfc3339()),
                    applied_by
                        .clone()
                        .map(serde_json::Value::String)
                        .unwrap_or(serde_json::Value::Null),
                    serde_json::Value::from(duration_ms),
                ],
            )
            .await
            .is_err();

        migration.status = MigrationStatus::Applied;
        migration.applied_at = Some(chrono::Utc::now());
        migration.applied_by = applied_by;

        if ledger_discrepancy {
            warn!(migration_id = %migration.id, "all DDL steps committed but the ledger insert failed; database is ahead of the ledger");
        }

        Ok(ExecutionResult {
            applied: true,
            steps_executed,
            duration_ms,
            ledger_discrepancy,
        })
    }

    /// Roll back `migration`: steps in descending `order`, skipping (with a
    /// warning) any step lacking `rollback_sql` (spec §4.4).
    pub async fn rollback(&self, session: &mut dyn DatabaseSession, migration: &mut Migration) -> Result<RollbackResult, MigrationError> {
        let mut ordered = migration.steps.clone();
        ordered.sort_by_key(|s| std::cmp::Reverse(s.order));

        let mut steps_rolled_back = 0u32;
        let mut steps_skipped = Vec::new();

        for step in &ordered {
            let Some(rollback_sql) = &step.rollback_sql else {
                warn!(migration_id = %migration.id, order = step.order, "no rollback SQL for this step; skipping");
                steps_skipped.push(step.order);
                continue;
            };
            for statement in split_statements(rollback_sql, migration.dialect) {
                if statement.trim().is_empty() {
                    continue;
                }
                session
                    .execute(&statement, &[])
                    .await
                    .map_err(|e| MigrationError::step_failed(step.order, anyhow::anyhow!(e.to_string())))?;
            }
            steps_rolled_back += 1;
        }

        session
            .commit()
            .await
            .map_err(|e| MigrationError::TransactionFailed(e.to_string()))?;

        let update = format!("UPDATE {} SET status = 'rolled_back' WHERE id = $1", LEDGER_TABLE);
        session
            .execute(&update, &[serde_json::Value::String(migration.id.as_str().to_string())])
            .await
            .map_err(|e| MigrationError::LedgerError(e.to_string()))?;

        migration.status = MigrationStatus::RolledBack;

        Ok(RollbackResult {
            steps_rolled_back,
            steps_skipped_without_rollback: steps_skipped,
        })
    }
}

/// Split a step's SQL text into individually executable statements. T-SQL
/// splits on whole-word `GO` batch separators (case-insensitive, outside
/// string literals); other dialects split on `;` at statement boundaries,
/// tolerating `;` inside string literals (spec §4.4 step 4a).
fn split_statements(sql: &str, dialect: Dialect) -> Vec<String> {
    match dialect {
        Dialect::SqlServer => split_on_go(sql),
        Dialect::Postgres => split_on_semicolon(sql),
    }
}

fn split_on_go(sql: &str) -> Vec<String> {
    let go_re = Regex::new(r"(?im)^\s*GO\s*$").expect("static GO-batch regex is valid");
    go_re
        .split(sql)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn split_on_semicolon(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut in_single_quote = false;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_single_quote = !in_single_quote;
                current.push(c);
            }
            ';' if !in_single_quote => {
                statements.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        statements.push(current.trim().to_string());
    }
    statements.into_iter().filter(|s| !s.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn go_batches_split_on_whole_word_go_case_insensitive() {
        let sql = "CREATE TABLE t (id INT);\ngo\nINSERT INTO t VALUES (1);\nGO\n";
        let parts = split_on_go(sql);
        assert_eq!(parts.len(), 2);
        assert!(parts[0].contains("CREATE TABLE"));
        assert!(parts[1].contains("INSERT INTO"));
    }

    #[test]
    fn semicolon_split_tolerates_literal_semicolons() {
        let sql = "INSERT INTO t (note) VALUES ('a;b'); INSERT INTO t (note) VALUES ('c');";
        let parts = split_on_semicolon(sql);
        assert_eq!(parts.len(), 2);
        assert!(parts[0].contains("'a;b'"));
    }

    #[test]
    fn validate_rejects_denylisted_patterns() {
        let executor = MigrationExecutor::new(ExecutorOptions::default());
        let mut migration = sample_migration("DROP DATABASE appdb;");
        migration.steps[0].rollback_sql = None;
        let err = executor.validate(&migration, None).unwrap_err();
        match err {
            ValidationError::Failed(errors) => assert!(errors.iter().any(|e| e.contains("DROP DATABASE"))),
        }
    }

    #[test]
    fn validate_passes_clean_migration() {
        let executor = MigrationExecutor::new(ExecutorOptions::default());
        let migration = sample_migration("ALTER TABLE dbo.Users ADD LastLogin DATETIME2 NULL;");
        assert!(executor.validate(&migration, None).is_ok());
    }

    fn sample_migration(forward_sql: &str) -> Migration {
        use crate::ids::MigrationId;
        use crate::model::migration::MigrationStep;

        Migration {
            id: MigrationId::from("m-1"),
            name: "test".into(),
            version: "1".into(),
            description: "test migration".into(),
            dialect: Dialect::SqlServer,
            steps: vec![MigrationStep {
                order: 1,
                description: "step".into(),
                forward_sql: forward_sql.into(),
                rollback_sql: Some("SELECT 1;".into()),
                requires_lock: false,
                estimated_duration_ms: 10,
            }],
            dependencies: vec![],
            breaking_changes: vec![],
            status: MigrationStatus::Pending,
            applied_at: None,
            applied_by: None,
        }
    }
}
