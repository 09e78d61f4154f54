//! Built-in checks (spec §4.5), translated line-for-line in spirit from
//! `original_source/libs/sql-orchestrator/src/checks.py`. `PERF001`,
//! `PERF002`, `SEC001`, `SEC002`, and `COMP001` stay SQL-Server-shaped (they
//! query `sys.*` catalog views, same as the pyodbc originals); `COMP002`
//! branches on [`Dialect`] since Postgres has no `msdb`-style backup catalog.
//! `CONF001` is new, grounded in
//! `original_source/libs/sql-compliance/src/scanner.py`'s
//! `AccessControlScanner` (its "public role has explicit permissions"
//! finding, generalized from a compliance finding into a configuration
//! check).

use super::Check;
use crate::external::{DatabaseSession, Row};
use crate::model::check::{CheckCategory, CheckDefinition, CheckResult, CheckStatus};
use crate::model::migration::Dialect;
use crate::model::diff::Severity;
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

fn frameworks(names: &[&str]) -> HashSet<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn tags(names: &[&str]) -> HashSet<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn str_at(row: &Row, i: usize) -> Option<String> {
    row.get(i).and_then(|v| v.as_str()).map(str::to_string)
}

fn bool_at(row: &Row, i: usize) -> Option<bool> {
    row.get(i).and_then(|v| v.as_bool())
}

fn i64_at(row: &Row, i: usize) -> Option<i64> {
    row.get(i).and_then(|v| v.as_i64())
}

fn f64_at(row: &Row, i: usize) -> Option<f64> {
    row.get(i).and_then(|v| v.as_f64())
}

/// A `CheckResult` skeleton carrying this check's own id/category/severity,
/// meant to be spread into a specific outcome with `..base(definition)` so
/// every branch (including the error path) reports the check's real
/// category and severity rather than a generic fallback.
fn base(definition: &CheckDefinition) -> CheckResult {
    CheckResult {
        check_id: definition.id.clone(),
        check_name: definition.name.clone(),
        category: definition.category,
        severity: definition.default_severity,
        status: CheckStatus::Error,
        message: String::new(),
        details: serde_json::Value::Null,
        remediation: None,
        affected_objects: Vec::new(),
        duration_ms: 0,
    }
}

/// Returns every built-in check, ready to hand to [`super::CheckRegistry::register`].
pub fn all() -> Vec<Arc<dyn Check>> {
    vec![
        Arc::new(MissingIndexCheck::new()),
        Arc::new(FragmentedIndexCheck::new()),
        Arc::new(TdeEncryptionCheck::new()),
        Arc::new(WeakPasswordPolicyCheck::new()),
        Arc::new(AuditConfigurationCheck::new()),
        Arc::new(BackupRecencyCheck::new(Dialect::Postgres)),
        Arc::new(PublicRolePermissionsCheck::new()),
    ]
}

/// `PERF001` — foreign key columns with no supporting index.
pub struct MissingIndexCheck {
    definition: CheckDefinition,
}

impl MissingIndexCheck {
    pub fn new() -> Self {
        Self {
            definition: CheckDefinition {
                id: "PERF001".into(),
                name: "Missing Foreign Key Indexes".into(),
                description: "Detects foreign key columns without indexes".into(),
                category: CheckCategory::Performance,
                default_severity: Severity::Medium,
                frameworks: frameworks(&["SOC2"]),
                tags: tags(&["performance", "indexes"]),
                parameters: Default::default(),
                enabled: true,
            },
        }
    }
}

#[async_trait]
impl Check for MissingIndexCheck {
    fn definition(&self) -> &CheckDefinition {
        &self.definition
    }

    async fn execute(&self, session: &mut dyn DatabaseSession) -> CheckResult {
        let start = Instant::now();
        let query = r#"
            SELECT
                OBJECT_SCHEMA_NAME(fk.parent_object_id) AS schema_name,
                OBJECT_NAME(fk.parent_object_id) AS table_name,
                COL_NAME(fkc.parent_object_id, fkc.parent_column_id) AS column_name,
                fk.name AS fk_name
            FROM sys.foreign_keys fk
            INNER JOIN sys.foreign_key_columns fkc
                ON fk.object_id = fkc.constraint_object_id
            WHERE NOT EXISTS (
                SELECT 1 FROM sys.index_columns ic
                WHERE ic.object_id = fkc.parent_object_id
                AND ic.column_id = fkc.parent_column_id
            )
            ORDER BY schema_name, table_name
        "#;

        let cursor = match session.execute(query, &[]).await {
            Ok(c) => c,
            Err(e) => return CheckResult { message: format!("failed to check missing indexes: {e}"), ..base(&self.definition) },
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        if cursor.rows.is_empty() {
            return CheckResult {
                status: CheckStatus::Passed,
                message: "All foreign key columns have indexes".into(),
                duration_ms,
                ..base(&self.definition)
            };
        }

        let affected: Vec<String> = cursor
            .rows
            .iter()
            .map(|r| format!("{}.{}.{}", str_at(r, 0).unwrap_or_default(), str_at(r, 1).unwrap_or_default(), str_at(r, 2).unwrap_or_default()))
            .collect();
        let details = json!({
            "missing_indexes": cursor.rows.iter().map(|r| json!({
                "schema": str_at(r, 0),
                "table": str_at(r, 1),
                "column": str_at(r, 2),
                "fk": str_at(r, 3),
            })).collect::<Vec<_>>(),
        });

        CheckResult {
            status: CheckStatus::Warning,
            message: format!("Found {} foreign key columns without indexes", cursor.rows.len()),
            details,
            remediation: Some("Create indexes on foreign key columns to improve join performance".into()),
            affected_objects: affected,
            duration_ms,
            ..base(&self.definition)
        }
    }
}

/// `PERF002` — indexes fragmented past a configurable threshold.
pub struct FragmentedIndexCheck {
    definition: CheckDefinition,
    fragmentation_threshold: f64,
}

impl FragmentedIndexCheck {
    pub fn new() -> Self {
        Self {
            definition: CheckDefinition {
                id: "PERF002".into(),
                name: "Fragmented Indexes".into(),
                description: "Detects indexes with high fragmentation".into(),
                category: CheckCategory::Performance,
                default_severity: Severity::Medium,
                frameworks: frameworks(&["SOC2"]),
                tags: tags(&["performance", "indexes", "maintenance"]),
                parameters: [("fragmentation_threshold".to_string(), json!(30))].into_iter().collect(),
                enabled: true,
            },
            fragmentation_threshold: 30.0,
        }
    }
}

#[async_trait]
impl Check for FragmentedIndexCheck {
    fn definition(&self) -> &CheckDefinition {
        &self.definition
    }

    async fn execute(&self, session: &mut dyn DatabaseSession) -> CheckResult {
        let start = Instant::now();
        let threshold = self
            .definition
            .parameters
            .get("fragmentation_threshold")
            .and_then(|v| v.as_f64())
            .unwrap_or(self.fragmentation_threshold);

        let query = format!(
            r#"
            SELECT
                OBJECT_SCHEMA_NAME(ips.object_id) AS schema_name,
                OBJECT_NAME(ips.object_id) AS table_name,
                i.name AS index_name,
                ips.avg_fragmentation_in_percent,
                ips.page_count
            FROM sys.dm_db_index_physical_stats(DB_ID(), NULL, NULL, NULL, 'LIMITED') ips
            INNER JOIN sys.indexes i ON ips.object_id = i.object_id AND ips.index_id = i.index_id
            WHERE ips.avg_fragmentation_in_percent > {threshold}
            AND ips.page_count > 1000
            AND i.name IS NOT NULL
            ORDER BY ips.avg_fragmentation_in_percent DESC
            "#
        );

        let cursor = match session.execute(&query, &[]).await {
            Ok(c) => c,
            Err(e) => return CheckResult { message: format!("failed to check index fragmentation: {e}"), ..base(&self.definition) },
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        if cursor.rows.is_empty() {
            return CheckResult {
                status: CheckStatus::Passed,
                message: format!("No indexes with fragmentation above {threshold}%"),
                duration_ms,
                ..base(&self.definition)
            };
        }

        let critical: Vec<&Row> = cursor.rows.iter().filter(|r| f64_at(r, 3).unwrap_or(0.0) > 80.0).collect();
        let affected: Vec<String> = cursor
            .rows
            .iter()
            .map(|r| format!("{}.{}.{}", str_at(r, 0).unwrap_or_default(), str_at(r, 1).unwrap_or_default(), str_at(r, 2).unwrap_or_default()))
            .collect();
        let details = json!({
            "fragmented_indexes": cursor.rows.iter().map(|r| json!({
                "schema": str_at(r, 0),
                "table": str_at(r, 1),
                "index": str_at(r, 2),
                "fragmentation": f64_at(r, 3),
                "pages": i64_at(r, 4),
            })).collect::<Vec<_>>(),
        });

        CheckResult {
            status: if critical.is_empty() { CheckStatus::Warning } else { CheckStatus::Failed },
            message: format!("Found {} fragmented indexes ({} critical)", cursor.rows.len(), critical.len()),
            details,
            remediation: Some("Rebuild or reorganize fragmented indexes during maintenance window".into()),
            affected_objects: affected,
            duration_ms,
            ..base(&self.definition)
        }
    }
}

/// `SEC001` — Transparent Data Encryption enabled and active.
pub struct TdeEncryptionCheck {
    definition: CheckDefinition,
}

impl TdeEncryptionCheck {
    pub fn new() -> Self {
        Self {
            definition: CheckDefinition {
                id: "SEC001".into(),
                name: "TDE Encryption".into(),
                description: "Checks if Transparent Data Encryption is enabled".into(),
                category: CheckCategory::Security,
                default_severity: Severity::Critical,
                frameworks: frameworks(&["SOC2", "HIPAA", "PCI-DSS", "GDPR"]),
                tags: tags(&["security", "encryption", "compliance"]),
                parameters: Default::default(),
                enabled: true,
            },
        }
    }
}

#[async_trait]
impl Check for TdeEncryptionCheck {
    fn definition(&self) -> &CheckDefinition {
        &self.definition
    }

    async fn execute(&self, session: &mut dyn DatabaseSession) -> CheckResult {
        let start = Instant::now();
        let query = r#"
            SELECT
                db.name AS database_name,
                db.is_encrypted,
                ek.encryption_state,
                ek.key_algorithm,
                ek.key_length
            FROM sys.databases db
            LEFT JOIN sys.dm_database_encryption_keys ek
                ON db.database_id = ek.database_id
            WHERE db.database_id = DB_ID()
        "#;

        let cursor = match session.execute(query, &[]).await {
            Ok(c) => c,
            Err(e) => return CheckResult { message: format!("failed to check TDE status: {e}"), ..base(&self.definition) },
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        let Some(row) = cursor.rows.first() else {
            return CheckResult {
                status: CheckStatus::Error,
                message: "Could not determine encryption status".into(),
                duration_ms,
                ..base(&self.definition)
            };
        };

        let is_encrypted = bool_at(row, 1).unwrap_or(false);
        let encryption_state = i64_at(row, 2);

        if is_encrypted && encryption_state == Some(3) {
            return CheckResult {
                status: CheckStatus::Passed,
                message: "Database has TDE encryption enabled and active".into(),
                details: json!({
                    "algorithm": str_at(row, 3),
                    "key_length": i64_at(row, 4),
                    "state": "encrypted",
                }),
                duration_ms,
                ..base(&self.definition)
            };
        }

        CheckResult {
            status: CheckStatus::Failed,
            message: "Database does not have TDE encryption enabled".into(),
            remediation: Some("Enable TDE using ALTER DATABASE SET ENCRYPTION ON".into()),
            details: json!({"is_encrypted": is_encrypted, "state": encryption_state}),
            duration_ms,
            ..base(&self.definition)
        }
    }
}

/// `SEC002` — SQL logins missing password/expiration policy enforcement.
pub struct WeakPasswordPolicyCheck {
    definition: CheckDefinition,
}

impl WeakPasswordPolicyCheck {
    pub fn new() -> Self {
        Self {
            definition: CheckDefinition {
                id: "SEC002".into(),
                name: "Password Policy Enforcement".into(),
                description: "Checks for SQL logins without password policy".into(),
                category: CheckCategory::Security,
                default_severity: Severity::High,
                frameworks: frameworks(&["SOC2", "HIPAA", "PCI-DSS"]),
                tags: tags(&["security", "authentication", "compliance"]),
                parameters: Default::default(),
                enabled: true,
            },
        }
    }
}

#[async_trait]
impl Check for WeakPasswordPolicyCheck {
    fn definition(&self) -> &CheckDefinition {
        &self.definition
    }

    async fn execute(&self, session: &mut dyn DatabaseSession) -> CheckResult {
        let start = Instant::now();
        let query = r#"
            SELECT
                name,
                is_policy_checked,
                is_expiration_checked,
                create_date,
                modify_date
            FROM sys.sql_logins
            WHERE is_disabled = 0
            AND (is_policy_checked = 0 OR is_expiration_checked = 0)
            AND name NOT LIKE '##%'
            ORDER BY name
        "#;

        let cursor = match session.execute(query, &[]).await {
            Ok(c) => c,
            Err(e) => return CheckResult { message: format!("failed to check password policies: {e}"), ..base(&self.definition) },
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        if cursor.rows.is_empty() {
            return CheckResult {
                status: CheckStatus::Passed,
                message: "All SQL logins have password policy enforced".into(),
                duration_ms,
                ..base(&self.definition)
            };
        }

        let affected: Vec<String> = cursor.rows.iter().filter_map(|r| str_at(r, 0)).collect();
        let details = json!({
            "weak_logins": cursor.rows.iter().map(|r| json!({
                "name": str_at(r, 0),
                "policy_checked": bool_at(r, 1),
                "expiration_checked": bool_at(r, 2),
            })).collect::<Vec<_>>(),
        });

        CheckResult {
            status: CheckStatus::Failed,
            message: format!("Found {} SQL logins without proper password policy", cursor.rows.len()),
            details,
            remediation: Some("ALTER LOGIN [login_name] WITH CHECK_POLICY = ON, CHECK_EXPIRATION = ON".into()),
            affected_objects: affected,
            duration_ms,
            ..base(&self.definition)
        }
    }
}

/// `COMP001` — an active, enabled SQL Server Audit.
pub struct AuditConfigurationCheck {
    definition: CheckDefinition,
}

impl AuditConfigurationCheck {
    pub fn new() -> Self {
        Self {
            definition: CheckDefinition {
                id: "COMP001".into(),
                name: "Audit Configuration".into(),
                description: "Checks if SQL Server Audit is configured".into(),
                category: CheckCategory::Compliance,
                default_severity: Severity::High,
                frameworks: frameworks(&["SOC2", "HIPAA", "PCI-DSS", "GDPR"]),
                tags: tags(&["compliance", "audit", "security"]),
                parameters: Default::default(),
                enabled: true,
            },
        }
    }
}

#[async_trait]
impl Check for AuditConfigurationCheck {
    fn definition(&self) -> &CheckDefinition {
        &self.definition
    }

    async fn execute(&self, session: &mut dyn DatabaseSession) -> CheckResult {
        let start = Instant::now();
        let query = r#"
            SELECT
                a.name AS audit_name,
                a.status_desc,
                a.type_desc AS destination,
                s.name AS spec_name,
                s.is_state_enabled
            FROM sys.server_audits a
            LEFT JOIN sys.server_audit_specifications s
                ON a.audit_guid = s.audit_guid
            WHERE a.is_state_enabled = 1
        "#;

        let cursor = match session.execute(query, &[]).await {
            Ok(c) => c,
            Err(e) => return CheckResult { message: format!("failed to check audit configuration: {e}"), ..base(&self.definition) },
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        if cursor.rows.is_empty() {
            return CheckResult {
                status: CheckStatus::Failed,
                message: "No active SQL Server Audit found".into(),
                remediation: Some("Create and enable a SQL Server Audit for compliance tracking".into()),
                duration_ms,
                ..base(&self.definition)
            };
        }

        CheckResult {
            status: CheckStatus::Passed,
            message: format!("Found {} active audit configuration(s)", cursor.rows.len()),
            details: json!({
                "audits": cursor.rows.iter().map(|r| json!({
                    "audit": str_at(r, 0),
                    "status": str_at(r, 1),
                    "destination": str_at(r, 2),
                    "spec": str_at(r, 3),
                    "enabled": bool_at(r, 4),
                })).collect::<Vec<_>>(),
            }),
            duration_ms,
            ..base(&self.definition)
        }
    }
}

/// `COMP002` — recent backups, written dialect-generically: SQL Server's
/// `msdb` backup history table has no equivalent in Postgres, which instead
/// surfaces WAL archiving health through `pg_stat_archiver` — used here as
/// the closest available recency proxy.
pub struct BackupRecencyCheck {
    definition: CheckDefinition,
    dialect: Dialect,
    max_backup_age_hours: i64,
}

impl BackupRecencyCheck {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            definition: CheckDefinition {
                id: "COMP002".into(),
                name: "Backup Recency".into(),
                description: "Checks if databases have recent backups".into(),
                category: CheckCategory::Compliance,
                default_severity: Severity::Critical,
                frameworks: frameworks(&["SOC2", "HIPAA"]),
                tags: tags(&["compliance", "backup", "disaster-recovery"]),
                parameters: [("max_backup_age_hours".to_string(), json!(24))].into_iter().collect(),
                enabled: true,
            },
            dialect,
            max_backup_age_hours: 24,
        }
    }

    async fn execute_sql_server(&self, session: &mut dyn DatabaseSession, max_hours: i64, duration_ms: u64) -> CheckResult {
        let query = format!(
            r#"
            SELECT
                d.name AS database_name,
                d.recovery_model_desc,
                MAX(b.backup_finish_date) AS last_backup,
                DATEDIFF(HOUR, MAX(b.backup_finish_date), GETDATE()) AS hours_since_backup
            FROM sys.databases d
            LEFT JOIN msdb.dbo.backupset b ON d.name = b.database_name
            WHERE d.database_id > 4
            AND d.state_desc = 'ONLINE'
            GROUP BY d.name, d.recovery_model_desc
            HAVING MAX(b.backup_finish_date) IS NULL
                OR DATEDIFF(HOUR, MAX(b.backup_finish_date), GETDATE()) > {max_hours}
            ORDER BY hours_since_backup DESC
            "#
        );

        let cursor = match session.execute(&query, &[]).await {
            Ok(c) => c,
            Err(e) => return CheckResult { message: format!("failed to check backup recency: {e}"), ..base(&self.definition) },
        };

        if cursor.rows.is_empty() {
            return CheckResult {
                status: CheckStatus::Passed,
                message: format!("All databases backed up within {max_hours} hours"),
                duration_ms,
                ..base(&self.definition)
            };
        }

        let no_backup: Vec<&Row> = cursor.rows.iter().filter(|r| i64_at(r, 3).is_none()).collect();
        let old_backup: Vec<&Row> = cursor.rows.iter().filter(|r| i64_at(r, 3).is_some()).collect();
        let affected: Vec<String> = cursor.rows.iter().filter_map(|r| str_at(r, 0)).collect();

        CheckResult {
            status: if no_backup.is_empty() { CheckStatus::Failed } else { CheckStatus::Critical },
            message: format!("Found {} databases with backup issues ({} never backed up)", cursor.rows.len(), no_backup.len()),
            details: json!({
                "no_backup": no_backup.iter().map(|r| json!({"database": str_at(r, 0), "recovery_model": str_at(r, 1)})).collect::<Vec<_>>(),
                "old_backup": old_backup.iter().map(|r| json!({"database": str_at(r, 0), "hours_ago": i64_at(r, 3)})).collect::<Vec<_>>(),
            }),
            remediation: Some(format!("Ensure all databases are backed up at least every {max_hours} hours")),
            affected_objects: affected,
            duration_ms,
            ..base(&self.definition)
        }
    }

    async fn execute_postgres(&self, session: &mut dyn DatabaseSession, max_hours: i64, duration_ms: u64) -> CheckResult {
        let query = r#"
            SELECT
                archived_count,
                last_archived_time,
                EXTRACT(EPOCH FROM (now() - last_archived_time)) / 3600 AS hours_since_archive
            FROM pg_stat_archiver
        "#;

        let cursor = match session.execute(query, &[]).await {
            Ok(c) => c,
            Err(e) => return CheckResult { message: format!("failed to check backup recency: {e}"), ..base(&self.definition) },
        };

        let Some(row) = cursor.rows.first() else {
            return CheckResult {
                status: CheckStatus::Error,
                message: "Could not read pg_stat_archiver".into(),
                duration_ms,
                ..base(&self.definition)
            };
        };

        let hours_since = f64_at(row, 2);
        match hours_since {
            None => CheckResult {
                status: CheckStatus::Critical,
                message: "No WAL archive has ever completed for this server".into(),
                remediation: Some("Configure and verify WAL archiving / a base backup schedule".into()),
                duration_ms,
                ..base(&self.definition)
            },
            Some(hours) if hours > max_hours as f64 => CheckResult {
                status: CheckStatus::Failed,
                message: format!("Last WAL archive was {hours:.1}h ago, exceeding the {max_hours}h window"),
                details: json!({"hours_since_archive": hours}),
                remediation: Some(format!("Ensure WAL archiving / base backups run at least every {max_hours} hours")),
                duration_ms,
                ..base(&self.definition)
            },
            Some(hours) => CheckResult {
                status: CheckStatus::Passed,
                message: format!("WAL archiving is current ({hours:.1}h since last archive)"),
                details: json!({"hours_since_archive": hours}),
                duration_ms,
                ..base(&self.definition)
            },
        }
    }
}

#[async_trait]
impl Check for BackupRecencyCheck {
    fn definition(&self) -> &CheckDefinition {
        &self.definition
    }

    async fn execute(&self, session: &mut dyn DatabaseSession) -> CheckResult {
        let start = Instant::now();
        let max_hours = self
            .definition
            .parameters
            .get("max_backup_age_hours")
            .and_then(|v| v.as_i64())
            .unwrap_or(self.max_backup_age_hours);

        let result = match self.dialect {
            Dialect::SqlServer => self.execute_sql_server(session, max_hours, 0).await,
            Dialect::Postgres => self.execute_postgres(session, max_hours, 0).await,
        };
        CheckResult {
            duration_ms: start.elapsed().as_millis() as u64,
            ..result
        }
    }
}

/// `CONF001` — the `public`/`PUBLIC` role holding explicit grants, a
/// configuration-category finding generalized from
/// `sql-compliance/src/scanner.py`'s `AccessControlScanner` (its
/// `ACCESS_PUBLIC` result).
pub struct PublicRolePermissionsCheck {
    definition: CheckDefinition,
}

impl PublicRolePermissionsCheck {
    pub fn new() -> Self {
        Self {
            definition: CheckDefinition {
                id: "CONF001".into(),
                name: "Public Role Permissions".into(),
                description: "Detects explicit grants held by the public/PUBLIC role".into(),
                category: CheckCategory::Configuration,
                default_severity: Severity::Medium,
                frameworks: frameworks(&["SOC2"]),
                tags: tags(&["configuration", "access-control"]),
                parameters: Default::default(),
                enabled: true,
            },
        }
    }
}

#[async_trait]
impl Check for PublicRolePermissionsCheck {
    fn definition(&self) -> &CheckDefinition {
        &self.definition
    }

    async fn execute(&self, session: &mut dyn DatabaseSession) -> CheckResult {
        let start = Instant::now();
        let query = r#"
            SELECT grantee, table_schema, table_name, privilege_type
            FROM information_schema.role_table_grants
            WHERE grantee IN ('PUBLIC', 'public')
            ORDER BY table_schema, table_name, privilege_type
        "#;

        let cursor = match session.execute(query, &[]).await {
            Ok(c) => c,
            Err(e) => return CheckResult { message: format!("failed to check public role permissions: {e}"), ..base(&self.definition) },
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        if cursor.rows.is_empty() {
            return CheckResult {
                status: CheckStatus::Passed,
                message: "Public role has no explicit grants".into(),
                duration_ms,
                ..base(&self.definition)
            };
        }

        let affected: Vec<String> = cursor
            .rows
            .iter()
            .map(|r| format!("{}.{}", str_at(r, 1).unwrap_or_default(), str_at(r, 2).unwrap_or_default()))
            .collect();
        let details = json!({
            "permissions": cursor.rows.iter().map(|r| json!({
                "schema": str_at(r, 1),
                "table": str_at(r, 2),
                "privilege": str_at(r, 3),
            })).collect::<Vec<_>>(),
        });

        CheckResult {
            status: CheckStatus::Warning,
            message: format!("Public role has {} explicit permission(s)", cursor.rows.len()),
            details,
            remediation: Some("Revoke default grants to the public role and use explicit role membership".into()),
            affected_objects: affected,
            duration_ms,
            ..base(&self.definition)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::external::Cursor;
    use async_trait::async_trait;
    use serde_json::Value as SqlValue;
    use std::collections::VecDeque;

    /// Replays a fixed sequence of query results, one per `execute()` call,
    /// so each check's status-mapping logic can be tested without a live
    /// session.
    struct ScriptedSession {
        responses: VecDeque<Result<Cursor, String>>,
    }

    impl ScriptedSession {
        fn new(responses: Vec<Result<Cursor, String>>) -> Self {
            Self { responses: responses.into() }
        }
    }

    #[async_trait]
    impl DatabaseSession for ScriptedSession {
        async fn execute(&mut self, _sql: &str, _params: &[SqlValue]) -> Result<Cursor, TransportError> {
            match self.responses.pop_front() {
                Some(Ok(cursor)) => Ok(cursor),
                Some(Err(msg)) => Err(TransportError::SessionClosed(msg)),
                None => Ok(Cursor::default()),
            }
        }
        async fn commit(&mut self) -> Result<(), TransportError> {
            Ok(())
        }
        async fn rollback(&mut self) -> Result<(), TransportError> {
            Ok(())
        }
        async fn close(&mut self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn row(values: Vec<SqlValue>) -> Row {
        Row { values }
    }

    #[tokio::test]
    async fn missing_index_check_passes_when_no_rows() {
        let mut session = ScriptedSession::new(vec![Ok(Cursor::default())]);
        let check = MissingIndexCheck::new();
        let result = check.execute(&mut session).await;
        assert_eq!(result.status, CheckStatus::Passed);
    }

    #[tokio::test]
    async fn missing_index_check_warns_with_affected_objects() {
        let cursor = Cursor {
            rows: vec![row(vec![json!("dbo"), json!("orders"), json!("customer_id"), json!("FK_orders_customer")])],
        };
        let mut session = ScriptedSession::new(vec![Ok(cursor)]);
        let check = MissingIndexCheck::new();
        let result = check.execute(&mut session).await;
        assert_eq!(result.status, CheckStatus::Warning);
        assert_eq!(result.affected_objects, vec!["dbo.orders.customer_id"]);
    }

    #[tokio::test]
    async fn fragmented_index_check_escalates_to_failed_above_eighty_percent() {
        let cursor = Cursor {
            rows: vec![row(vec![json!("dbo"), json!("orders"), json!("IX_orders"), json!(85.5), json!(2000)])],
        };
        let mut session = ScriptedSession::new(vec![Ok(cursor)]);
        let check = FragmentedIndexCheck::new();
        let result = check.execute(&mut session).await;
        assert_eq!(result.status, CheckStatus::Failed);
    }

    #[tokio::test]
    async fn tde_check_fails_closed_when_not_encrypted() {
        let cursor = Cursor {
            rows: vec![row(vec![json!("appdb"), json!(false), json!(0), SqlValue::Null, SqlValue::Null])],
        };
        let mut session = ScriptedSession::new(vec![Ok(cursor)]);
        let check = TdeEncryptionCheck::new();
        let result = check.execute(&mut session).await;
        assert_eq!(result.status, CheckStatus::Failed);
    }

    #[tokio::test]
    async fn tde_check_passes_when_encrypted_and_active() {
        let cursor = Cursor {
            rows: vec![row(vec![json!("appdb"), json!(true), json!(3), json!("AES_256"), json!(256)])],
        };
        let mut session = ScriptedSession::new(vec![Ok(cursor)]);
        let check = TdeEncryptionCheck::new();
        let result = check.execute(&mut session).await;
        assert_eq!(result.status, CheckStatus::Passed);
    }

    #[tokio::test]
    async fn backup_recency_postgres_flags_missing_archive() {
        let cursor = Cursor {
            rows: vec![row(vec![json!(0), SqlValue::Null, SqlValue::Null])],
        };
        let mut session = ScriptedSession::new(vec![Ok(cursor)]);
        let check = BackupRecencyCheck::new(Dialect::Postgres);
        let result = check.execute(&mut session).await;
        assert_eq!(result.status, CheckStatus::Critical);
    }

    #[tokio::test]
    async fn backup_recency_postgres_passes_within_window() {
        let cursor = Cursor {
            rows: vec![row(vec![json!(10), json!("2024-01-01T00:00:00Z"), json!(2.0)])],
        };
        let mut session = ScriptedSession::new(vec![Ok(cursor)]);
        let check = BackupRecencyCheck::new(Dialect::Postgres);
        let result = check.execute(&mut session).await;
        assert_eq!(result.status, CheckStatus::Passed);
    }

    #[tokio::test]
    async fn check_never_propagates_transport_error() {
        let mut session = ScriptedSession::new(vec![Err("connection reset".into())]);
        let check = PublicRolePermissionsCheck::new();
        let result = check.execute(&mut session).await;
        assert_eq!(result.status, CheckStatus::Error);
        assert!(result.message.contains("connection reset"));
    }
}
