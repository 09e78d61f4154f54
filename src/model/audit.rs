//! [`AuditEntry`] — the unit of record in [`crate::audit::AuditLog`].

use crate::ids::{AuditEntryId, TenantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSeverity {
    Info,
    Warning,
    Critical,
}

/// Immutable after construction via [`AuditEntry::new`] + [`AuditEntry::with_hash`].
/// Callers MUST NOT mutate a logged entry; the `AuditLog` owns it once
/// accepted into the buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: AuditEntryId,
    pub timestamp: DateTime<Utc>,
    pub tenant_id: TenantId,
    pub user_id: Option<String>,
    pub action: String,
    pub severity: AuditSeverity,
    pub resource_type: String,
    pub resource_id: String,
    pub success: bool,
    pub details: serde_json::Value,
    pub previous_hash: Option<String>,
    pub entry_hash: String,
}

/// The subset of fields the caller supplies; `AuditLog::log` fills in the
/// rest (id, timestamp, tenant, hash chain).
#[derive(Debug, Clone)]
pub struct AuditEntryDraft {
    pub user_id: Option<String>,
    pub action: String,
    pub severity: AuditSeverity,
    pub resource_type: String,
    pub resource_id: String,
    pub success: bool,
    pub details: serde_json::Value,
}

impl AuditEntry {
    /// Canonical bytes hashed to produce `entry_hash`: every field except
    /// `entry_hash` itself, serialized through `serde_json` with sorted map
    /// keys (the derived `Serialize` impl already emits struct fields in
    /// declaration order, which is stable), concatenated with the previous
    /// hash (or empty string for the first entry in a chain).
    pub fn compute_hash(
        id: &AuditEntryId,
        timestamp: &DateTime<Utc>,
        tenant_id: &TenantId,
        user_id: &Option<String>,
        action: &str,
        severity: AuditSeverity,
        resource_type: &str,
        resource_id: &str,
        success: bool,
        details: &serde_json::Value,
        previous_hash: &Option<String>,
    ) -> String {
        #[derive(Serialize)]
        struct Canonical<'a> {
            id: &'a str,
            timestamp: String,
            tenant_id: &'a str,
            user_id: &'a Option<String>,
            action: &'a str,
            severity: AuditSeverity,
            resource_type: &'a str,
            resource_id: &'a str,
            success: bool,
            details: &'a serde_json::Value,
        }
        let canonical = Canonical {
            id: id.as_str(),
            timestamp: timestamp.to_rfc3339(),
            tenant_id: tenant_id.as_str(),
            user_id,
            action,
            severity,
            resource_type,
            resource_id,
            success,
            details,
        };
        let body = serde_json::to_vec(&canonical).expect("canonical audit entry always serializes");
        let mut hasher = Sha256::new();
        hasher.update(&body);
        hasher.update(previous_hash.as_deref().unwrap_or("").as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn recompute_hash(&self) -> String {
        Self::compute_hash(
            &self.id,
            &self.timestamp,
            &self.tenant_id,
            &self.user_id,
            &self.action,
            self.severity,
            &self.resource_type,
            &self.resource_id,
            self.success,
            &self.details,
            &self.previous_hash,
        )
    }

    pub fn verify_self(&self) -> bool {
        self.recompute_hash() == self.entry_hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_changes_when_any_field_changes() {
        let id = AuditEntryId::from("a1");
        let tenant = TenantId::from("t1");
        let ts = Utc::now();
        let base = AuditEntry::compute_hash(
            &id,
            &ts,
            &tenant,
            &None,
            "schema.export",
            AuditSeverity::Info,
            "connection",
            "conn-1",
            true,
            &serde_json::json!({"rows": 10}),
            &None,
        );
        let tampered = AuditEntry::compute_hash(
            &id,
            &ts,
            &tenant,
            &None,
            "schema.export",
            AuditSeverity::Info,
            "connection",
            "conn-1",
            true,
            &serde_json::json!({"rows": 11}),
            &None,
        );
        assert_ne!(base, tampered);
    }
}
