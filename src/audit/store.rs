//! [`AuditStore`] — the persistence boundary consumed by [`crate::audit::AuditLog`]
//! (spec §6.3), plus an in-memory reference implementation used by this
//! crate's own tests and suitable as a starting point for embedders that
//! haven't wired a real store yet.

use crate::error::AuditError;
use crate::ids::{AuditEntryId, TenantId};
use crate::model::audit::AuditEntry;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

/// Query parameters for [`AuditStore::query`] / [`crate::audit::AuditLog::query`].
/// `tenant_id` is required; everything else narrows the result set. Paged
/// via `limit`/`offset` with stable ordering on `timestamp` (default
/// descending, per spec §4.7).
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub tenant_id: TenantId,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub user_id: Option<String>,
    pub actions: Option<Vec<String>>,
    pub resource_type: Option<String>,
    pub success: Option<bool>,
    pub limit: usize,
    pub offset: usize,
    pub ascending: bool,
}

impl AuditFilter {
    pub fn for_tenant(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            limit: 100,
            ..Default::default()
        }
    }

    fn matches(&self, entry: &AuditEntry) -> bool {
        if entry.tenant_id != self.tenant_id {
            return false;
        }
        if let Some(start) = self.start {
            if entry.timestamp < start {
                return false;
            }
        }
        if let Some(end) = self.end {
            if entry.timestamp > end {
                return false;
            }
        }
        if let Some(user_id) = &self.user_id {
            if entry.user_id.as_deref() != Some(user_id.as_str()) {
                return false;
            }
        }
        if let Some(actions) = &self.actions {
            if !actions.contains(&entry.action) {
                return false;
            }
        }
        if let Some(resource_type) = &self.resource_type {
            if &entry.resource_type != resource_type {
                return false;
            }
        }
        if let Some(success) = self.success {
            if entry.success != success {
                return false;
            }
        }
        true
    }
}

/// Persistence boundary for audit entries (spec §6.3). The core never
/// decides how this is backed — relational table, object store, whatever the
/// embedder already operates.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn write(&self, entry: AuditEntry) -> Result<(), AuditError>;
    async fn write_batch(&self, entries: Vec<AuditEntry>) -> Result<(), AuditError>;
    async fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>, AuditError>;
    async fn get_by_id(&self, id: &AuditEntryId) -> Result<Option<AuditEntry>, AuditError>;
    async fn get_last_hash(&self, tenant_id: &TenantId) -> Result<Option<String>, AuditError>;
    /// Verify the hash chain over `[start_id, end_id]` (default: the whole
    /// tenant range). Returns `Ok(None)` when the chain is intact, or
    /// `Ok(Some(id))` naming the first entry (in ascending timestamp order)
    /// that fails self-verification or doesn't link to its predecessor
    /// (spec §4.7 step 4, scenario S5).
    async fn verify_chain(
        &self,
        tenant_id: &TenantId,
        start_id: Option<&AuditEntryId>,
        end_id: Option<&AuditEntryId>,
    ) -> Result<Option<AuditEntryId>, AuditError>;
}

/// Reference `AuditStore` backed by an in-process `Vec`, guarded by a single
/// mutex (spec never prescribes persistence; this is the crate's own test
/// double and a usable default for single-process embedders).
#[derive(Default)]
pub struct InMemoryAuditStore {
    entries: Mutex<Vec<AuditEntry>>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn write(&self, entry: AuditEntry) -> Result<(), AuditError> {
        self.entries.lock().await.push(entry);
        Ok(())
    }

    async fn write_batch(&self, entries: Vec<AuditEntry>) -> Result<(), AuditError> {
        self.entries.lock().await.extend(entries);
        Ok(())
    }

    async fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>, AuditError> {
        let guard = self.entries.lock().await;
        let mut matched: Vec<AuditEntry> = guard.iter().filter(|e| filter.matches(e)).cloned().collect();
        if filter.ascending {
            matched.sort_by_key(|e| e.timestamp);
        } else {
            matched.sort_by_key(|e| std::cmp::Reverse(e.timestamp));
        }
        let limit = if filter.limit == 0 { matched.len() } else { filter.limit };
        Ok(matched.into_iter().skip(filter.offset).take(limit).collect())
    }

    async fn get_by_id(&self, id: &AuditEntryId) -> Result<Option<AuditEntry>, AuditError> {
        Ok(self.entries.lock().await.iter().find(|e| &e.id == id).cloned())
    }

    async fn get_last_hash(&self, tenant_id: &TenantId) -> Result<Option<String>, AuditError> {
        let guard = self.entries.lock().await;
        Ok(guard
            .iter()
            .filter(|e| &e.tenant_id == tenant_id)
            .max_by_key(|e| e.timestamp)
            .map(|e| e.entry_hash.clone()))
    }

    async fn verify_chain(
        &self,
        tenant_id: &TenantId,
        start_id: Option<&AuditEntryId>,
        end_id: Option<&AuditEntryId>,
    ) -> Result<Option<AuditEntryId>, AuditError> {
        let guard = self.entries.lock().await;
        let mut entries: Vec<&AuditEntry> = guard.iter().filter(|e| &e.tenant_id == tenant_id).collect();
        entries.sort_by_key(|e| e.timestamp);

        if entries.is_empty() {
            return Ok(None);
        }

        let start_index = start_id.and_then(|id| entries.iter().position(|e| &e.id == id)).unwrap_or(0);
        let end_index = end_id
            .and_then(|id| entries.iter().position(|e| &e.id == id))
            .unwrap_or(entries.len().saturating_sub(1));

        let mut previous: Option<&AuditEntry> = if start_index > 0 { Some(entries[start_index - 1]) } else { None };
        for entry in &entries[start_index..=end_index.min(entries.len() - 1)] {
            if !entry.verify_self() {
                return Ok(Some(entry.id.clone()));
            }
            if let Some(prev) = previous {
                if entry.previous_hash.as_deref() != Some(prev.entry_hash.as_str()) {
                    return Ok(Some(entry.id.clone()));
                }
            }
            previous = Some(entry);
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::audit::AuditSeverity;

    fn entry(tenant: &TenantId, previous_hash: Option<String>, action: &str) -> AuditEntry {
        let id = AuditEntryId::new();
        let timestamp = Utc::now();
        let details = serde_json::json!({});
        let entry_hash = AuditEntry::compute_hash(
            &id,
            &timestamp,
            tenant,
            &None,
            action,
            AuditSeverity::Info,
            "connection",
            "conn-1",
            true,
            &details,
            &previous_hash,
        );
        AuditEntry {
            id,
            timestamp,
            tenant_id: tenant.clone(),
            user_id: None,
            action: action.into(),
            severity: AuditSeverity::Info,
            resource_type: "connection".into(),
            resource_id: "conn-1".into(),
            success: true,
            details,
            previous_hash,
            entry_hash,
        }
    }

    #[tokio::test]
    async fn verify_chain_detects_tamper() {
        let store = InMemoryAuditStore::new();
        let tenant = TenantId::new();
        let e1 = entry(&tenant, None, "schema.export");
        let e2 = entry(&tenant, Some(e1.entry_hash.clone()), "check.run");
        let e3 = entry(&tenant, Some(e2.entry_hash.clone()), "migration.apply");
        store.write(e1).await.unwrap();
        store.write(e2.clone()).await.unwrap();
        store.write(e3).await.unwrap();

        assert_eq!(store.verify_chain(&tenant, None, None).await.unwrap(), None);

        {
            let mut guard = store.entries.lock().await;
            let tampered = guard.iter_mut().find(|e| e.id == e2.id).unwrap();
            tampered.details = serde_json::json!({"tampered": true});
        }
        assert_eq!(store.verify_chain(&tenant, None, None).await.unwrap(), Some(e2.id.clone()));
    }
}
