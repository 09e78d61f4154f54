//! [`AuditLog`] — buffered, hash-chained append-only event stream
//! (spec §4.7). Receives an [`AuditStore`] handle via its constructor rather
//! than reaching for a process-global logger (spec §9).

use crate::audit::store::{AuditFilter, AuditStore};
use crate::config::AuditConfig;
use crate::error::AuditError;
use crate::ids::{AuditEntryId, TenantId};
use crate::model::audit::{AuditEntry, AuditEntryDraft, AuditSeverity};
use chrono::Utc;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, warn};

/// After this many consecutive flush failures, entries are allowed to
/// overflow the buffer and a diagnostic event is emitted (spec §7,
/// `AuditWriteError`, "≥5").
const MAX_CONSECUTIVE_FLUSH_FAILURES: u32 = 5;

struct TenantChainState {
    last_hash: Mutex<Option<String>>,
}

pub struct AuditLog {
    config: AuditConfig,
    store: Arc<dyn AuditStore>,
    buffer: Arc<Mutex<VecDeque<AuditEntry>>>,
    chains: DashMap<String, Arc<TenantChainState>>,
    consecutive_flush_failures: AtomicU32,
    flusher: Mutex<Option<JoinHandle<()>>>,
    /// Lets buffer-size-triggered flushes spawn an owned task without every
    /// caller of `log()` needing to hold its own `Arc<AuditLog>`.
    self_weak: Weak<AuditLog>,
}

impl AuditLog {
    pub fn new(config: AuditConfig, store: Arc<dyn AuditStore>) -> Arc<Self> {
        let log = Arc::new_cyclic(|weak| Self {
            config,
            store,
            buffer: Arc::new(Mutex::new(VecDeque::new())),
            chains: DashMap::new(),
            consecutive_flush_failures: AtomicU32::new(0),
            flusher: Mutex::new(None),
            self_weak: weak.clone(),
        });
        if log.config.enabled && log.config.async_write {
            log.clone().spawn_flusher();
        }
        log
    }

    fn spawn_flusher(self: Arc<Self>) {
        let interval = std::time::Duration::from_secs(self.config.flush_interval_seconds.max(1));
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(e) = self.flush().await {
                    warn!(error = %e, "periodic audit flush failed");
                }
            }
        });
        // Not awaited anywhere but `stop()`; stored purely so shutdown can
        // cancel it rather than leaking a detached task forever.
        if let Ok(mut guard) = self.flusher.try_lock() {
            *guard = Some(handle);
        }
    }

    fn chain_state(&self, tenant_id: &TenantId) -> Arc<TenantChainState> {
        self.chains
            .entry(tenant_id.as_str().to_string())
            .or_insert_with(|| {
                Arc::new(TenantChainState {
                    last_hash: Mutex::new(None),
                })
            })
            .clone()
    }

    /// Append one entry (spec §4.7 `log()`). The hash-chain read-compute-
    /// update is serialized per tenant by `chain.last_hash`'s mutex, matching
    /// spec §5's "strictly serialized" requirement; different tenants'
    /// entries may interleave freely.
    pub async fn log(&self, tenant_id: TenantId, draft: AuditEntryDraft) -> Result<AuditEntry, AuditError> {
        if !self.config.enabled {
            return Ok(self.build_unchained(tenant_id, draft));
        }

        let id = AuditEntryId::new();
        let timestamp = Utc::now();

        let (previous_hash, entry_hash, chain_guard) = if self.config.hash_chain_enabled {
            let chain = self.chain_state(&tenant_id);
            let mut last_hash_guard = chain.last_hash.lock().await;
            if last_hash_guard.is_none() {
                *last_hash_guard = self.store.get_last_hash(&tenant_id).await?;
            }
            let previous = last_hash_guard.clone();
            let hash = AuditEntry::compute_hash(
                &id,
                &timestamp,
                &tenant_id,
                &draft.user_id,
                &draft.action,
                draft.severity,
                &draft.resource_type,
                &draft.resource_id,
                draft.success,
                &draft.details,
                &previous,
            );
            *last_hash_guard = Some(hash.clone());
            (previous, hash, Some(chain))
        } else {
            (None, String::new(), None)
        };
        // Hold the chain's mutex past the hash computation above (it already
        // is, via `last_hash_guard`'s lifetime) so no other `log()` call for
        // this tenant can observe a stale `last_hash` in between.
        drop(chain_guard);

        let entry = AuditEntry {
            id,
            timestamp,
            tenant_id: tenant_id.clone(),
            user_id: draft.user_id,
            action: draft.action,
            severity: draft.severity,
            resource_type: draft.resource_type,
            resource_id: draft.resource_id,
            success: draft.success,
            details: draft.details,
            previous_hash,
            entry_hash,
        };

        if self.config.async_write {
            let mut buffer = self.buffer.lock().await;
            buffer.push_back(entry.clone());
            let should_flush = buffer.len() >= self.config.buffer_size;
            drop(buffer);
            if should_flush {
                if let Some(log) = self.self_weak.upgrade() {
                    tokio::spawn(async move {
                        if let Err(e) = log.flush().await {
                            warn!(error = %e, "buffer-size-triggered audit flush failed");
                        }
                    });
                }
            }
        } else {
            self.store.write(entry.clone()).await?;
        }

        Ok(entry)
    }

    /// Convenience used only when `config.enabled == false`: callers still
    /// get back a well-formed `AuditEntry` (e.g. for logging to `tracing`),
    /// it is simply never persisted.
    fn build_unchained(&self, tenant_id: TenantId, draft: AuditEntryDraft) -> AuditEntry {
        let id = AuditEntryId::new();
        let timestamp = Utc::now();
        let entry_hash = AuditEntry::compute_hash(
            &id,
            &timestamp,
            &tenant_id,
            &draft.user_id,
            &draft.action,
            draft.severity,
            &draft.resource_type,
            &draft.resource_id,
            draft.success,
            &draft.details,
            &None,
        );
        AuditEntry {
            id,
            timestamp,
            tenant_id,
            user_id: draft.user_id,
            action: draft.action,
            severity: draft.severity,
            resource_type: draft.resource_type,
            resource_id: draft.resource_id,
            success: draft.success,
            details: draft.details,
            previous_hash: None,
            entry_hash,
        }
    }

    /// Swap the buffer out under its lock, write outside it (spec §5's
    /// single-producer-multiple-appender rule).
    pub async fn flush(&self) -> Result<(), AuditError> {
        let drained: Vec<AuditEntry> = {
            let mut buffer = self.buffer.lock().await;
            buffer.drain(..).collect()
        };
        if drained.is_empty() {
            return Ok(());
        }

        match self.store.write_batch(drained.clone()).await {
            Ok(()) => {
                self.consecutive_flush_failures.store(0, Ordering::SeqCst);
                Ok(())
            }
            Err(e) => {
                let failures = self.consecutive_flush_failures.fetch_add(1, Ordering::SeqCst) + 1;
                if failures >= MAX_CONSECUTIVE_FLUSH_FAILURES {
                    error!(
                        failures,
                        entries = drained.len(),
                        "audit flush failed repeatedly; entries are being dropped rather than buffered indefinitely"
                    );
                } else {
                    let mut buffer = self.buffer.lock().await;
                    for entry in drained.into_iter().rev() {
                        buffer.push_front(entry);
                    }
                }
                Err(e)
            }
        }
    }

    pub async fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>, AuditError> {
        self.store.query(filter).await
    }

    /// Verify the hash chain for `tenant_id` (spec §4.7 `verify_integrity`).
    /// On the first mismatch, emits a diagnostic event naming the offending
    /// entry (spec §4.7 step 4, scenario S5).
    pub async fn verify_integrity(&self, tenant_id: &TenantId) -> Result<bool, AuditError> {
        let failing_entry = self.store.verify_chain(tenant_id, None, None).await?;
        if let Some(entry_id) = &failing_entry {
            warn!(
                tenant_id = %tenant_id,
                entry_id = %entry_id,
                "audit chain integrity verification failed"
            );
        }
        Ok(failing_entry.is_none())
    }

    /// Cancel the background flusher and flush any residual buffered
    /// entries (spec §4.7 shutdown). Returns entries that could not be
    /// persisted.
    pub async fn stop(&self) -> Vec<AuditEntry> {
        if let Some(handle) = self.flusher.lock().await.take() {
            handle.abort();
        }
        if self.flush().await.is_ok() {
            Vec::new()
        } else {
            self.buffer.lock().await.drain(..).collect()
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::store::InMemoryAuditStore;

    fn draft(action: &str) -> AuditEntryDraft {
        AuditEntryDraft {
            user_id: Some("user-1".into()),
            action: action.into(),
            severity: AuditSeverity::Info,
            resource_type: "connection".into(),
            resource_id: "conn-1".into(),
            success: true,
            details: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn synchronous_writes_are_immediately_queryable() {
        let store = Arc::new(InMemoryAuditStore::new());
        let config = AuditConfig {
            async_write: false,
            ..AuditConfig::default()
        };
        let log = AuditLog::new(config, store);
        let tenant = TenantId::new();

        log.log(tenant.clone(), draft("schema.export")).await.unwrap();
        log.log(tenant.clone(), draft("check.run")).await.unwrap();

        let results = log.query(&AuditFilter::for_tenant(tenant.clone())).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(log.verify_integrity(&tenant).await.unwrap());
    }

    #[tokio::test]
    async fn hash_chain_links_sequential_entries() {
        let store = Arc::new(InMemoryAuditStore::new());
        let config = AuditConfig {
            async_write: false,
            ..AuditConfig::default()
        };
        let log = AuditLog::new(config, store);
        let tenant = TenantId::new();

        let first = log.log(tenant.clone(), draft("a")).await.unwrap();
        let second = log.log(tenant.clone(), draft("b")).await.unwrap();

        assert!(first.previous_hash.is_none());
        assert_eq!(second.previous_hash.as_deref(), Some(first.entry_hash.as_str()));
    }

    #[tokio::test]
    async fn async_buffer_flushes_at_buffer_size() {
        let store = Arc::new(InMemoryAuditStore::new());
        let config = AuditConfig {
            buffer_size: 2,
            flush_interval_seconds: 3600,
            ..AuditConfig::default()
        };
        let log = AuditLog::new(config, store.clone());
        let tenant = TenantId::new();

        log.log(tenant.clone(), draft("a")).await.unwrap();
        log.log(tenant.clone(), draft("b")).await.unwrap();
        // buffer-size flush is spawned, not awaited inline; give it a tick.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let results = store.query(&AuditFilter::for_tenant(tenant)).await.unwrap();
        assert_eq!(results.len(), 2);
    }
}
