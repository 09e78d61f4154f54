//! Typed configuration for each subsystem.
//!
//! These structs are constructed programmatically by the embedder (there is
//! no HTTP-facing config surface in this crate); each carries the defaults
//! named in `spec.md` so a caller can use `..Default::default()`.

use serde::{Deserialize, Serialize};

/// Options controlling a single `SchemaExtractor::extract` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractOptions {
    pub include_definitions: bool,
    pub include_row_counts: bool,
    /// Empty/absent means "all non-system schemas".
    pub schemas: Option<Vec<String>>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            include_definitions: true,
            include_row_counts: false,
            schemas: None,
        }
    }
}

/// Configuration for [`crate::orchestrator::CheckOrchestrator`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    pub tenant_id: String,
    pub max_concurrent_checks: usize,
    pub check_timeout_seconds: u64,
    pub excluded_checks: std::collections::HashSet<String>,
    pub alert_on_critical: bool,
    pub alert_on_failure: bool,
    pub alert_webhook_url: Option<String>,
}

impl OrchestratorConfig {
    pub fn new(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            max_concurrent_checks: 4,
            check_timeout_seconds: 120,
            excluded_checks: Default::default(),
            alert_on_critical: false,
            alert_on_failure: false,
            alert_webhook_url: None,
        }
    }
}

/// Configuration for [`crate::audit::AuditLog`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    pub enabled: bool,
    pub buffer_size: usize,
    pub flush_interval_seconds: u64,
    pub hash_chain_enabled: bool,
    pub compliance_frameworks: Vec<String>,
    pub async_write: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            buffer_size: 100,
            flush_interval_seconds: 5,
            hash_chain_enabled: true,
            compliance_frameworks: Vec::new(),
            async_write: true,
        }
    }
}

/// Options controlling [`crate::migration::executor::MigrationExecutor`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ExecutorOptions {
    pub dry_run: bool,
    pub transaction_per_step: bool,
    pub allow_truncate: bool,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            transaction_per_step: false,
            allow_truncate: false,
        }
    }
}
