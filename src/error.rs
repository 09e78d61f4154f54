//! Error taxonomy shared across the extraction, migration, check, and audit
//! subsystems.
//!
//! Each subsystem defines its own `thiserror` enum so call sites can match on
//! the specific failure mode they care about; [`DbOpsError`] composes them
//! for code that just wants a single propagation type.

use thiserror::Error;

/// Errors raised while acquiring or operating a [`crate::external::DatabaseSession`].
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("session closed unexpectedly: {0}")]
    SessionClosed(String),
}

/// Errors raised by the `Credential` boundary.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("access denied: {0}")]
    AccessDenied(String),
    #[error("credential not found for tenant={tenant_id} connection={connection_id}")]
    NotFound {
        tenant_id: String,
        connection_id: String,
    },
}

/// Errors raised while issuing or parsing a catalog query.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("catalog query '{query_name}' failed: {cause}")]
    QueryFailed {
        query_name: String,
        #[source]
        cause: anyhow::Error,
    },
    #[error("transport error during extraction: {0}")]
    Transport(#[from] TransportError),
}

impl ExtractionError {
    pub fn query_failed(query_name: impl Into<String>, cause: impl Into<anyhow::Error>) -> Self {
        Self::QueryFailed {
            query_name: query_name.into(),
            cause: cause.into(),
        }
    }
}

/// Errors raised by [`crate::migration::generator`]'s multi-migration planner.
#[derive(Error, Debug)]
pub enum PlanError {
    #[error("migration dependency graph has a cycle touching: {0:?}")]
    Cycle(Vec<String>),
    #[error("migration '{0}' declares a dependency on unknown migration '{1}'")]
    MissingDependency(String, String),
}

/// Errors raised by migration validation.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("migration validation failed with {} error(s): {}", .0.len(), .0.join("; "))]
    Failed(Vec<String>),
}

/// Errors raised while applying or rolling back a migration.
#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("migration '{0}' is already applied")]
    AlreadyApplied(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("migration step {order} failed: {cause}")]
    StepFailed {
        order: u32,
        #[source]
        cause: anyhow::Error,
    },
    #[error("migration ledger operation failed: {0}")]
    LedgerError(String),
    #[error("transaction control failed: {0}")]
    TransactionFailed(String),
    #[error("migration '{0}' does not support rollback")]
    RollbackNotSupported(String),
}

impl MigrationError {
    pub fn step_failed(order: u32, cause: impl Into<anyhow::Error>) -> Self {
        Self::StepFailed {
            order,
            cause: cause.into(),
        }
    }
}

/// Errors raised while registering a [`crate::orchestrator::triggers::ScheduledTrigger`].
#[derive(Error, Debug)]
pub enum TriggerError {
    #[error("invalid cron expression '{expression}': {reason}")]
    InvalidCronExpression { expression: String, reason: String },
}

/// Errors surfaced from [`crate::audit::AuditLog`].
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("audit store write failed: {0}")]
    WriteFailed(String),
    #[error("audit chain integrity violation: entry '{entry_id}' failed verification")]
    IntegrityViolation { entry_id: String },
}

/// Composed top-level error for call sites that don't need to match on a
/// specific subsystem's taxonomy.
#[derive(Error, Debug)]
pub enum DbOpsError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Migration(#[from] MigrationError),
    #[error(transparent)]
    Audit(#[from] AuditError),
    #[error(transparent)]
    Trigger(#[from] TriggerError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
