//! Vendor-neutral data model shared by every subsystem.

pub mod audit;
pub mod check;
pub mod diff;
pub mod migration;
pub mod schema;
pub mod snapshot;

pub use audit::{AuditEntry, AuditEntryDraft, AuditSeverity};
pub use check::{
    CheckCategory, CheckDefinition, CheckExecution, CheckResult, CheckStatus, DatabaseHealth,
    HealthStatus, TriggerType,
};
pub use diff::{BreakingChange, ChangeType, DiffItem, ObjectType, SchemaDiff, Severity};
pub use migration::{Dialect, Migration, MigrationStatus, MigrationStep};
pub use schema::{
    Column, DatabaseSchema, ForeignKey, Function, FunctionKind, Index, IndexType, Parameter,
    Procedure, ReferentialAction, Table, Trigger, TriggerTiming, View, DataType,
};
pub use snapshot::SchemaSnapshot;
