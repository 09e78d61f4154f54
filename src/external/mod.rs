//! Interfaces the core consumes but does not implement the policy for:
//! connection acquisition, credential resolution, and audit persistence.
//!
//! `AuditStore` lives in [`crate::audit::store`] since it is intimately tied
//! to the audit entry shape; this module carries the other two boundaries
//! named in spec §6.

use crate::error::{AuthError, TransportError};
use crate::ids::{ConnectionId, TenantId};
use async_trait::async_trait;
use serde_json::Value as SqlValue;

/// A single row returned by [`DatabaseSession::execute`]. Column access is by
/// ordinal to stay driver-agnostic; concrete `DatabaseSession` impls (see
/// `crate::schema::postgres`, `crate::schema::sqlserver`) adapt their native
/// row type into this shape.
#[derive(Debug, Clone, Default)]
pub struct Row {
    pub values: Vec<SqlValue>,
}

impl Row {
    pub fn get(&self, index: usize) -> Option<&SqlValue> {
        self.values.get(index)
    }
}

/// Rows produced by one `execute` call.
#[derive(Debug, Clone, Default)]
pub struct Cursor {
    pub rows: Vec<Row>,
}

/// A single-ownership, single-threaded live connection to a target database.
/// Implementations MUST NOT allow statements from two tasks to interleave on
/// one session — callers that need concurrency acquire one session per task.
#[async_trait]
pub trait DatabaseSession: Send {
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<Cursor, TransportError>;
    async fn commit(&mut self) -> Result<(), TransportError>;
    async fn rollback(&mut self) -> Result<(), TransportError>;
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Acquires a live [`DatabaseSession`] for a connection identifier. The core
/// never decides how sessions are pooled, authenticated, or load balanced.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    async fn acquire(&self, connection_id: &ConnectionId) -> Result<Box<dyn DatabaseSession>, TransportError>;
}

/// Resolves a plaintext secret for the duration of a single operation. The
/// core never stores, caches, or encrypts what this returns.
#[async_trait]
pub trait Credential: Send + Sync {
    async fn fetch(
        &self,
        tenant_id: &TenantId,
        connection_id: &ConnectionId,
        user_id: &str,
    ) -> Result<String, AuthError>;
}
