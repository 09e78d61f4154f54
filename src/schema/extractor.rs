//! The [`SchemaExtractor`] contract (spec §4.1): connect, issue catalog
//! queries, populate a [`DatabaseSchema`], and optionally wrap the result in
//! a hashed [`SchemaSnapshot`].

use crate::config::ExtractOptions;
use crate::error::{ExtractionError, TransportError};
use crate::ids::{ConnectionId, TenantId};
use crate::model::{DatabaseSchema, SchemaSnapshot};
use async_trait::async_trait;

/// Result of a connectivity probe. Protocol-level authentication failures are
/// reported as `ok: false` with a message, NOT as a `ConnectionError` — only
/// unexpected transport failures (DNS, TCP reset, TLS negotiation) raise.
#[derive(Debug, Clone)]
pub struct ConnectionCheck {
    pub ok: bool,
    pub message: String,
    pub server_version: Option<String>,
}

#[async_trait]
pub trait SchemaExtractor: Send + Sync {
    async fn test_connection(&self) -> Result<ConnectionCheck, TransportError>;

    async fn extract(&self, options: &ExtractOptions) -> Result<DatabaseSchema, ExtractionError>;

    /// Compose `extract()` with hashing to produce a persistable snapshot.
    async fn create_snapshot(
        &self,
        connection_id: ConnectionId,
        tenant_id: TenantId,
        created_by: Option<String>,
        label: Option<String>,
        is_baseline: bool,
        options: &ExtractOptions,
    ) -> Result<SchemaSnapshot, ExtractionError> {
        let schema = self.extract(options).await?.sorted();
        Ok(SchemaSnapshot::new(
            connection_id,
            tenant_id,
            schema,
            created_by,
            label,
            is_baseline,
        ))
    }
}

/// Maps a vendor-specific raw type string onto the fixed [`crate::model::DataType`]
/// set. One implementation per engine; unknown strings fall back to
/// `DataType::Unknown` with the raw string preserved on the `Column`.
pub trait TypeNormalizer {
    fn normalize(&self, raw_type: &str) -> crate::model::DataType;
}

pub(crate) fn is_system_schema(name: &str) -> bool {
    crate::model::schema::SYSTEM_SCHEMAS
        .iter()
        .any(|s| s.eq_ignore_ascii_case(name))
}
