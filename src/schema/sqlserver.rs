//! SQL Server [`SchemaExtractor`], built on `tiberius`.
//!
//! Catalog queries are grounded in `sys.*` catalog views (`sys.tables`,
//! `sys.columns`, `sys.indexes`, `sys.foreign_keys`), following the shape of
//! the original Python `SQLServerExtractor` and the `tiberius::Client`
//! query/row idiom (`client.simple_query(...).into_first_result()`) used by
//! `other_examples/4938fef2_rust-db-refinery__refinery_core-src-drivers-tiberius.rs.rs`.

use crate::config::ExtractOptions;
use crate::error::{ExtractionError, TransportError};
use crate::model::{Column, DataType, DatabaseSchema, ForeignKey, Index, IndexType, ReferentialAction, Table, View};
use crate::schema::extractor::{is_system_schema, ConnectionCheck, SchemaExtractor, TypeNormalizer};
use async_trait::async_trait;
use chrono::Utc;
use futures::io::{AsyncRead, AsyncWrite};
use std::marker::Unpin;
use tiberius::{Client, Row};
use tokio::sync::Mutex;

pub struct SqlServerTypeNormalizer;

impl TypeNormalizer for SqlServerTypeNormalizer {
    fn normalize(&self, raw_type: &str) -> DataType {
        match raw_type.to_lowercase().as_str() {
            "int" => DataType::Int,
            "bigint" => DataType::BigInt,
            "smallint" => DataType::SmallInt,
            "tinyint" => DataType::TinyInt,
            "decimal" => DataType::Decimal,
            "numeric" => DataType::Numeric,
            "float" => DataType::Float,
            "real" => DataType::Real,
            "money" | "smallmoney" => DataType::Money,
            "bit" => DataType::Bit,
            "char" => DataType::Char,
            "varchar" => DataType::Varchar,
            "nchar" => DataType::NChar,
            "nvarchar" => DataType::NVarchar,
            "text" => DataType::Text,
            "ntext" => DataType::NText,
            "date" => DataType::Date,
            "time" => DataType::Time,
            "datetime" => DataType::DateTime,
            "smalldatetime" => DataType::SmallDateTime,
            "datetime2" => DataType::DateTime2,
            "datetimeoffset" => DataType::DateTimeOffset,
            "timestamp" | "rowversion" => DataType::Timestamp,
            "binary" => DataType::Binary,
            "varbinary" => DataType::VarBinary,
            "image" => DataType::Image,
            "uniqueidentifier" => DataType::UniqueIdentifier,
            "xml" => DataType::Xml,
            "geography" => DataType::Geography,
            "geometry" => DataType::Geometry,
            "hierarchyid" => DataType::HierarchyId,
            "sql_variant" => DataType::SqlVariant,
            _ => DataType::Unknown,
        }
    }
}

/// `tiberius::Client` is generic over its transport stream (typically a
/// `tokio::net::TcpStream` wrapped in `tokio_util::compat`); this extractor
/// is generic over that the same way the `tiberius`-based example in the
/// retrieval pack is, and owns the client behind a `Mutex` because
/// `Client::simple_query` takes `&mut self` while `SchemaExtractor`'s trait
/// methods take `&self` (one extractor instance, one session, per spec
/// §4.1 — the mutex here is not for concurrent access, only interior
/// mutability).
pub struct SqlServerExtractor<S: AsyncRead + AsyncWrite + Unpin + Send> {
    client: Mutex<Client<S>>,
    normalizer: SqlServerTypeNormalizer,
}

impl<S: AsyncRead + AsyncWrite + Unpin + Send> SqlServerExtractor<S> {
    pub fn new(client: Client<S>) -> Self {
        Self {
            client: Mutex::new(client),
            normalizer: SqlServerTypeNormalizer,
        }
    }

    async fn query(&self, sql: &str) -> Result<Vec<Row>, tiberius::error::Error> {
        let mut client = self.client.lock().await;
        let stream = client.simple_query(sql).await?;
        stream.into_first_result().await
    }

    async fn extract_columns(&self, schema: &str, table: &str) -> Result<Vec<Column>, ExtractionError> {
        let sql = format!(
            "SELECT c.name, ty.name AS type_name, c.max_length, c.precision, c.scale, \
                    c.is_nullable, c.is_identity, c.is_computed, dc.definition AS default_value, \
                    c.column_id, \
                    CASE WHEN ic.column_id IS NOT NULL THEN 1 ELSE 0 END AS is_primary_key \
             FROM sys.columns c \
             JOIN sys.tables t ON t.object_id = c.object_id \
             JOIN sys.schemas s ON s.schema_id = t.schema_id \
             JOIN sys.types ty ON ty.user_type_id = c.user_type_id \
             LEFT JOIN sys.default_constraints dc ON dc.object_id = c.default_object_id \
             LEFT JOIN sys.indexes i ON i.object_id = t.object_id AND i.is_primary_key = 1 \
             LEFT JOIN sys.index_columns ic ON ic.object_id = i.object_id AND ic.index_id = i.index_id AND ic.column_id = c.column_id \
             WHERE s.name = '{schema}' AND t.name = '{table}' \
             ORDER BY c.column_id"
        );
        let rows = self.query(&sql).await.map_err(|e| ExtractionError::query_failed("extract_columns", e))?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in &rows {
            let raw_type: &str = row.get("type_name").unwrap_or("unknown");
            let max_length: i16 = row.get("max_length").unwrap_or(0);
            columns.push(Column {
                name: row.get::<&str, _>("name").unwrap_or_default().to_string(),
                data_type: self.normalizer.normalize(raw_type),
                raw_type: raw_type.to_string(),
                max_length: max_length as i64,
                precision: row.get::<u8, _>("precision").map(|v| v as u32),
                scale: row.get::<u8, _>("scale").map(|v| v as u32),
                is_nullable: row.get("is_nullable").unwrap_or(false),
                is_identity: row.get("is_identity").unwrap_or(false),
                is_primary_key: row.get::<i32, _>("is_primary_key").unwrap_or(0) == 1,
                is_computed: row.get("is_computed").unwrap_or(false),
                computed_expression: None,
                default_value: row.get::<&str, _>("default_value").map(|s| s.to_string()),
                ordinal_position: row.get::<i32, _>("column_id").unwrap_or(0) as u32,
            });
        }
        Ok(columns)
    }

    async fn extract_primary_key_columns(&self, schema: &str, table: &str) -> Result<Vec<String>, ExtractionError> {
        let sql = format!(
            "SELECT c.name \
             FROM sys.indexes i \
             JOIN sys.index_columns ic ON ic.object_id = i.object_id AND ic.index_id = i.index_id \
             JOIN sys.columns c ON c.object_id = ic.object_id AND c.column_id = ic.column_id \
             JOIN sys.tables t ON t.object_id = i.object_id \
             JOIN sys.schemas s ON s.schema_id = t.schema_id \
             WHERE i.is_primary_key = 1 AND s.name = '{schema}' AND t.name = '{table}' \
             ORDER BY ic.key_ordinal"
        );
        let rows = self.query(&sql).await.map_err(|e| ExtractionError::query_failed("extract_primary_key", e))?;
        Ok(rows.iter().filter_map(|r| r.get::<&str, _>("name").map(|s| s.to_string())).collect())
    }

    async fn extract_foreign_keys(&self, schema: &str, table: &str) -> Result<Vec<ForeignKey>, ExtractionError> {
        let sql = format!(
            "SELECT fk.name AS fk_name, c.name AS column_name, rs.name AS referenced_schema, \
                    rt.name AS referenced_table, rc.name AS referenced_column, \
                    fk.delete_referential_action_desc, fk.update_referential_action_desc \
             FROM sys.foreign_keys fk \
             JOIN sys.foreign_key_columns fkc ON fkc.constraint_object_id = fk.object_id \
             JOIN sys.tables t ON t.object_id = fk.parent_object_id \
             JOIN sys.schemas s ON s.schema_id = t.schema_id \
             JOIN sys.columns c ON c.object_id = fkc.parent_object_id AND c.column_id = fkc.parent_column_id \
             JOIN sys.tables rt ON rt.object_id = fk.referenced_object_id \
             JOIN sys.schemas rs ON rs.schema_id = rt.schema_id \
             JOIN sys.columns rc ON rc.object_id = fkc.referenced_object_id AND rc.column_id = fkc.referenced_column_id \
             WHERE s.name = '{schema}' AND t.name = '{table}' \
             ORDER BY fk.name, fkc.constraint_column_id"
        );
        let rows = self.query(&sql).await.map_err(|e| ExtractionError::query_failed("extract_foreign_keys", e))?;

        let mut grouped: std::collections::BTreeMap<String, ForeignKey> = std::collections::BTreeMap::new();
        for row in &rows {
            let name: &str = row.get("fk_name").unwrap_or_default();
            let entry = grouped.entry(name.to_string()).or_insert_with(|| ForeignKey {
                name: name.to_string(),
                columns: Vec::new(),
                referenced_schema: row.get::<&str, _>("referenced_schema").unwrap_or_default().to_string(),
                referenced_table: row.get::<&str, _>("referenced_table").unwrap_or_default().to_string(),
                referenced_columns: Vec::new(),
                on_delete: map_referential_action(row.get("delete_referential_action_desc")),
                on_update: map_referential_action(row.get("update_referential_action_desc")),
            });
            if let Some(col) = row.get::<&str, _>("column_name") {
                entry.columns.push(col.to_string());
            }
            if let Some(col) = row.get::<&str, _>("referenced_column") {
                entry.referenced_columns.push(col.to_string());
            }
        }
        Ok(grouped.into_values().collect())
    }

    async fn extract_indexes(&self, schema: &str, table: &str) -> Result<Vec<Index>, ExtractionError> {
        let sql = format!(
            "SELECT i.name AS index_name, i.type_desc, i.is_unique, i.is_primary_key, \
                    c.name AS column_name, ic.is_included_column, i.filter_definition \
             FROM sys.indexes i \
             JOIN sys.index_columns ic ON ic.object_id = i.object_id AND ic.index_id = i.index_id \
             JOIN sys.columns c ON c.object_id = ic.object_id AND c.column_id = ic.column_id \
             JOIN sys.tables t ON t.object_id = i.object_id \
             JOIN sys.schemas s ON s.schema_id = t.schema_id \
             WHERE i.name IS NOT NULL AND s.name = '{schema}' AND t.name = '{table}' \
             ORDER BY i.name, ic.key_ordinal"
        );
        let rows = self.query(&sql).await.map_err(|e| ExtractionError::query_failed("extract_indexes", e))?;

        let mut grouped: std::collections::BTreeMap<String, Index> = std::collections::BTreeMap::new();
        for row in &rows {
            let name: &str = row.get("index_name").unwrap_or_default();
            let type_desc: &str = row.get("type_desc").unwrap_or_default();
            let entry = grouped.entry(name.to_string()).or_insert_with(|| Index {
                name: name.to_string(),
                index_type: map_index_type(type_desc),
                is_unique: row.get("is_unique").unwrap_or(false),
                is_primary_key: row.get("is_primary_key").unwrap_or(false),
                key_columns: Vec::new(),
                included_columns: Vec::new(),
                filter_predicate: row.get::<&str, _>("filter_definition").map(|s| s.to_string()),
            });
            let included: bool = row.get("is_included_column").unwrap_or(false);
            if let Some(col) = row.get::<&str, _>("column_name") {
                if included {
                    entry.included_columns.push(col.to_string());
                } else {
                    entry.key_columns.push(col.to_string());
                }
            }
        }
        Ok(grouped.into_values().collect())
    }

    async fn extract_row_count(&self, schema: &str, table: &str) -> Result<Option<u64>, ExtractionError> {
        let sql = format!(
            "SELECT SUM(ps.row_count) AS row_count \
             FROM sys.dm_db_partition_stats ps \
             JOIN sys.tables t ON t.object_id = ps.object_id \
             JOIN sys.schemas s ON s.schema_id = t.schema_id \
             WHERE ps.index_id IN (0, 1) AND s.name = '{schema}' AND t.name = '{table}'"
        );
        let rows = self.query(&sql).await.map_err(|e| ExtractionError::query_failed("extract_row_count", e))?;
        Ok(rows.first().and_then(|r| r.get::<i64, _>("row_count")).map(|v| v.max(0) as u64))
    }

    async fn extract_tables(&self, options: &ExtractOptions) -> Result<Vec<Table>, ExtractionError> {
        let sql = "SELECT s.name AS schema_name, t.name AS table_name \
                    FROM sys.tables t JOIN sys.schemas s ON s.schema_id = t.schema_id \
                    ORDER BY s.name, t.name";
        let rows = self.query(sql).await.map_err(|e| ExtractionError::query_failed("extract_tables", e))?;

        let mut tables = Vec::new();
        for row in &rows {
            let schema: String = row.get::<&str, _>("schema_name").unwrap_or_default().to_string();
            let name: String = row.get::<&str, _>("table_name").unwrap_or_default().to_string();
            if is_system_schema(&schema) {
                continue;
            }
            if let Some(allowed) = &options.schemas {
                if !allowed.iter().any(|s| s.eq_ignore_ascii_case(&schema)) {
                    continue;
                }
            }

            let columns = self.extract_columns(&schema, &name).await?;
            let primary_key_columns = self.extract_primary_key_columns(&schema, &name).await?;
            let foreign_keys = self.extract_foreign_keys(&schema, &name).await?;
            let indexes = self.extract_indexes(&schema, &name).await?;
            let row_count = if options.include_row_counts {
                self.extract_row_count(&schema, &name).await?
            } else {
                None
            };

            tables.push(Table {
                schema,
                name,
                columns,
                indexes,
                foreign_keys,
                primary_key_columns,
                row_count,
                is_temporal: false,
                history_table: None,
            });
        }
        Ok(tables)
    }

    async fn extract_views(&self, options: &ExtractOptions) -> Result<Vec<View>, ExtractionError> {
        if !options.include_definitions {
            return Ok(Vec::new());
        }
        let sql = "SELECT s.name AS schema_name, v.name AS view_name, m.definition \
                    FROM sys.views v \
                    JOIN sys.schemas s ON s.schema_id = v.schema_id \
                    JOIN sys.sql_modules m ON m.object_id = v.object_id";
        let rows = self.query(sql).await.map_err(|e| ExtractionError::query_failed("extract_views", e))?;

        Ok(rows
            .iter()
            .filter(|r| !is_system_schema(r.get::<&str, _>("schema_name").unwrap_or_default()))
            .map(|r| View {
                schema: r.get::<&str, _>("schema_name").unwrap_or_default().to_string(),
                name: r.get::<&str, _>("view_name").unwrap_or_default().to_string(),
                definition: r.get::<&str, _>("definition").unwrap_or_default().to_string(),
            })
            .collect())
    }
}

fn map_referential_action(rule: Option<&str>) -> ReferentialAction {
    match rule.unwrap_or("NO_ACTION") {
        "CASCADE" => ReferentialAction::Cascade,
        "SET_NULL" => ReferentialAction::SetNull,
        "SET_DEFAULT" => ReferentialAction::SetDefault,
        _ => ReferentialAction::NoAction,
    }
}

fn map_index_type(type_desc: &str) -> IndexType {
    match type_desc {
        "CLUSTERED" => IndexType::Clustered,
        "NONCLUSTERED" => IndexType::NonClustered,
        "CLUSTERED COLUMNSTORE" => IndexType::ClusteredColumnstore,
        "NONCLUSTERED COLUMNSTORE" => IndexType::NonClusteredColumnstore,
        "XML" => IndexType::Xml,
        "SPATIAL" => IndexType::Spatial,
        _ => IndexType::Unknown,
    }
}

#[async_trait]
impl<S: AsyncRead + AsyncWrite + Unpin + Send> SchemaExtractor for SqlServerExtractor<S> {
    async fn test_connection(&self) -> Result<ConnectionCheck, TransportError> {
        match self.query("SELECT @@VERSION AS version").await {
            Ok(rows) => Ok(ConnectionCheck {
                ok: true,
                message: "connected".to_string(),
                server_version: rows.first().and_then(|r| r.get::<&str, _>("version")).map(|s| s.to_string()),
            }),
            Err(e) => match e {
                tiberius::error::Error::Server(_) => Ok(ConnectionCheck {
                    ok: false,
                    message: e.to_string(),
                    server_version: None,
                }),
                other => Err(TransportError::ConnectionFailed(other.to_string())),
            },
        }
    }

    async fn extract(&self, options: &ExtractOptions) -> Result<DatabaseSchema, ExtractionError> {
        let db_rows = self
            .query("SELECT DB_NAME() AS db_name, SERVERPROPERTY('ProductVersion') AS version, CONVERT(sysname, DATABASEPROPERTYEX(DB_NAME(), 'Collation')) AS collation")
            .await
            .map_err(|e| ExtractionError::query_failed("database_info", e))?;
        let db_row = db_rows.first();

        let tables = self.extract_tables(options).await?;
        let views = self.extract_views(options).await?;

        Ok(DatabaseSchema {
            database_name: db_row.and_then(|r| r.get::<&str, _>("db_name")).unwrap_or_default().to_string(),
            server_version: db_row.and_then(|r| r.get::<&str, _>("version")).unwrap_or_default().to_string(),
            collation: db_row.and_then(|r| r.get::<&str, _>("collation")).map(|s| s.to_string()),
            extracted_at: Utc::now(),
            tables,
            views,
            procedures: Vec::new(),
            functions: Vec::new(),
            triggers: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_normalizer_maps_documented_sql_server_types() {
        let normalizer = SqlServerTypeNormalizer;
        assert_eq!(normalizer.normalize("NVARCHAR"), DataType::NVarchar);
        assert_eq!(normalizer.normalize("datetime2"), DataType::DateTime2);
        assert_eq!(normalizer.normalize("uniqueidentifier"), DataType::UniqueIdentifier);
        assert_eq!(normalizer.normalize("something_unheard_of"), DataType::Unknown);
    }

    #[test]
    fn referential_action_maps_known_rules_and_falls_back() {
        assert_eq!(map_referential_action(Some("CASCADE")), ReferentialAction::Cascade);
        assert_eq!(map_referential_action(Some("SET_NULL")), ReferentialAction::SetNull);
        assert_eq!(map_referential_action(None), ReferentialAction::NoAction);
    }

    #[test]
    fn index_type_maps_known_descriptions_and_falls_back() {
        assert_eq!(map_index_type("CLUSTERED"), IndexType::Clustered);
        assert_eq!(map_index_type("NONCLUSTERED COLUMNSTORE"), IndexType::NonClusteredColumnstore);
        assert_eq!(map_index_type("HEAP"), IndexType::Unknown);
    }
}
