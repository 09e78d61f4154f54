//! PostgreSQL [`SchemaExtractor`], built on `tokio-postgres`.
//!
//! Catalog queries are grounded in `information_schema` views, following the
//! same shape as the original Python `PostgreSQLExtractor` and the real
//! `tokio-postgres`-based introspection code this crate drew on for idiom
//! (correlated subqueries against `information_schema.key_column_usage` for
//! primary-key/unique flags, `array_agg(... ORDER BY ordinal_position)` for
//! multi-column keys).

use crate::config::ExtractOptions;
use crate::error::{ExtractionError, TransportError};
use crate::model::{Column, DataType, DatabaseSchema, ForeignKey, Index, IndexType, ReferentialAction, Table, View};
use crate::schema::extractor::{is_system_schema, ConnectionCheck, SchemaExtractor, TypeNormalizer};
use async_trait::async_trait;
use chrono::Utc;
use tokio_postgres::Client;

pub struct PostgresTypeNormalizer;

impl TypeNormalizer for PostgresTypeNormalizer {
    fn normalize(&self, raw_type: &str) -> DataType {
        // Strip array markers (`integer[]`) and parenthesized precision
        // (`numeric(10,2)`) the same way the original extractor does before
        // looking the base name up in the mapping table below.
        let base = raw_type
            .split('(')
            .next()
            .unwrap_or(raw_type)
            .trim_end_matches("[]")
            .trim()
            .to_lowercase();

        match base.as_str() {
            "integer" | "int" | "int4" => DataType::Int,
            "bigint" | "int8" => DataType::BigInt,
            "smallint" | "int2" => DataType::SmallInt,
            "numeric" | "decimal" => DataType::Numeric,
            "real" | "float4" => DataType::Real,
            "double precision" | "float8" => DataType::Float,
            "money" => DataType::Money,
            "boolean" | "bool" => DataType::Boolean,
            "character" | "char" => DataType::Char,
            "character varying" | "varchar" => DataType::Varchar,
            "text" => DataType::Text,
            "date" => DataType::Date,
            "time" | "time without time zone" | "time with time zone" => DataType::Time,
            "timestamp" | "timestamp without time zone" => DataType::DateTime,
            "timestamptz" | "timestamp with time zone" => DataType::DateTimeOffset,
            "bytea" => DataType::Bytea,
            "uuid" => DataType::Uuid,
            "json" => DataType::Json,
            "jsonb" => DataType::Jsonb,
            "inet" => DataType::Inet,
            "cidr" => DataType::Cidr,
            "macaddr" => DataType::MacAddr,
            "serial" | "serial4" => DataType::Serial,
            "bigserial" | "serial8" => DataType::BigSerial,
            _ => DataType::Unknown,
        }
    }
}

pub struct PostgresExtractor {
    client: Client,
    normalizer: PostgresTypeNormalizer,
}

impl PostgresExtractor {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            normalizer: PostgresTypeNormalizer,
        }
    }

    async fn extract_columns(&self, schema: &str, table: &str) -> Result<Vec<Column>, ExtractionError> {
        let rows = self
            .client
            .query(
                r#"
                SELECT
                    c.column_name,
                    c.data_type,
                    c.character_maximum_length,
                    c.numeric_precision,
                    c.numeric_scale,
                    c.is_nullable = 'YES' AS is_nullable,
                    c.column_default,
                    c.ordinal_position,
                    c.is_identity = 'YES' AS is_identity,
                    c.is_generated = 'ALWAYS' AS is_computed,
                    EXISTS (
                        SELECT 1 FROM information_schema.table_constraints tc
                        JOIN information_schema.key_column_usage kcu
                            ON tc.constraint_name = kcu.constraint_name
                           AND tc.table_schema = kcu.table_schema
                        WHERE tc.constraint_type = 'PRIMARY KEY'
                          AND tc.table_schema = c.table_schema
                          AND tc.table_name = c.table_name
                          AND kcu.column_name = c.column_name
                    ) AS is_primary_key
                FROM information_schema.columns c
                WHERE c.table_schema = $1 AND c.table_name = $2
                ORDER BY c.ordinal_position
                "#,
                &[&schema, &table],
            )
            .await
            .map_err(|e| ExtractionError::query_failed("extract_columns", e))?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let raw_type: String = row.get("data_type");
            let max_length: Option<i32> = row.get("character_maximum_length");
            columns.push(Column {
                name: row.get("column_name"),
                data_type: self.normalizer.normalize(&raw_type),
                raw_type,
                max_length: max_length.map(|v| v as i64).unwrap_or(-1),
                precision: row.get::<_, Option<i32>>("numeric_precision").map(|v| v as u32),
                scale: row.get::<_, Option<i32>>("numeric_scale").map(|v| v as u32),
                is_nullable: row.get("is_nullable"),
                is_identity: row.get("is_identity"),
                is_primary_key: row.get("is_primary_key"),
                is_computed: row.get("is_computed"),
                computed_expression: None,
                default_value: row.get("column_default"),
                ordinal_position: row.get::<_, i32>("ordinal_position") as u32,
            });
        }
        Ok(columns)
    }

    async fn extract_primary_key_columns(&self, schema: &str, table: &str) -> Result<Vec<String>, ExtractionError> {
        let row = self
            .client
            .query_opt(
                r#"
                SELECT array_agg(kcu.column_name ORDER BY kcu.ordinal_position) AS columns
                FROM information_schema.table_constraints tc
                JOIN information_schema.key_column_usage kcu
                    ON tc.constraint_name = kcu.constraint_name
                   AND tc.table_schema = kcu.table_schema
                WHERE tc.constraint_type = 'PRIMARY KEY'
                  AND tc.table_schema = $1 AND tc.table_name = $2
                "#,
                &[&schema, &table],
            )
            .await
            .map_err(|e| ExtractionError::query_failed("extract_primary_key", e))?;

        Ok(row
            .and_then(|r| r.get::<_, Option<Vec<String>>>("columns"))
            .unwrap_or_default())
    }

    async fn extract_foreign_keys(&self, schema: &str, table: &str) -> Result<Vec<ForeignKey>, ExtractionError> {
        let rows = self
            .client
            .query(
                r#"
                SELECT
                    tc.constraint_name,
                    array_agg(kcu.column_name ORDER BY kcu.ordinal_position) AS columns,
                    ccu.table_schema AS referenced_schema,
                    ccu.table_name AS referenced_table,
                    array_agg(ccu.column_name ORDER BY kcu.ordinal_position) AS referenced_columns,
                    rc.update_rule,
                    rc.delete_rule
                FROM information_schema.table_constraints tc
                JOIN information_schema.key_column_usage kcu
                    ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema
                JOIN information_schema.constraint_column_usage ccu
                    ON tc.constraint_name = ccu.constraint_name AND tc.table_schema = ccu.table_schema
                JOIN information_schema.referential_constraints rc
                    ON tc.constraint_name = rc.constraint_name AND tc.table_schema = rc.constraint_schema
                WHERE tc.constraint_type = 'FOREIGN KEY'
                  AND tc.table_schema = $1 AND tc.table_name = $2
                GROUP BY tc.constraint_name, ccu.table_schema, ccu.table_name, rc.update_rule, rc.delete_rule
                "#,
                &[&schema, &table],
            )
            .await
            .map_err(|e| ExtractionError::query_failed("extract_foreign_keys", e))?;

        Ok(rows
            .into_iter()
            .map(|row| ForeignKey {
                name: row.get("constraint_name"),
                columns: row.get("columns"),
                referenced_schema: row.get("referenced_schema"),
                referenced_table: row.get("referenced_table"),
                referenced_columns: row.get("referenced_columns"),
                on_delete: map_referential_action(row.get("delete_rule")),
                on_update: map_referential_action(row.get("update_rule")),
            })
            .collect())
    }

    async fn extract_indexes(&self, schema: &str, table: &str) -> Result<Vec<Index>, ExtractionError> {
        let rows = self
            .client
            .query(
                r#"
                SELECT
                    i.relname AS index_name,
                    ix.indisunique AS is_unique,
                    ix.indisprimary AS is_primary,
                    am.amname AS index_type,
                    array_agg(a.attname ORDER BY array_position(ix.indkey, a.attnum)) AS columns
                FROM pg_index ix
                JOIN pg_class t ON t.oid = ix.indrelid
                JOIN pg_class i ON i.oid = ix.indexrelid
                JOIN pg_namespace n ON n.oid = t.relnamespace
                JOIN pg_am am ON am.oid = i.relam
                JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(ix.indkey)
                WHERE n.nspname = $1 AND t.relname = $2
                GROUP BY i.relname, ix.indisunique, ix.indisprimary, am.amname
                "#,
                &[&schema, &table],
            )
            .await
            .map_err(|e| ExtractionError::query_failed("extract_indexes", e))?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let amname: String = row.get("index_type");
                Index {
                    name: row.get("index_name"),
                    index_type: map_index_type(&amname),
                    is_unique: row.get("is_unique"),
                    is_primary_key: row.get("is_primary"),
                    key_columns: row.get("columns"),
                    included_columns: Vec::new(),
                    filter_predicate: None,
                }
            })
            .collect())
    }

    async fn extract_tables(&self, options: &ExtractOptions) -> Result<Vec<Table>, ExtractionError> {
        let rows = self
            .client
            .query(
                r#"
                SELECT table_schema, table_name
                FROM information_schema.tables
                WHERE table_type = 'BASE TABLE'
                  AND table_schema NOT IN ('pg_catalog', 'information_schema')
                ORDER BY table_schema, table_name
                "#,
                &[],
            )
            .await
            .map_err(|e| ExtractionError::query_failed("extract_tables", e))?;

        let mut tables = Vec::new();
        for row in rows {
            let schema: String = row.get("table_schema");
            let name: String = row.get("table_name");
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
                self.estimate_row_count(&schema, &name).await?
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

    async fn estimate_row_count(&self, schema: &str, table: &str) -> Result<Option<u64>, ExtractionError> {
        let row = self
            .client
            .query_opt(
                "SELECT n_live_tup FROM pg_stat_user_tables WHERE schemaname = $1 AND relname = $2",
                &[&schema, &table],
            )
            .await
            .map_err(|e| ExtractionError::query_failed("estimate_row_count", e))?;
        Ok(row.and_then(|r| r.get::<_, Option<i64>>("n_live_tup")).map(|v| v.max(0) as u64))
    }

    async fn extract_views(&self, options: &ExtractOptions) -> Result<Vec<View>, ExtractionError> {
        if !options.include_definitions {
            return Ok(Vec::new());
        }
        let rows = self
            .client
            .query(
                r#"
                SELECT table_schema, table_name, view_definition
                FROM information_schema.views
                WHERE table_schema NOT IN ('pg_catalog', 'information_schema')
                "#,
                &[],
            )
            .await
            .map_err(|e| ExtractionError::query_failed("extract_views", e))?;

        Ok(rows
            .into_iter()
            .filter(|row| !is_system_schema(row.get::<_, &str>("table_schema")))
            .map(|row| View {
                schema: row.get("table_schema"),
                name: row.get("table_name"),
                definition: row.get::<_, Option<String>>("view_definition").unwrap_or_default(),
            })
            .collect())
    }
}

fn map_referential_action(rule: String) -> ReferentialAction {
    match rule.as_str() {
        "CASCADE" => ReferentialAction::Cascade,
        "SET NULL" => ReferentialAction::SetNull,
        "SET DEFAULT" => ReferentialAction::SetDefault,
        "RESTRICT" => ReferentialAction::Restrict,
        _ => ReferentialAction::NoAction,
    }
}

fn map_index_type(amname: &str) -> IndexType {
    match amname {
        "btree" => IndexType::BTree,
        "hash" => IndexType::Hash,
        "gin" => IndexType::Gin,
        "gist" => IndexType::Gist,
        "brin" => IndexType::Brin,
        _ => IndexType::BTree,
    }
}

#[async_trait]
impl SchemaExtractor for PostgresExtractor {
    async fn test_connection(&self) -> Result<ConnectionCheck, TransportError> {
        match self.client.query_one("SELECT version()", &[]).await {
            Ok(row) => Ok(ConnectionCheck {
                ok: true,
                message: "connected".to_string(),
                server_version: Some(row.get::<_, String>(0)),
            }),
            Err(e) if e.code().is_some() => Ok(ConnectionCheck {
                ok: false,
                message: e.to_string(),
                server_version: None,
            }),
            Err(e) => Err(TransportError::ConnectionFailed(e.to_string())),
        }
    }

    async fn extract(&self, options: &ExtractOptions) -> Result<DatabaseSchema, ExtractionError> {
        let db_name_row = self
            .client
            .query_one("SELECT current_database()", &[])
            .await
            .map_err(|e| ExtractionError::query_failed("current_database", e))?;
        let version_row = self
            .client
            .query_one("SELECT version()", &[])
            .await
            .map_err(|e| ExtractionError::query_failed("version", e))?;

        let tables = self.extract_tables(options).await?;
        let views = self.extract_views(options).await?;

        Ok(DatabaseSchema {
            database_name: db_name_row.get(0),
            server_version: version_row.get(0),
            collation: None,
            extracted_at: Utc::now(),
            tables,
            views,
            procedures: Vec::new(),
            functions: Vec::new(),
            triggers: Vec::new(),
        })
    }
}
