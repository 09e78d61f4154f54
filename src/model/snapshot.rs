//! [`SchemaSnapshot`] — a hashed, persistable wrapper around a
//! [`DatabaseSchema`], and the canonicalization rules used to hash it.

use crate::ids::{ConnectionId, SnapshotId, TenantId};
use crate::model::schema::{Column, DatabaseSchema, ForeignKey, Index, Table};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub id: SnapshotId,
    pub connection_id: ConnectionId,
    pub tenant_id: TenantId,
    pub schema: DatabaseSchema,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<String>,
    pub label: Option<String>,
    pub is_baseline: bool,
    pub content_hash: String,
}

/// Canonicalize a column's `max_length` for hashing: `-1` (unbounded / MAX)
/// becomes the sentinel string `"MAX"`, everything else is the decimal value.
fn canonical_max_length(max_length: i64) -> String {
    if max_length == -1 {
        "MAX".to_string()
    } else {
        max_length.to_string()
    }
}

/// Normalize line endings to `\n` and strip trailing whitespace on each line,
/// per §4.1's canonicalization rule for definitions.
fn canonical_definition(text: &str) -> String {
    text.replace("\r\n", "\n")
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

fn canonical_column(c: &Column) -> serde_json::Value {
    serde_json::json!({
        "name": c.name.to_lowercase(),
        "data_type": c.data_type,
        "max_length": canonical_max_length(c.max_length),
        "precision": c.precision,
        "scale": c.scale,
        "is_nullable": c.is_nullable,
        "is_identity": c.is_identity,
        "is_primary_key": c.is_primary_key,
        "is_computed": c.is_computed,
        "default_value": c.default_value,
        "ordinal_position": c.ordinal_position,
    })
}

fn canonical_index(i: &Index) -> serde_json::Value {
    serde_json::json!({
        "name": i.name.to_lowercase(),
        "index_type": i.index_type,
        "is_unique": i.is_unique,
        "is_primary_key": i.is_primary_key,
        "key_columns": i.key_columns,
        "included_columns": i.included_columns,
        "filter_predicate": i.filter_predicate,
    })
}

fn canonical_fk(fk: &ForeignKey) -> serde_json::Value {
    serde_json::json!({
        "name": fk.name.to_lowercase(),
        "columns": fk.columns,
        "referenced_schema": fk.referenced_schema.to_lowercase(),
        "referenced_table": fk.referenced_table.to_lowercase(),
        "referenced_columns": fk.referenced_columns,
        "on_delete": fk.on_delete,
        "on_update": fk.on_update,
    })
}

fn canonical_table(t: &Table) -> serde_json::Value {
    let mut columns: Vec<_> = t.columns.iter().map(canonical_column).collect();
    columns.sort_by_key(|v| v["ordinal_position"].as_u64().unwrap_or(0));
    let mut indexes: Vec<_> = t.indexes.iter().map(canonical_index).collect();
    indexes.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));
    let mut fks: Vec<_> = t.foreign_keys.iter().map(canonical_fk).collect();
    fks.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));

    serde_json::json!({
        "schema": t.schema.to_lowercase(),
        "name": t.name.to_lowercase(),
        "columns": columns,
        "indexes": indexes,
        "foreign_keys": fks,
        "primary_key_columns": t.primary_key_columns,
        "is_temporal": t.is_temporal,
    })
}

/// Build the canonical JSON value hashed by [`content_hash`]. Every
/// collection is sorted by its stable key so that hash determinism does not
/// depend on extractor iteration order.
pub fn canonicalize(schema: &DatabaseSchema) -> serde_json::Value {
    let mut tables: Vec<_> = schema.tables.iter().map(canonical_table).collect();
    tables.sort_by(|a, b| {
        (a["schema"].as_str(), a["name"].as_str()).cmp(&(b["schema"].as_str(), b["name"].as_str()))
    });

    let mut views: Vec<_> = schema
        .views
        .iter()
        .map(|v| {
            serde_json::json!({
                "schema": v.schema.to_lowercase(),
                "name": v.name.to_lowercase(),
                "definition": canonical_definition(&v.definition),
            })
        })
        .collect();
    views.sort_by(|a, b| (a["schema"].as_str(), a["name"].as_str()).cmp(&(b["schema"].as_str(), b["name"].as_str())));

    let mut procedures: Vec<_> = schema
        .procedures
        .iter()
        .map(|p| {
            serde_json::json!({
                "schema": p.schema.to_lowercase(),
                "name": p.name.to_lowercase(),
                "definition": canonical_definition(&p.definition),
                "parameters": p.parameters,
            })
        })
        .collect();
    procedures.sort_by(|a, b| (a["schema"].as_str(), a["name"].as_str()).cmp(&(b["schema"].as_str(), b["name"].as_str())));

    let mut functions: Vec<_> = schema
        .functions
        .iter()
        .map(|f| {
            serde_json::json!({
                "schema": f.schema.to_lowercase(),
                "name": f.name.to_lowercase(),
                "definition": canonical_definition(&f.definition),
                "parameters": f.parameters,
                "return_type": f.return_type,
                "kind": f.kind,
            })
        })
        .collect();
    functions.sort_by(|a, b| (a["schema"].as_str(), a["name"].as_str()).cmp(&(b["schema"].as_str(), b["name"].as_str())));

    serde_json::json!({
        "database_name": schema.database_name,
        "server_version": schema.server_version,
        "collation": schema.collation,
        "tables": tables,
        "views": views,
        "procedures": procedures,
        "functions": functions,
    })
}

/// SHA-256 over the canonical JSON serialization of `schema`. Deterministic
/// across runs given byte-equal canonicalized input (invariant 1, §8).
pub fn content_hash(schema: &DatabaseSchema) -> String {
    let canonical = canonicalize(schema);
    // `serde_json::Value`'s `Serialize` impl preserves map insertion order,
    // and every object above was built with keys in a fixed literal order,
    // so this serialization is stable across process runs.
    let bytes = serde_json::to_vec(&canonical).expect("canonical schema always serializes");
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    format!("{:x}", hasher.finalize())
}

impl SchemaSnapshot {
    pub fn new(
        connection_id: ConnectionId,
        tenant_id: TenantId,
        schema: DatabaseSchema,
        created_by: Option<String>,
        label: Option<String>,
        is_baseline: bool,
    ) -> Self {
        let content_hash = content_hash(&schema);
        Self {
            id: SnapshotId::new(),
            connection_id,
            tenant_id,
            schema,
            created_at: Utc::now(),
            created_by,
            label,
            is_baseline,
            content_hash,
        }
    }

    /// Render the §6.4 on-wire file format: lexicographically sorted keys,
    /// LF line endings, UTF-8, no trailing whitespace, no BOM.
    pub fn to_canonical_json(&self) -> String {
        let value = serde_json::json!({
            "content_hash": self.content_hash,
            "connection_id": self.connection_id.as_str(),
            "created_at": self.created_at.to_rfc3339(),
            "created_by": self.created_by,
            "id": self.id.as_str(),
            "is_baseline": self.is_baseline,
            "label": self.label,
            "schema": canonicalize(&self.schema),
            "tenant_id": self.tenant_id.as_str(),
        });
        serde_json::to_string_pretty(&sort_keys(&value)).expect("snapshot always serializes")
    }
}

/// Recursively rebuild a `Value` with object keys in lexicographic order.
/// `serde_json`'s default map is insertion-ordered; this walks the tree so
/// nested objects (e.g. `schema.tables[].columns[]`) are also sorted,
/// matching the "keys lexicographically sorted" requirement in §6.4.
fn sort_keys(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut sorted = serde_json::Map::new();
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            for key in keys {
                sorted.insert(key.clone(), sort_keys(&map[&key]));
            }
            serde_json::Value::Object(sorted)
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(sort_keys).collect())
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::schema::View;

    fn empty_schema() -> DatabaseSchema {
        DatabaseSchema {
            database_name: "AppDb".into(),
            server_version: "15.0".into(),
            collation: Some("SQL_Latin1_General_CP1_CI_AS".into()),
            extracted_at: Utc::now(),
            tables: vec![],
            views: vec![],
            procedures: vec![],
            functions: vec![],
            triggers: vec![],
        }
    }

    #[test]
    fn hash_is_deterministic_for_equal_input() {
        let a = empty_schema();
        let b = empty_schema();
        assert_eq!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn hash_ignores_collection_iteration_order() {
        let mut a = empty_schema();
        let mut b = empty_schema();
        a.views.push(View {
            schema: "dbo".into(),
            name: "vOne".into(),
            definition: "SELECT 1".into(),
        });
        a.views.push(View {
            schema: "dbo".into(),
            name: "vTwo".into(),
            definition: "SELECT 2".into(),
        });
        b.views.push(View {
            schema: "dbo".into(),
            name: "vTwo".into(),
            definition: "SELECT 2".into(),
        });
        b.views.push(View {
            schema: "dbo".into(),
            name: "vOne".into(),
            definition: "SELECT 1".into(),
        });
        assert_eq!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn definition_whitespace_is_canonicalized() {
        let mut a = empty_schema();
        let mut b = empty_schema();
        a.views.push(View {
            schema: "dbo".into(),
            name: "v".into(),
            definition: "SELECT 1\r\n".into(),
        });
        b.views.push(View {
            schema: "dbo".into(),
            name: "v".into(),
            definition: "SELECT 1   \n".into(),
        });
        assert_eq!(content_hash(&a), content_hash(&b));
    }
}
