//! [`SchemaDiffer`] — pure, synchronous comparison of two [`DatabaseSchema`]
//! values into a [`SchemaDiff`] (spec §4.2). Never suspends (spec §5).

use crate::model::diff::{BreakingChange, ChangeType, DiffCounters, DiffItem, ObjectType, Severity};
use crate::model::schema::{Column, DatabaseSchema, ForeignKey, Index, Table};
use std::collections::HashMap;

/// Stateless; a unit struct rather than free functions so call sites read the
/// same way as the other component types (`SchemaExtractor`, `CheckRegistry`).
#[derive(Debug, Default, Clone, Copy)]
pub struct SchemaDiffer;

impl SchemaDiffer {
    pub fn new() -> Self {
        Self
    }

    /// Compare `source` against `target`, producing the ordered, sorted diff
    /// described by spec §4.2. `diff(S, S)` is empty (testable property 3).
    pub fn diff(&self, source: &DatabaseSchema, target: &DatabaseSchema) -> SchemaDiff {
        let mut items = Vec::new();
        let mut breaking = Vec::new();
        let mut counters = DiffCounters::default();

        diff_tables(source, target, &mut items, &mut breaking, &mut counters);
        diff_views(source, target, &mut items);
        diff_procedures(source, target, &mut items, &mut breaking, &mut counters);
        diff_functions(source, target, &mut items, &mut breaking);

        let mut diff = SchemaDiff {
            items,
            counters,
            breaking_changes: breaking,
        };
        diff.sort_items();
        diff
    }
}

pub use crate::model::diff::SchemaDiff;

fn keyed<'a, T>(items: &'a [T], key: impl Fn(&T) -> String) -> HashMap<String, &'a T> {
    items.iter().map(|t| (key(&t), t)).collect()
}

fn diff_tables(
    source: &DatabaseSchema,
    target: &DatabaseSchema,
    items: &mut Vec<DiffItem>,
    breaking: &mut Vec<BreakingChange>,
    counters: &mut DiffCounters,
) {
    let src = keyed(&source.tables, Table::key);
    let tgt = keyed(&target.tables, Table::key);

    for (key, table) in &tgt {
        if !src.contains_key(key) {
            items.push(DiffItem {
                object_type: ObjectType::Table,
                object_name: table.full_name(),
                change_type: ChangeType::Added,
                old_value: None,
                new_value: Some(serde_json::to_value(table).unwrap_or_default()),
                details: serde_json::Value::Null,
                breaking_change: false,
            });
            counters.tables_added += 1;
        }
    }

    for (key, table) in &src {
        if !tgt.contains_key(key) {
            items.push(DiffItem {
                object_type: ObjectType::Table,
                object_name: table.full_name(),
                change_type: ChangeType::Removed,
                old_value: Some(serde_json::to_value(table).unwrap_or_default()),
                new_value: None,
                details: serde_json::Value::Null,
                breaking_change: true,
            });
            counters.tables_removed += 1;
            breaking.push(BreakingChange {
                change_type: ChangeType::Removed,
                severity: Severity::Critical,
                object_name: table.full_name(),
                description: format!("table '{}' was dropped", table.full_name()),
                data_loss_risk: true,
                remediation: Some("confirm the table's data has been migrated or archived before applying".into()),
            });
        }
    }

    for (key, target_table) in &tgt {
        let Some(source_table) = src.get(key) else {
            continue;
        };
        let mut table_modified = false;

        table_modified |= diff_columns(source_table, target_table, items, breaking);
        table_modified |= diff_indexes(source_table, target_table, items);
        table_modified |= diff_foreign_keys(source_table, target_table, items);

        if source_table.primary_key_columns != target_table.primary_key_columns {
            table_modified = true;
            items.push(DiffItem {
                object_type: ObjectType::Table,
                object_name: target_table.full_name(),
                change_type: ChangeType::Modified,
                old_value: Some(serde_json::json!(source_table.primary_key_columns)),
                new_value: Some(serde_json::json!(target_table.primary_key_columns)),
                details: serde_json::json!({"primary_key_columns": {
                    "from": source_table.primary_key_columns,
                    "to": target_table.primary_key_columns,
                }}),
                breaking_change: true,
            });
            breaking.push(BreakingChange {
                change_type: ChangeType::Modified,
                severity: Severity::High,
                object_name: target_table.full_name(),
                description: format!("primary key columns changed on '{}'", target_table.full_name()),
                data_loss_risk: false,
                remediation: Some("verify dependent foreign keys and application queries".into()),
            });
        }

        if table_modified {
            counters.tables_modified += 1;
        }
    }
}

/// Returns `true` if any column-level diff item was emitted for this table.
fn diff_columns(
    source_table: &Table,
    target_table: &Table,
    items: &mut Vec<DiffItem>,
    breaking: &mut Vec<BreakingChange>,
) -> bool {
    let src = keyed(&source_table.columns, |c| c.name.to_lowercase());
    let tgt = keyed(&target_table.columns, |c| c.name.to_lowercase());
    let mut any = false;

    for (key, column) in &tgt {
        if src.contains_key(key) {
            continue;
        }
        any = true;
        let object_name = format!("{}.{}", target_table.full_name(), column.name);
        let is_breaking = !column.is_nullable && column.default_value.is_none();
        items.push(DiffItem {
            object_type: ObjectType::Column,
            object_name: object_name.clone(),
            change_type: ChangeType::Added,
            old_value: None,
            new_value: Some(serde_json::to_value(column).unwrap_or_default()),
            details: serde_json::Value::Null,
            breaking_change: is_breaking,
        });
        if is_breaking {
            breaking.push(BreakingChange {
                change_type: ChangeType::Added,
                severity: Severity::High,
                object_name,
                description: "non-nullable column added without a default".into(),
                data_loss_risk: false,
                remediation: Some("add a default value or backfill existing rows before enforcing NOT NULL".into()),
            });
        }
    }

    for (key, column) in &src {
        if tgt.contains_key(key) {
            continue;
        }
        any = true;
        let object_name = format!("{}.{}", target_table.full_name(), column.name);
        items.push(DiffItem {
            object_type: ObjectType::Column,
            object_name: object_name.clone(),
            change_type: ChangeType::Removed,
            old_value: Some(serde_json::to_value(column).unwrap_or_default()),
            new_value: None,
            details: serde_json::Value::Null,
            breaking_change: true,
        });
        breaking.push(BreakingChange {
            change_type: ChangeType::Removed,
            severity: Severity::Critical,
            object_name,
            description: format!("column '{}' was dropped", column.name),
            data_loss_risk: true,
            remediation: Some("confirm the column's data is no longer required".into()),
        });
    }

    for (key, target_col) in &tgt {
        let Some(source_col) = src.get(key) else {
            continue;
        };
        if let Some((details, is_breaking)) = column_change_details(source_col, target_col) {
            any = true;
            let object_name = format!("{}.{}", target_table.full_name(), target_col.name);
            items.push(DiffItem {
                object_type: ObjectType::Column,
                object_name: object_name.clone(),
                change_type: ChangeType::Modified,
                old_value: Some(serde_json::to_value(source_col).unwrap_or_default()),
                new_value: Some(serde_json::to_value(target_col).unwrap_or_default()),
                details: details.clone(),
                breaking_change: is_breaking,
            });
            if is_breaking {
                breaking.push(BreakingChange {
                    change_type: ChangeType::Modified,
                    severity: Severity::High,
                    object_name,
                    description: format!("column attributes changed: {}", details),
                    data_loss_risk: details.get("data_type").is_some() || details.get("max_length").is_some(),
                    remediation: Some("verify the new shape is compatible with existing data and clients".into()),
                });
            }
        }
    }

    any
}

/// Per-attribute `{from, to}` details (spec §4.2 step 3) and whether the
/// overall change is breaking (spec §4.2 step 4).
fn column_change_details(source: &Column, target: &Column) -> Option<(serde_json::Value, bool)> {
    let mut details = serde_json::Map::new();
    let mut breaking = false;

    if source.data_type != target.data_type {
        details.insert(
            "data_type".into(),
            serde_json::json!({"from": source.data_type, "to": target.data_type}),
        );
        if source.data_type.narrows_to(target.data_type) {
            breaking = true;
        }
    }
    if source.max_length != target.max_length {
        details.insert(
            "max_length".into(),
            serde_json::json!({"from": source.max_length, "to": target.max_length}),
        );
        let shrinks = target.max_length != -1 && (source.max_length == -1 || target.max_length < source.max_length);
        if shrinks {
            breaking = true;
        }
    }
    if source.precision != target.precision {
        details.insert(
            "precision".into(),
            serde_json::json!({"from": source.precision, "to": target.precision}),
        );
    }
    if source.scale != target.scale {
        details.insert("scale".into(), serde_json::json!({"from": source.scale, "to": target.scale}));
    }
    if source.is_nullable != target.is_nullable {
        details.insert(
            "is_nullable".into(),
            serde_json::json!({"from": source.is_nullable, "to": target.is_nullable}),
        );
        if source.is_nullable && !target.is_nullable {
            breaking = true;
        }
    }
    if source.default_value != target.default_value {
        details.insert(
            "default_value".into(),
            serde_json::json!({"from": source.default_value, "to": target.default_value}),
        );
    }
    if source.is_identity != target.is_identity {
        details.insert(
            "is_identity".into(),
            serde_json::json!({"from": source.is_identity, "to": target.is_identity}),
        );
    }

    if details.is_empty() {
        None
    } else {
        Some((serde_json::Value::Object(details), breaking))
    }
}

fn diff_indexes(source_table: &Table, target_table: &Table, items: &mut Vec<DiffItem>) -> bool {
    let src = keyed(&source_table.indexes, |i| i.name.to_lowercase());
    let tgt = keyed(&target_table.indexes, |i| i.name.to_lowercase());
    let mut any = false;

    for (key, index) in &tgt {
        if src.contains_key(key) {
            continue;
        }
        any = true;
        items.push(DiffItem {
            object_type: ObjectType::Index,
            object_name: format!("{}.{}", target_table.full_name(), index.name),
            change_type: ChangeType::Added,
            old_value: None,
            new_value: Some(serde_json::to_value(index).unwrap_or_default()),
            details: serde_json::Value::Null,
            breaking_change: false,
        });
    }
    for (key, index) in &src {
        if tgt.contains_key(key) {
            continue;
        }
        any = true;
        items.push(DiffItem {
            object_type: ObjectType::Index,
            object_name: format!("{}.{}", target_table.full_name(), index.name),
            change_type: ChangeType::Removed,
            old_value: Some(serde_json::to_value(index).unwrap_or_default()),
            new_value: None,
            details: serde_json::Value::Null,
            breaking_change: false,
        });
    }
    for (key, target_index) in &tgt {
        let Some(source_index) = src.get(key) else { continue };
        if index_differs(source_index, target_index) {
            any = true;
            items.push(DiffItem {
                object_type: ObjectType::Index,
                object_name: format!("{}.{}", target_table.full_name(), target_index.name),
                change_type: ChangeType::Modified,
                old_value: Some(serde_json::to_value(source_index).unwrap_or_default()),
                new_value: Some(serde_json::to_value(target_index).unwrap_or_default()),
                details: serde_json::Value::Null,
                breaking_change: false,
            });
        }
    }
    any
}

fn index_differs(a: &Index, b: &Index) -> bool {
    a.is_unique != b.is_unique
        || a.index_type != b.index_type
        || a.key_columns != b.key_columns
        || a.included_columns != b.included_columns
        || a.filter_predicate != b.filter_predicate
}

fn diff_foreign_keys(source_table: &Table, target_table: &Table, items: &mut Vec<DiffItem>) -> bool {
    let src = keyed(&source_table.foreign_keys, |fk| fk.name.to_lowercase());
    let tgt = keyed(&target_table.foreign_keys, |fk| fk.name.to_lowercase());
    let mut any = false;

    for (key, fk) in &tgt {
        if src.contains_key(key) {
            continue;
        }
        any = true;
        items.push(DiffItem {
            object_type: ObjectType::ForeignKey,
            object_name: format!("{}.{}", target_table.full_name(), fk.name),
            change_type: ChangeType::Added,
            old_value: None,
            new_value: Some(serde_json::to_value(fk).unwrap_or_default()),
            details: serde_json::Value::Null,
            breaking_change: false,
        });
    }
    for (key, fk) in &src {
        if tgt.contains_key(key) {
            continue;
        }
        any = true;
        items.push(DiffItem {
            object_type: ObjectType::ForeignKey,
            object_name: format!("{}.{}", target_table.full_name(), fk.name),
            change_type: ChangeType::Removed,
            old_value: Some(serde_json::to_value(fk).unwrap_or_default()),
            new_value: None,
            details: serde_json::Value::Null,
            breaking_change: false,
        });
    }
    for (key, target_fk) in &tgt {
        let Some(source_fk) = src.get(key) else { continue };
        if fk_differs(source_fk, target_fk) {
            any = true;
            items.push(DiffItem {
                object_type: ObjectType::ForeignKey,
                object_name: format!("{}.{}", target_table.full_name(), target_fk.name),
                change_type: ChangeType::Modified,
                old_value: Some(serde_json::to_value(source_fk).unwrap_or_default()),
                new_value: Some(serde_json::to_value(target_fk).unwrap_or_default()),
                details: serde_json::Value::Null,
                breaking_change: false,
            });
        }
    }
    any
}

fn fk_differs(a: &ForeignKey, b: &ForeignKey) -> bool {
    a.columns != b.columns
        || a.referenced_schema.to_lowercase() != b.referenced_schema.to_lowercase()
        || a.referenced_table.to_lowercase() != b.referenced_table.to_lowercase()
        || a.referenced_columns != b.referenced_columns
        || a.on_delete != b.on_delete
        || a.on_update != b.on_update
}

fn diff_views(source: &DatabaseSchema, target: &DatabaseSchema, items: &mut Vec<DiffItem>) {
    let src = keyed(&source.views, |v| v.key());
    let tgt = keyed(&target.views, |v| v.key());

    for (key, view) in &tgt {
        if !src.contains_key(key) {
            items.push(DiffItem {
                object_type: ObjectType::View,
                object_name: view.full_name(),
                change_type: ChangeType::Added,
                old_value: None,
                new_value: Some(serde_json::to_value(view).unwrap_or_default()),
                details: serde_json::Value::Null,
                breaking_change: false,
            });
        }
    }
    for (key, view) in &src {
        if !tgt.contains_key(key) {
            items.push(DiffItem {
                object_type: ObjectType::View,
                object_name: view.full_name(),
                change_type: ChangeType::Removed,
                old_value: Some(serde_json::to_value(view).unwrap_or_default()),
                new_value: None,
                details: serde_json::Value::Null,
                breaking_change: true,
            });
        }
    }
    for (key, target_view) in &tgt {
        let Some(source_view) = src.get(key) else { continue };
        if canonical_text(&source_view.definition) != canonical_text(&target_view.definition) {
            items.push(DiffItem {
                object_type: ObjectType::View,
                object_name: target_view.full_name(),
                change_type: ChangeType::Modified,
                old_value: Some(serde_json::json!(source_view.definition)),
                new_value: Some(serde_json::json!(target_view.definition)),
                details: serde_json::json!({"definition_changed": true}),
                breaking_change: false,
            });
        }
    }
}

fn diff_procedures(
    source: &DatabaseSchema,
    target: &DatabaseSchema,
    items: &mut Vec<DiffItem>,
    breaking: &mut Vec<BreakingChange>,
    counters: &mut DiffCounters,
) {
    let src = keyed(&source.procedures, |p| p.key());
    let tgt = keyed(&target.procedures, |p| p.key());

    for (key, proc) in &tgt {
        if !src.contains_key(key) {
            items.push(DiffItem {
                object_type: ObjectType::Procedure,
                object_name: proc.full_name(),
                change_type: ChangeType::Added,
                old_value: None,
                new_value: Some(serde_json::to_value(proc).unwrap_or_default()),
                details: serde_json::Value::Null,
                breaking_change: false,
            });
            counters.procedures_added += 1;
        }
    }
    for (key, proc) in &src {
        if !tgt.contains_key(key) {
            items.push(DiffItem {
                object_type: ObjectType::Procedure,
                object_name: proc.full_name(),
                change_type: ChangeType::Removed,
                old_value: Some(serde_json::to_value(proc).unwrap_or_default()),
                new_value: None,
                details: serde_json::Value::Null,
                breaking_change: true,
            });
            counters.procedures_removed += 1;
            breaking.push(BreakingChange {
                change_type: ChangeType::Removed,
                severity: Severity::High,
                object_name: proc.full_name(),
                description: format!("procedure '{}' was dropped", proc.full_name()),
                data_loss_risk: false,
                remediation: Some("confirm no callers still invoke this procedure".into()),
            });
        }
    }
    for (key, target_proc) in &tgt {
        let Some(source_proc) = src.get(key) else { continue };
        let definition_changed = canonical_text(&source_proc.definition) != canonical_text(&target_proc.definition);
        let signature_change = signature_change_breaking(&source_proc.parameters, &target_proc.parameters);

        if definition_changed || signature_change.is_some() {
            counters.procedures_modified += 1;
            let description = signature_change.clone().unwrap_or_default();
            items.push(DiffItem {
                object_type: ObjectType::Procedure,
                object_name: target_proc.full_name(),
                change_type: ChangeType::Modified,
                old_value: Some(serde_json::to_value(source_proc).unwrap_or_default()),
                new_value: Some(serde_json::to_value(target_proc).unwrap_or_default()),
                details: serde_json::json!({
                    "definition_changed": definition_changed,
                    "signature_change": description,
                }),
                breaking_change: signature_change.is_some(),
            });
            if let Some(reason) = signature_change {
                breaking.push(BreakingChange {
                    change_type: ChangeType::Modified,
                    severity: Severity::Medium,
                    object_name: target_proc.full_name(),
                    description: reason,
                    data_loss_risk: false,
                    remediation: Some("update callers to match the new parameter list".into()),
                });
            }
        }
    }
}

fn diff_functions(source: &DatabaseSchema, target: &DatabaseSchema, items: &mut Vec<DiffItem>, breaking: &mut Vec<BreakingChange>) {
    let src = keyed(&source.functions, |f| f.key());
    let tgt = keyed(&target.functions, |f| f.key());

    for (key, func) in &tgt {
        if !src.contains_key(key) {
            items.push(DiffItem {
                object_type: ObjectType::Function,
                object_name: func.full_name(),
                change_type: ChangeType::Added,
                old_value: None,
                new_value: Some(serde_json::to_value(func).unwrap_or_default()),
                details: serde_json::Value::Null,
                breaking_change: false,
            });
        }
    }
    for (key, func) in &src {
        if !tgt.contains_key(key) {
            items.push(DiffItem {
                object_type: ObjectType::Function,
                object_name: func.full_name(),
                change_type: ChangeType::Removed,
                old_value: Some(serde_json::to_value(func).unwrap_or_default()),
                new_value: None,
                details: serde_json::Value::Null,
                breaking_change: true,
            });
            breaking.push(BreakingChange {
                change_type: ChangeType::Removed,
                severity: Severity::High,
                object_name: func.full_name(),
                description: format!("function '{}' was dropped", func.full_name()),
                data_loss_risk: false,
                remediation: Some("confirm no callers still invoke this function".into()),
            });
        }
    }
    for (key, target_func) in &tgt {
        let Some(source_func) = src.get(key) else { continue };
        let definition_changed = canonical_text(&source_func.definition) != canonical_text(&target_func.definition);
        let signature_change = signature_change_breaking(&source_func.parameters, &target_func.parameters);
        let return_type_changed = source_func.return_type != target_func.return_type;

        if definition_changed || signature_change.is_some() || return_type_changed {
            let breaking_now = signature_change.is_some() || return_type_changed;
            items.push(DiffItem {
                object_type: ObjectType::Function,
                object_name: target_func.full_name(),
                change_type: ChangeType::Modified,
                old_value: Some(serde_json::to_value(source_func).unwrap_or_default()),
                new_value: Some(serde_json::to_value(target_func).unwrap_or_default()),
                details: serde_json::json!({
                    "definition_changed": definition_changed,
                    "return_type": {"from": source_func.return_type, "to": target_func.return_type},
                }),
                breaking_change: breaking_now,
            });
            if breaking_now {
                let description = signature_change.unwrap_or_else(|| "return type changed".to_string());
                breaking.push(BreakingChange {
                    change_type: ChangeType::Modified,
                    severity: Severity::Medium,
                    object_name: target_func.full_name(),
                    description,
                    data_loss_risk: false,
                    remediation: Some("update callers to match the new signature".into()),
                });
            }
        }
    }
}

/// `Some(reason)` when a parameter was added without a default, removed, or
/// changed type — spec §4.2 rule 4's "procedure/function signature change".
fn signature_change_breaking(
    source_params: &[crate::model::schema::Parameter],
    target_params: &[crate::model::schema::Parameter],
) -> Option<String> {
    let src: HashMap<_, _> = source_params.iter().map(|p| (p.name.to_lowercase(), p)).collect();
    let tgt: HashMap<_, _> = target_params.iter().map(|p| (p.name.to_lowercase(), p)).collect();

    for (name, param) in &tgt {
        if !src.contains_key(name) && !param.has_default {
            return Some(format!("parameter '{}' added without a default", param.name));
        }
    }
    for (name, param) in &src {
        if !tgt.contains_key(name) {
            return Some(format!("parameter '{}' removed", param.name));
        }
    }
    for (name, target_param) in &tgt {
        if let Some(source_param) = src.get(name) {
            if source_param.data_type != target_param.data_type {
                return Some(format!("parameter '{}' type changed", target_param.name));
            }
        }
    }
    None
}

fn canonical_text(text: &str) -> String {
    text.replace("\r\n", "\n")
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::schema::{Column, DataType, Table};
    use chrono::Utc;

    fn empty_schema() -> DatabaseSchema {
        DatabaseSchema {
            database_name: "AppDb".into(),
            server_version: "15.0".into(),
            collation: None,
            extracted_at: Utc::now(),
            tables: vec![],
            views: vec![],
            procedures: vec![],
            functions: vec![],
            triggers: vec![],
        }
    }

    fn users_table(email_nullable: bool) -> Table {
        Table {
            schema: "dbo".into(),
            name: "Users".into(),
            columns: vec![
                Column {
                    name: "Id".into(),
                    data_type: DataType::Int,
                    raw_type: "int".into(),
                    max_length: -1,
                    precision: None,
                    scale: None,
                    is_nullable: false,
                    is_identity: true,
                    is_primary_key: true,
                    is_computed: false,
                    computed_expression: None,
                    default_value: None,
                    ordinal_position: 1,
                },
                Column {
                    name: "Email".into(),
                    data_type: DataType::NVarchar,
                    raw_type: "nvarchar(255)".into(),
                    max_length: 255,
                    precision: None,
                    scale: None,
                    is_nullable: email_nullable,
                    is_identity: false,
                    is_primary_key: false,
                    is_computed: false,
                    computed_expression: None,
                    default_value: None,
                    ordinal_position: 2,
                },
            ],
            indexes: vec![],
            foreign_keys: vec![],
            primary_key_columns: vec!["Id".into()],
            row_count: None,
            is_temporal: false,
            history_table: None,
        }
    }

    #[test]
    fn diff_of_identical_schemas_is_empty() {
        let mut schema = empty_schema();
        schema.tables.push(users_table(false));
        let diff = SchemaDiffer::new().diff(&schema, &schema);
        assert!(diff.is_empty());
        assert!(!diff.has_breaking_changes());
    }

    #[test]
    fn s1_adding_nullable_column_is_non_breaking() {
        let mut source = empty_schema();
        source.tables.push(users_table(false));
        let mut target = empty_schema();
        let mut table = users_table(false);
        table.columns.push(Column {
            name: "LastLogin".into(),
            data_type: DataType::DateTime2,
            raw_type: "datetime2".into(),
            max_length: -1,
            precision: None,
            scale: None,
            is_nullable: true,
            is_identity: false,
            is_primary_key: false,
            is_computed: false,
            computed_expression: None,
            default_value: None,
            ordinal_position: 3,
        });
        target.tables.push(table);

        let diff = SchemaDiffer::new().diff(&source, &target);
        assert_eq!(diff.items.len(), 1);
        let item = &diff.items[0];
        assert_eq!(item.object_type, ObjectType::Column);
        assert_eq!(item.change_type, ChangeType::Added);
        assert_eq!(item.object_name, "dbo.Users.LastLogin");
        assert!(!item.breaking_change);
        assert!(!diff.has_breaking_changes());
    }

    #[test]
    fn s2_dropping_table_is_breaking_with_critical_severity() {
        let mut source = empty_schema();
        source.tables.push(Table {
            name: "Legacy".into(),
            ..users_table(false)
        });
        let target = empty_schema();

        let diff = SchemaDiffer::new().diff(&source, &target);
        assert_eq!(diff.items.len(), 1);
        assert_eq!(diff.items[0].change_type, ChangeType::Removed);
        assert!(diff.items[0].breaking_change);
        assert_eq!(diff.breaking_changes.len(), 1);
        assert_eq!(diff.breaking_changes[0].severity, Severity::Critical);
        assert!(diff.breaking_changes[0].data_loss_risk);
    }

    #[test]
    fn s3_narrowing_type_change_is_breaking() {
        let mut source = empty_schema();
        let mut target = empty_schema();
        let mut src_table = users_table(false);
        let mut tgt_table = users_table(false);
        src_table.columns.push(Column {
            name: "Amount".into(),
            data_type: DataType::BigInt,
            raw_type: "bigint".into(),
            max_length: -1,
            precision: None,
            scale: None,
            is_nullable: false,
            is_identity: false,
            is_primary_key: false,
            is_computed: false,
            computed_expression: None,
            default_value: None,
            ordinal_position: 3,
        });
        tgt_table.columns.push(Column {
            name: "Amount".into(),
            data_type: DataType::Int,
            raw_type: "int".into(),
            max_length: -1,
            precision: None,
            scale: None,
            is_nullable: false,
            is_identity: false,
            is_primary_key: false,
            is_computed: false,
            computed_expression: None,
            default_value: None,
            ordinal_position: 3,
        });
        source.tables.push(src_table);
        target.tables.push(tgt_table);

        let diff = SchemaDiffer::new().diff(&source, &target);
        let amount_item = diff
            .items
            .iter()
            .find(|i| i.object_name == "dbo.Users.Amount")
            .expect("amount diff item present");
        assert_eq!(amount_item.change_type, ChangeType::Modified);
        assert!(amount_item.breaking_change);
        assert_eq!(amount_item.details["data_type"]["from"], serde_json::json!("bigint"));
    }

    #[test]
    fn not_nullable_to_nullable_is_not_breaking_but_reverse_is() {
        let mut source = empty_schema();
        source.tables.push(users_table(true));
        let mut target = empty_schema();
        target.tables.push(users_table(false));

        let diff = SchemaDiffer::new().diff(&source, &target);
        let item = diff.items.iter().find(|i| i.object_name == "dbo.Users.Email").unwrap();
        assert!(item.breaking_change);
    }
}
