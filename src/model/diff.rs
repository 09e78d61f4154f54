//! Output types for [`crate::schema::differ::SchemaDiffer`].

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    Table,
    Column,
    Index,
    ForeignKey,
    View,
    Procedure,
    Function,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Added,
    Removed,
    Modified,
}

/// A single detected difference. `object_name` is fully qualified
/// (`schema.name` or `schema.table.column`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffItem {
    pub object_type: ObjectType,
    pub object_name: String,
    pub change_type: ChangeType,
    pub old_value: Option<serde_json::Value>,
    pub new_value: Option<serde_json::Value>,
    pub details: serde_json::Value,
    pub breaking_change: bool,
}

impl DiffItem {
    /// Sort key matching the spec's `(object_type, change_type, object_name)`
    /// ordering requirement.
    pub fn sort_key(&self) -> (ObjectType, ChangeType, String) {
        (self.object_type, self.change_type, self.object_name.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakingChange {
    pub change_type: ChangeType,
    pub severity: Severity,
    pub object_name: String,
    pub description: String,
    pub data_loss_risk: bool,
    pub remediation: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiffCounters {
    pub tables_added: u32,
    pub tables_removed: u32,
    pub tables_modified: u32,
    pub columns_added: u32,
    pub columns_removed: u32,
    pub columns_modified: u32,
    pub procedures_added: u32,
    pub procedures_removed: u32,
    pub procedures_modified: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaDiff {
    pub items: Vec<DiffItem>,
    pub counters: DiffCounters,
    pub breaking_changes: Vec<BreakingChange>,
}

impl SchemaDiff {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn sort_items(&mut self) {
        self.items.sort_by(|a, b| {
            let (at, ac, an) = a.sort_key();
            let (bt, bc, bn) = b.sort_key();
            at.cmp(&bt)
                .then(ac.cmp(&bc))
                .then_with(|| an.cmp(&bn))
                .then(Ordering::Equal)
        });
    }

    pub fn has_breaking_changes(&self) -> bool {
        !self.breaking_changes.is_empty()
    }
}
