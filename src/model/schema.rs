//! Vendor-neutral schema entities populated by a [`crate::schema::SchemaExtractor`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Normalized type tag. Vendor-specific raw type strings are mapped onto this
/// fixed set by each engine's `TypeNormalizer`; anything not recognized maps
/// to `Unknown` with the raw string preserved on the `Column`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    #[serde(rename = "int")]
    Int,
    #[serde(rename = "bigint")]
    BigInt,
    #[serde(rename = "smallint")]
    SmallInt,
    #[serde(rename = "tinyint")]
    TinyInt,
    #[serde(rename = "decimal")]
    Decimal,
    #[serde(rename = "numeric")]
    Numeric,
    #[serde(rename = "float")]
    Float,
    #[serde(rename = "real")]
    Real,
    #[serde(rename = "money")]
    Money,
    #[serde(rename = "bit")]
    Bit,
    #[serde(rename = "boolean")]
    Boolean,
    #[serde(rename = "char")]
    Char,
    #[serde(rename = "varchar")]
    Varchar,
    #[serde(rename = "nchar")]
    NChar,
    #[serde(rename = "nvarchar")]
    NVarchar,
    #[serde(rename = "text")]
    Text,
    #[serde(rename = "ntext")]
    NText,
    #[serde(rename = "date")]
    Date,
    #[serde(rename = "time")]
    Time,
    #[serde(rename = "datetime")]
    DateTime,
    #[serde(rename = "datetime2")]
    DateTime2,
    #[serde(rename = "smalldatetime")]
    SmallDateTime,
    #[serde(rename = "datetimeoffset")]
    DateTimeOffset,
    #[serde(rename = "timestamp")]
    Timestamp,
    #[serde(rename = "binary")]
    Binary,
    #[serde(rename = "varbinary")]
    VarBinary,
    #[serde(rename = "image")]
    Image,
    #[serde(rename = "bytea")]
    Bytea,
    #[serde(rename = "uniqueidentifier")]
    UniqueIdentifier,
    #[serde(rename = "uuid")]
    Uuid,
    #[serde(rename = "xml")]
    Xml,
    #[serde(rename = "json")]
    Json,
    #[serde(rename = "jsonb")]
    Jsonb,
    #[serde(rename = "geography")]
    Geography,
    #[serde(rename = "geometry")]
    Geometry,
    #[serde(rename = "hierarchyid")]
    HierarchyId,
    #[serde(rename = "sql_variant")]
    SqlVariant,
    #[serde(rename = "inet")]
    Inet,
    #[serde(rename = "cidr")]
    Cidr,
    #[serde(rename = "macaddr")]
    MacAddr,
    #[serde(rename = "serial")]
    Serial,
    #[serde(rename = "bigserial")]
    BigSerial,
    #[serde(rename = "unknown")]
    Unknown,
}

impl DataType {
    /// Documented narrowing conversions used by the differ's breaking-change
    /// rule. `self` is the old type, `other` the new one.
    pub fn narrows_to(&self, other: DataType) -> bool {
        use DataType::*;
        matches!(
            (self, other),
            (BigInt, Int)
                | (BigInt, SmallInt)
                | (BigInt, TinyInt)
                | (Int, SmallInt)
                | (Int, TinyInt)
                | (SmallInt, TinyInt)
                | (NVarchar, Varchar)
                | (NChar, Char)
                | (NText, Text)
                | (Decimal, Int)
                | (Decimal, BigInt)
                | (Numeric, Int)
                | (Numeric, BigInt)
                | (Float, Real)
                | (DateTime2, DateTime)
                | (DateTime2, SmallDateTime)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexType {
    Clustered,
    NonClustered,
    ClusteredColumnstore,
    NonClusteredColumnstore,
    BTree,
    Hash,
    Gin,
    Gist,
    Brin,
    Spatial,
    Xml,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReferentialAction {
    NoAction,
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionKind {
    Scalar,
    InlineTable,
    MultiStatementTable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerTiming {
    After,
    InsteadOf,
}

/// A single column. `max_length == -1` means unbounded ("MAX"); it is
/// normalized to the sentinel string `"MAX"` during hashing canonicalization,
/// not here, so the live value stays a plain integer for comparisons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
    pub raw_type: String,
    pub max_length: i64,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
    pub is_nullable: bool,
    pub is_identity: bool,
    pub is_primary_key: bool,
    pub is_computed: bool,
    pub computed_expression: Option<String>,
    pub default_value: Option<String>,
    pub ordinal_position: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Index {
    pub name: String,
    pub index_type: IndexType,
    pub is_unique: bool,
    pub is_primary_key: bool,
    pub key_columns: Vec<String>,
    pub included_columns: Vec<String>,
    pub filter_predicate: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub name: String,
    pub columns: Vec<String>,
    pub referenced_schema: String,
    pub referenced_table: String,
    pub referenced_columns: Vec<String>,
    pub on_delete: ReferentialAction,
    pub on_update: ReferentialAction,
}

impl ForeignKey {
    pub fn is_well_formed(&self) -> bool {
        !self.columns.is_empty() && self.columns.len() == self.referenced_columns.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub schema: String,
    pub name: String,
    pub columns: Vec<Column>,
    pub indexes: Vec<Index>,
    pub foreign_keys: Vec<ForeignKey>,
    pub primary_key_columns: Vec<String>,
    pub row_count: Option<u64>,
    pub is_temporal: bool,
    pub history_table: Option<String>,
}

impl Table {
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    pub fn key(&self) -> String {
        format!("{}.{}", self.schema.to_lowercase(), self.name.to_lowercase())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub data_type: DataType,
    pub raw_type: String,
    pub has_default: bool,
    pub is_output: bool,
    pub ordinal_position: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Procedure {
    pub schema: String,
    pub name: String,
    pub definition: String,
    pub parameters: Vec<Parameter>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub schema: String,
    pub name: String,
    pub definition: String,
    pub parameters: Vec<Parameter>,
    pub return_type: DataType,
    pub kind: FunctionKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct View {
    pub schema: String,
    pub name: String,
    pub definition: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    pub schema: String,
    pub name: String,
    pub table: String,
    pub timing: TriggerTiming,
    pub events: Vec<String>,
    pub definition: String,
}

impl Procedure {
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
    pub fn key(&self) -> String {
        format!("{}.{}", self.schema.to_lowercase(), self.name.to_lowercase())
    }
}

impl Function {
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
    pub fn key(&self) -> String {
        format!("{}.{}", self.schema.to_lowercase(), self.name.to_lowercase())
    }
}

impl View {
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
    pub fn key(&self) -> String {
        format!("{}.{}", self.schema.to_lowercase(), self.name.to_lowercase())
    }
}

/// Root container for everything extracted from a single connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSchema {
    pub database_name: String,
    pub server_version: String,
    pub collation: Option<String>,
    pub extracted_at: DateTime<Utc>,
    pub tables: Vec<Table>,
    pub views: Vec<View>,
    pub procedures: Vec<Procedure>,
    pub functions: Vec<Function>,
    pub triggers: Vec<Trigger>,
}

impl DatabaseSchema {
    /// Sort every collection by its stable key so iteration order is
    /// deterministic regardless of what order the extractor's catalog
    /// queries returned rows in.
    pub fn sorted(mut self) -> Self {
        self.tables.sort_by_key(|t| t.key());
        self.views.sort_by_key(|v| v.key());
        self.procedures.sort_by_key(|p| p.key());
        self.functions.sort_by_key(|f| f.key());
        self.triggers
            .sort_by_key(|t| format!("{}.{}", t.schema.to_lowercase(), t.name.to_lowercase()));
        for table in &mut self.tables {
            table.columns.sort_by_key(|c| c.ordinal_position);
            table
                .indexes
                .sort_by_key(|i| i.name.to_lowercase());
            table
                .foreign_keys
                .sort_by_key(|fk| fk.name.to_lowercase());
        }
        self
    }
}

pub const SYSTEM_SCHEMAS: &[&str] = &["sys", "INFORMATION_SCHEMA", "pg_catalog", "pg_toast", "information_schema", "guest"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrowing_rules_match_documented_examples() {
        assert!(DataType::BigInt.narrows_to(DataType::Int));
        assert!(DataType::NVarchar.narrows_to(DataType::Varchar));
        assert!(DataType::Decimal.narrows_to(DataType::Int));
        assert!(!DataType::Int.narrows_to(DataType::BigInt));
        assert!(!DataType::Varchar.narrows_to(DataType::NVarchar));
    }

    #[test]
    fn foreign_key_well_formed_requires_matching_and_nonempty_columns() {
        let fk = ForeignKey {
            name: "fk_orders_customer".into(),
            columns: vec!["customer_id".into()],
            referenced_schema: "dbo".into(),
            referenced_table: "Customers".into(),
            referenced_columns: vec!["Id".into()],
            on_delete: ReferentialAction::NoAction,
            on_update: ReferentialAction::NoAction,
        };
        assert!(fk.is_well_formed());

        let mismatched = ForeignKey {
            columns: vec![],
            ..fk
        };
        assert!(!mismatched.is_well_formed());
    }
}
