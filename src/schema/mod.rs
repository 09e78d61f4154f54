//! Schema Engine: extraction (spec §4.1), diffing (spec §4.2), and the
//! vendor-neutral contracts both are built on.

pub mod differ;
pub mod extractor;
pub mod postgres;
#[cfg(feature = "mssql")]
pub mod sqlserver;

pub use differ::SchemaDiffer;
pub use extractor::{ConnectionCheck, SchemaExtractor, TypeNormalizer};
pub use postgres::{PostgresExtractor, PostgresTypeNormalizer};
#[cfg(feature = "mssql")]
pub use sqlserver::{SqlServerExtractor, SqlServerTypeNormalizer};
