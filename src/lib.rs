//! `dbops-core`: the embeddable engine behind a database-operations
//! platform — schema extraction and diffing, migration planning and
//! execution, scheduled/on-demand/deployment-triggered check orchestration,
//! and a tamper-evident audit log (spec §2).
//!
//! This crate has no network-facing surface of its own. An embedder wires
//! its own connection pooling and credential resolution through
//! [`external::ConnectionProvider`]/[`external::Credential`], picks a
//! [`schema::SchemaExtractor`] per vendor (`schema::postgres` behind the
//! `postgres` feature, `schema::sqlserver` behind `mssql`), and persists
//! audit entries through an [`audit::AuditStore`] implementation.
//!
//! ```ignore
//! use dbops_core::schema::{PostgresExtractor, SchemaExtractor};
//! use dbops_core::config::ExtractOptions;
//!
//! let extractor = PostgresExtractor::new(client);
//! let schema = extractor.extract(&ExtractOptions::default()).await?;
//! ```

pub mod audit;
pub mod checks;
pub mod config;
pub mod error;
pub mod external;
pub mod ids;
pub mod logging;
pub mod migration;
pub mod model;
pub mod orchestrator;
pub mod schema;

pub use error::DbOpsError;
