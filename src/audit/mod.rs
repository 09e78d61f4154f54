//! Audit Log: append-only, hash-chained event recording with buffered
//! asynchronous writes and integrity verification (spec §4.7).

pub mod log;
pub mod store;

pub use log::AuditLog;
pub use store::{AuditFilter, AuditStore, InMemoryAuditStore};
