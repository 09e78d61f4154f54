//! Migration Planner/Executor: turning a [`crate::model::SchemaDiff`] into an
//! ordered, reversible [`crate::model::Migration`] (spec §4.3) and applying
//! or rolling it back against a live session with a tracking ledger
//! (spec §4.4).

pub mod executor;
pub mod generator;

pub use executor::{ExecutionResult, MigrationExecutor, RollbackResult};
pub use generator::{MigrationGenerator, MigrationPlan};
