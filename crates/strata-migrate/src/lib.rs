//! SQL schema migrations with DAG dependencies.
//!
//! `strata-migrate` manages the evolution of a relational database schema
//! through named migrations stored as plain-text files. Each migration
//! carries forward and backward SQL plus declared dependencies on other
//! migrations, forming a directed acyclic graph. The tool installs, reverts
//! and tests migrations against a live database, using the database's own
//! transactions to guarantee atomic application.
//!
//! # Architecture
//!
//! - **Store** - reads and writes migration files in a store directory
//! - **Graph** - validates the dependency DAG and answers ordering queries
//! - **Backend** - effects a single migration against a database session
//!   and maintains the ledger of installed migrations
//! - **Coordinator** - computes plans from the graph and the ledger and
//!   drives them under one transaction per operation
//!
//! # Migration files
//!
//! ```text
//! Description: add the widgets table
//! Created: 2026-08-01 12:00:00 UTC
//! Depends: root
//! Apply:
//!   CREATE TABLE widgets (id INTEGER PRIMARY KEY);
//! Revert:
//!   DROP TABLE widgets;
//! ```
//!
//! # CLI usage
//!
//! ```bash
//! # Create an empty migration file
//! strata-migrate new migrations/ add_widgets
//!
//! # Apply everything pending
//! strata-migrate upgrade migrations/ app.db
//!
//! # Apply one migration and its missing dependencies
//! strata-migrate apply migrations/ app.db add_widgets
//!
//! # Check a migration round-trips, leaving the database untouched
//! strata-migrate test migrations/ app.db add_widgets
//! ```

pub mod backend;
pub mod coordinator;
pub mod error;
pub mod graph;
pub mod migration;
pub mod store;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::backend::{Backend, SqliteBackend};
    pub use crate::coordinator::Coordinator;
    pub use crate::error::{MigrateError, Result};
    pub use crate::graph::DependencyGraph;
    pub use crate::migration::{Migration, BOOTSTRAP_ID, MIGRATION_EXTENSION};
    pub use crate::store::{MigrationSet, MigrationStore};
}
