//! Error types for the migration system.

use std::path::PathBuf;

/// Errors that can occur during migration operations.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// The migration store contains a dependency cycle.
    ///
    /// The path lists the ids along the cycle, beginning and ending at the
    /// same migration.
    #[error("Circular dependency detected: {}", .cycle.join(" -> "))]
    CircularDependency {
        /// The offending cycle, e.g. `["a", "b", "a"]`.
        cycle: Vec<String>,
    },

    /// A migration depends on another that doesn't exist in the store.
    #[error("Migration '{migration}' depends on '{dependency}' which doesn't exist")]
    UnknownDependency {
        /// The migration declaring the dependency.
        migration: String,
        /// The dependency that's missing.
        dependency: String,
    },

    /// Two store entries resolved to the same migration id.
    #[error("Duplicate migration id '{0}'")]
    DuplicateId(String),

    /// The named migration is not in the store.
    #[error("Migration '{0}' not found in the store")]
    UnknownMigration(String),

    /// The migration has no revert section.
    #[error("Migration '{0}' is not reversible")]
    NotReversible(String),

    /// The migration is not recorded in the ledger.
    #[error("Migration '{0}' is not installed")]
    NotInstalled(String),

    /// Database error from the backend.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// IO error reading or writing migration files.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse a migration file.
    #[error("Failed to parse migration file '{path}' at line {line}: {message}")]
    ParseError {
        /// Path to the migration file.
        path: PathBuf,
        /// 1-based line the parser stopped at.
        line: usize,
        /// What was wrong.
        message: String,
    },

    /// `new` targeted an id that already has a file.
    #[error("Migration file already exists: {0}")]
    MigrationExists(PathBuf),

    /// The store directory does not exist.
    #[error("Migration store not found: {0}")]
    StoreNotFound(PathBuf),

    /// The migration id contains characters the store cannot represent.
    #[error("Invalid migration id '{0}'")]
    InvalidId(String),
}

/// Result type for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
