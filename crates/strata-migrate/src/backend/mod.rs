//! Database backends.
//!
//! A backend knows how to effect a single migration against a database
//! session and how to maintain the ledger of installed migrations. It never
//! decides *which* migrations run and never opens transactions of its own:
//! the coordinator computes the plan and owns the transaction boundaries
//! through `begin`/`commit`/`rollback`.

mod sqlite;

pub use sqlite::SqliteBackend;

use std::collections::HashSet;

use crate::error::Result;
use crate::migration::Migration;

/// Capability interface to a relational database.
///
/// Dispatch is static: the coordinator is generic over its backend.
#[allow(async_fn_in_trait)]
pub trait Backend {
    /// An open database session. One session lives for the whole of a
    /// coordinator operation.
    type Session;

    /// Opens a session, creating the database if necessary.
    async fn connect(&self) -> Result<Self::Session>;

    /// Ensures the ledger table exists and that the bootstrap migration id
    /// is recorded. Idempotent; runs outside any transaction so that the
    /// ledger survives a later failure.
    async fn bootstrap(&self, session: &mut Self::Session) -> Result<()>;

    /// The set of installed migration ids from the ledger.
    async fn list_installed(&self, session: &mut Self::Session) -> Result<HashSet<String>>;

    /// Executes the migration's apply SQL, then inserts its id into the
    /// ledger. Both effects belong to the enclosing transaction.
    async fn apply_migration(&self, session: &mut Self::Session, migration: &Migration)
        -> Result<()>;

    /// Executes the migration's revert SQL, then deletes its id from the
    /// ledger. Fails with `NotReversible` for one-way migrations.
    async fn revert_migration(
        &self,
        session: &mut Self::Session,
        migration: &Migration,
    ) -> Result<()>;

    /// Opens a transaction on the session.
    async fn begin(&self, session: &mut Self::Session) -> Result<()>;

    /// Commits the current transaction.
    async fn commit(&self, session: &mut Self::Session) -> Result<()>;

    /// Rolls back the current transaction.
    async fn rollback(&self, session: &mut Self::Session) -> Result<()>;

    /// Closes the session gracefully.
    async fn close(&self, session: Self::Session) -> Result<()>;
}
