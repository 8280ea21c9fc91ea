//! SQLite backend.

use std::collections::HashSet;
use std::path::PathBuf;

use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{ConnectOptions, Connection};
use tracing::debug;

use crate::backend::Backend;
use crate::error::{MigrateError, Result};
use crate::migration::{Migration, BOOTSTRAP_ID};

/// SQL to create the ledger table.
pub const CREATE_LEDGER_TABLE_SQL: &str = r"
CREATE TABLE IF NOT EXISTS installed_migrations (
    migration_id TEXT PRIMARY KEY
)
";

/// Backend over a SQLite database file.
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    path: PathBuf,
}

impl SqliteBackend {
    /// Creates a backend for the database at `path`. The file is created on
    /// first connect if it does not exist.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Backend for SqliteBackend {
    type Session = SqliteConnection;

    async fn connect(&self) -> Result<SqliteConnection> {
        let options = SqliteConnectOptions::new()
            .filename(&self.path)
            .create_if_missing(true);
        Ok(options.connect().await?)
    }

    async fn bootstrap(&self, session: &mut SqliteConnection) -> Result<()> {
        debug!("bootstrapping migration ledger");
        sqlx::raw_sql(CREATE_LEDGER_TABLE_SQL)
            .execute(&mut *session)
            .await?;
        sqlx::query("INSERT OR IGNORE INTO installed_migrations (migration_id) VALUES (?1)")
            .bind(BOOTSTRAP_ID)
            .execute(&mut *session)
            .await?;
        Ok(())
    }

    async fn list_installed(&self, session: &mut SqliteConnection) -> Result<HashSet<String>> {
        let ids: Vec<String> =
            sqlx::query_scalar("SELECT migration_id FROM installed_migrations")
                .fetch_all(&mut *session)
                .await?;
        Ok(ids.into_iter().collect())
    }

    async fn apply_migration(
        &self,
        session: &mut SqliteConnection,
        migration: &Migration,
    ) -> Result<()> {
        debug!(id = %migration.id, sql = %migration.apply, "executing apply SQL");
        sqlx::raw_sql(&migration.apply)
            .execute(&mut *session)
            .await?;
        sqlx::query("INSERT INTO installed_migrations (migration_id) VALUES (?1)")
            .bind(&migration.id)
            .execute(&mut *session)
            .await?;
        Ok(())
    }

    async fn revert_migration(
        &self,
        session: &mut SqliteConnection,
        migration: &Migration,
    ) -> Result<()> {
        let revert = migration
            .revert
            .as_deref()
            .ok_or_else(|| MigrateError::NotReversible(migration.id.clone()))?;
        debug!(id = %migration.id, sql = %revert, "executing revert SQL");
        sqlx::raw_sql(revert).execute(&mut *session).await?;
        sqlx::query("DELETE FROM installed_migrations WHERE migration_id = ?1")
            .bind(&migration.id)
            .execute(&mut *session)
            .await?;
        Ok(())
    }

    async fn begin(&self, session: &mut SqliteConnection) -> Result<()> {
        sqlx::raw_sql("BEGIN").execute(&mut *session).await?;
        Ok(())
    }

    async fn commit(&self, session: &mut SqliteConnection) -> Result<()> {
        sqlx::raw_sql("COMMIT").execute(&mut *session).await?;
        Ok(())
    }

    async fn rollback(&self, session: &mut SqliteConnection) -> Result<()> {
        sqlx::raw_sql("ROLLBACK").execute(&mut *session).await?;
        Ok(())
    }

    async fn close(&self, session: SqliteConnection) -> Result<()> {
        session.close().await?;
        Ok(())
    }
}
