//! Filesystem store of migrations.
//!
//! A store is a flat directory with one file per migration, named
//! `<id>.yml`. The store loads the complete migration set once per
//! invocation; it is read-only afterwards except for `create_new`.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{MigrateError, Result};
use crate::migration::{self, Migration, BOOTSTRAP_ID, MIGRATION_EXTENSION};

/// The complete mapping from migration id to migration, as loaded from a
/// store.
pub type MigrationSet = BTreeMap<String, Migration>;

/// A directory of migration files.
#[derive(Debug, Clone)]
pub struct MigrationStore {
    dir: PathBuf,
}

impl MigrationStore {
    /// Creates a store rooted at `dir`. The directory is not touched until
    /// a load or create operation.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The store directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// The file path a migration id resolves to, whether or not it exists.
    #[must_use]
    pub fn resolve(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.{MIGRATION_EXTENSION}"))
    }

    /// Walks the store directory, parses every migration file and returns
    /// the complete migration set.
    ///
    /// Dependency closure is checked after all files have parsed, so the
    /// error names the first missing edge rather than a file ordering
    /// accident. A dependency on [`BOOTSTRAP_ID`] is always considered
    /// resolved; the coordinator supplies the bootstrap migration when the
    /// store doesn't.
    pub fn load_all(&self) -> Result<MigrationSet> {
        if !self.dir.is_dir() {
            return Err(MigrateError::StoreNotFound(self.dir.clone()));
        }

        let mut paths: Vec<PathBuf> = fs::read_dir(&self.dir)?
            .collect::<std::io::Result<Vec<_>>>()?
            .into_iter()
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file() && path.extension() == Some(OsStr::new(MIGRATION_EXTENSION))
            })
            .collect();
        paths.sort();

        let mut migrations = MigrationSet::new();
        for path in &paths {
            let id = path
                .file_stem()
                .and_then(OsStr::to_str)
                .ok_or_else(|| MigrateError::InvalidId(path.display().to_string()))?;
            let contents = fs::read_to_string(path)?;
            let parsed = Migration::parse(id, &contents, path)?;
            debug!(id, path = %path.display(), "loaded migration");
            if migrations.insert(id.to_string(), parsed).is_some() {
                return Err(MigrateError::DuplicateId(id.to_string()));
            }
        }

        for m in migrations.values() {
            for dep in &m.depends {
                if dep != BOOTSTRAP_ID && !migrations.contains_key(dep) {
                    return Err(MigrateError::UnknownDependency {
                        migration: m.id.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
            if !m.is_reversible() && m.id != BOOTSTRAP_ID {
                warn!(id = %m.id, "migration has no Revert section and cannot be reverted");
            }
        }

        Ok(migrations)
    }

    /// Writes a fresh migration skeleton for `id` and returns its path.
    ///
    /// The store directory is created if missing. Fails if a file for the
    /// id already exists.
    pub fn create_new(&self, id: &str) -> Result<PathBuf> {
        if !migration::is_valid_id(id) {
            return Err(MigrateError::InvalidId(id.to_string()));
        }
        let path = self.resolve(id);
        if path.exists() {
            return Err(MigrateError::MigrationExists(path));
        }
        fs::create_dir_all(&self.dir)?;
        fs::write(&path, Migration::template(id).to_file_string())?;
        Ok(path)
    }
}
