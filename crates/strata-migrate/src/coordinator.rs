//! Coordinator: orchestrates the store, graph and backend.
//!
//! Every operation follows the same shape: load the migration set, build
//! the dependency graph, open a session, bootstrap the ledger, then drive
//! the computed plan under a single transaction. The bootstrap runs in
//! autocommit mode before the transaction opens, so ledger initialization
//! survives a later failure. On any error the open transaction is rolled
//! back and the session is closed; the session is closed on success too.

use std::io::Write as _;

use tracing::{debug, info};

use crate::backend::Backend;
use crate::error::{MigrateError, Result};
use crate::graph::DependencyGraph;
use crate::migration::{self, Migration, BOOTSTRAP_ID};
use crate::store::{MigrationSet, MigrationStore};

/// The loaded, validated view of a store for one invocation.
struct Context {
    migrations: MigrationSet,
    graph: DependencyGraph,
}

/// Drives migration operations against one store and one database.
pub struct Coordinator<B: Backend> {
    store: MigrationStore,
    backend: B,
}

impl<B: Backend> Coordinator<B> {
    /// Creates a coordinator over a store and a backend.
    pub fn new(store: MigrationStore, backend: B) -> Self {
        Self { store, backend }
    }

    /// Applies every pending migration in topological order.
    ///
    /// Returns the ids applied, in order.
    pub async fn upgrade(&self) -> Result<Vec<String>> {
        let ctx = self.context()?;
        let mut session = self.backend.connect().await?;
        let result = self.run_upgrade(&ctx, &mut session).await;
        self.finish(session, result).await
    }

    /// Applies the target migration plus any of its missing dependencies.
    ///
    /// Returns the ids applied, in order.
    pub async fn apply(&self, target: &str) -> Result<Vec<String>> {
        let ctx = self.context()?;
        let mut session = self.backend.connect().await?;
        let result = self.run_apply(&ctx, &mut session, target).await;
        self.finish(session, result).await
    }

    /// Reverts the target migration plus everything installed that depends
    /// on it, most-dependent first.
    ///
    /// Returns the ids reverted, in order.
    pub async fn revert(&self, target: &str) -> Result<Vec<String>> {
        let ctx = self.context()?;
        let mut session = self.backend.connect().await?;
        let result = self.run_revert(&ctx, &mut session, target).await;
        self.finish(session, result).await
    }

    /// Reverts the target (with its installed dependents) and applies it
    /// again, all inside one transaction.
    pub async fn reinstall(&self, target: &str) -> Result<()> {
        let ctx = self.context()?;
        let mut session = self.backend.connect().await?;
        let result = self.run_reinstall(&ctx, &mut session, target).await;
        self.finish(session, result).await
    }

    /// Applies the target as [`Coordinator::apply`] would, reverts exactly
    /// what was applied, then rolls the transaction back so the database
    /// ends exactly as it began.
    ///
    /// Returns the ids that were exercised.
    pub async fn test(&self, target: &str) -> Result<Vec<String>> {
        let ctx = self.context()?;
        let mut session = self.backend.connect().await?;
        let result = self.run_test(&ctx, &mut session, target).await;
        self.finish(session, result).await
    }

    /// Prints the pending migration ids without applying anything.
    ///
    /// Returns the ids, in the order `upgrade` would apply them.
    pub async fn list_pending(&self) -> Result<Vec<String>> {
        let ctx = self.context()?;
        let mut session = self.backend.connect().await?;
        let result = self.run_list_pending(&ctx, &mut session).await;
        self.finish(session, result).await
    }

    /// Prints the installed migration ids, sorted.
    pub async fn list_installed(&self) -> Result<Vec<String>> {
        let ctx = self.context()?;
        let mut session = self.backend.connect().await?;
        let result = self.run_list_installed(&ctx, &mut session).await;
        self.finish(session, result).await
    }

    /// Loads the store, injects the bootstrap migration if absent and
    /// validates the dependency graph.
    fn context(&self) -> Result<Context> {
        let mut migrations = self.store.load_all()?;
        migrations
            .entry(BOOTSTRAP_ID.to_string())
            .or_insert_with(migration::bootstrap);
        let graph = DependencyGraph::build(&migrations)?;
        Ok(Context { migrations, graph })
    }

    /// Rolls back on failure and closes the session on every path.
    async fn finish<T>(&self, mut session: B::Session, result: Result<T>) -> Result<T> {
        if result.is_err() {
            if let Err(rollback_err) = self.backend.rollback(&mut session).await {
                // No transaction was open; nothing to undo.
                debug!(error = %rollback_err, "rollback was a no-op");
            }
        }
        match self.backend.close(session).await {
            Ok(()) => result,
            Err(close_err) => result.and(Err(close_err)),
        }
    }

    async fn run_upgrade(&self, ctx: &Context, session: &mut B::Session) -> Result<Vec<String>> {
        self.backend.bootstrap(session).await?;
        let installed = self.backend.list_installed(session).await?;

        let plan: Vec<&Migration> = ctx
            .graph
            .topo_order()
            .iter()
            .filter(|id| !installed.contains(id.as_str()))
            .map(|id| &ctx.migrations[id.as_str()])
            .collect();
        if plan.is_empty() {
            println!("Database is up to date.");
            return Ok(Vec::new());
        }

        info!(count = plan.len(), "applying pending migrations");
        self.backend.begin(session).await?;
        let mut applied = Vec::with_capacity(plan.len());
        for m in plan {
            self.apply_one(session, m).await?;
            applied.push(m.id.clone());
        }
        self.backend.commit(session).await?;
        Ok(applied)
    }

    async fn run_apply(
        &self,
        ctx: &Context,
        session: &mut B::Session,
        target: &str,
    ) -> Result<Vec<String>> {
        self.backend.bootstrap(session).await?;
        let installed = self.backend.list_installed(session).await?;

        let mut ids = ctx.graph.ancestors(target)?;
        ids.push(target.to_string());
        let plan: Vec<&Migration> = ids
            .iter()
            .filter(|id| !installed.contains(id.as_str()))
            .map(|id| &ctx.migrations[id.as_str()])
            .collect();
        if plan.is_empty() {
            println!("Migration '{target}' is already installed.");
            return Ok(Vec::new());
        }

        self.backend.begin(session).await?;
        let mut applied = Vec::with_capacity(plan.len());
        for m in plan {
            self.apply_one(session, m).await?;
            applied.push(m.id.clone());
        }
        self.backend.commit(session).await?;
        Ok(applied)
    }

    async fn run_revert(
        &self,
        ctx: &Context,
        session: &mut B::Session,
        target: &str,
    ) -> Result<Vec<String>> {
        self.backend.bootstrap(session).await?;
        let installed = self.backend.list_installed(session).await?;

        let mut ids = ctx.graph.descendants(target)?;
        ids.push(target.to_string());
        let plan: Vec<&Migration> = ids
            .iter()
            .filter(|id| installed.contains(id.as_str()))
            .map(|id| &ctx.migrations[id.as_str()])
            .collect();
        if plan.is_empty() {
            println!("Migration '{target}' is not installed.");
            return Ok(Vec::new());
        }

        self.backend.begin(session).await?;
        let mut reverted = Vec::with_capacity(plan.len());
        for m in plan {
            self.revert_one(session, m).await?;
            reverted.push(m.id.clone());
        }
        self.backend.commit(session).await?;
        Ok(reverted)
    }

    async fn run_reinstall(
        &self,
        ctx: &Context,
        session: &mut B::Session,
        target: &str,
    ) -> Result<()> {
        self.backend.bootstrap(session).await?;
        let installed = self.backend.list_installed(session).await?;
        if !installed.contains(target) {
            if !ctx.graph.contains(target) {
                return Err(MigrateError::UnknownMigration(target.to_string()));
            }
            return Err(MigrateError::NotInstalled(target.to_string()));
        }

        let mut revert_ids = ctx.graph.descendants(target)?;
        revert_ids.push(target.to_string());
        let revert_plan: Vec<&Migration> = revert_ids
            .iter()
            .filter(|id| installed.contains(id.as_str()))
            .map(|id| &ctx.migrations[id.as_str()])
            .collect();

        let mut apply_ids = ctx.graph.ancestors(target)?;
        apply_ids.push(target.to_string());
        let apply_plan: Vec<&Migration> = apply_ids
            .iter()
            .filter(|id| id.as_str() == target || !installed.contains(id.as_str()))
            .map(|id| &ctx.migrations[id.as_str()])
            .collect();

        self.backend.begin(session).await?;
        for m in revert_plan {
            self.revert_one(session, m).await?;
        }
        for m in apply_plan {
            self.apply_one(session, m).await?;
        }
        self.backend.commit(session).await?;
        Ok(())
    }

    async fn run_test(
        &self,
        ctx: &Context,
        session: &mut B::Session,
        target: &str,
    ) -> Result<Vec<String>> {
        self.backend.bootstrap(session).await?;
        let installed = self.backend.list_installed(session).await?;

        let mut ids = ctx.graph.ancestors(target)?;
        ids.push(target.to_string());
        let plan: Vec<&Migration> = ids
            .iter()
            .filter(|id| !installed.contains(id.as_str()))
            .map(|id| &ctx.migrations[id.as_str()])
            .collect();

        self.backend.begin(session).await?;
        let mut exercised = Vec::with_capacity(plan.len());
        for m in &plan {
            self.apply_one(session, m).await?;
            exercised.push(m.id.clone());
        }
        for m in plan.iter().rev() {
            self.revert_one(session, m).await?;
        }
        self.backend.rollback(session).await?;
        println!("Successfully tested migrations.");
        Ok(exercised)
    }

    async fn run_list_pending(
        &self,
        ctx: &Context,
        session: &mut B::Session,
    ) -> Result<Vec<String>> {
        self.backend.bootstrap(session).await?;
        let installed = self.backend.list_installed(session).await?;

        let pending: Vec<String> = ctx
            .graph
            .topo_order()
            .iter()
            .filter(|id| !installed.contains(id.as_str()))
            .cloned()
            .collect();
        if pending.is_empty() {
            println!("Database is up to date.");
        } else {
            for id in &pending {
                println!("{id}");
            }
        }
        Ok(pending)
    }

    async fn run_list_installed(
        &self,
        _ctx: &Context,
        session: &mut B::Session,
    ) -> Result<Vec<String>> {
        self.backend.bootstrap(session).await?;
        let mut installed: Vec<String> =
            self.backend.list_installed(session).await?.into_iter().collect();
        installed.sort();
        for id in &installed {
            println!("{id}");
        }
        Ok(installed)
    }

    async fn apply_one(&self, session: &mut B::Session, migration: &Migration) -> Result<()> {
        print!("Applying: {}... ", migration.id);
        std::io::stdout().flush()?;
        self.backend.apply_migration(session, migration).await?;
        println!("done.");
        Ok(())
    }

    async fn revert_one(&self, session: &mut B::Session, migration: &Migration) -> Result<()> {
        print!("Reverting: {}... ", migration.id);
        std::io::stdout().flush()?;
        self.backend.revert_migration(session, migration).await?;
        println!("done.");
        Ok(())
    }
}
