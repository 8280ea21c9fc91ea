//! strata-migrate CLI
//!
//! Command-line tool for managing SQL schema migrations with DAG
//! dependencies.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use strata_migrate::coordinator::Coordinator;
use strata_migrate::error::MigrateError;
use strata_migrate::prelude::*;

/// SQL schema migrations with DAG dependencies.
#[derive(Parser)]
#[command(name = "strata-migrate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty migration file in the store.
    New {
        /// Migration store directory.
        store_path: PathBuf,
        /// Id of the migration to create.
        migration_id: String,
    },

    /// Apply a migration and any of its missing dependencies.
    Apply {
        /// Migration store directory.
        store_path: PathBuf,
        /// SQLite database file.
        db_path: PathBuf,
        /// Id of the migration to apply.
        migration_id: String,
    },

    /// Revert a migration and everything installed that depends on it.
    Revert {
        /// Migration store directory.
        store_path: PathBuf,
        /// SQLite database file.
        db_path: PathBuf,
        /// Id of the migration to revert.
        migration_id: String,
    },

    /// Revert a migration, then apply it again.
    Reinstall {
        /// Migration store directory.
        store_path: PathBuf,
        /// SQLite database file.
        db_path: PathBuf,
        /// Id of the migration to reinstall.
        migration_id: String,
    },

    /// Apply a migration, revert it, and roll the database back.
    Test {
        /// Migration store directory.
        store_path: PathBuf,
        /// SQLite database file.
        db_path: PathBuf,
        /// Id of the migration to test.
        migration_id: String,
    },

    /// Apply all pending migrations.
    Upgrade {
        /// Migration store directory.
        store_path: PathBuf,
        /// SQLite database file.
        db_path: PathBuf,
    },

    /// List pending migrations without applying them.
    UpgradeList {
        /// Migration store directory.
        store_path: PathBuf,
        /// SQLite database file.
        db_path: PathBuf,
    },

    /// List installed migrations.
    List {
        /// Migration store directory.
        store_path: PathBuf,
        /// SQLite database file.
        db_path: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    // The tool's contract is exit code 1 for usage errors, where clap
    // defaults to 2.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            process::exit(1);
        }
    };

    if let Err(err) = run(cli).await {
        match err.downcast_ref::<MigrateError>() {
            Some(MigrateError::Database(db_err)) => {
                eprintln!("A database error occurred: {db_err}");
            }
            _ => eprintln!("{err}"),
        }
        process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::New {
            store_path,
            migration_id,
        } => {
            let store = MigrationStore::new(store_path);
            let path = store.create_new(&migration_id)?;
            println!("Created migration: {}", path.display());
        }

        Commands::Apply {
            store_path,
            db_path,
            migration_id,
        } => {
            coordinator(store_path, db_path).apply(&migration_id).await?;
        }

        Commands::Revert {
            store_path,
            db_path,
            migration_id,
        } => {
            coordinator(store_path, db_path)
                .revert(&migration_id)
                .await?;
        }

        Commands::Reinstall {
            store_path,
            db_path,
            migration_id,
        } => {
            coordinator(store_path, db_path)
                .reinstall(&migration_id)
                .await?;
        }

        Commands::Test {
            store_path,
            db_path,
            migration_id,
        } => {
            coordinator(store_path, db_path).test(&migration_id).await?;
        }

        Commands::Upgrade {
            store_path,
            db_path,
        } => {
            coordinator(store_path, db_path).upgrade().await?;
        }

        Commands::UpgradeList {
            store_path,
            db_path,
        } => {
            coordinator(store_path, db_path).list_pending().await?;
        }

        Commands::List {
            store_path,
            db_path,
        } => {
            coordinator(store_path, db_path).list_installed().await?;
        }
    }

    Ok(())
}

fn coordinator(store_path: PathBuf, db_path: PathBuf) -> Coordinator<SqliteBackend> {
    Coordinator::new(MigrationStore::new(store_path), SqliteBackend::new(db_path))
}
