use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use memberhub::authz::{scopes, AccessConfig, RoleCatalog};
use memberhub::db::members::{fetch_member_by_username, update_member_roles};

#[derive(Parser, Debug)]
#[command(author, version, about = "memberhub admin tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply pending migrations
    MigrateRun,
    /// Show migration status against the current database
    MigrateStatus,
    /// Validate a role catalog file and print its scopes
    CheckRoles {
        /// Defaults to ROLES_FILE or the bundled catalog
        file: Option<PathBuf>,
    },
    /// Grant a general-scope role directly, bypassing the priority guard
    GrantRole { username: String, role: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if dotenv().is_err() {
        let crate_env = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(crate_env);
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::MigrateRun => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            migrator.run(&pool).await?;
            println!("Migrations applied");
        }
        Commands::MigrateStatus => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            print_status(&pool, &migrator).await?;
        }
        Commands::CheckRoles { file } => {
            let path = match file {
                Some(path) => path,
                None => AccessConfig::from_env()?.roles_file,
            };
            let catalog = RoleCatalog::load(&path).with_context(|| format!("invalid catalog {}", path.display()))?;
            print_catalog(&catalog);
        }
        Commands::GrantRole { username, role } => {
            let catalog = AccessConfig::from_env()?.load_catalog()?;
            let known = catalog
                .scope(scopes::GENERAL)
                .and_then(|scope| scope.role(&role))
                .is_some();
            if !known {
                anyhow::bail!("role '{}' is not defined in scope '{}'", role, scopes::GENERAL);
            }

            let pool = get_pool().await?;
            let member = fetch_member_by_username(&pool, &username)
                .await?
                .with_context(|| format!("no member named {}", username))?;

            let mut roles = member.roles.clone();
            if roles.insert(role.as_str()) {
                update_member_roles(&pool, member.id, &roles).await?;
                println!("{} now holds {}", username, roles);
            } else {
                println!("{} already holds {}", username, role);
            }
        }
    }

    Ok(())
}

fn print_catalog(catalog: &RoleCatalog) {
    println!("superuser level: {}", catalog.superuser_level());
    for scope in catalog.scopes() {
        println!("{}", scope.name);
        for role in scope.roles() {
            let permissions: Vec<&str> = role.permissions.iter().map(String::as_str).collect();
            println!("  {:<14} {:>4}  {}", role.name, role.level, permissions.join(", "));
        }
    }
}

async fn get_pool() -> anyhow::Result<SqlitePool> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
    let options = SqliteConnectOptions::from_str(&database_url)
        .context("invalid DATABASE_URL")?
        .create_if_missing(true)
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .context("failed to connect to database")
}

async fn print_status(pool: &SqlitePool, migrator: &sqlx::migrate::Migrator) -> anyhow::Result<()> {
    let has_table: Option<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type='table' AND name='_sqlx_migrations'")
            .fetch_optional(pool)
            .await?;

    let applied_versions: HashSet<i64> = if has_table.is_some() {
        let rows = sqlx::query("SELECT version FROM _sqlx_migrations WHERE success = 1")
            .fetch_all(pool)
            .await?;
        rows.iter().filter_map(|row| row.try_get::<i64, _>("version").ok()).collect()
    } else {
        HashSet::new()
    };

    println!("{:<8} {:<20} {}", "Status", "Version", "Name");
    for migration in migrator.iter() {
        let status = if applied_versions.contains(&migration.version) { "applied" } else { "pending" };
        let desc = migration.description.trim();
        let name = if desc.is_empty() { "unknown" } else { desc };
        println!("{:<8} {:<20} {}", status, migration.version, name);
    }

    Ok(())
}

async fn get_migrator() -> anyhow::Result<sqlx::migrate::Migrator> {
    let local = Path::new("./migrations");
    let migrator_path = if local.exists() {
        local.to_path_buf()
    } else {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")
    };

    let display = migrator_path.display().to_string();
    sqlx::migrate::Migrator::new(migrator_path)
        .await
        .with_context(|| format!("failed to load migrations from {}", display))
}
