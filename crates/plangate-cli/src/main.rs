mod config;
mod serve_cmd;
mod token_cmd;

#[cfg(test)]
mod test_util;

use clap::{Parser, Subcommand};

use plangate_store::models::StoreBackend;
use plangate_store::pool;

use config::PlangateConfig;

#[derive(Parser)]
#[command(name = "plangate", about = "Authenticated gateway for per-user plan documents")]
struct Cli {
    /// Database URL (overrides PLANGATE_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a plangate config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = config::DEFAULT_DATABASE_URL)]
        db_url: String,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Create and migrate the plangate database
    DbInit,
    /// Serve the plan operations over HTTP
    Serve {
        /// Address to bind (defaults to server.bind, then 127.0.0.1)
        #[arg(long)]
        bind: Option<String>,
        /// Port to listen on (defaults to server.port, then 8080)
        #[arg(long)]
        port: Option<u16>,
        /// Document store backend: postgres or memory
        #[arg(long)]
        store: Option<StoreBackend>,
    },
    /// Identity token management
    Token {
        #[command(subcommand)]
        command: TokenCommands,
    },
}

#[derive(Subcommand)]
enum TokenCommands {
    /// Issue a signed identity token for a uid
    Issue {
        /// Caller uid to embed in the token
        uid: String,
        /// Lifetime of the token in seconds
        #[arg(long, default_value_t = 3600)]
        ttl_secs: u64,
    },
    /// Verify a token and print its claims
    Verify {
        /// Token to verify
        token: String,
    },
}

/// Execute the `plangate init` command: write config file.
fn cmd_init(db_url: &str, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();
    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let token_secret = config::generate_token_secret();
    let cfg = config::ConfigFile {
        database: config::DatabaseSection {
            url: db_url.to_string(),
        },
        auth: config::AuthSection {
            token_secret: token_secret.clone(),
        },
        server: config::ServerSection::default(),
        store: config::StoreSection::default(),
    };
    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  database.url = {db_url}");
    println!(
        "  auth.token_secret = {}...{}",
        &token_secret[..8],
        &token_secret[56..]
    );
    println!();
    println!("Next: run `plangate db-init` to create and migrate the database.");
    Ok(())
}

/// Execute the `plangate db-init` command: create database and run migrations.
async fn cmd_db_init(cli_db_url: Option<&str>) -> anyhow::Result<()> {
    let resolved = PlangateConfig::resolve(cli_db_url, None)?;
    println!("Initializing plangate database...");

    let target = resolved.db_target()?;
    if pool::ensure_database(&target).await? {
        println!("Created database {}.", target.database());
    }
    let db_pool = pool::connect(&target).await?;
    let result = migrate_and_count(&db_pool).await;
    db_pool.close().await;

    let stats = result?;
    if stats.is_empty() {
        println!("Database ready. No plans stored yet.");
    } else {
        println!("Database ready. Stored documents:");
        for s in &stats {
            println!(
                "  {}: {} documents in {} collections",
                s.kind, s.documents, s.collections
            );
        }
    }
    println!("plangate db-init complete.");
    Ok(())
}

async fn migrate_and_count(db_pool: &sqlx::PgPool) -> anyhow::Result<Vec<pool::CollectionStats>> {
    pool::run_migrations(db_pool).await?;
    pool::collection_stats(db_pool).await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { db_url, force } => {
            cmd_init(&db_url, force)?;
        }
        Commands::DbInit => {
            cmd_db_init(cli.database_url.as_deref()).await?;
        }
        Commands::Serve { bind, port, store } => {
            let resolved = PlangateConfig::resolve(cli.database_url.as_deref(), store)?;
            let bind = bind.unwrap_or_else(|| resolved.server.bind.clone());
            let port = port.unwrap_or(resolved.server.port);
            serve_cmd::run_serve(resolved, &bind, port).await?;
        }
        Commands::Token { command } => {
            let resolved = PlangateConfig::resolve(cli.database_url.as_deref(), None)?;
            match command {
                TokenCommands::Issue { uid, ttl_secs } => {
                    token_cmd::run_issue(&resolved.token_config, &uid, ttl_secs)?;
                }
                TokenCommands::Verify { token } => {
                    token_cmd::run_verify(&resolved.token_config, &token)?;
                }
            }
        }
    }

    Ok(())
}
