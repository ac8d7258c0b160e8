use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::sync::Arc;
use tracing::info;

use phishnode::config::Config;
use phishnode::db::models::{IndicatorKind, IndicatorStatus, Role};
use phishnode::db::Database;
use phishnode::indicators::{BlocklistMatcher, IndicatorStore, Submission};
use phishnode::users::UserRegistry;

/// phishnode: a shared phishing-indicator feed.
///
/// Trusted parties submit phishing domains and email addresses, administrators
/// moderate them, and clients consume the hashed feed.
#[derive(Parser)]
#[command(name = "phishnode", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Run the HTTP API
    #[cfg(feature = "web")]
    Serve {
        /// Port to listen on (default: PORT or 7856)
        #[arg(long)]
        port: Option<u16>,

        /// Address to bind (default: PHISHNODE_BIND or 127.0.0.1)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Create a user account directly, bypassing registration
    CreateUser {
        name: String,
        email: String,

        /// Role: user, submitter or admin
        #[arg(long, default_value = "user")]
        role: Role,

        /// Activate the account immediately
        #[arg(long)]
        activated: bool,
    },

    /// Submit indicators (domains or email addresses, cleartext or SHA-256)
    Submit {
        #[arg(required = true)]
        indicators: Vec<String>,

        /// Indicator type; required for pre-hashed values
        #[arg(long = "type")]
        kind: Option<IndicatorKind>,

        /// Tag to attach (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Leave the indicators pending instead of enabling them
        #[arg(long)]
        pending: bool,

        /// Owner recorded on new indicators
        #[arg(long, default_value = "operator")]
        owner: String,
    },

    /// Enable indicators by hash
    Enable {
        #[arg(required = true)]
        hashes: Vec<String>,
    },

    /// Disable indicators by hash
    Disable {
        #[arg(required = true)]
        hashes: Vec<String>,
    },

    /// Check a domain or URL against the enabled blocklist
    Check { target: String },

    /// Show node status (DB stats, indicator and user counts)
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if missing)
    let _ = dotenvy::dotenv();

    // Set up structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("phishnode=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Init => {
            info!("Initializing phishnode database...");
            let db = init_database(&config).await?;
            let table_count = db.table_count().await?;
            println!("Database initialized at: {}", db_display(&config));
            println!("Tables created: {table_count}");
            println!("\nphishnode is ready. Create an administrator with:");
            println!("  phishnode create-user <name> <email> --role admin --activated");
        }

        #[cfg(feature = "web")]
        Commands::Serve { port, bind } => {
            let db = open_database(&config).await?;
            let port = port.unwrap_or(config.port);
            let bind = bind.unwrap_or_else(|| config.bind.clone());
            phishnode::web::run_server(config, db, port, &bind).await?;
        }

        Commands::CreateUser {
            name,
            email,
            role,
            activated,
        } => {
            let db = open_database(&config).await?;
            let registry = UserRegistry::new(db, config.enforce_user_auth);
            let user = registry.create(&name, &email, role, activated).await?;
            println!("{} {} <{}>", "Created".green().bold(), user.name, user.email);
            println!("  id:        {}", user.id);
            println!("  role:      {}", user.role);
            println!("  activated: {}", user.activated);
            println!("  key:       {}", user.key.bold());
            println!("{}", "Store the key now; it is not shown again.".dimmed());
        }

        Commands::Submit {
            indicators,
            kind,
            tags,
            pending,
            owner,
        } => {
            let db = open_database(&config).await?;
            let store = IndicatorStore::new(db);
            let summary = store
                .add(&Submission {
                    kind,
                    values: indicators,
                    tags,
                    owner,
                    enabled: !pending,
                })
                .await;
            println!(
                "Added {}, already known {}, skipped {}, failed {}",
                summary.added.to_string().green(),
                summary.touched,
                summary.skipped.to_string().yellow(),
                summary.failed.to_string().red(),
            );
        }

        Commands::Enable { hashes } => {
            let db = open_database(&config).await?;
            let toggled = IndicatorStore::new(db)
                .set_status_many(&hashes, IndicatorStatus::Enabled)
                .await?;
            println!("Enabled {toggled} of {} indicators", hashes.len());
        }

        Commands::Disable { hashes } => {
            let db = open_database(&config).await?;
            let toggled = IndicatorStore::new(db)
                .set_status_many(&hashes, IndicatorStatus::Disabled)
                .await?;
            println!("Disabled {toggled} of {} indicators", hashes.len());
        }

        Commands::Check { target } => {
            let db = open_database(&config).await?;
            let verdict = BlocklistMatcher::new(db).is_blocked(&target).await?;
            match verdict.matched {
                Some(ref hash) => {
                    println!("{} {}", "BLOCKLISTED".red().bold(), target);
                    println!("  score:   {}", verdict.score);
                    println!("  matched: {hash}");
                }
                None => println!("{} {}", "not listed".green(), target),
            }
        }

        Commands::Status => {
            let db = open_database(&config).await?;
            phishnode::status::show(&db, &db_display(&config), !config.uses_postgres()).await?;
        }
    }

    Ok(())
}

/// Display-friendly database identifier; Postgres credentials are redacted.
fn db_display(config: &Config) -> String {
    match config.database_url.as_deref() {
        Some(url) if config.uses_postgres() => phishnode::status::redact_url(url),
        _ => config.db_path.clone(),
    }
}

/// Open an existing database (Postgres when DATABASE_URL says so).
async fn open_database(config: &Config) -> Result<Arc<dyn Database>> {
    if let Some(ref url) = config.database_url {
        if config.uses_postgres() {
            #[cfg(feature = "postgres")]
            {
                info!("Using PostgreSQL backend");
                return phishnode::db::connect_postgres(url).await;
            }
            #[cfg(not(feature = "postgres"))]
            anyhow::bail!(
                "DATABASE_URL points to PostgreSQL ({}) but the 'postgres' feature is not compiled in.\n\
                 Rebuild with: cargo build --features postgres",
                phishnode::status::redact_url(url)
            );
        }
    }
    sqlite_open(config)
}

/// Initialize the database (create if needed).
async fn init_database(config: &Config) -> Result<Arc<dyn Database>> {
    if let Some(ref url) = config.database_url {
        if config.uses_postgres() {
            #[cfg(feature = "postgres")]
            {
                info!("Using PostgreSQL backend");
                return phishnode::db::connect_postgres(url).await;
            }
            #[cfg(not(feature = "postgres"))]
            anyhow::bail!(
                "DATABASE_URL points to PostgreSQL ({}) but the 'postgres' feature is not compiled in.\n\
                 Rebuild with: cargo build --features postgres",
                phishnode::status::redact_url(url)
            );
        }
    }
    sqlite_init(config)
}

#[cfg(feature = "sqlite")]
fn sqlite_open(config: &Config) -> Result<Arc<dyn Database>> {
    phishnode::db::open_sqlite(&config.db_path)
}

#[cfg(feature = "sqlite")]
fn sqlite_init(config: &Config) -> Result<Arc<dyn Database>> {
    phishnode::db::initialize_sqlite(&config.db_path)
}

#[cfg(not(feature = "sqlite"))]
fn sqlite_open(_config: &Config) -> Result<Arc<dyn Database>> {
    anyhow::bail!("No database backend: set DATABASE_URL or rebuild with the 'sqlite' feature")
}

#[cfg(not(feature = "sqlite"))]
fn sqlite_init(config: &Config) -> Result<Arc<dyn Database>> {
    sqlite_open(config)
}
