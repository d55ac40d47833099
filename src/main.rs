use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use berth::auth::{ApiKeyGenerator, create_user};
use berth::blob::UrlSigner;
use berth::config::ServerConfig;
use berth::server::{AppState, create_router};
use berth::store::{SqliteStore, Store};
use berth::types::Role;

const DEFAULT_DATA_DIR: &str = "./data";

#[derive(Parser)]
#[command(name = "berth")]
#[command(about = "A build distribution server for the wharf upload protocol", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Administrative commands
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },

    /// Manage users and their API keys
    User {
        #[command(subcommand)]
        command: UserCommands,
    },

    /// Start the server
    Serve {
        /// Host to bind to [default: 127.0.0.1]
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to [default: 8080]
        #[arg(long, short)]
        port: Option<u16>,

        /// Data directory for the database, blobs and config file
        #[arg(long, default_value = DEFAULT_DATA_DIR)]
        data_dir: PathBuf,

        /// Public base URL for external access (e.g., "https://builds.example.com").
        /// Presigned upload and download URLs are built from it.
        #[arg(long)]
        public_base_url: Option<String>,
    },
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Initialize the server (create database and URL signing key)
    Init {
        #[arg(long, default_value = DEFAULT_DATA_DIR)]
        data_dir: PathBuf,

        /// Skip interactive prompts
        #[arg(long)]
        non_interactive: bool,
    },

    /// Rebuild archives that failed to assemble
    RetryArchives {
        #[arg(long, default_value = DEFAULT_DATA_DIR)]
        data_dir: PathBuf,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Create a user and print their API key
    Create {
        username: String,

        /// Grant access to every namespace
        #[arg(long)]
        admin: bool,

        #[arg(long, default_value = DEFAULT_DATA_DIR)]
        data_dir: PathBuf,
    },

    /// List all users
    List {
        #[arg(long, default_value = DEFAULT_DATA_DIR)]
        data_dir: PathBuf,
    },

    /// Allow a user to authenticate again
    Activate {
        username: String,

        #[arg(long, default_value = DEFAULT_DATA_DIR)]
        data_dir: PathBuf,
    },

    /// Reject a user's API key without deleting anything
    Deactivate {
        username: String,

        #[arg(long, default_value = DEFAULT_DATA_DIR)]
        data_dir: PathBuf,
    },
}

/// Opens the store of an initialized data directory.
fn open_store(config: &ServerConfig) -> anyhow::Result<SqliteStore> {
    if !config.signing_key_path().exists() {
        bail!(
            "Server not initialized. Run 'berth admin init --data-dir {}' first.",
            config.data_dir.display()
        );
    }

    let store = SqliteStore::new(config.db_path())?;
    store.initialize()?;
    Ok(store)
}

fn open_state(config: &ServerConfig) -> anyhow::Result<Arc<AppState>> {
    let store = open_store(config)?;
    let key = UrlSigner::read_key(&config.signing_key_path())
        .with_context(|| format!("reading {}", config.signing_key_path().display()))?;

    Ok(Arc::new(AppState::with_local_blobs(
        Arc::new(store),
        config,
        key,
    )))
}

fn print_key(username: &str, raw_key: &str) {
    println!();
    println!("========================================");
    println!("API key for '{username}' (save this, it won't be shown again):");
    println!();
    println!("  {raw_key}");
    println!();
    println!("========================================");
    println!();
}

fn run_init(data_dir: &Path, non_interactive: bool) -> anyhow::Result<()> {
    fs::create_dir_all(data_dir)?;
    let config = ServerConfig::load(data_dir)?;

    let key_path = config.signing_key_path();
    if key_path.exists() {
        bail!(
            "Server already initialized. Signing key exists at: {}",
            key_path.display()
        );
    }

    let store = SqliteStore::new(config.db_path())?;
    store.initialize()?;
    fs::create_dir_all(config.blob_dir())?;

    UrlSigner::write_key(&key_path, &UrlSigner::generate_key())?;

    println!("Initialized {}", data_dir.display());
    println!("  database:    {}", config.db_path().display());
    println!("  blobs:       {}", config.blob_dir().display());
    println!("  signing key: {}", key_path.display());

    if !non_interactive {
        create_admin_prompt(&store)?;
    }

    Ok(())
}

fn create_admin_prompt(store: &SqliteStore) -> anyhow::Result<()> {
    let create = inquire::Confirm::new("Would you like to create an admin user?")
        .with_default(true)
        .prompt()?;

    if !create {
        return Ok(());
    }

    let username = inquire::Text::new("Username:")
        .with_validator(|input: &str| {
            match berth::validation::validate_username(input.trim()) {
                Ok(()) => Ok(inquire::validator::Validation::Valid),
                Err(msg) => Ok(inquire::validator::Validation::Invalid(msg.into())),
            }
        })
        .prompt()?;
    let username = username.trim();

    let (_, raw_key) = create_user(store, &ApiKeyGenerator::new(), username, Role::Admin)?;
    print_key(username, &raw_key);

    Ok(())
}

async fn run_serve(
    data_dir: PathBuf,
    host: Option<String>,
    port: Option<u16>,
    public_base_url: Option<String>,
) -> anyhow::Result<()> {
    let mut config = ServerConfig::load(&data_dir)?;
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }
    if public_base_url.is_some() {
        config.public_base_url = public_base_url;
    }

    let state = open_state(&config)?;

    match state.engine.retry_archives().await {
        Ok(summary) if summary.attempted > 0 => {
            info!("Retried {} pending archive(s)", summary.attempted);
        }
        Ok(_) => {}
        Err(e) => warn!("Archive retry at startup failed: {e}"),
    }

    let app = create_router(state);
    let addr = config.socket_addr()?;

    info!("Starting server on {} (public URL {})", addr, config.base_url());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn run_user(command: UserCommands) -> anyhow::Result<()> {
    match command {
        UserCommands::Create {
            username,
            admin,
            data_dir,
        } => {
            let store = open_store(&ServerConfig::load(&data_dir)?)?;
            let role = if admin { Role::Admin } else { Role::Member };

            let (_, raw_key) = create_user(&store, &ApiKeyGenerator::new(), &username, role)?;
            print_key(&username, &raw_key);
        }
        UserCommands::List { data_dir } => {
            let store = open_store(&ServerConfig::load(&data_dir)?)?;

            println!("{:<6} {:<24} {:<8} {:<8}", "ID", "USERNAME", "ROLE", "ACTIVE");
            for user in store.list_users()? {
                println!(
                    "{:<6} {:<24} {:<8} {:<8}",
                    user.id,
                    user.username,
                    user.role.as_str(),
                    if user.is_active { "yes" } else { "no" }
                );
            }
        }
        UserCommands::Activate { username, data_dir } => {
            set_active(&data_dir, &username, true)?;
        }
        UserCommands::Deactivate { username, data_dir } => {
            set_active(&data_dir, &username, false)?;
        }
    }

    Ok(())
}

fn set_active(data_dir: &Path, username: &str, active: bool) -> anyhow::Result<()> {
    let store = open_store(&ServerConfig::load(data_dir)?)?;

    if !store.set_user_active(username, active)? {
        bail!("User '{username}' not found");
    }

    println!(
        "User '{username}' {}",
        if active { "activated" } else { "deactivated" }
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("berth=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Admin { command } => match command {
            AdminCommands::Init {
                data_dir,
                non_interactive,
            } => run_init(&data_dir, non_interactive)?,
            AdminCommands::RetryArchives { data_dir } => {
                let state = open_state(&ServerConfig::load(&data_dir)?)?;
                let summary = state.engine.retry_archives().await?;
                println!(
                    "Retried {} archive(s), rebuilt {}",
                    summary.attempted, summary.rebuilt
                );
            }
        },
        Commands::User { command } => run_user(command)?,
        Commands::Serve {
            host,
            port,
            data_dir,
            public_base_url,
        } => run_serve(data_dir, host, port, public_base_url).await?,
    }

    Ok(())
}
