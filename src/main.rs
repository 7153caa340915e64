use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::bail;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use forkwiki::config::{EngineConfig, ServerConfig};
use forkwiki::server::{AppState, create_router};
use forkwiki::store::{SqliteStore, Store};
use forkwiki::subject::slugify;

#[derive(Parser)]
#[command(name = "forkwiki")]
#[command(about = "Subject-rooted fork trees for wiki-like repositories", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the data directory and database
    Init {
        /// Data directory for database and repositories
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,
    },

    /// Start the server
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(long, short, default_value = "8080")]
        port: u16,

        /// Data directory for database and repositories
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,

        /// Engine configuration (TOML)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Manage users
    User {
        #[command(subcommand)]
        command: UserCommands,
    },

    /// Print the slug derived from a subject name
    Slug {
        name: String,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Add a user
    Add {
        name: String,

        /// Data directory for database and repositories
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,
    },
}

fn open_store(data_dir: &Path) -> anyhow::Result<SqliteStore> {
    let config = ServerConfig {
        data_dir: data_dir.to_path_buf(),
        ..ServerConfig::default()
    };
    let db_path = config.db_path();
    if !db_path.exists() {
        bail!("Server not initialized. Run 'forkwiki init' first to create the database.");
    }
    Ok(SqliteStore::new(&db_path)?)
}

fn run_init(data_dir: &Path) -> anyhow::Result<()> {
    let config = ServerConfig {
        data_dir: data_dir.to_path_buf(),
        ..ServerConfig::default()
    };
    fs::create_dir_all(config.repos_dir())?;

    let db_path = config.db_path();
    let store = SqliteStore::new(&db_path)?;
    store.initialize()?;

    println!("Initialized database at {}", db_path.display());
    Ok(())
}

fn run_user_add(data_dir: &Path, name: &str) -> anyhow::Result<()> {
    let name = name.trim();
    if name.is_empty() || name.contains(char::is_whitespace) {
        bail!("Username cannot be empty or contain whitespace");
    }

    let store = open_store(data_dir)?;
    store.initialize()?;
    if store.get_user_by_name(name)?.is_some() {
        bail!("User '{name}' already exists");
    }

    let user = store.create_user(name)?;
    println!("Created user '{}' with id {}", user.name, user.id);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("forkwiki=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { data_dir } => run_init(&data_dir)?,
        Commands::User { command } => match command {
            UserCommands::Add { name, data_dir } => run_user_add(&data_dir, &name)?,
        },
        Commands::Slug { name } => println!("{}", slugify(&name)),
        Commands::Serve {
            host,
            port,
            data_dir,
            config,
        } => {
            let engine = match config {
                Some(path) => EngineConfig::load(&path)?,
                None => EngineConfig::default(),
            };
            let config = ServerConfig {
                host,
                port,
                data_dir,
                engine,
            };

            let store = open_store(&config.data_dir)?;
            store.initialize()?;

            info!(
                "Fork tree limit: {}, graph depth {} / nodes {}",
                config.engine.fork.max_fork_tree_nodes,
                config.engine.graph.max_depth,
                config.engine.graph.max_nodes
            );

            let state = Arc::new(AppState::new(Arc::new(store), &config));
            let app = create_router(state);
            let addr = config.socket_addr()?;

            info!("Starting server on {}", addr);

            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, app).await?;
        }
    }

    Ok(())
}
