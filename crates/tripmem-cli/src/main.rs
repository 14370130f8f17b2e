//! tripmem operator command line
//!
//! Usage:
//!   tripmem export <file>                    Write all memories to a JSON document
//!   tripmem import <file>                    Upsert memories from a JSON document
//!   tripmem forget <user> [--erase]          Remove a user's memories (and preferences)
//!   tripmem context <user> <query...>        Print the context block for a query
//!   tripmem prefs <user>                     Print a user's preferences
//!   tripmem set <user> <key> <value...>      Set one preference
//!   tripmem remember <user> <text...>        Record a memory
//!
//! Storage locations and the embedding provider come from the environment
//! (`PREFERENCE_DIR`, `MEMORY_DIR`, `EMBEDDING_PROVIDER`, ...).

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tripmem_memory::{MemoryConfig, MemoryFacade};

/// Inspect and manage tripmem user memory
#[derive(Parser)]
#[command(name = "tripmem", version, about = "Inspect and manage tripmem user memory")]
struct Cli {
    /// Override PREFERENCE_DIR
    #[arg(long, global = true)]
    preference_dir: Option<PathBuf>,

    /// Override MEMORY_DIR
    #[arg(long, global = true)]
    memory_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export every memory entry as JSON
    Export { file: PathBuf },

    /// Import a JSON export; re-importing replaces entries instead of duplicating them
    Import { file: PathBuf },

    /// Remove every memory of a user
    Forget {
        user_id: String,

        /// Also delete the user's preferences
        #[arg(long)]
        erase: bool,
    },

    /// Print the preferences and related memories for a query
    Context {
        user_id: String,

        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,

        /// Number of memories to include
        #[arg(long)]
        top_k: Option<usize>,

        /// Only memories created at or after this RFC 3339 time
        #[arg(long)]
        since: Option<String>,
    },

    /// Print a user's preferences
    Prefs { user_id: String },

    /// Set one preference
    Set {
        user_id: String,
        key: String,

        #[arg(required = true, num_args = 1..)]
        value: Vec<String>,
    },

    /// Record a memory for a user
    Remember {
        user_id: String,

        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,

        /// Paired reply stored with the text
        #[arg(long)]
        reply: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(output) => println!("{}", output),
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<String> {
    let mut config = MemoryConfig::from_env()?;
    if let Some(dir) = cli.preference_dir {
        config = config.preference_dir(dir);
    }
    if let Some(dir) = cli.memory_dir {
        config = config.memory_dir(dir);
    }

    info!("tripmem v{}", env!("CARGO_PKG_VERSION"));
    let facade = MemoryFacade::open(&config)?;

    let output = match cli.command {
        Commands::Export { file } => commands::export(&facade, &file)?,
        Commands::Import { file } => commands::import(&facade, &file).await?,
        Commands::Forget { user_id, erase } => commands::forget(&facade, &user_id, erase)?,
        Commands::Context {
            user_id,
            query,
            top_k,
            since,
        } => {
            commands::context(&facade, &user_id, &query.join(" "), top_k, since.as_deref()).await?
        }
        Commands::Prefs { user_id } => commands::prefs(&facade, &user_id)?,
        Commands::Set {
            user_id,
            key,
            value,
        } => commands::set(&facade, &user_id, &key, &value.join(" "))?,
        Commands::Remember {
            user_id,
            text,
            reply,
        } => commands::remember(&facade, &user_id, &text.join(" "), reply.as_deref()).await?,
    };

    facade.memory_store().flush()?;
    Ok(output)
}
