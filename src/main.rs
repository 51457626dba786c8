//! # docchunk CLI (`dchunk`)
//!
//! ## Usage
//!
//! ```bash
//! dchunk --config ./config/docchunk.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `dchunk init` | Create the SQLite database and run schema migrations |
//! | `dchunk serve` | Start the HTTP server |
//! | `dchunk process <project>` | Chunk a project's uploaded files |
//! | `dchunk projects` | List projects |
//! | `dchunk chunk <id>` | Print one stored chunk |
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use docchunk::commands::{self, ProcessArgs};
use docchunk::config;
use docchunk::server;
use docchunk::store::sqlite::SqliteStore;

/// docchunk: upload text documents and split them into overlapping chunks.
#[derive(Parser)]
#[command(name = "dchunk", version, about = "Document upload and chunking backend")]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docchunk.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema and uploads directory.
    ///
    /// Idempotent: running it again leaves existing data untouched.
    Init,

    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// Split a project's uploaded files into chunks.
    Process {
        /// Client-supplied project id.
        project: String,

        /// Only process this stored file (the `file_id` returned by upload).
        #[arg(long)]
        file_id: Option<String>,

        /// Window length in characters. Defaults to `[chunking].chunk_size`.
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Characters shared by consecutive windows. Defaults to `[chunking].overlap_size`.
        #[arg(long)]
        overlap_size: Option<usize>,

        /// Delete the project's existing chunks first.
        #[arg(long)]
        reset: bool,
    },

    /// List projects, oldest first.
    Projects {
        #[arg(long, default_value_t = 1)]
        page: u64,

        #[arg(long, default_value_t = 10)]
        page_size: u64,
    },

    /// Print a stored chunk by id.
    Chunk { id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            commands::run_init(&cfg).await?;
        }
        Commands::Serve => {
            let store = Arc::new(SqliteStore::open(&cfg).await?);
            let result = server::run_server(&cfg, store.clone()).await;
            store.close().await;
            result?;
        }
        Commands::Process {
            project,
            file_id,
            chunk_size,
            overlap_size,
            reset,
        } => {
            let args = ProcessArgs {
                file_id,
                chunk_size,
                overlap_size,
                reset,
            };
            commands::run_process(&cfg, &project, args).await?;
        }
        Commands::Projects { page, page_size } => {
            commands::run_projects(&cfg, page, page_size).await?;
        }
        Commands::Chunk { id } => {
            commands::run_chunk(&cfg, &id).await?;
        }
    }

    Ok(())
}
