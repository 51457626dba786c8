//! CLI command implementations.
//!
//! Each command opens the configured SQLite store, does its work, prints a
//! human-readable result and closes the store again.

use anyhow::{bail, Result};
use std::sync::Arc;

use crate::config::Config;
use crate::content::FsContentReader;
use crate::process::{ProcessRequest, Processor};
use crate::store::sqlite::SqliteStore;
use crate::store::{ChunkStore, ProjectStore};

/// Create the database file and schema. Safe to run repeatedly.
pub async fn run_init(config: &Config) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    store.close().await;
    std::fs::create_dir_all(&config.files.dir)?;
    println!("Database initialized at {}", config.db.path.display());
    println!("Uploads directory: {}", config.files.dir.display());
    Ok(())
}

/// Options for `dchunk process`. Unset sizes fall back to `[chunking]`.
#[derive(Debug, Default)]
pub struct ProcessArgs {
    pub file_id: Option<String>,
    pub chunk_size: Option<usize>,
    pub overlap_size: Option<usize>,
    pub reset: bool,
}

pub async fn run_process(config: &Config, project_id: &str, args: ProcessArgs) -> Result<()> {
    let store = Arc::new(SqliteStore::open(config).await?);
    let reader = Arc::new(FsContentReader::new(config.files.dir.clone()));
    let processor = Processor::new(store.clone(), reader);

    let request = ProcessRequest {
        file_id: args.file_id,
        chunk_size: args.chunk_size.unwrap_or(config.chunking.chunk_size),
        overlap_size: args.overlap_size.unwrap_or(config.chunking.overlap_size),
        do_reset: args.reset,
    };

    let result = processor.process_project(project_id, &request).await;
    store.close().await;

    match result {
        Ok(summary) => {
            println!("Project:          {}", project_id);
            println!("Chunk size:       {}", request.chunk_size);
            println!("Overlap size:     {}", request.overlap_size);
            println!("Files processed:  {}", summary.processed_files);
            println!("Chunks inserted:  {}", summary.inserted_chunks);
            Ok(())
        }
        Err(e) => bail!("{} ({})", e, e.signal()),
    }
}

pub async fn run_projects(config: &Config, page: u64, page_size: u64) -> Result<()> {
    if page_size == 0 {
        bail!("--page-size must be > 0");
    }
    let store = SqliteStore::open(config).await?;
    let result = store.list_projects(page.max(1), page_size).await;
    store.close().await;
    let listing = result?;

    if listing.projects.is_empty() {
        println!("No projects.");
        return Ok(());
    }

    println!("{:<38} {:<30} CREATED", "ID", "PROJECT");
    for project in &listing.projects {
        let created = chrono::DateTime::from_timestamp(project.created_at, 0)
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| project.created_at.to_string());
        println!("{:<38} {:<30} {}", project.id, project.project_id, created);
    }
    println!();
    println!("Page {} of {}", page.max(1), listing.total_pages);
    Ok(())
}

pub async fn run_chunk(config: &Config, chunk_id: &str) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let result = store.get_by_id(chunk_id).await;
    store.close().await;

    let Some(chunk) = result? else {
        bail!("chunk not found: {}", chunk_id);
    };

    println!("id:        {}", chunk.id);
    println!("project:   {}", chunk.project_id);
    println!("asset:     {}", chunk.asset_id);
    println!("order:     {}", chunk.order);
    println!("hash:      {}", chunk.hash);
    println!(
        "metadata:  {}",
        serde_json::Value::Object(chunk.metadata.clone())
    );
    println!("---");
    println!("{}", chunk.text);
    Ok(())
}
