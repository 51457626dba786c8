//! Processing pipeline orchestration.
//!
//! Coordinates one processing request: resolve the project's files →
//! optionally reset the project's chunks → for each file read, chunk, build
//! records and insert → report totals.
//!
//! Files are handled one at a time in upload order. A file that cannot be
//! read is logged and skipped; a file that reads but yields no chunks aborts
//! the request, since that points at the input or parameters rather than at
//! one bad file.
//!
//! Calls for the same project are serialized through [`ProjectLocks`], so a
//! reset from one request cannot land between another request's inserts.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::OwnedMutexGuard;

use crate::chunk::ChunkWindow;
use crate::content::ContentReader;
use crate::error::ProcessError;
use crate::models::{is_valid_project_id, Asset, AssetType, Project};
use crate::records::build_records;
use crate::store::DocumentStore;

/// Parameters of a processing request.
#[derive(Debug, Clone)]
pub struct ProcessRequest {
    /// Process only the asset with this name; all file assets when `None`.
    pub file_id: Option<String>,
    pub chunk_size: usize,
    pub overlap_size: usize,
    /// Delete the project's existing chunks before processing.
    pub do_reset: bool,
}

/// Totals across every file processed by one request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProcessSummary {
    pub inserted_chunks: usize,
    pub processed_files: usize,
}

/// Per-project async mutexes, created on first use and dropped once no call
/// holds or waits on them.
#[derive(Default)]
pub struct ProjectLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

/// Holds a project's lock; releasing it prunes the entry when unused.
pub struct ProjectGuard<'a> {
    locks: &'a ProjectLocks,
    project_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl ProjectLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, project_id: &str) -> ProjectGuard<'_> {
        let lock = {
            let mut locks = self.table();
            locks
                .entry(project_id.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        ProjectGuard {
            locks: self,
            project_id: project_id.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Number of projects with a live lock entry.
    pub fn len(&self) -> usize {
        self.table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn table(&self) -> MutexGuard<'_, HashMap<String, Arc<tokio::sync::Mutex<()>>>> {
        self.locks.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn release(&self, project_id: &str) {
        let mut locks = self.table();
        // Clones are only taken under this map lock, so a count of 1 means
        // nobody else holds or awaits the mutex.
        if locks
            .get(project_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(project_id);
        }
    }
}

impl Drop for ProjectGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks.release(&self.project_id);
    }
}

/// Store, content source and locks shared by every processing call.
#[derive(Clone)]
pub struct Processor {
    store: Arc<dyn DocumentStore>,
    reader: Arc<dyn ContentReader>,
    locks: Arc<ProjectLocks>,
}

impl Processor {
    pub fn new(store: Arc<dyn DocumentStore>, reader: Arc<dyn ContentReader>) -> Self {
        Self {
            store,
            reader,
            locks: Arc::new(ProjectLocks::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn locks(&self) -> &ProjectLocks {
        &self.locks
    }

    /// Run [`process_project`] while holding the project's lock.
    pub async fn process_project(
        &self,
        project_id: &str,
        request: &ProcessRequest,
    ) -> Result<ProcessSummary, ProcessError> {
        let _guard = self.locks.acquire(project_id).await;
        process_project(self.store.as_ref(), self.reader.as_ref(), project_id, request).await
    }
}

/// Process a project's files into stored chunks.
///
/// `project_id` is the client-supplied id; the project is created if this is
/// its first reference. Chunking parameters are validated before anything is
/// read or written.
pub async fn process_project(
    store: &dyn DocumentStore,
    reader: &dyn ContentReader,
    project_id: &str,
    request: &ProcessRequest,
) -> Result<ProcessSummary, ProcessError> {
    if !is_valid_project_id(project_id) {
        return Err(ProcessError::InvalidProjectId(project_id.to_string()));
    }
    let window = ChunkWindow::new(request.chunk_size, request.overlap_size)?;

    let project = store.get_or_create_project(project_id).await?;
    let assets = resolve_assets(store, &project, request.file_id.as_deref()).await?;

    if request.do_reset {
        let deleted = store.delete_by_project(&project.id).await?;
        tracing::info!(project_id, deleted, "reset project chunks");
    }

    let mut summary = ProcessSummary::default();

    for asset in &assets {
        let content = match reader.read(&project, asset).await {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(project_id, file = %asset.name, error = %e, "skipping unreadable file");
                continue;
            }
        };

        let chunks = window.split(&content);
        if chunks.is_empty() {
            tracing::error!(project_id, file = %asset.name, "file produced no chunks, aborting");
            return Err(ProcessError::ProcessingFailed(asset.name.clone()));
        }

        let records = build_records(chunks, &project.id, &asset.id)?;
        let inserted = store.insert_batch(&records).await?;
        tracing::debug!(project_id, file = %asset.name, inserted, "file processed");

        summary.inserted_chunks += inserted;
        summary.processed_files += 1;
    }

    tracing::info!(
        project_id,
        inserted_chunks = summary.inserted_chunks,
        processed_files = summary.processed_files,
        "processing finished"
    );
    Ok(summary)
}

async fn resolve_assets(
    store: &dyn DocumentStore,
    project: &Project,
    file_id: Option<&str>,
) -> Result<Vec<Asset>, ProcessError> {
    let assets = match file_id {
        Some(name) => {
            let asset = store
                .get_asset(&project.id, name)
                .await?
                .ok_or_else(|| ProcessError::FileNotFound(name.to_string()))?;
            vec![asset]
        }
        None => store.list_assets(&project.id, AssetType::File).await?,
    };

    if assets.is_empty() {
        return Err(ProcessError::NoFilesToProcess);
    }
    Ok(assets)
}
