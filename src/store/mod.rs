//! Storage abstraction for docchunk.
//!
//! Three traits split the storage surface by collection: [`ProjectStore`],
//! [`AssetStore`] and [`ChunkStore`]. Backends implement all three and are
//! used through [`DocumentStore`], which the processing pipeline and HTTP
//! server hold as a shared handle.
//!
//! | Backend | Purpose |
//! |---------|---------|
//! | [`sqlite::SqliteStore`] | Production store, one SQLite file |
//! | [`memory::InMemoryStore`] | Tests and embedding in other programs |
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::models::{Asset, AssetType, ChunkRecord, NewAsset, Project};

/// Records per insert sub-batch unless configured otherwise.
pub const DEFAULT_INSERT_BATCH_SIZE: usize = 100;

/// One page of projects.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectPage {
    pub projects: Vec<Project>,
    pub total_pages: u64,
}

/// Number of pages needed to show `total` items `page_size` at a time.
pub(crate) fn page_count(total: u64, page_size: u64) -> u64 {
    total.div_ceil(page_size)
}

/// Items to skip before 1-based `page`. `None` when the offset does not fit
/// in a `u64`, which no store can reach.
pub(crate) fn page_offset(page: u64, page_size: u64) -> Option<u64> {
    page.saturating_sub(1).checked_mul(page_size)
}

#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// Return the project with this client-supplied id, creating it first
    /// if it does not exist. Concurrent calls for the same id observe a
    /// single project.
    async fn get_or_create_project(&self, project_id: &str) -> Result<Project>;

    /// List projects in creation order. `page` is 1-based (0 reads as 1) and
    /// pages past the end come back empty; `page_size` must be > 0.
    async fn list_projects(&self, page: u64, page_size: u64) -> Result<ProjectPage>;
}

#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn create_asset(&self, asset: NewAsset) -> Result<Asset>;

    /// Look up an asset by owning project (internal id) and content key.
    async fn get_asset(&self, project_id: &str, name: &str) -> Result<Option<Asset>>;

    /// All assets of one type for a project, in upload order.
    async fn list_assets(&self, project_id: &str, asset_type: AssetType) -> Result<Vec<Asset>>;
}

/// Chunk persistence.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert_batch`](ChunkStore::insert_batch) | Insert records in fixed-size sub-batches |
/// | [`delete_by_project`](ChunkStore::delete_by_project) | Reset: drop every chunk of a project |
/// | [`get_by_id`](ChunkStore::get_by_id) | Fetch a single chunk |
/// | [`count_by_project`](ChunkStore::count_by_project) | Number of chunks a project owns |
/// | [`list_by_asset`](ChunkStore::list_by_asset) | A file's chunks in order |
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Insert `records` preserving their order, in sub-batches of the
    /// store's batch size. Each sub-batch commits on its own: when one
    /// fails, the error is returned and earlier sub-batches stay written.
    async fn insert_batch(&self, records: &[ChunkRecord]) -> Result<usize>;

    /// Delete every chunk whose `project_id` equals `project_id` exactly.
    async fn delete_by_project(&self, project_id: &str) -> Result<u64>;

    async fn get_by_id(&self, chunk_id: &str) -> Result<Option<ChunkRecord>>;

    async fn count_by_project(&self, project_id: &str) -> Result<u64>;

    /// Chunks of one (project, asset) pair sorted by `order`.
    async fn list_by_asset(&self, project_id: &str, asset_id: &str) -> Result<Vec<ChunkRecord>>;
}

/// A backend holding all three collections.
pub trait DocumentStore: ProjectStore + AssetStore + ChunkStore {}

impl<T: ProjectStore + AssetStore + ChunkStore> DocumentStore for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_offset() {
        assert_eq!(page_offset(1, 10), Some(0));
        assert_eq!(page_offset(0, 10), Some(0));
        assert_eq!(page_offset(3, 10), Some(20));
        assert_eq!(page_offset(u64::MAX, 100), None);
    }

    #[test]
    fn test_page_count() {
        assert_eq!(page_count(0, 10), 0);
        assert_eq!(page_count(10, 10), 1);
        assert_eq!(page_count(11, 10), 2);
    }
}
