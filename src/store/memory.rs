//! In-memory [`DocumentStore`] implementation for tests.
//!
//! Uses `Vec`s behind `std::sync::RwLock`. Insertion order stands in for the
//! SQLite backend's creation order.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{Asset, AssetType, ChunkRecord, NewAsset, Project};

use super::{
    page_count, page_offset, AssetStore, ChunkStore, ProjectPage, ProjectStore,
    DEFAULT_INSERT_BATCH_SIZE,
};

pub struct InMemoryStore {
    projects: RwLock<Vec<Project>>,
    assets: RwLock<Vec<Asset>>,
    chunks: RwLock<Vec<ChunkRecord>>,
    batch_size: usize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_batch_size(DEFAULT_INSERT_BATCH_SIZE)
    }

    pub fn with_batch_size(batch_size: usize) -> Self {
        Self {
            projects: RwLock::new(Vec::new()),
            assets: RwLock::new(Vec::new()),
            chunks: RwLock::new(Vec::new()),
            batch_size: batch_size.max(1),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[async_trait]
impl ProjectStore for InMemoryStore {
    async fn get_or_create_project(&self, project_id: &str) -> Result<Project> {
        // The write lock spans lookup and insert.
        let mut projects = write(&self.projects)?;
        if let Some(existing) = projects.iter().find(|p| p.project_id == project_id) {
            return Ok(existing.clone());
        }
        let project = Project {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            created_at: now(),
        };
        projects.push(project.clone());
        Ok(project)
    }

    async fn list_projects(&self, page: u64, page_size: u64) -> Result<ProjectPage> {
        if page_size == 0 {
            bail!("page_size must be > 0");
        }
        let projects = read(&self.projects)?;
        let skip = page_offset(page, page_size)
            .and_then(|o| usize::try_from(o).ok())
            .unwrap_or(usize::MAX);
        let take = usize::try_from(page_size).unwrap_or(usize::MAX);
        Ok(ProjectPage {
            projects: projects.iter().skip(skip).take(take).cloned().collect(),
            total_pages: page_count(projects.len() as u64, page_size),
        })
    }
}

#[async_trait]
impl AssetStore for InMemoryStore {
    async fn create_asset(&self, asset: NewAsset) -> Result<Asset> {
        let mut assets = write(&self.assets)?;
        if assets
            .iter()
            .any(|a| a.project_id == asset.project_id && a.name == asset.name)
        {
            bail!("asset already exists: {}", asset.name);
        }
        let stored = Asset {
            id: Uuid::new_v4().to_string(),
            project_id: asset.project_id,
            asset_type: asset.asset_type,
            name: asset.name,
            size: asset.size,
            created_at: now(),
        };
        assets.push(stored.clone());
        Ok(stored)
    }

    async fn get_asset(&self, project_id: &str, name: &str) -> Result<Option<Asset>> {
        Ok(read(&self.assets)?
            .iter()
            .find(|a| a.project_id == project_id && a.name == name)
            .cloned())
    }

    async fn list_assets(&self, project_id: &str, asset_type: AssetType) -> Result<Vec<Asset>> {
        Ok(read(&self.assets)?
            .iter()
            .filter(|a| a.project_id == project_id && a.asset_type == asset_type)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ChunkStore for InMemoryStore {
    async fn insert_batch(&self, records: &[ChunkRecord]) -> Result<usize> {
        for batch in records.chunks(self.batch_size) {
            let mut chunks = write(&self.chunks)?;
            if let Some(dup) = batch.iter().find(|r| chunks.iter().any(|c| c.id == r.id)) {
                bail!("duplicate chunk id: {}", dup.id);
            }
            chunks.extend_from_slice(batch);
        }
        Ok(records.len())
    }

    async fn delete_by_project(&self, project_id: &str) -> Result<u64> {
        let mut chunks = write(&self.chunks)?;
        let before = chunks.len();
        chunks.retain(|c| c.project_id != project_id);
        Ok((before - chunks.len()) as u64)
    }

    async fn get_by_id(&self, chunk_id: &str) -> Result<Option<ChunkRecord>> {
        Ok(read(&self.chunks)?.iter().find(|c| c.id == chunk_id).cloned())
    }

    async fn count_by_project(&self, project_id: &str) -> Result<u64> {
        Ok(read(&self.chunks)?
            .iter()
            .filter(|c| c.project_id == project_id)
            .count() as u64)
    }

    async fn list_by_asset(&self, project_id: &str, asset_id: &str) -> Result<Vec<ChunkRecord>> {
        let mut found: Vec<ChunkRecord> = read(&self.chunks)?
            .iter()
            .filter(|c| c.project_id == project_id && c.asset_id == asset_id)
            .cloned()
            .collect();
        found.sort_by_key(|c| c.order);
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::split_text;
    use crate::records::build_records;

    fn records(project_id: &str, asset_id: &str, n: usize) -> Vec<ChunkRecord> {
        let chunks = split_text(&"abcdefghij".repeat(n), 10, 0).unwrap();
        build_records(chunks, project_id, asset_id).unwrap()
    }

    #[tokio::test]
    async fn test_get_or_create_is_stable() {
        let store = InMemoryStore::new();
        let a = store.get_or_create_project("demo").await.unwrap();
        let b = store.get_or_create_project("demo").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(store.list_projects(1, 10).await.unwrap().projects.len(), 1);
    }

    #[tokio::test]
    async fn test_list_projects_far_page_is_empty() {
        let store = InMemoryStore::new();
        for id in ["a", "b", "c"] {
            store.get_or_create_project(id).await.unwrap();
        }
        let page = store.list_projects(u64::MAX, 100).await.unwrap();
        assert!(page.projects.is_empty());
        assert_eq!(page.total_pages, 1);

        let page = store.list_projects(2, u64::MAX).await.unwrap();
        assert!(page.projects.is_empty());
        let page = store.list_projects(0, 2).await.unwrap();
        assert_eq!(page.projects.len(), 2);
    }

    #[tokio::test]
    async fn test_insert_spans_sub_batches() {
        let store = InMemoryStore::with_batch_size(3);
        let recs = records("p1", "a1", 10);
        assert_eq!(store.insert_batch(&recs).await.unwrap(), 10);
        let listed = store.list_by_asset("p1", "a1").await.unwrap();
        assert_eq!(listed, recs);
    }

    #[tokio::test]
    async fn test_delete_is_scoped_to_project() {
        let store = InMemoryStore::new();
        store.insert_batch(&records("p1", "a1", 4)).await.unwrap();
        store.insert_batch(&records("p2", "a2", 6)).await.unwrap();

        assert_eq!(store.delete_by_project("p1").await.unwrap(), 4);
        assert_eq!(store.count_by_project("p1").await.unwrap(), 0);
        assert_eq!(store.count_by_project("p2").await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_list_projects_pages() {
        let store = InMemoryStore::new();
        for i in 0..5 {
            store.get_or_create_project(&format!("p{}", i)).await.unwrap();
        }
        let page = store.list_projects(2, 2).await.unwrap();
        assert_eq!(page.total_pages, 3);
        let ids: Vec<&str> = page.projects.iter().map(|p| p.project_id.as_str()).collect();
        assert_eq!(ids, vec!["p2", "p3"]);
        assert!(store.list_projects(1, 0).await.is_err());
    }
}
