//! SQLite-backed [`DocumentStore`](super::DocumentStore) implementation.
//!
//! [`SqliteStore::open`] is the only constructor used by the binary: it
//! connects, applies the schema and indexes, and hands back a ready store.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::models::{Asset, AssetType, ChunkRecord, NewAsset, Project};

use super::{
    page_count, page_offset, AssetStore, ChunkStore, ProjectPage, ProjectStore,
    DEFAULT_INSERT_BATCH_SIZE,
};

/// SQLite implementation of the store traits.
///
/// Wraps a [`SqlitePool`]; clones of the pool are cheap, so the store is
/// shared behind an `Arc` rather than cloned.
pub struct SqliteStore {
    pool: SqlitePool,
    batch_size: usize,
}

impl SqliteStore {
    /// Connect to the configured database and make sure the schema exists.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        let store = Self::from_pool(pool, config.chunking.insert_batch_size).await?;
        tracing::debug!(path = %config.db.path.display(), "sqlite store ready");
        Ok(store)
    }

    /// Wrap an existing pool, applying migrations first.
    pub async fn from_pool(pool: SqlitePool, batch_size: usize) -> Result<Self> {
        migrate::run_migrations(&pool).await?;
        Ok(Self {
            pool,
            batch_size: if batch_size == 0 {
                DEFAULT_INSERT_BATCH_SIZE
            } else {
                batch_size
            },
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn project_from_row(row: &SqliteRow) -> Result<Project> {
    Ok(Project {
        id: row.try_get("id")?,
        project_id: row.try_get("project_id")?,
        created_at: row.try_get("created_at")?,
    })
}

fn asset_from_row(row: &SqliteRow) -> Result<Asset> {
    let asset_type: String = row.try_get("asset_type")?;
    Ok(Asset {
        id: row.try_get("id")?,
        project_id: row.try_get("project_id")?,
        asset_type: AssetType::parse(&asset_type)
            .ok_or_else(|| anyhow!("unknown asset type in database: {}", asset_type))?,
        name: row.try_get("name")?,
        size: row.try_get("size")?,
        created_at: row.try_get("created_at")?,
    })
}

fn chunk_from_row(row: &SqliteRow) -> Result<ChunkRecord> {
    let metadata_json: String = row.try_get("metadata_json")?;
    Ok(ChunkRecord {
        id: row.try_get("id")?,
        text: row.try_get("text")?,
        metadata: serde_json::from_str(&metadata_json).unwrap_or_default(),
        order: row.try_get("chunk_order")?,
        project_id: row.try_get("project_id")?,
        asset_id: row.try_get("asset_id")?,
        hash: row.try_get("hash")?,
    })
}

const CHUNK_COLUMNS: &str = "id, project_id, asset_id, chunk_order, text, metadata_json, hash";

#[async_trait]
impl ProjectStore for SqliteStore {
    async fn get_or_create_project(&self, project_id: &str) -> Result<Project> {
        // The UNIQUE(project_id) constraint settles concurrent creators.
        sqlx::query(
            "INSERT INTO projects (id, project_id, created_at) VALUES (?, ?, ?) ON CONFLICT(project_id) DO NOTHING",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(project_id)
        .bind(now())
        .execute(&self.pool)
        .await?;

        let row = sqlx::query("SELECT id, project_id, created_at FROM projects WHERE project_id = ?")
            .bind(project_id)
            .fetch_one(&self.pool)
            .await?;
        project_from_row(&row)
    }

    async fn list_projects(&self, page: u64, page_size: u64) -> Result<ProjectPage> {
        if page_size == 0 {
            bail!("page_size must be > 0");
        }
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM projects")
            .fetch_one(&self.pool)
            .await?;

        let total_pages = page_count(total as u64, page_size);

        // SQLite takes signed 64-bit LIMIT/OFFSET.
        let Some(offset) = page_offset(page, page_size).and_then(|o| i64::try_from(o).ok()) else {
            return Ok(ProjectPage {
                projects: Vec::new(),
                total_pages,
            });
        };
        let limit = i64::try_from(page_size).unwrap_or(i64::MAX);

        let rows = sqlx::query(
            "SELECT id, project_id, created_at FROM projects ORDER BY created_at ASC, rowid ASC LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(ProjectPage {
            projects: rows.iter().map(project_from_row).collect::<Result<_>>()?,
            total_pages,
        })
    }
}

#[async_trait]
impl AssetStore for SqliteStore {
    async fn create_asset(&self, asset: NewAsset) -> Result<Asset> {
        let stored = Asset {
            id: Uuid::new_v4().to_string(),
            project_id: asset.project_id,
            asset_type: asset.asset_type,
            name: asset.name,
            size: asset.size,
            created_at: now(),
        };

        sqlx::query(
            "INSERT INTO assets (id, project_id, asset_type, name, size, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&stored.id)
        .bind(&stored.project_id)
        .bind(stored.asset_type.as_str())
        .bind(&stored.name)
        .bind(stored.size)
        .bind(stored.created_at)
        .execute(&self.pool)
        .await?;

        Ok(stored)
    }

    async fn get_asset(&self, project_id: &str, name: &str) -> Result<Option<Asset>> {
        let row = sqlx::query(
            "SELECT id, project_id, asset_type, name, size, created_at FROM assets WHERE project_id = ? AND name = ?",
        )
        .bind(project_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(asset_from_row).transpose()
    }

    async fn list_assets(&self, project_id: &str, asset_type: AssetType) -> Result<Vec<Asset>> {
        let rows = sqlx::query(
            r#"
            SELECT id, project_id, asset_type, name, size, created_at
            FROM assets
            WHERE project_id = ? AND asset_type = ?
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(project_id)
        .bind(asset_type.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(asset_from_row).collect()
    }
}

#[async_trait]
impl ChunkStore for SqliteStore {
    async fn insert_batch(&self, records: &[ChunkRecord]) -> Result<usize> {
        for (i, batch) in records.chunks(self.batch_size).enumerate() {
            let mut tx = self.pool.begin().await?;

            for record in batch {
                let metadata_json = serde_json::to_string(&record.metadata)?;
                sqlx::query(
                    "INSERT INTO chunks (id, project_id, asset_id, chunk_order, text, metadata_json, hash) VALUES (?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(&record.id)
                .bind(&record.project_id)
                .bind(&record.asset_id)
                .bind(record.order)
                .bind(&record.text)
                .bind(&metadata_json)
                .bind(&record.hash)
                .execute(&mut *tx)
                .await?;
            }

            tx.commit().await?;
            tracing::trace!(sub_batch = i, records = batch.len(), "chunk sub-batch committed");
        }

        Ok(records.len())
    }

    async fn delete_by_project(&self, project_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM chunks WHERE project_id = ?")
            .bind(project_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn get_by_id(&self, chunk_id: &str) -> Result<Option<ChunkRecord>> {
        let row = sqlx::query(&format!("SELECT {} FROM chunks WHERE id = ?", CHUNK_COLUMNS))
            .bind(chunk_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(chunk_from_row).transpose()
    }

    async fn count_by_project(&self, project_id: &str) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE project_id = ?")
            .bind(project_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    async fn list_by_asset(&self, project_id: &str, asset_id: &str) -> Result<Vec<ChunkRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM chunks WHERE project_id = ? AND asset_id = ? ORDER BY chunk_order ASC",
            CHUNK_COLUMNS
        ))
        .bind(project_id)
        .bind(asset_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(chunk_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::split_text;
    use crate::records::build_records;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_store(batch_size: usize) -> SqliteStore {
        // A single connection keeps every query on the same in-memory database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        SqliteStore::from_pool(pool, batch_size).await.unwrap()
    }

    fn records(project_id: &str, asset_id: &str, n: usize) -> Vec<ChunkRecord> {
        let chunks = split_text(&"0123456789".repeat(n), 10, 0).unwrap();
        build_records(chunks, project_id, asset_id).unwrap()
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let store = memory_store(100).await;
        migrate::run_migrations(store.pool()).await.unwrap();
        migrate::run_migrations(store.pool()).await.unwrap();
    }

    #[tokio::test]
    async fn test_get_or_create_project_single_row() {
        let store = memory_store(100).await;
        let a = store.get_or_create_project("demo").await.unwrap();
        let b = store.get_or_create_project("demo").await.unwrap();
        assert_eq!(a.id, b.id);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM projects")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_list_projects_offset_beyond_i64() {
        let store = memory_store(100).await;
        for id in ["a", "b", "c"] {
            store.get_or_create_project(id).await.unwrap();
        }
        let page = store.list_projects(u64::MAX, 100).await.unwrap();
        assert!(page.projects.is_empty());
        assert_eq!(page.total_pages, 1);

        // Fits in u64 but not in SQLite's signed OFFSET.
        let page = store.list_projects((1u64 << 61) + 1, 4).await.unwrap();
        assert!(page.projects.is_empty());

        let page = store.list_projects(1, u64::MAX).await.unwrap();
        assert_eq!(page.projects.len(), 3);
    }

    #[tokio::test]
    async fn test_assets_listed_in_upload_order() {
        let store = memory_store(100).await;
        let project = store.get_or_create_project("demo").await.unwrap();
        for name in ["c.txt", "a.txt", "b.txt"] {
            store
                .create_asset(NewAsset {
                    project_id: project.id.clone(),
                    asset_type: AssetType::File,
                    name: name.to_string(),
                    size: 1,
                })
                .await
                .unwrap();
        }
        let names: Vec<String> = store
            .list_assets(&project.id, AssetType::File)
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.name)
            .collect();
        assert_eq!(names, vec!["c.txt", "a.txt", "b.txt"]);

        let found = store.get_asset(&project.id, "a.txt").await.unwrap();
        assert_eq!(found.unwrap().name, "a.txt");
        assert!(store.get_asset(&project.id, "zzz.txt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_batch_round_trip_in_order() {
        let store = memory_store(4).await;
        let recs = records("p1", "a1", 11);
        assert_eq!(store.insert_batch(&recs).await.unwrap(), 11);

        let listed = store.list_by_asset("p1", "a1").await.unwrap();
        assert_eq!(listed, recs);

        let one = store.get_by_id(&recs[5].id).await.unwrap().unwrap();
        assert_eq!(one.order, 6);
        assert_eq!(one.metadata["start_offset"], 50);
        assert!(store.get_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_sub_batch_keeps_earlier_batches() {
        let store = memory_store(3).await;
        let mut recs = records("p1", "a1", 7);
        // Record 5 sits in the second sub-batch and collides with record 1.
        recs[4].id = recs[0].id.clone();

        assert!(store.insert_batch(&recs).await.is_err());
        let listed = store.list_by_asset("p1", "a1").await.unwrap();
        let orders: Vec<i64> = listed.iter().map(|r| r.order).collect();
        assert_eq!(orders, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_delete_then_insert_scoped_to_project() {
        let store = memory_store(100).await;
        store.insert_batch(&records("p1", "a1", 40)).await.unwrap();
        store.insert_batch(&records("p2", "a2", 9)).await.unwrap();

        assert_eq!(store.delete_by_project("p1").await.unwrap(), 40);
        let fresh = records("p1", "a1", 25);
        store.insert_batch(&fresh).await.unwrap();

        assert_eq!(store.count_by_project("p1").await.unwrap(), 25);
        assert_eq!(store.count_by_project("p2").await.unwrap(), 9);
        assert_eq!(store.list_by_asset("p1", "a1").await.unwrap(), fresh);
    }

    #[tokio::test]
    async fn test_delete_matches_project_id_exactly() {
        let store = memory_store(100).await;
        store.insert_batch(&records("p1", "a1", 2)).await.unwrap();
        store.insert_batch(&records("p10", "a2", 3)).await.unwrap();
        store.insert_batch(&records("P1", "a3", 4)).await.unwrap();

        assert_eq!(store.delete_by_project("p1").await.unwrap(), 2);
        assert_eq!(store.count_by_project("p10").await.unwrap(), 3);
        assert_eq!(store.count_by_project("P1").await.unwrap(), 4);
    }
}
