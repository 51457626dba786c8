//! Raw content access for stored assets.
//!
//! Uploaded files live at `<files.dir>/<project_id>/<asset name>`. The
//! processing pipeline reads them through [`ContentReader`] so tests can
//! substitute an in-memory source.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::error::ReadError;
use crate::models::{Asset, Project};

#[async_trait]
pub trait ContentReader: Send + Sync {
    /// Read an asset's full content as text.
    async fn read(&self, project: &Project, asset: &Asset) -> Result<String, ReadError>;
}

/// Reads assets from the upload directory.
#[derive(Debug, Clone)]
pub struct FsContentReader {
    root: PathBuf,
}

impl FsContentReader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding a project's uploads, keyed by the client-supplied id.
    pub fn project_dir(&self, project_id: &str) -> PathBuf {
        self.root.join(project_id)
    }

    pub fn asset_path(&self, project: &Project, asset: &Asset) -> PathBuf {
        self.project_dir(&project.project_id).join(&asset.name)
    }
}

#[async_trait]
impl ContentReader for FsContentReader {
    async fn read(&self, project: &Project, asset: &Asset) -> Result<String, ReadError> {
        let path = self.asset_path(project, asset);
        let bytes = tokio::fs::read(&path).await.map_err(|source| ReadError::Io {
            name: asset.name.clone(),
            source,
        })?;
        String::from_utf8(bytes).map_err(|_| ReadError::NotUtf8 {
            name: asset.name.clone(),
        })
    }
}

/// Content held in memory, keyed by `(project_id, asset name)`.
#[derive(Default)]
pub struct MemoryContentReader {
    files: RwLock<HashMap<(String, String), Vec<u8>>>,
}

impl MemoryContentReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register raw bytes for an asset. `project_id` is the client-supplied id.
    pub fn insert(&self, project_id: &str, name: &str, bytes: impl Into<Vec<u8>>) {
        if let Ok(mut files) = self.files.write() {
            files.insert((project_id.to_string(), name.to_string()), bytes.into());
        }
    }
}

#[async_trait]
impl ContentReader for MemoryContentReader {
    async fn read(&self, project: &Project, asset: &Asset) -> Result<String, ReadError> {
        let bytes = self
            .files
            .read()
            .ok()
            .and_then(|files| {
                files
                    .get(&(project.project_id.clone(), asset.name.clone()))
                    .cloned()
            })
            .ok_or_else(|| ReadError::Io {
                name: asset.name.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
            })?;
        String::from_utf8(bytes).map_err(|_| ReadError::NotUtf8 {
            name: asset.name.clone(),
        })
    }
}
