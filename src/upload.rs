//! File uploads.
//!
//! An upload is validated against the `[files]` policy, streamed to
//! `<files.dir>/<project_id>/<random>_<clean name>`, and recorded as a file
//! asset of the project. The stored file name doubles as the asset's content
//! key, and is what process requests refer to as `file_id`.

use async_trait::async_trait;
use axum::body::Bytes;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use uuid::Uuid;

use crate::config::FilesConfig;
use crate::error::UploadError;
use crate::models::{is_valid_project_id, Asset, AssetType, NewAsset, Project};
use crate::store::DocumentStore;

/// Length of the random prefix on stored file names.
const RANDOM_PREFIX_LEN: usize = 12;

/// A body delivered in pieces.
#[async_trait]
pub trait UploadSource: Send {
    /// Next piece of the body, or `None` once it is exhausted.
    async fn next_piece(&mut self) -> Result<Option<Bytes>, UploadError>;
}

/// An in-memory body handed out in fixed-size pieces.
pub struct BytesSource {
    data: Bytes,
    piece_len: usize,
}

impl BytesSource {
    pub fn new(data: impl Into<Bytes>, piece_len: usize) -> Self {
        Self {
            data: data.into(),
            piece_len: piece_len.max(1),
        }
    }
}

#[async_trait]
impl UploadSource for BytesSource {
    async fn next_piece(&mut self) -> Result<Option<Bytes>, UploadError> {
        if self.data.is_empty() {
            return Ok(None);
        }
        let n = self.piece_len.min(self.data.len());
        Ok(Some(self.data.split_to(n)))
    }
}

/// Result of a stored upload.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub project: Project,
    pub asset: Asset,
}

/// Check a declared content type against the allowed list.
pub fn validate_content_type(files: &FilesConfig, content_type: &str) -> Result<(), UploadError> {
    // Ignore parameters such as `; charset=utf-8`.
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if files
        .allowed_types
        .iter()
        .any(|allowed| allowed.eq_ignore_ascii_case(&essence))
    {
        Ok(())
    } else {
        Err(UploadError::UnsupportedType(content_type.to_string()))
    }
}

/// Reduce an uploaded file name to `[A-Za-z0-9._-]`, turning spaces into
/// underscores. Falls back to `file` when nothing survives.
pub fn clean_file_name(original: &str) -> String {
    // Browsers may send a full client-side path.
    let base = original.rsplit(&['/', '\\'][..]).next().unwrap_or_default();
    let cleaned: String = base
        .trim()
        .chars()
        .filter_map(|c| match c {
            ' ' => Some('_'),
            c if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' => Some(c),
            _ => None,
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Attempts at finding an unused stored name before giving up.
const MAX_NAME_ATTEMPTS: usize = 16;

fn random_prefix() -> String {
    Uuid::new_v4().simple().to_string()[..RANDOM_PREFIX_LEN].to_string()
}

/// Stored name for an upload of `original`: a random prefix and the cleaned
/// name.
pub fn stored_file_name(original: &str) -> String {
    format!("{}_{}", random_prefix(), clean_file_name(original))
}

/// Create a file in `dir` that did not exist before, taking names from
/// `next_name` until one is free. Existing files are never opened.
pub async fn create_unique_file(
    dir: &Path,
    mut next_name: impl FnMut() -> String,
) -> std::io::Result<(File, PathBuf, String)> {
    for _ in 0..MAX_NAME_ATTEMPTS {
        let name = next_name();
        let path = dir.join(&name);
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => return Ok((file, path, name)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }
    Err(std::io::Error::new(
        ErrorKind::AlreadyExists,
        format!("no free file name in {}", dir.display()),
    ))
}

async fn remove_partial(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        tracing::warn!(path = %path.display(), error = %e, "failed to remove stored upload");
    }
}

/// Validate, store and record one uploaded file.
///
/// Nothing is created for uploads rejected by validation. When writing fails
/// part way, the partial file is removed.
pub async fn save_upload(
    store: &dyn DocumentStore,
    files: &FilesConfig,
    project_id: &str,
    original_name: &str,
    content_type: &str,
    source: &mut dyn UploadSource,
) -> Result<UploadOutcome, UploadError> {
    if !is_valid_project_id(project_id) {
        return Err(UploadError::InvalidProjectId(project_id.to_string()));
    }
    validate_content_type(files, content_type)?;

    let project = store.get_or_create_project(project_id).await?;

    let dir = files.dir.join(project_id);
    tokio::fs::create_dir_all(&dir).await?;
    let (file, path, name) = create_unique_file(&dir, || stored_file_name(original_name)).await?;

    let size = match write_file(file, source, files).await {
        Ok(size) => size,
        Err(e) => {
            remove_partial(&path).await;
            return Err(e);
        }
    };

    let created = store
        .create_asset(NewAsset {
            project_id: project.id.clone(),
            asset_type: AssetType::File,
            name,
            size: size as i64,
        })
        .await;
    let asset = match created {
        Ok(asset) => asset,
        Err(e) => {
            // A file without an asset record would never be processed.
            remove_partial(&path).await;
            return Err(e.into());
        }
    };

    tracing::info!(project_id, file = %asset.name, size, "stored upload");
    Ok(UploadOutcome { project, asset })
}

async fn write_file(
    file: File,
    source: &mut dyn UploadSource,
    files: &FilesConfig,
) -> Result<u64, UploadError> {
    let max = files.max_size_bytes();
    let mut writer = BufWriter::with_capacity(files.read_buffer_bytes, file);
    let mut size: u64 = 0;

    while let Some(piece) = source.next_piece().await? {
        size += piece.len() as u64;
        if size > max {
            return Err(UploadError::TooLarge { size, max });
        }
        writer.write_all(&piece).await?;
    }

    writer.flush().await?;
    Ok(size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkRecord;
    use crate::store::memory::InMemoryStore;
    use crate::store::{AssetStore, ChunkStore, ProjectPage, ProjectStore};
    use tempfile::TempDir;

    /// Delegates to an in-memory store but refuses to record assets.
    struct AssetsUnavailable(InMemoryStore);

    #[async_trait]
    impl ProjectStore for AssetsUnavailable {
        async fn get_or_create_project(&self, project_id: &str) -> anyhow::Result<Project> {
            self.0.get_or_create_project(project_id).await
        }
        async fn list_projects(&self, page: u64, page_size: u64) -> anyhow::Result<ProjectPage> {
            self.0.list_projects(page, page_size).await
        }
    }

    #[async_trait]
    impl AssetStore for AssetsUnavailable {
        async fn create_asset(&self, _asset: NewAsset) -> anyhow::Result<Asset> {
            anyhow::bail!("assets table unavailable")
        }
        async fn get_asset(&self, project_id: &str, name: &str) -> anyhow::Result<Option<Asset>> {
            self.0.get_asset(project_id, name).await
        }
        async fn list_assets(
            &self,
            project_id: &str,
            asset_type: AssetType,
        ) -> anyhow::Result<Vec<Asset>> {
            self.0.list_assets(project_id, asset_type).await
        }
    }

    #[async_trait]
    impl ChunkStore for AssetsUnavailable {
        async fn insert_batch(&self, records: &[ChunkRecord]) -> anyhow::Result<usize> {
            self.0.insert_batch(records).await
        }
        async fn delete_by_project(&self, project_id: &str) -> anyhow::Result<u64> {
            self.0.delete_by_project(project_id).await
        }
        async fn get_by_id(&self, chunk_id: &str) -> anyhow::Result<Option<ChunkRecord>> {
            self.0.get_by_id(chunk_id).await
        }
        async fn count_by_project(&self, project_id: &str) -> anyhow::Result<u64> {
            self.0.count_by_project(project_id).await
        }
        async fn list_by_asset(
            &self,
            project_id: &str,
            asset_id: &str,
        ) -> anyhow::Result<Vec<ChunkRecord>> {
            self.0.list_by_asset(project_id, asset_id).await
        }
    }

    fn files_config(dir: &Path) -> FilesConfig {
        FilesConfig {
            dir: dir.to_path_buf(),
            allowed_types: vec!["text/plain".to_string()],
            max_size_mb: 1,
            read_buffer_bytes: 64,
        }
    }

    #[test]
    fn test_clean_file_name() {
        assert_eq!(clean_file_name("my notes (v2).txt"), "my_notes_v2.txt");
        assert_eq!(clean_file_name("C:\\Users\\me\\report.md"), "report.md");
        assert_eq!(clean_file_name("../../etc/passwd"), "passwd");
        assert_eq!(clean_file_name("..."), "file");
        assert_eq!(clean_file_name("日本語"), "file");
    }

    #[test]
    fn test_stored_file_name_shape() {
        let name = stored_file_name("a b.txt");
        assert_eq!(name.len(), RANDOM_PREFIX_LEN + 1 + "a_b.txt".len());
        assert!(name.ends_with("_a_b.txt"));
        assert_ne!(stored_file_name("a b.txt"), name);
    }

    #[tokio::test]
    async fn test_create_unique_file_skips_existing() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("taken.txt"), "keep me").unwrap();

        let mut names = vec!["fresh.txt", "taken.txt"];
        let (_file, path, name) =
            create_unique_file(tmp.path(), || names.pop().unwrap().to_string())
                .await
                .unwrap();

        assert_eq!(name, "fresh.txt");
        assert_eq!(path, tmp.path().join("fresh.txt"));
        let kept = std::fs::read_to_string(tmp.path().join("taken.txt")).unwrap();
        assert_eq!(kept, "keep me");
    }

    #[tokio::test]
    async fn test_create_unique_file_gives_up() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("taken.txt"), "x").unwrap();
        let err = create_unique_file(tmp.path(), || "taken.txt".to_string())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    }

    #[test]
    fn test_content_type_validation() {
        let tmp = TempDir::new().unwrap();
        let cfg = files_config(tmp.path());
        assert!(validate_content_type(&cfg, "text/plain").is_ok());
        assert!(validate_content_type(&cfg, "Text/Plain; charset=utf-8").is_ok());
        assert!(matches!(
            validate_content_type(&cfg, "application/pdf"),
            Err(UploadError::UnsupportedType(_))
        ));
    }

    #[tokio::test]
    async fn test_save_upload_writes_file_and_asset() {
        let tmp = TempDir::new().unwrap();
        let cfg = files_config(tmp.path());
        let store = InMemoryStore::new();
        let body = "line one\nline two\n".repeat(20);
        let mut source = BytesSource::new(body.clone(), 17);

        let outcome = save_upload(&store, &cfg, "demo", "notes.txt", "text/plain", &mut source)
            .await
            .unwrap();

        let on_disk = std::fs::read_to_string(tmp.path().join("demo").join(&outcome.asset.name))
            .unwrap();
        assert_eq!(on_disk, body);
        assert_eq!(outcome.asset.size, body.len() as i64);
        assert_eq!(outcome.asset.project_id, outcome.project.id);

        let found = store
            .get_asset(&outcome.project.id, &outcome.asset.name)
            .await
            .unwrap();
        assert_eq!(found, Some(outcome.asset));
    }

    #[tokio::test]
    async fn test_oversized_upload_leaves_nothing() {
        let tmp = TempDir::new().unwrap();
        let cfg = files_config(tmp.path());
        let store = InMemoryStore::new();
        let mut source = BytesSource::new(vec![b'a'; 1024 * 1024 + 1], 4096);

        let err = save_upload(&store, &cfg, "demo", "big.txt", "text/plain", &mut source)
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::TooLarge { .. }));

        let leftover = std::fs::read_dir(tmp.path().join("demo")).unwrap().count();
        assert_eq!(leftover, 0);
        let project = store.get_or_create_project("demo").await.unwrap();
        assert!(store
            .list_assets(&project.id, AssetType::File)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_failed_asset_record_removes_file() {
        let tmp = TempDir::new().unwrap();
        let cfg = files_config(tmp.path());
        let store = AssetsUnavailable(InMemoryStore::new());
        let mut source = BytesSource::new("orphan candidate", 64);

        let err = save_upload(&store, &cfg, "demo", "a.txt", "text/plain", &mut source)
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Store(_)));
        assert_eq!(err.signal(), crate::signal::ResponseSignal::InternalError);

        let leftover = std::fs::read_dir(tmp.path().join("demo")).unwrap().count();
        assert_eq!(leftover, 0);
    }

    #[tokio::test]
    async fn test_rejected_type_creates_nothing() {
        let tmp = TempDir::new().unwrap();
        let cfg = files_config(tmp.path());
        let store = InMemoryStore::new();
        let mut source = BytesSource::new("%PDF-1.7", 64);

        let err = save_upload(&store, &cfg, "demo", "x.pdf", "application/pdf", &mut source)
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::UnsupportedType(_)));
        assert!(!tmp.path().join("demo").exists());
    }

    #[tokio::test]
    async fn test_invalid_project_id_rejected() {
        let tmp = TempDir::new().unwrap();
        let cfg = files_config(tmp.path());
        let store = InMemoryStore::new();
        let mut source = BytesSource::new("hi", 64);
        let err = save_upload(&store, &cfg, "../up", "a.txt", "text/plain", &mut source)
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::InvalidProjectId(_)));
    }
}
