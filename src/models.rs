//! Core data models used throughout docchunk.
//!
//! Projects own assets (uploaded files), and every stored chunk points back
//! at exactly one project and one asset by internal identifier.

use serde::{Deserialize, Serialize};

/// Longest accepted client-supplied project id.
pub const MAX_PROJECT_ID_LEN: usize = 128;

/// Client-supplied project ids name a directory on disk, so they are limited
/// to ASCII alphanumerics, `-` and `_`.
pub fn is_valid_project_id(project_id: &str) -> bool {
    !project_id.is_empty()
        && project_id.len() <= MAX_PROJECT_ID_LEN
        && project_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// A logical workspace grouping uploaded files and their chunks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Project {
    /// Store-assigned identifier.
    pub id: String,
    /// Client-supplied identifier, unique across projects.
    pub project_id: String,
    pub created_at: i64,
}

/// Kind of asset attached to a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    File,
}

impl AssetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetType::File => "file",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "file" => Some(AssetType::File),
            _ => None,
        }
    }
}

/// One uploaded file belonging to a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Asset {
    pub id: String,
    /// Owning project's internal identifier.
    pub project_id: String,
    pub asset_type: AssetType,
    /// Content key: the stored file name inside the project directory.
    pub name: String,
    pub size: i64,
    pub created_at: i64,
}

/// Fields supplied when recording a new asset.
#[derive(Debug, Clone)]
pub struct NewAsset {
    pub project_id: String,
    pub asset_type: AssetType,
    pub name: String,
    pub size: i64,
}

/// A window of text produced by the chunker, before it is tied to a project.
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    pub text: String,
    /// Splitting metadata (`start_offset`, `end_offset`, `char_count`).
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// A persisted chunk of an asset's text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkRecord {
    pub id: String,
    pub text: String,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// 1-based position within the asset's chunk sequence.
    pub order: i64,
    pub project_id: String,
    pub asset_id: String,
    /// SHA-256 of `text`.
    pub hash: String,
}
