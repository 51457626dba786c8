//! Turns chunker output into persistable [`ChunkRecord`]s.
//!
//! Order numbers are assigned here, not by the store: record `i` of the input
//! gets `order = i + 1`, so a file's chunks always read back as `1..=N`.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::ProcessError;
use crate::models::{ChunkRecord, TextChunk};

/// Tag `chunks` with their owning project and asset.
///
/// An empty input is a processing failure: the caller asked for records of a
/// file that produced nothing.
pub fn build_records(
    chunks: Vec<TextChunk>,
    project_id: &str,
    asset_id: &str,
) -> Result<Vec<ChunkRecord>, ProcessError> {
    if chunks.is_empty() {
        return Err(ProcessError::ProcessingFailed(asset_id.to_string()));
    }

    Ok(chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| ChunkRecord {
            id: Uuid::new_v4().to_string(),
            hash: text_hash(&chunk.text),
            text: chunk.text,
            metadata: chunk.metadata,
            order: i as i64 + 1,
            project_id: project_id.to_string(),
            asset_id: asset_id.to_string(),
        })
        .collect())
}

/// SHA-256 hex digest of a chunk's text.
pub fn text_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
