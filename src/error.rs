//! Error taxonomy for the upload and processing paths.
//!
//! Each error kind maps onto exactly one [`ResponseSignal`] so the HTTP layer
//! never has to inspect messages to pick a response.

use crate::signal::ResponseSignal;

/// Rejected chunk window parameters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChunkingError {
    #[error("chunk_size must be > 0")]
    ZeroChunkSize,
    #[error("overlap_size ({overlap_size}) must be smaller than chunk_size ({chunk_size})")]
    OverlapTooLarge {
        chunk_size: usize,
        overlap_size: usize,
    },
}

/// Failure reading a stored file's content. Never fatal for a batch.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("failed to read {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{name} is not valid UTF-8 text")]
    NotUtf8 { name: String },
}

/// Failure of a `process_project` call.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("invalid project id: {0:?}")]
    InvalidProjectId(String),
    #[error("invalid chunking parameters: {0}")]
    InvalidChunking(#[from] ChunkingError),
    #[error("file not found in project: {0}")]
    FileNotFound(String),
    #[error("project has no files to process")]
    NoFilesToProcess,
    #[error("chunking produced no output for file: {0}")]
    ProcessingFailed(String),
    #[error("store error: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl ProcessError {
    pub fn signal(&self) -> ResponseSignal {
        match self {
            ProcessError::InvalidProjectId(_) => ResponseSignal::InvalidProjectId,
            ProcessError::InvalidChunking(_) => ResponseSignal::InvalidChunking,
            ProcessError::FileNotFound(_) => ResponseSignal::FileIdError,
            ProcessError::NoFilesToProcess => ResponseSignal::NoFilesToProcess,
            ProcessError::ProcessingFailed(_) => ResponseSignal::ProcessingFailed,
            ProcessError::Store(_) => ResponseSignal::InternalError,
        }
    }
}

/// Failure of an upload.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("invalid project id: {0:?}")]
    InvalidProjectId(String),
    #[error("content type not supported: {0}")]
    UnsupportedType(String),
    #[error("file size {size} exceeds the {max} byte limit")]
    TooLarge { size: u64, max: u64 },
    #[error("failed to write uploaded file: {0}")]
    WriteFailed(#[from] std::io::Error),
    #[error("malformed upload: {0}")]
    Malformed(String),
    #[error("store error: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl UploadError {
    pub fn signal(&self) -> ResponseSignal {
        match self {
            UploadError::InvalidProjectId(_) => ResponseSignal::InvalidProjectId,
            UploadError::UnsupportedType(_) => ResponseSignal::FileTypeNotSupported,
            UploadError::TooLarge { .. } => ResponseSignal::FileSizeExceeded,
            UploadError::WriteFailed(_) | UploadError::Malformed(_) => {
                ResponseSignal::FileUploadFailed
            }
            UploadError::Store(_) => ResponseSignal::InternalError,
        }
    }
}
