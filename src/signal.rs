//! Response signals.
//!
//! Every HTTP response carries a `signal` field naming what happened. The set
//! is closed and each variant owns a stable wire string that clients match on.

use serde::{Serialize, Serializer};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseSignal {
    FileTypeNotSupported,
    FileSizeExceeded,
    FileUploadFailed,
    FileUploadSuccess,
    FileIdError,
    InvalidProjectId,
    NoFilesToProcess,
    InvalidChunking,
    ProcessingFailed,
    ProcessingSuccess,
    ChunkNotFound,
    /// Request body or query could not be parsed.
    InvalidRequest,
    InternalError,
}

impl ResponseSignal {
    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseSignal::FileTypeNotSupported => "file_type_not_supported",
            ResponseSignal::FileSizeExceeded => "file_size_exceeded",
            ResponseSignal::FileUploadFailed => "file_upload_failed",
            ResponseSignal::FileUploadSuccess => "file_upload_success",
            ResponseSignal::FileIdError => "file_id_error",
            ResponseSignal::InvalidProjectId => "invalid_project_id",
            ResponseSignal::NoFilesToProcess => "no_files_to_process",
            ResponseSignal::InvalidChunking => "invalid_chunking",
            ResponseSignal::ProcessingFailed => "processing_failed",
            ResponseSignal::ProcessingSuccess => "processing_success",
            ResponseSignal::ChunkNotFound => "chunk_not_found",
            ResponseSignal::InvalidRequest => "invalid_request",
            ResponseSignal::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for ResponseSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ResponseSignal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_as_wire_string() {
        let json = serde_json::to_value(ResponseSignal::ProcessingSuccess).unwrap();
        assert_eq!(json, serde_json::json!("processing_success"));
    }

    #[test]
    fn test_display_matches_wire_string() {
        assert_eq!(ResponseSignal::FileIdError.to_string(), "file_id_error");
    }
}
