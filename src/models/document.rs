use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Suffix appended to the file name of synthetic numeric-summary chunks.
pub const SUMMARY_SUFFIX: &str = "::summary";

/// Where the text of a document comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentBody {
    /// Inline text supplied by the caller.
    Content(String),
    /// A file the service reads itself.
    Path(PathBuf),
}

/// A document handed to `ingest`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub job_id: String,
    pub file_name: String,
    pub body: DocumentBody,
}

impl Document {
    pub fn from_content(
        job_id: impl Into<String>,
        file_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            file_name: file_name.into(),
            body: DocumentBody::Content(content.into()),
        }
    }

    pub fn from_path(job_id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());
        Self {
            job_id: job_id.into(),
            file_name,
            body: DocumentBody::Path(path),
        }
    }
}

/// Provenance of one stored vector. Position `i` in the metadata array
/// describes position `i` in the vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMeta {
    pub chunk_id: String,
    pub job_id: String,
    pub file_name: String,
    pub text: String,
}

impl ChunkMeta {
    pub fn new(job_id: &str, file_name: &str, text: String) -> Self {
        Self {
            chunk_id: uuid::Uuid::new_v4().to_string(),
            job_id: job_id.to_string(),
            file_name: file_name.to_string(),
            text,
        }
    }

    pub fn summary(job_id: &str, file_name: &str, text: String) -> Self {
        Self::new(job_id, &format!("{file_name}{SUMMARY_SUFFIX}"), text)
    }

    pub fn is_summary(&self) -> bool {
        self.file_name.ends_with(SUMMARY_SUFFIX)
    }
}

/// Outcome of a single ingest, returned to the ingestion caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub job_id: String,
    /// Text chunks produced (the numeric summary is not counted).
    pub num_chunks: usize,
    pub indexed: bool,
    pub summary_chunk: bool,
    pub skipped_cells: usize,
    pub skipped_rows: usize,
    /// Bytes dropped while decoding the file as UTF-8.
    pub skipped_bytes: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_ids_are_unique() {
        let a = ChunkMeta::new("job", "a.txt", "x".to_string());
        let b = ChunkMeta::new("job", "a.txt", "x".to_string());
        assert_ne!(a.chunk_id, b.chunk_id);
        assert_eq!(a.chunk_id.len(), 36);
    }

    #[test]
    fn test_summary_suffix() {
        let meta = ChunkMeta::summary("job", "ledger.csv", "amt=sum:1.00".to_string());
        assert_eq!(meta.file_name, "ledger.csv::summary");
        assert!(meta.is_summary());
        assert!(!ChunkMeta::new("job", "ledger.csv", String::new()).is_summary());
    }

    #[test]
    fn test_document_from_path_uses_file_name() {
        let doc = Document::from_path("j1", "/data/in/report.md");
        assert_eq!(doc.file_name, "report.md");
        assert!(matches!(doc.body, DocumentBody::Path(_)));
    }
}
