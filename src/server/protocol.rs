use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::IngestError;
use crate::models::{
    Answer, Document, DocumentBody, Health, IndexStatus, IngestReport, SearchResults,
};
use crate::services::MetricsSummary;

/// Frames larger than this are rejected.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    Ping,
    Shutdown,
    Status,
    Health,
    Ingest(IngestRequest),
    Search(QueryRequest),
    Generate(QueryRequest),
    Rebuild,
    Clear,
}

impl Request {
    /// Operation name recorded in metrics.
    pub fn operation(&self) -> &'static str {
        match self {
            Request::Ping => "ping",
            Request::Shutdown => "shutdown",
            Request::Status => "status",
            Request::Health => "health",
            Request::Ingest(_) => "ingest",
            Request::Search(_) => "search",
            Request::Generate(_) => "generate",
            Request::Rebuild => "rebuild",
            Request::Clear => "clear",
        }
    }
}

/// A document to ingest: inline `content`, or a `path` the daemon reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRequest {
    pub job_id: String,
    pub file_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl TryFrom<IngestRequest> for Document {
    type Error = IngestError;

    fn try_from(req: IngestRequest) -> Result<Self, Self::Error> {
        let body = match (req.content, req.path) {
            (Some(content), _) => DocumentBody::Content(content),
            (None, Some(path)) => DocumentBody::Path(path),
            (None, None) => return Err(IngestError::MissingContent),
        };
        Ok(Document {
            job_id: req.job_id,
            file_name: req.file_name,
            body,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    pub k: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Pong,
    ShutdownAck,
    Status(StatusResponse),
    Health(Health),
    Ingest(IngestReport),
    Search(SearchResults),
    Generate(Answer),
    Index(IndexStatus),
    Error(ErrorResponse),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub running: bool,
    pub pid: u32,
    pub idle_secs: u64,
    pub requests_served: u64,
    pub index: IndexStatus,
    pub metrics: Option<MetricsSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
}

impl Response {
    pub fn error(message: impl Into<String>) -> Self {
        Response::Error(ErrorResponse {
            message: message.into(),
        })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error(_))
    }
}

pub fn encode_message(msg: &impl Serialize) -> Result<Vec<u8>, serde_json::Error> {
    let json = serde_json::to_vec(msg)?;
    let len = (json.len() as u32).to_be_bytes();
    let mut buf = Vec::with_capacity(4 + json.len());
    buf.extend_from_slice(&len);
    buf.extend_from_slice(&json);
    Ok(buf)
}

pub fn decode_length(buf: &[u8; 4]) -> usize {
    u32::from_be_bytes(*buf) as usize
}
