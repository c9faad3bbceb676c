mod assembler;
mod chunker;
mod engine;
pub mod index;
mod metrics;
pub mod snapshot;
pub mod state;
mod tabular;
pub mod vectorizer;

pub use assembler::{NO_DOCUMENTS_MESSAGE, NOTHING_FOUND_MESSAGE, assemble_answer};
pub use chunker::{ChunkedDocument, TextChunker, chunk_text};
pub use engine::IndexService;
pub use index::{Neighbor, VectorIndex};
pub use metrics::{MetricsStore, MetricsSummary};
pub use snapshot::{Manifest, SnapshotStore};
pub use state::IndexState;
pub use tabular::{CellOutcome, TabularSummary, coerce_cell, summarize};
pub use vectorizer::{
    Embedder, HashEmbedder, InputKind, OnnxEmbedder, QueryVector, SharedEmbedder, SparseVector,
    TfidfVectorizer, Vectorizer,
};
