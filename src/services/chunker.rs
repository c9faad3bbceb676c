//! Fixed-size, non-overlapping text chunking.

use crate::models::{ChunkMeta, IndexConfig, IngestConfig};
use crate::services::tabular::{TabularSummary, is_tabular, summarize};

/// Splits documents into fixed-size character spans.
#[derive(Debug, Clone)]
pub struct TextChunker {
    /// Maximum chunk length in characters
    chunk_size: usize,
    /// Data rows read when summarising tabular files
    tabular_rows: usize,
}

/// Chunks of one document, ready to be vectorized.
#[derive(Debug, Clone, Default)]
pub struct ChunkedDocument {
    /// Text chunks followed by the numeric summary chunk, if any.
    pub entries: Vec<ChunkMeta>,
    /// Text chunks only.
    pub num_chunks: usize,
    pub summary_chunk: bool,
    pub skipped_cells: usize,
    pub skipped_rows: usize,
}

impl TextChunker {
    pub fn new(index: &IndexConfig, ingest: &IngestConfig) -> Self {
        Self {
            chunk_size: index.chunk_size.max(1),
            tabular_rows: ingest.tabular_rows,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(&IndexConfig::default(), &IngestConfig::default())
    }

    /// Chunk a document's text and, for tabular files, append the numeric
    /// summary pseudo-chunk.
    pub fn chunk_document(&self, job_id: &str, file_name: &str, text: &str) -> ChunkedDocument {
        let mut entries: Vec<ChunkMeta> = chunk_text(text, self.chunk_size)
            .into_iter()
            .map(|span| ChunkMeta::new(job_id, file_name, span.to_string()))
            .collect();
        let num_chunks = entries.len();

        let mut doc = ChunkedDocument {
            num_chunks,
            ..Default::default()
        };

        if is_tabular(file_name) {
            let TabularSummary {
                text: summary,
                skipped_cells,
                skipped_rows,
                ..
            } = summarize(file_name, text, self.tabular_rows);
            doc.skipped_cells = skipped_cells;
            doc.skipped_rows = skipped_rows;
            if let Some(summary) = summary {
                entries.push(ChunkMeta::summary(job_id, file_name, summary));
                doc.summary_chunk = true;
            }
        }

        doc.entries = entries;
        doc
    }
}

/// Slice `text` at character offsets `[0, max_len), [max_len, 2*max_len), ...`.
///
/// Empty input yields no chunks; the last chunk may be shorter than `max_len`.
pub fn chunk_text(text: &str, max_len: usize) -> Vec<&str> {
    if text.is_empty() {
        return Vec::new();
    }
    let max_len = max_len.max(1);

    let mut chunks = Vec::new();
    let mut start = 0;
    for (count, (byte_idx, _)) in text.char_indices().enumerate() {
        if count > 0 && count % max_len == 0 {
            chunks.push(&text[start..byte_idx]);
            start = byte_idx;
        }
    }
    chunks.push(&text[start..]);
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text_yields_no_chunks() {
        assert!(chunk_text("", 1000).is_empty());
        let doc = TextChunker::with_defaults().chunk_document("job", "a.txt", "");
        assert!(doc.entries.is_empty());
        assert_eq!(doc.num_chunks, 0);
    }

    #[test]
    fn test_chunk_count_and_concatenation() {
        for (len, size) in [(1usize, 1000usize), (999, 1000), (1000, 1000), (1001, 1000), (2500, 1000), (17, 4)] {
            let text: String = (0..len).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
            let chunks = chunk_text(&text, size);
            assert_eq!(chunks.len(), len.div_ceil(size), "len={len} size={size}");
            for chunk in &chunks[..chunks.len() - 1] {
                assert_eq!(chunk.chars().count(), size);
            }
            assert!(chunks.last().unwrap().chars().count() <= size);
            assert_eq!(chunks.concat(), text);
        }
    }

    #[test]
    fn test_chunks_measure_characters_not_bytes() {
        let text = "é".repeat(5);
        let chunks = chunk_text(&text, 2);
        assert_eq!(chunks, vec!["éé", "éé", "é"]);
    }

    #[test]
    fn test_plain_document_has_no_summary() {
        let chunker = TextChunker::with_defaults();
        let doc = chunker.chunk_document("job", "notes.txt", "amt\n10\n20\n");
        assert_eq!(doc.num_chunks, 1);
        assert_eq!(doc.entries.len(), 1);
        assert!(!doc.summary_chunk);
    }

    #[test]
    fn test_csv_document_gets_summary_chunk() {
        let chunker = TextChunker::with_defaults();
        let doc = chunker.chunk_document("job", "ledger.csv", "amt\n\"$10.00\"\n\"$20.00\"\n");
        assert_eq!(doc.num_chunks, 1);
        assert_eq!(doc.entries.len(), 2);
        assert!(doc.summary_chunk);
        let summary = &doc.entries[1];
        assert!(summary.is_summary());
        assert!(summary.text.contains("amt=sum:30.00@count:2@avg:15.00"));
    }

    #[test]
    fn test_every_chunk_tagged_with_job_and_file() {
        let config = IndexConfig {
            chunk_size: 10,
            ..Default::default()
        };
        let chunker = TextChunker::new(&config, &IngestConfig::default());
        let doc = chunker.chunk_document("job-7", "a.md", &"x".repeat(35));
        assert_eq!(doc.num_chunks, 4);
        assert!(doc.entries.iter().all(|c| c.job_id == "job-7" && c.file_name == "a.md"));
    }
}
