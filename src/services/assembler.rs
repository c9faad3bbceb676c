//! Turns index neighbours into hits and extractive answers.
//!
//! No text is generated here: an answer is the retrieved chunk text joined
//! in rank order and capped. Callers that drive an external language model
//! pass the answer on as context.

use crate::models::{Answer, AnswerConfig, ChunkMeta, SearchHit};
use crate::services::index::Neighbor;
use crate::utils::truncate_chars;

/// Answer text when the index holds no documents.
pub const NO_DOCUMENTS_MESSAGE: &str = "No documents indexed yet.";

/// Answer text when no stored chunk qualified for the query.
pub const NOTHING_FOUND_MESSAGE: &str =
    "I couldn't find relevant information in the indexed documents.";

/// Map index positions back through the metadata array.
///
/// Positions outside the metadata array are skipped.
pub fn to_hits(neighbors: &[Neighbor], metadata: &[ChunkMeta], preview_chars: usize) -> Vec<SearchHit> {
    neighbors
        .iter()
        .filter_map(|&(position, score)| {
            let meta = metadata.get(position)?;
            Some(SearchHit {
                chunk_id: meta.chunk_id.clone(),
                job_id: meta.job_id.clone(),
                file_name: meta.file_name.clone(),
                score,
                snippet: truncate_chars(&meta.text, preview_chars).to_string(),
            })
        })
        .collect()
}

/// Concatenate the texts of ranked chunks into an answer.
///
/// Each text is trimmed and cut to `per_chunk_chars`, then the joined
/// result is cut to `max_answer_chars`. Texts that are empty after
/// trimming are left out.
pub fn assemble_answer<'a>(texts: impl IntoIterator<Item = &'a str>, config: &AnswerConfig) -> String {
    let parts: Vec<&str> = texts
        .into_iter()
        .map(|t| truncate_chars(t.trim(), config.per_chunk_chars))
        .filter(|t| !t.is_empty())
        .collect();
    let joined = parts.join(&config.separator);
    truncate_chars(&joined, config.max_answer_chars).to_string()
}

/// Build the answer for ranked `neighbors`, or the fallback when none qualify.
pub fn answer(
    neighbors: &[Neighbor],
    metadata: &[ChunkMeta],
    preview_chars: usize,
    config: &AnswerConfig,
) -> Answer {
    let sources = to_hits(neighbors, metadata, preview_chars);
    let texts = neighbors
        .iter()
        .filter_map(|&(position, _)| metadata.get(position))
        .map(|meta| meta.text.as_str());
    let assembled = assemble_answer(texts, config);

    if sources.is_empty() || assembled.is_empty() {
        return Answer {
            answer: NOTHING_FOUND_MESSAGE.to_string(),
            sources: Vec::new(),
        };
    }
    Answer {
        answer: assembled,
        sources,
    }
}

/// The answer returned before anything has been ingested.
pub fn empty_index_answer() -> Answer {
    Answer {
        answer: NO_DOCUMENTS_MESSAGE.to_string(),
        sources: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metas(texts: &[&str]) -> Vec<ChunkMeta> {
        texts
            .iter()
            .map(|t| ChunkMeta::new("job-1", "doc.txt", t.to_string()))
            .collect()
    }

    #[test]
    fn test_hits_follow_neighbor_order() {
        let metadata = metas(&["first chunk", "second chunk", "third chunk"]);
        let hits = to_hits(&[(2, 0.9), (0, 0.5)], &metadata, 5);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk_id, metadata[2].chunk_id);
        assert_eq!(hits[0].snippet, "third");
        assert_eq!(hits[1].score, 0.5);
        assert_eq!(hits[1].job_id, "job-1");
        assert_eq!(hits[1].file_name, "doc.txt");
    }

    #[test]
    fn test_out_of_range_positions_skipped() {
        let metadata = metas(&["only"]);
        assert_eq!(to_hits(&[(4, 1.0), (0, 1.0)], &metadata, 400).len(), 1);
    }

    #[test]
    fn test_assemble_joins_in_rank_order() {
        let config = AnswerConfig::default();
        let answer = assemble_answer(["  alpha ", "beta\n", "   "], &config);
        assert_eq!(answer, "alpha\n\nbeta");
    }

    #[test]
    fn test_answer_never_exceeds_cap() {
        let config = AnswerConfig::default();
        let long = "x".repeat(3000);
        let metadata = metas(&[&long, &long, &long, &long]);
        let neighbors: Vec<Neighbor> = (0..4).map(|i| (i, 1.0)).collect();

        let result = answer(&neighbors, &metadata, 400, &config);
        assert_eq!(result.answer.chars().count(), config.max_answer_chars);
        assert_eq!(result.sources.len(), 4);

        let small = AnswerConfig {
            per_chunk_chars: 10,
            max_answer_chars: 25,
            separator: " | ".to_string(),
        };
        let result = answer(&neighbors, &metadata, 400, &small);
        assert_eq!(result.answer, "xxxxxxxxxx | xxxxxxxxxx |");
    }

    #[test]
    fn test_no_neighbors_gives_fallback() {
        let metadata = metas(&["text"]);
        let result = answer(&[], &metadata, 400, &AnswerConfig::default());
        assert_eq!(result.answer, NOTHING_FOUND_MESSAGE);
        assert!(result.sources.is_empty());

        assert_eq!(empty_index_answer().answer, NO_DOCUMENTS_MESSAGE);
    }
}
