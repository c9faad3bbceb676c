//! The live index: fitted vectorizer, vectors and their metadata.

use std::collections::HashSet;

use crate::error::IndexError;
use crate::models::ChunkMeta;
use crate::services::index::VectorIndex;
use crate::services::vectorizer::TfidfVectorizer;

/// Everything one snapshot generation holds.
///
/// `index` and `metadata` are positionally aligned; a state is only ever
/// replaced as a whole, never mutated in place while shared.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexState {
    pub generation: u64,
    pub scheme: String,
    /// Present only for the TF-IDF scheme once a corpus exists.
    pub vectorizer: Option<TfidfVectorizer>,
    pub index: VectorIndex,
    pub metadata: Vec<ChunkMeta>,
}

impl IndexState {
    pub fn empty(scheme: impl Into<String>, index: VectorIndex) -> Self {
        Self {
            generation: 0,
            scheme: scheme.into(),
            vectorizer: None,
            index,
            metadata: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.metadata.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }

    pub fn check_aligned(&self) -> Result<(), IndexError> {
        if self.index.len() != self.metadata.len() {
            return Err(IndexError::Misaligned {
                vectors: self.index.len(),
                entries: self.metadata.len(),
            });
        }
        Ok(())
    }

    /// Number of distinct job ids with at least one stored chunk.
    pub fn job_count(&self) -> usize {
        self.metadata
            .iter()
            .map(|m| m.job_id.as_str())
            .collect::<HashSet<_>>()
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::vectorizer::QueryVector;

    #[test]
    fn test_alignment_check() {
        let mut state = IndexState::empty("dense:hash-v1:2", VectorIndex::flat(2));
        assert!(state.check_aligned().is_ok());

        state.index.add(QueryVector::Dense(vec![1.0, 0.0])).unwrap();
        assert!(matches!(
            state.check_aligned(),
            Err(IndexError::Misaligned {
                vectors: 1,
                entries: 0
            })
        ));

        state
            .metadata
            .push(ChunkMeta::new("job", "a.txt", "text".to_string()));
        assert!(state.check_aligned().is_ok());
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn test_job_count() {
        let mut state = IndexState::empty("tfidf-v1", VectorIndex::sparse(Vec::new()));
        for job in ["a", "b", "a"] {
            state
                .metadata
                .push(ChunkMeta::new(job, "f.txt", String::new()));
        }
        assert_eq!(state.job_count(), 2);
    }
}
