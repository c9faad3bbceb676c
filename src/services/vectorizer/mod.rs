//! Vector representations for chunks and queries.
//!
//! Two schemes exist and are never mixed inside one index:
//! - corpus-relative TF-IDF ([`TfidfVectorizer`]), re-fit over the whole
//!   corpus on every ingest;
//! - absolute dense embeddings ([`Embedder`]), computed per text and safe
//!   to append incrementally.

mod dense;
mod tfidf;

pub use dense::{HashEmbedder, OnnxEmbedder};
pub use tfidf::{TFIDF_SCHEME, TfidfVectorizer, tokenize};

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::EmbeddingError;
use crate::models::{Config, EmbeddingBackend, EmbeddingConfig, Scheme};

/// Whether a text is being stored or used to query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Document,
    Query,
}

/// L2-normalised sparse row. `indices` is strictly increasing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

impl SparseVector {
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn dot(&self, other: &SparseVector) -> f32 {
        let (mut i, mut j) = (0, 0);
        let mut sum = 0.0;
        while i < self.indices.len() && j < other.indices.len() {
            match self.indices[i].cmp(&other.indices[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    sum += self.values[i] * other.values[j];
                    i += 1;
                    j += 1;
                }
            }
        }
        sum
    }
}

/// A vector in either representation.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryVector {
    Sparse(SparseVector),
    Dense(Vec<f32>),
}

impl QueryVector {
    pub fn kind(&self) -> &'static str {
        match self {
            QueryVector::Sparse(_) => "sparse",
            QueryVector::Dense(_) => "dense",
        }
    }
}

/// Maps texts independently to fixed-dimension vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identifier stored with every snapshot built by this embedder.
    fn scheme(&self) -> String;

    fn dimension(&self) -> usize;

    async fn embed(
        &self,
        texts: &[String],
        kind: InputKind,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Embed a single query text.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed(&[text.to_string()], InputKind::Query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::InvalidResponse("empty embedding response".to_string()))
    }
}

pub type SharedEmbedder = Arc<dyn Embedder>;

/// The configured vectorization strategy.
#[derive(Clone)]
pub enum Vectorizer {
    /// Corpus-relative; the fitted state lives in the index state.
    Tfidf { max_features: usize },
    /// Absolute; stateless with respect to the corpus.
    Dense(SharedEmbedder),
}

impl Vectorizer {
    pub fn from_config(config: &Config) -> Result<Self, EmbeddingError> {
        match config.vectorizer.scheme {
            Scheme::Tfidf => Ok(Vectorizer::Tfidf {
                max_features: config.vectorizer.max_features,
            }),
            Scheme::Dense => Ok(Vectorizer::Dense(create_embedder(&config.embedding)?)),
        }
    }

    pub fn scheme(&self) -> String {
        match self {
            Vectorizer::Tfidf { .. } => TFIDF_SCHEME.to_string(),
            Vectorizer::Dense(embedder) => embedder.scheme(),
        }
    }

    pub fn is_corpus_relative(&self) -> bool {
        matches!(self, Vectorizer::Tfidf { .. })
    }
}

impl std::fmt::Debug for Vectorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Vectorizer::Tfidf { max_features } => f
                .debug_struct("Tfidf")
                .field("max_features", max_features)
                .finish(),
            Vectorizer::Dense(embedder) => f.debug_tuple("Dense").field(&embedder.scheme()).finish(),
        }
    }
}

/// Build the embedder selected by the configuration.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<SharedEmbedder, EmbeddingError> {
    match config.backend {
        EmbeddingBackend::Onnx => Ok(Arc::new(OnnxEmbedder::load(config)?)),
        EmbeddingBackend::Hash => Ok(Arc::new(HashEmbedder::new(config.dimension as usize))),
    }
}

pub(crate) fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sparse(pairs: &[(u32, f32)]) -> SparseVector {
        SparseVector {
            indices: pairs.iter().map(|p| p.0).collect(),
            values: pairs.iter().map(|p| p.1).collect(),
        }
    }

    #[test]
    fn test_sparse_dot_only_counts_shared_terms() {
        let a = sparse(&[(1, 0.5), (3, 0.5), (7, 1.0)]);
        let b = sparse(&[(3, 2.0), (4, 9.0), (7, 1.0)]);
        assert!((a.dot(&b) - 2.0).abs() < 1e-6);
        assert_eq!(a.dot(&SparseVector::default()), 0.0);
    }

    #[test]
    fn test_l2_normalize() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0, 0.0];
        l2_normalize(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }

    #[test]
    fn test_vectorizer_from_config() {
        let config = Config::default();
        let vectorizer = Vectorizer::from_config(&config).unwrap();
        assert!(vectorizer.is_corpus_relative());
        assert_eq!(vectorizer.scheme(), TFIDF_SCHEME);

        let mut config = Config::default();
        config.vectorizer.scheme = Scheme::Dense;
        config.embedding = EmbeddingConfig::hashed(32);
        let vectorizer = Vectorizer::from_config(&config).unwrap();
        assert!(!vectorizer.is_corpus_relative());
        assert_eq!(vectorizer.scheme(), "dense:hash-v1:32");
    }
}
