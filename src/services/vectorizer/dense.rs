//! Absolute (dense) embedders.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use super::{Embedder, InputKind, l2_normalize, tokenize};
use crate::error::{EmbeddingError, ModelError};
use crate::models::{Config, EmbeddingConfig};
use crate::server::embedding::{EmbeddingModel, SharedEmbeddingModel};

/// Pretrained sentence-embedding model run locally through ONNX Runtime.
pub struct OnnxEmbedder {
    model: SharedEmbeddingModel,
    model_id: String,
    batch_size: usize,
}

impl OnnxEmbedder {
    pub fn load(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let model_dir = model_dir(config)?;
        tracing::info!(model = %config.model_id, dir = %model_dir.display(), "loading embedding model");
        let model = EmbeddingModel::load(config, &model_dir)?;
        Ok(Self {
            model: Arc::new(model),
            model_id: config.model_id.clone(),
            batch_size: config.batch_size.max(1) as usize,
        })
    }
}

fn model_dir(config: &EmbeddingConfig) -> Result<PathBuf, ModelError> {
    if let Some(path) = &config.model_path {
        return Ok(path.clone());
    }
    let models_dir = Config::models_dir().ok_or_else(|| {
        ModelError::NotFound("could not determine models directory".to_string())
    })?;
    Ok(models_dir.join(model_dir_name(&config.model_id)))
}

fn model_dir_name(model_id: &str) -> String {
    model_id.replace('/', "--")
}

#[async_trait]
impl Embedder for OnnxEmbedder {
    fn scheme(&self) -> String {
        format!("dense:onnx:{}:{}", self.model_id, self.model.dimension())
    }

    fn dimension(&self) -> usize {
        self.model.dimension()
    }

    async fn embed(
        &self,
        texts: &[String],
        _kind: InputKind,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size) {
            let model = Arc::clone(&self.model);
            let batch = batch.to_vec();
            // Inference is CPU-bound; keep it off the async workers.
            let embeddings = tokio::task::spawn_blocking(move || model.embed(&batch))
                .await
                .map_err(|e| ModelError::InferenceError(e.to_string()))??;
            all_embeddings.extend(embeddings);
        }

        if all_embeddings.len() != texts.len() {
            return Err(EmbeddingError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                all_embeddings.len()
            )));
        }
        Ok(all_embeddings)
    }
}

/// Feature-hashing embedder: every token is hashed into one of `dimension`
/// buckets with a hash-derived sign, then the row is L2-normalised.
///
/// Needs no model files, and each text maps to the same vector no matter
/// what else has been ingested.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimension];
        for token in tokenize(text) {
            let h = fnv1a(token.as_bytes());
            let bucket = (h % self.dimension as u64) as usize;
            let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }
        l2_normalize(&mut v);
        v
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn scheme(&self) -> String {
        format!("dense:hash-v1:{}", self.dimension)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(
        &self,
        texts: &[String],
        _kind: InputKind,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |h, &b| (h ^ u64::from(b)).wrapping_mul(PRIME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hash_embedder_is_deterministic_and_normalised() {
        let embedder = HashEmbedder::new(64);
        let texts = vec!["quarterly revenue grew".to_string(), String::new()];
        let a = embedder.embed(&texts, InputKind::Document).await.unwrap();
        let b = embedder.embed(&texts, InputKind::Query).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0].len(), 64);

        let norm: f32 = a[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert!(a[1].iter().all(|&x| x == 0.0));
    }

    #[tokio::test]
    async fn test_embed_query_returns_single_vector() {
        let embedder = HashEmbedder::new(16);
        let v = embedder.embed_query("hello world").await.unwrap();
        assert_eq!(v, embedder.embed_one("hello world"));
    }

    #[test]
    fn test_scheme_names_dimension() {
        assert_eq!(HashEmbedder::new(128).scheme(), "dense:hash-v1:128");
    }

    #[test]
    fn test_fnv1a_known_value() {
        assert_eq!(fnv1a(b""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv1a(b"a"), 0xaf63_dc4c_8601_ec8c);
    }

    #[test]
    fn test_missing_model_is_reported() {
        let config = EmbeddingConfig {
            model_path: Some(PathBuf::from("/nonexistent/ragdex-model")),
            ..Default::default()
        };
        let err = OnnxEmbedder::load(&config).err().unwrap();
        assert!(matches!(err, EmbeddingError::Model(ModelError::NotFound(_))));
    }
}
