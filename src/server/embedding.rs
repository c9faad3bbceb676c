use std::borrow::Cow;
use std::path::Path;
use std::sync::{Arc, Mutex};

use ndarray::{ArrayViewD, Axis, Ix3};
use ort::session::{Session, SessionInputValue, builder::GraphOptimizationLevel};
use ort::value::Tensor;
use tokenizers::Tokenizer;
use tokenizers::{PaddingParams, PaddingStrategy, TruncationParams, TruncationStrategy};

use crate::error::ModelError;
use crate::models::{EmbeddingConfig, Pooling};

/// Sentence-embedding model served through ONNX Runtime.
pub struct EmbeddingModel {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    input_names: Vec<String>,
    dimension: usize,
    pooling: Pooling,
}

impl EmbeddingModel {
    pub fn load(config: &EmbeddingConfig, model_dir: &Path) -> Result<Self, ModelError> {
        let model_path = model_dir.join("model.onnx");
        let tokenizer_path = model_dir.join("tokenizer.json");
        let max_tokens = config.max_tokens as usize;

        if !model_path.exists() {
            return Err(ModelError::NotFound(format!(
                "model not found: {}",
                model_path.display()
            )));
        }

        let session = Session::builder()
            .map_err(|e: ort::Error| ModelError::LoadError(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e: ort::Error| ModelError::LoadError(e.to_string()))?
            .with_intra_threads(num_cpus())
            .map_err(|e: ort::Error| ModelError::LoadError(e.to_string()))?
            .commit_from_file(&model_path)
            .map_err(|e: ort::Error| ModelError::LoadError(e.to_string()))?;

        let input_names: Vec<String> = session.inputs.iter().map(|i| i.name.clone()).collect();

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| ModelError::TokenizerError(e.to_string()))?;

        // Configure truncation to prevent OOM with long texts
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: max_tokens,
                strategy: TruncationStrategy::LongestFirst,
                ..Default::default()
            }))
            .map_err(|e| ModelError::TokenizerError(e.to_string()))?;

        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..Default::default()
        }));

        tracing::info!(
            model = %model_path.display(),
            inputs = ?input_names,
            pooling = ?config.pooling,
            "loaded onnx embedding model"
        );

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            input_names,
            dimension: config.dimension as usize,
            pooling: config.pooling,
        })
    }

    /// Embed a batch of texts. Output rows are L2-normalised.
    pub fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| ModelError::TokenizerError(e.to_string()))?;

        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0);
        let batch_size = encodings.len();

        let mut input_ids = vec![0i64; batch_size * max_len];
        let mut attention_mask = vec![0i64; batch_size * max_len];
        let mut token_type_ids = vec![0i64; batch_size * max_len];
        let mut position_ids = vec![0i64; batch_size * max_len];

        for (i, encoding) in encodings.iter().enumerate() {
            let ids = encoding.get_ids();
            let mask = encoding.get_attention_mask();
            let types = encoding.get_type_ids();
            for (j, (&id, &m)) in ids.iter().zip(mask.iter()).enumerate() {
                input_ids[i * max_len + j] = id as i64;
                attention_mask[i * max_len + j] = m as i64;
                token_type_ids[i * max_len + j] = types.get(j).copied().unwrap_or(0) as i64;
                position_ids[i * max_len + j] = j as i64;
            }
        }

        let shape = [batch_size, max_len];
        let mut inputs: Vec<(Cow<'_, str>, SessionInputValue<'_>)> =
            Vec::with_capacity(self.input_names.len());
        for name in &self.input_names {
            let data = match name.as_str() {
                "input_ids" => input_ids.clone(),
                "attention_mask" => attention_mask.clone(),
                "token_type_ids" => token_type_ids.clone(),
                "position_ids" => position_ids.clone(),
                other => {
                    return Err(ModelError::InferenceError(format!(
                        "unsupported model input: {other}"
                    )));
                }
            };
            let tensor = Tensor::from_array((shape, data))
                .map_err(|e: ort::Error| ModelError::InferenceError(e.to_string()))?;
            inputs.push((Cow::Owned(name.clone()), tensor.into()));
        }

        let mut session = self
            .session
            .lock()
            .map_err(|_| ModelError::InferenceError("session lock poisoned".to_string()))?;

        let outputs = session
            .run(inputs)
            .map_err(|e: ort::Error| ModelError::InferenceError(e.to_string()))?;

        let output_array = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e: ort::Error| ModelError::InferenceError(e.to_string()))?;

        let seq_lens: Vec<usize> = encodings
            .iter()
            .map(|e| e.get_attention_mask().iter().filter(|&&m| m == 1).count())
            .collect();

        let embeddings = match output_array.ndim() {
            3 => self.pool(output_array, &attention_mask, &seq_lens, max_len)?,
            2 => output_array
                .outer_iter()
                .map(|row| row.iter().copied().collect::<Vec<f32>>())
                .collect(),
            _ => {
                return Err(ModelError::InferenceError(format!(
                    "unexpected output shape: {:?}",
                    output_array.shape()
                )));
            }
        };

        embeddings
            .into_iter()
            .map(|embedding| {
                if embedding.len() != self.dimension {
                    return Err(ModelError::InferenceError(format!(
                        "model produced {} dimensions, {} configured",
                        embedding.len(),
                        self.dimension
                    )));
                }
                Ok(normalize(&embedding))
            })
            .collect()
    }

    /// Reduce `[batch, seq, hidden]` token states to one row per text.
    fn pool(
        &self,
        states: ArrayViewD<'_, f32>,
        attention_mask: &[i64],
        seq_lens: &[usize],
        max_len: usize,
    ) -> Result<Vec<Vec<f32>>, ModelError> {
        let states = states
            .into_dimensionality::<Ix3>()
            .map_err(|e| ModelError::InferenceError(e.to_string()))?;

        let rows = states
            .axis_iter(Axis(0))
            .enumerate()
            .map(|(i, tokens)| match self.pooling {
                Pooling::Mean => {
                    let hidden = tokens.shape()[1];
                    let mut sum = vec![0.0f32; hidden];
                    let mut count = 0.0f32;
                    for (j, token) in tokens.axis_iter(Axis(0)).enumerate() {
                        if attention_mask[i * max_len + j] == 0 {
                            continue;
                        }
                        count += 1.0;
                        for (acc, v) in sum.iter_mut().zip(token.iter()) {
                            *acc += v;
                        }
                    }
                    if count > 0.0 {
                        sum.iter_mut().for_each(|v| *v /= count);
                    }
                    sum
                }
                Pooling::LastToken => {
                    let last_idx = seq_lens[i].saturating_sub(1);
                    tokens.index_axis(Axis(0), last_idx).to_vec()
                }
            })
            .collect();
        Ok(rows)
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }
}

fn normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

pub type SharedEmbeddingModel = Arc<EmbeddingModel>;
