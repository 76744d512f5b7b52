//! Local ONNX Runtime embedding provider (all-MiniLM-L6-v2 via `ort`).

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;

use super::{EmbeddingProvider, EMBEDDING_DIM};
use crate::config::EmbeddingConfig;

/// Maximum sequence length for all-MiniLM-L6-v2 (trained at 256).
const MAX_SEQ_LEN: usize = 256;

pub const MODEL_FILE: &str = "model.onnx";
pub const TOKENIZER_FILE: &str = "tokenizer.json";

pub struct LocalEmbeddingProvider {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    batch_size: usize,
}

// Safety: Tokenizer is Send+Sync and the Session is only touched behind the Mutex.
unsafe impl Send for LocalEmbeddingProvider {}
unsafe impl Sync for LocalEmbeddingProvider {}

/// Paths of the model and tokenizer files inside the configured cache directory.
pub fn model_paths(config: &EmbeddingConfig) -> (PathBuf, PathBuf) {
    let cache_dir = crate::config::expand_tilde(&config.cache_dir);
    (cache_dir.join(MODEL_FILE), cache_dir.join(TOKENIZER_FILE))
}

impl LocalEmbeddingProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model_path, tokenizer_path) = model_paths(config);

        for path in [&model_path, &tokenizer_path] {
            anyhow::ensure!(
                path.exists(),
                "{} not found. Run `lorekeeper model download` first.",
                path.display()
            );
        }

        let session = Session::builder()?
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)
            .map_err(ort::Error::<()>::from)?
            .with_intra_threads(4)
            .map_err(ort::Error::<()>::from)?
            .commit_from_file(&model_path)
            .context("failed to load ONNX model")?;

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("failed to load tokenizer: {e}"))?;
        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length: MAX_SEQ_LEN,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("failed to set truncation: {e}"))?;
        tokenizer.with_padding(Some(tokenizers::PaddingParams {
            strategy: tokenizers::PaddingStrategy::BatchLongest,
            ..Default::default()
        }));

        tracing::info!(
            model = %model_path.display(),
            batch_size = config.batch_size,
            "local embedding model loaded"
        );

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            batch_size: config.batch_size.max(1),
        })
    }

    /// Run one forward pass over at most `batch_size` texts.
    fn embed_chunk(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| anyhow::anyhow!("tokenization failed: {e}"))?;

        let batch = encodings.len();
        let seq_len = encodings.first().map_or(0, |e| e.get_ids().len());

        let ids: Vec<i64> = encodings
            .iter()
            .flat_map(|e| e.get_ids().iter().map(|&id| id as i64))
            .collect();
        let mask: Vec<i64> = encodings
            .iter()
            .flat_map(|e| e.get_attention_mask().iter().map(|&m| m as i64))
            .collect();
        // single-segment input
        let token_types = vec![0i64; batch * seq_len];

        let shape = vec![batch as i64, seq_len as i64];
        let ids_tensor = Tensor::from_array((shape.clone(), ids.into_boxed_slice()))?;
        let mask_tensor = Tensor::from_array((shape.clone(), mask.clone().into_boxed_slice()))?;
        let types_tensor = Tensor::from_array((shape, token_types.into_boxed_slice()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| anyhow::anyhow!("session lock poisoned: {e}"))?;
        let outputs = session.run(ort::inputs! {
            "input_ids" => ids_tensor,
            "attention_mask" => mask_tensor,
            "token_type_ids" => types_tensor,
        })?;

        // Output name varies by export
        let hidden = outputs
            .get("token_embeddings")
            .or_else(|| outputs.get("last_hidden_state"))
            .unwrap_or_else(|| &outputs[0]);
        let (dims, data) = hidden
            .try_extract_tensor::<f32>()
            .context("failed to extract token embeddings")?;

        let dims: &[i64] = &dims;
        anyhow::ensure!(
            dims.len() == 3 && dims[2] == EMBEDDING_DIM as i64,
            "unexpected token embedding shape {dims:?}, expected [batch, seq, {EMBEDDING_DIM}]"
        );

        Ok(mean_pool(data, &mask, batch, dims[1] as usize, seq_len, EMBEDDING_DIM)
            .into_iter()
            .map(|v| l2_normalize(&v))
            .collect())
    }
}

impl EmbeddingProvider for LocalEmbeddingProvider {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size) {
            out.extend(self.embed_chunk(chunk)?);
        }
        Ok(out)
    }
}

/// Attention-masked mean over the token axis.
///
/// `hidden` is `[batch, hidden_seq, dim]` row-major; `mask` is `[batch, mask_seq]`.
fn mean_pool(
    hidden: &[f32],
    mask: &[i64],
    batch: usize,
    hidden_seq: usize,
    mask_seq: usize,
    dim: usize,
) -> Vec<Vec<f32>> {
    (0..batch)
        .map(|b| {
            let mut sum = vec![0.0f32; dim];
            let mut count = 0.0f32;
            for s in 0..hidden_seq.min(mask_seq) {
                if mask[b * mask_seq + s] == 0 {
                    continue;
                }
                let offset = (b * hidden_seq + s) * dim;
                for (acc, x) in sum.iter_mut().zip(&hidden[offset..offset + dim]) {
                    *acc += x;
                }
                count += 1.0;
            }
            if count > 0.0 {
                sum.iter_mut().for_each(|x| *x /= count);
            }
            sum
        })
        .collect()
}

/// L2-normalize a vector. Returns the input unchanged if its norm is zero.
fn l2_normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}
