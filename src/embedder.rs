//! # Embedders
//!
//! The index never computes embeddings itself. It talks to an [`Embedder`]: something
//! that maps a batch of strings to a batch of equal-length `f32` vectors in one call.
//!
//! Two implementations ship with the crate:
//!
//! - [`SentenceEmbedder`]: the all-MiniLM-L6-v2 sentence model run through Candle (pure
//!   Rust), with config/tokenizer/weights fetched from the Hugging Face Hub on first use.
//! - [`FeatureHashEmbedder`]: a deterministic, offline bag-of-words embedder. Each
//!   lowercased word is hashed with BLAKE3 into one of `dimension` signed buckets.
//!
//! Neither one normalizes its output; unit scaling happens in the index.

use std::sync::Arc;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config, DTYPE};
use hf_hub::{Repo, RepoType, api::sync::Api};
use once_cell::sync::Lazy;
use regex::Regex;
use tokenizers::{PaddingParams, Tokenizer, TruncationParams};
use tracing::{debug, info};

use crate::config::{EmbedderKind, RagConfig};
use crate::error::{IndexError, Result};

/// Maps a batch of texts to a batch of fixed-length vectors.
///
/// Implementations must return exactly one vector per input, in input order, and
/// should produce the same dimensionality on every call.
pub trait Embedder: Send + Sync {
    fn encode(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;
}

impl<E: Embedder + ?Sized> Embedder for Arc<E> {
    fn encode(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        (**self).encode(texts)
    }
}

/// Build the embedder selected in `config`.
///
/// # Errors
/// [`IndexError::Embedding`] if the sentence model cannot be downloaded or loaded,
/// [`IndexError::InvalidArgument`] for a zero feature dimension.
pub fn from_config(config: &RagConfig) -> Result<Arc<dyn Embedder>> {
    match config.embedder {
        EmbedderKind::Minilm => Ok(Arc::new(SentenceEmbedder::load(
            &config.embedding_model_id,
        )?)),
        EmbedderKind::Features => Ok(Arc::new(FeatureHashEmbedder::new(
            config.feature_dimension,
        )?)),
    }
}

fn model_err(context: &str) -> impl Fn(candle_core::Error) -> IndexError + '_ {
    move |e| IndexError::Embedding(format!("{context}: {e}"))
}

/// Sentence embeddings model using Candle (pure Rust).
pub struct SentenceEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
}

impl SentenceEmbedder {
    /// Default Hugging Face model id.
    pub const DEFAULT_MODEL_ID: &'static str = "sentence-transformers/all-MiniLM-L6-v2";

    /// Load the model from the Hugging Face Hub (or its local cache).
    pub fn load(model_id: &str) -> Result<Self> {
        let device = Device::Cpu;
        info!("Loading embedding model {model_id}");

        let repo = Repo::with_revision(model_id.to_string(), RepoType::Model, "main".to_string());
        let api = Api::new()
            .map_err(|e| IndexError::Embedding(format!("Hugging Face API unavailable: {e}")))?;
        let api_repo = api.repo(repo);

        let fetch = |name: &str| {
            api_repo
                .get(name)
                .map_err(|e| IndexError::Embedding(format!("failed to fetch {name}: {e}")))
        };
        let config_filename = fetch("config.json")?;
        let tokenizer_filename = fetch("tokenizer.json")?;
        let weights_filename = fetch("model.safetensors")?;

        let config = std::fs::read_to_string(config_filename)
            .map_err(|e| IndexError::Embedding(format!("failed to read model config: {e}")))?;
        let config: Config = serde_json::from_str(&config)
            .map_err(|e| IndexError::Embedding(format!("failed to parse model config: {e}")))?;

        let mut tokenizer = Tokenizer::from_file(tokenizer_filename)
            .map_err(|e| IndexError::Embedding(format!("failed to load tokenizer: {e}")))?;
        // Pad every batch to its longest member; BERT tops out at 512 positions.
        tokenizer.with_padding(Some(PaddingParams::default()));
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: 512,
                ..Default::default()
            }))
            .map_err(|e| IndexError::Embedding(format!("failed to configure tokenizer: {e}")))?;

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_filename], DTYPE, &device)
                .map_err(model_err("failed to map weights"))?
        };
        let model = BertModel::load(vb, &config).map_err(model_err("failed to build model"))?;

        Ok(Self {
            model,
            tokenizer,
            device,
        })
    }

    fn encode_batch(&self, texts: &[&str]) -> candle_core::Result<Vec<Vec<f32>>> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| candle_core::Error::Msg(format!("tokenization error: {e}")))?;

        let token_ids = stack_rows(encodings.iter().map(|e| e.get_ids()), &self.device)?;
        let token_type_ids =
            stack_rows(encodings.iter().map(|e| e.get_type_ids()), &self.device)?;
        let attention_mask =
            stack_rows(encodings.iter().map(|e| e.get_attention_mask()), &self.device)?;

        // [batch, seq_len, hidden]
        let output = self
            .model
            .forward(&token_ids, &token_type_ids, Some(&attention_mask))?;

        // Mean pooling over real (unpadded) tokens.
        let mask = attention_mask.to_dtype(DType::F32)?.unsqueeze(2)?; // [batch, seq_len, 1]
        let sum = output.broadcast_mul(&mask)?.sum(1)?; // [batch, hidden]
        let count = mask.sum(1)?.clamp(1f32, f32::INFINITY)?; // [batch, 1]
        sum.broadcast_div(&count)?.to_vec2::<f32>()
    }
}

/// Stack equal-length token rows into a `[rows, seq_len]` tensor.
fn stack_rows<'a>(
    rows: impl Iterator<Item = &'a [u32]>,
    device: &Device,
) -> candle_core::Result<Tensor> {
    let rows = rows
        .map(|row| Tensor::new(row, device))
        .collect::<candle_core::Result<Vec<_>>>()?;
    Tensor::stack(&rows, 0)
}

impl Embedder for SentenceEmbedder {
    fn encode(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        debug!("Encoding batch of {} texts", texts.len());
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.encode_batch(texts).map_err(model_err("inference failed"))
    }
}

static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+").expect("valid word regex"));

/// Deterministic bag-of-words embedder based on feature hashing.
///
/// Stable across runs and platforms, needs no model files. Texts sharing words score
/// higher against each other than texts that don't.
#[derive(Debug, Clone)]
pub struct FeatureHashEmbedder {
    dimension: usize,
}

impl FeatureHashEmbedder {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(IndexError::InvalidArgument(
                "feature dimension must be at least 1".into(),
            ));
        }
        Ok(Self { dimension })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimension];
        for word in WORD.find_iter(text) {
            let digest = blake3::hash(word.as_str().to_lowercase().as_bytes());
            let bytes = digest.as_bytes();
            let mut head = [0u8; 8];
            head.copy_from_slice(&bytes[..8]);
            let bucket = (u64::from_le_bytes(head) % self.dimension as u64) as usize;
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }
        v
    }
}

impl Embedder for FeatureHashEmbedder {
    fn encode(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}
