//! This module provides functionality for loading and handling the application's configuration.
//!
//! It defines the `RagConfig` struct, which holds the configuration parameters,
//! and a `load_config` function to load the configuration from a YAML file. Every field
//! has a default, so a config file only needs the keys it wants to change.
//!
//! # Examples
//!
//! Loading the configuration from a file:
//!
//! ```no_run
//! use afm_rag::config::{RagConfig, load_config};
//!
//! let config_file_path = "/path/to/config.yaml";
//! let config: RagConfig = load_config(config_file_path).unwrap();
//! println!("{:?}", config);
//! ```

use serde::{Deserialize, Serialize};
use std::{error::Error, fs, path::PathBuf, time::Duration};

use tracing::*;

use crate::embedder::SentenceEmbedder;

/// Which [`Embedder`](crate::embedder::Embedder) the application builds.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderKind {
    /// The MiniLM sentence model through Candle.
    #[default]
    Minilm,
    /// The offline feature-hashing embedder.
    Features,
}

/// Represents the application's configuration.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(default)]
pub struct RagConfig {
    /// Deployment label reported in answers (`dev`, `prod`, ...).
    pub app_env: String,

    /// Model label reported in answers.
    pub model_name: String,

    /// Embedder used for ingestion and retrieval.
    pub embedder: EmbedderKind,

    /// Hugging Face model id for [`EmbedderKind::Minilm`].
    pub embedding_model_id: String,

    /// Bucket count for [`EmbedderKind::Features`].
    pub feature_dimension: usize,

    /// Directory holding `corpus.jsonl` and `embeddings.bin`.
    pub data_dir: PathBuf,

    // Number of hits returned when a caller gives no top_k.
    pub default_top_k: usize,

    // Upper bound on a single embedder call.
    pub embed_timeout_secs: Option<u64>,

    // Chunker window, in characters.
    pub chunk_size: usize,

    // Characters shared between neighbouring chunks.
    pub chunk_overlap: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            app_env: "dev".to_string(),
            model_name: "mock-001".to_string(),
            embedder: EmbedderKind::default(),
            embedding_model_id: SentenceEmbedder::DEFAULT_MODEL_ID.to_string(),
            feature_dimension: 256,
            data_dir: PathBuf::from("data"),
            default_top_k: 3,
            embed_timeout_secs: None,
            chunk_size: 400,
            chunk_overlap: 40,
        }
    }
}

impl RagConfig {
    pub fn embed_timeout(&self) -> Option<Duration> {
        self.embed_timeout_secs.map(Duration::from_secs)
    }
}

/// Loads the application's configuration from a YAML file.
///
/// # Parameters
///
/// - `file`: The path to the YAML configuration file.
///
/// # Returns
///
/// - `Ok(RagConfig)`: The loaded configuration.
/// - `Err(Box<dyn Error>)`: An error occurred while reading the file or parsing the YAML.
pub fn load_config(file: &str) -> Result<RagConfig, Box<dyn Error>> {
    debug!("Loading config from {file}");
    let content = fs::read_to_string(file)?;
    let config: RagConfig = serde_yaml::from_str(&content)?;
    Ok(config)
}
