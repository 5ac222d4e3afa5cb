//! # afm-rag (library root)
//!
//! A small retrieval-augmented generation core: ingest documents, embed them in one batch,
//! keep them in an in-memory cosine-similarity index, and answer queries with the best
//! matching chunks. The index can be snapshotted to disk and restored.
//!
//! - Documents and input parsing (`document`), text chunking (`chunker`).
//! - Embedding backends (`embedder`) and vector normalization (`normalize`).
//! - The index itself (`vector_index`) and its on-disk snapshot (`persistence`).
//! - The shared async service (`service`) and answer formatting (`answer`).
//! - CLI parsing (`commands`), the interactive session (`shell`) and configuration (`config`).
//!
//! ## Quick example
//! ```rust
//! use std::sync::Arc;
//! use afm_rag::{document::Document, embedder::FeatureHashEmbedder};
//! use afm_rag::{persistence::IndexStore, service::RagService};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), afm_rag::error::IndexError> {
//! let dir = tempfile::tempdir().unwrap();
//! let service = RagService::new(
//!     Arc::new(FeatureHashEmbedder::new(256)?),
//!     IndexStore::new(dir.path()),
//! );
//! service.ingest(vec![Document::new("p1", "Rust is great!")]).await?;
//! let hits = service.retrieve("rust", 1).await?;
//! assert_eq!(hits[0].document.id, "p1");
//! # Ok(()) }
//! ```

use directories::ProjectDirs;
use std::{error::Error, path::Path, path::PathBuf};
use tracing::debug;

pub mod answer;
pub mod chunker;
pub mod commands;
pub mod config;
pub mod document;
pub mod embedder;
pub mod error;
pub mod normalize;
pub mod persistence;
pub mod service;
pub mod shell;
pub mod vector_index;

#[cfg(test)]
pub(crate) mod test_support;

/// Return the per-platform configuration directory used by afm.
///
/// This uses [`directories::ProjectDirs`] with the application triple
/// `("com", "afm", "afm-rag")`. The directory is **not** created here.
///
/// # Errors
/// Returns an error if the platform configuration directory cannot be determined.
pub fn config_dir() -> Result<PathBuf, Box<dyn Error>> {
    let proj_dirs =
        ProjectDirs::from("com", "afm", "afm-rag").ok_or("Unable to determine config directory")?;
    Ok(proj_dirs.config_dir().to_path_buf())
}

/// Find and load the configuration.
///
/// An explicit path must exist. Without one, `config.yaml` in [`config_dir`] is used if
/// present, and the built-in defaults otherwise.
pub fn resolve_config(explicit: Option<&Path>) -> Result<config::RagConfig, Box<dyn Error>> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let default_path = config_dir()?.join("config.yaml");
            if !default_path.exists() {
                debug!("No config at {}, using defaults", default_path.display());
                return Ok(config::RagConfig::default());
            }
            default_path
        }
    };
    let path = path.to_str().ok_or("Config path is not valid UTF-8")?;
    config::load_config(path)
}
