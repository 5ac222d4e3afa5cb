//! This module defines the command-line interface for the application using `clap`.
//!
//! It provides a `Cli` struct that represents the parsed command-line arguments,
//! and a `Commands` enum that represents the available subcommands and their
//! options. Global flags override the matching keys of the config file and can also be
//! set through environment variables.
//!
//! # Examples
//!
//! Parsing command-line arguments:
//!
//! ```no_run
//! use clap::Parser;
//! use afm_rag::commands::{Cli, Commands};
//!
//! let cli = Cli::parse();
//! match cli.command {
//!     Commands::Retrieve { query, top_k } => {
//!         // Handle the 'retrieve' subcommand
//!     }
//!     _ => {}
//! }
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::RagConfig;

/// Represents the parsed command-line arguments.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, propagate_version = true, color = clap::ColorChoice::Always)]
pub struct Cli {
    /// Path to a YAML config file. Defaults to `config.yaml` in the user config directory.
    #[arg(long, global = true, env = "AFM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory holding `corpus.jsonl` and `embeddings.bin`.
    #[arg(long, global = true, env = "AFM_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Deployment label reported in answers.
    #[arg(long, global = true, env = "APP_ENV")]
    pub app_env: Option<String>,

    /// Model label reported in answers.
    #[arg(long, global = true, env = "MODEL_NAME")]
    pub model_name: Option<String>,

    /// The parsed subcommand and its options.
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Apply the global overrides on top of a loaded config.
    pub fn apply_overrides(&self, config: &mut RagConfig) {
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(env) = &self.app_env {
            config.app_env = env.clone();
        }
        if let Some(model) = &self.model_name {
            config.model_name = model.clone();
        }
    }
}

/// Represents the available subcommands and their options.
#[derive(Subcommand, Debug, PartialEq)]
#[command(about, long_about = None, color = clap::ColorChoice::Always)]
pub enum Commands {
    /// Write a default config file to the user config directory.
    Init,

    /// Ingest documents from a JSON array or JSON Lines file.
    #[clap(name = "ingest", alias = "i")]
    Ingest {
        file: PathBuf,

        /// Keep the result in memory only.
        #[arg(long)]
        no_save: bool,
    },

    /// Chunk and ingest a plain-text file.
    #[clap(name = "ingest-text", alias = "it")]
    IngestText {
        file: PathBuf,

        /// Id prefix for the chunks. Defaults to the file path.
        #[arg(long, short = 'p')]
        prefix: Option<String>,

        #[arg(long)]
        no_save: bool,
    },

    /// Show the best matches for a query.
    #[clap(name = "retrieve", alias = "r")]
    Retrieve {
        query: String,

        /// How many hits to return. Defaults to `default_top_k` from the config.
        #[arg(short = 'k', long = "top-k")]
        top_k: Option<usize>,
    },

    /// Answer a question from the best matching context.
    #[clap(name = "ask", alias = "a")]
    Ask { question: String },

    /// Load and verify the saved snapshot.
    Load,

    /// Delete the saved snapshot.
    Reset,

    /// Start an interactive session.
    #[clap(name = "shell", alias = "s")]
    Shell,
}
