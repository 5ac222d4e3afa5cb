//! Main module for the afm CLI application.
//!
//! Handles command parsing, configuration loading and initialization, then hands off to
//! the library's [`RagService`]. Results are printed to stdout as JSON.
//!
//! # Examples
//!
//! ```sh
//! afm init
//! afm ingest docs.jsonl
//! afm ingest-text handbook.txt --prefix handbook
//! afm retrieve "how do refunds work?" -k 5
//! afm ask "how do refunds work?"
//! afm shell
//! ```

use afm_rag::{
    commands::{Cli, Commands},
    config::RagConfig,
    config_dir,
    persistence::{IndexStore, LoadStatus, ResetStatus},
    resolve_config,
    service::RagService,
    shell,
};
use clap::Parser;
use once_cell::sync::OnceCell;
use serde::Serialize;
use serde_json::json;
use std::{error::Error, fs, io};
use tracing::{debug, info};

static TRACING: OnceCell<()> = OnceCell::new();

fn main() -> Result<(), Box<dyn Error>> {
    TRACING.get_or_init(|| {
        tracing_subscriber::fmt::init();
    });
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run())
}

/// Parses the command line, resolves the configuration and runs one command.
async fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let mut config = resolve_config(cli.config.as_deref())?;
    cli.apply_overrides(&mut config);
    debug!("Config loaded: {:?}", config);

    match cli.command {
        Commands::Init => {
            debug!("Initializing configuration");
            init()?;
        }
        Commands::Ingest { file, no_save } => {
            let service = open(&config).await?;
            let ingested = service.ingest_file(&file).await?;
            finish_ingest(&service, ingested, no_save).await?;
        }
        Commands::IngestText {
            file,
            prefix,
            no_save,
        } => {
            let service = open(&config).await?;
            let ingested = service.ingest_text_file(&file, prefix.as_deref()).await?;
            finish_ingest(&service, ingested, no_save).await?;
        }
        Commands::Retrieve { query, top_k } => {
            let service = open(&config).await?;
            let hits = service
                .retrieve(&query, top_k.unwrap_or(config.default_top_k))
                .await?;
            print_json(&hits)?;
        }
        Commands::Ask { question } => {
            let service = open(&config).await?;
            print_json(&service.answer(&question).await)?;
        }
        Commands::Load => {
            // Verifying a snapshot needs no embedder.
            let status = match IndexStore::new(&config.data_dir).load()? {
                Some(index) => LoadStatus::Loaded { count: index.len() },
                None => LoadStatus::Empty,
            };
            print_json(&status)?;
        }
        Commands::Reset => {
            IndexStore::new(&config.data_dir).remove()?;
            print_json(&ResetStatus { reset: "ok" })?;
        }
        Commands::Shell => {
            let service = open(&config).await?;
            shell::run(
                &service,
                config.default_top_k,
                io::stdin().lock(),
                io::stdout(),
            )
            .await?;
        }
    }

    Ok(())
}

/// Builds the service and restores the saved snapshot, if there is one.
async fn open(config: &RagConfig) -> Result<RagService, Box<dyn Error>> {
    let service = RagService::from_config(config)?;
    let status = service.load().await?;
    debug!("Opened {} with {status:?}", config.data_dir.display());
    Ok(service)
}

async fn finish_ingest(
    service: &RagService,
    ingested: usize,
    no_save: bool,
) -> Result<(), Box<dyn Error>> {
    let saved = if no_save {
        None
    } else {
        Some(service.save().await?)
    };
    print_json(&json!({
        "ingested": ingested,
        "total": service.len(),
        "saved": saved,
    }))
}

fn print_json(value: &impl Serialize) -> Result<(), Box<dyn Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Writes a default `config.yaml` to the user config directory.
///
/// # Errors
///
/// Returns an error if the directory or file cannot be created, or the configuration
/// cannot be serialized to YAML.
fn init() -> Result<(), Box<dyn Error>> {
    let config_dir = config_dir()?;
    info!("Creating config directory: {}", config_dir.display());
    fs::create_dir_all(&config_dir)?;

    let config_path = config_dir.join("config.yaml");
    info!("Creating config file: {}", config_path.display());
    let config_yaml = serde_yaml::to_string(&RagConfig::default())?;
    fs::write(&config_path, config_yaml)?;

    print_json(&json!({"config": config_path}))
}
