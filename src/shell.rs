//! Interactive session over one in-memory index.
//!
//! Each input line is one command. Results are printed as pretty JSON; failures are
//! printed in red and the session carries on. Nothing is written to disk unless the user
//! says `save`.

use std::error::Error;
use std::io::{BufRead, Write};
use std::path::PathBuf;

use crossterm::{
    ExecutableCommand,
    style::{Color, Print, SetForegroundColor},
};
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use crate::error::{IndexError, Result};
use crate::service::RagService;

pub const HELP: &str = "\
commands:
  ingest <file>                 ingest a JSON array or JSON Lines file of documents
  ingest-text <file> [prefix]   chunk and ingest a plain-text file
  retrieve [k] <query>          show the k best matches
  ask <question>                answer from the best match
  save | load | reset           snapshot, restore or wipe the index
  status                        document count, dimension and data directory
  help | quit";

/// One parsed shell line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Ingest(PathBuf),
    IngestText {
        path: PathBuf,
        prefix: Option<String>,
    },
    Retrieve {
        top_k: Option<usize>,
        query: String,
    },
    Ask(String),
    Save,
    Load,
    Reset,
    Status,
    Help,
    Quit,
}

impl ShellCommand {
    /// Parse a line. Blank lines give `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };

        let command = match verb.to_lowercase().as_str() {
            "ingest" => ShellCommand::Ingest(PathBuf::from(required(rest, "ingest <file>")?)),
            "ingest-text" => {
                let rest = required(rest, "ingest-text <file> [prefix]")?;
                let (path, prefix) = match rest.split_once(char::is_whitespace) {
                    Some((path, prefix)) => (path, Some(prefix.trim().to_string())),
                    None => (rest, None),
                };
                ShellCommand::IngestText {
                    path: PathBuf::from(path),
                    prefix,
                }
            }
            "retrieve" | "r" => {
                let rest = required(rest, "retrieve [k] <query>")?;
                match rest.split_once(char::is_whitespace) {
                    Some((k, query)) if k.parse::<usize>().is_ok() => ShellCommand::Retrieve {
                        top_k: k.parse().ok(),
                        query: query.trim().to_string(),
                    },
                    _ => ShellCommand::Retrieve {
                        top_k: None,
                        query: rest.to_string(),
                    },
                }
            }
            "ask" | "a" => ShellCommand::Ask(required(rest, "ask <question>")?.to_string()),
            "save" => ShellCommand::Save,
            "load" => ShellCommand::Load,
            "reset" => ShellCommand::Reset,
            "status" => ShellCommand::Status,
            "help" | "?" => ShellCommand::Help,
            "quit" | "exit" | "q" => ShellCommand::Quit,
            other => {
                return Err(IndexError::InvalidArgument(format!(
                    "unknown command `{other}` (try `help`)"
                )));
            }
        };
        Ok(Some(command))
    }
}

fn required<'a>(rest: &'a str, usage: &str) -> Result<&'a str> {
    if rest.is_empty() {
        Err(IndexError::InvalidArgument(format!("usage: {usage}")))
    } else {
        Ok(rest)
    }
}

fn pretty(value: &impl Serialize) -> Result<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| IndexError::InvalidArgument(format!("cannot render result: {e}")))
}

/// Run one command and render its result. `Ok(None)` means the session should end.
pub async fn execute(
    service: &RagService,
    command: ShellCommand,
    default_top_k: usize,
) -> Result<Option<String>> {
    debug!("Shell command: {command:?}");
    let output = match command {
        ShellCommand::Ingest(path) => {
            let ingested = service.ingest_file(&path).await?;
            pretty(&json!({"ingested": ingested, "total": service.len()}))?
        }
        ShellCommand::IngestText { path, prefix } => {
            let ingested = service.ingest_text_file(&path, prefix.as_deref()).await?;
            pretty(&json!({"ingested": ingested, "total": service.len()}))?
        }
        ShellCommand::Retrieve { top_k, query } => {
            let hits = service
                .retrieve(&query, top_k.unwrap_or(default_top_k))
                .await?;
            pretty(&hits)?
        }
        ShellCommand::Ask(question) => pretty(&service.answer(&question).await)?,
        ShellCommand::Save => pretty(&service.save().await?)?,
        ShellCommand::Load => pretty(&service.load().await?)?,
        ShellCommand::Reset => pretty(&service.reset().await?)?,
        ShellCommand::Status => pretty(&service.stats())?,
        ShellCommand::Help => HELP.to_string(),
        ShellCommand::Quit => return Ok(None),
    };
    Ok(Some(output))
}

/// Read commands from `input` until `quit` or end of input.
pub async fn run<R: BufRead, W: Write>(
    service: &RagService,
    default_top_k: usize,
    input: R,
    mut out: W,
) -> std::result::Result<(), Box<dyn Error>> {
    out.execute(SetForegroundColor(Color::Blue))?;
    out.execute(Print(format!(
        "afm shell: {} documents loaded, `help` for commands\n",
        service.len()
    )))?;
    out.execute(SetForegroundColor(Color::Reset))?;

    let mut lines = input.lines();
    loop {
        out.execute(SetForegroundColor(Color::Green))?;
        out.execute(Print("afm> "))?;
        out.execute(SetForegroundColor(Color::Reset))?;
        out.flush()?;

        let Some(line) = lines.next() else {
            writeln!(out)?;
            break;
        };
        let line = line?;

        let result = match ShellCommand::parse(&line) {
            Ok(Some(command)) => execute(service, command, default_top_k).await,
            Ok(None) => continue,
            Err(e) => Err(e),
        };
        match result {
            Ok(Some(output)) => writeln!(out, "{output}")?,
            Ok(None) => break,
            Err(e) => {
                out.execute(SetForegroundColor(Color::Red))?;
                out.execute(Print(format!("error: {e}\n")))?;
                out.execute(SetForegroundColor(Color::Reset))?;
            }
        }
    }
    Ok(())
}
