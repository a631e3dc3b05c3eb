//! Folio command line.
//!
//! Usage:
//!   # Replay a script and print each replica's outline
//!   cargo run -p folio-cli -- replay demos/shopping.ron
//!
//!   # With an editor config
//!   cargo run -p folio-cli -- replay demos/shopping.ron --config folio.ron
//!
//! `RUST_LOG` overrides the config's `log_filter`.

mod script;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use folio_editor::EditorConfig;
use tracing_subscriber::{EnvFilter, fmt};

use crate::script::{Replay, Script};

#[derive(Parser, Debug)]
#[command(name = "folio")]
#[command(about = "Collaborative block documents, replayed from scripts")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay an editing script against in-memory replicas
    Replay {
        /// RON script
        script: PathBuf,

        /// Editor config (RON). Defaults apply when the file is absent.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn load_config(path: Option<&Path>) -> Result<EditorConfig> {
    match path {
        Some(path) if path.exists() => EditorConfig::load(path)
            .with_context(|| format!("loading config {}", path.display())),
        _ => Ok(EditorConfig::default()),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Replay { script, config } => {
            let config = load_config(config.as_deref())?;

            // Logs go to stderr; stdout carries the outlines.
            let filter = EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
            fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_ansi(false)
                .init();

            let script = Script::load(&script)?;
            let mut replay = Replay::open(&config, script.replicas)?;
            replay.run(&script.steps)?;

            for (index, outline) in replay.outlines()?.iter().enumerate() {
                println!("# replica {index}");
                print!("{outline}");
            }
            tracing::info!(steps = script.steps.len(), "replay finished");
        }
    }
    Ok(())
}
