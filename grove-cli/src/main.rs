//! `grove`: build a corpus from documents and ask grounded questions about it.

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
#[command(version, about = "Retrieval-augmented answers over your own documents")]
struct Cli {
    /// JSON file with pipeline settings; missing fields use defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true, default_value_t = false)]
    log_json: bool,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Build a new corpus from files or directories, replacing any existing one
    Build {
        /// Corpus directory
        #[arg(long)]
        corpus: PathBuf,
        /// Maximum tokens per segment
        #[arg(long)]
        max_tokens: Option<usize>,
        /// Tokens shared by consecutive segments
        #[arg(long)]
        overlap_tokens: Option<usize>,
        /// Documents (PDF or text) or directories holding them
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
    /// Add documents to an existing corpus
    Append {
        #[arg(long)]
        corpus: PathBuf,
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
    /// Show the segments most similar to a query
    Search {
        #[arg(long)]
        corpus: PathBuf,
        /// Number of segments to return
        #[arg(short, long)]
        k: Option<usize>,
        /// Print results as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
        query: String,
    },
    /// Answer a question from the corpus
    Ask {
        #[arg(long)]
        corpus: PathBuf,
        #[arg(short, long)]
        k: Option<usize>,
        /// JSON persona file (name, description, characteristics, instructions, language)
        #[arg(long, conflicts_with = "preset")]
        persona: Option<PathBuf>,
        /// Built-in persona: default or dr_c
        #[arg(long)]
        preset: Option<String>,
        /// Override the persona language (en, pt)
        #[arg(long)]
        language: Option<String>,
        /// Print the answer as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
        question: String,
    },
    /// Summarize a corpus without contacting any provider
    Inspect {
        #[arg(long)]
        corpus: PathBuf,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = commands::load_config(cli.config.as_deref())?;
    match cli.cmd {
        Cmd::Build { corpus, max_tokens, overlap_tokens, inputs } => {
            let config = commands::with_chunking(config, max_tokens, overlap_tokens)?;
            commands::build(config, &corpus, &inputs).await
        }
        Cmd::Append { corpus, inputs } => commands::append(config, &corpus, &inputs).await,
        Cmd::Search { corpus, k, json, query } => {
            commands::search(config, &corpus, &query, k, json).await
        }
        Cmd::Ask { corpus, k, persona, preset, language, json, question } => {
            let persona =
                commands::load_persona(persona.as_deref(), preset.as_deref(), language.as_deref())?;
            commands::ask(config, &corpus, &question, k, &persona, json).await
        }
        Cmd::Inspect { corpus, json } => commands::inspect(&corpus, json),
    }
}

/// Logs go to stderr so command output on stdout stays pipeable.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(filter).with_target(false).with_writer(std::io::stderr);
    let _ = if json { builder.json().try_init() } else { builder.try_init() };
}
