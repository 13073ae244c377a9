//! # Policy Assistant CLI (`policy-assistant`)
//!
//! Runs the HTTP server and exposes the same operations for local use.
//!
//! ## Usage
//!
//! ```bash
//! policy-assistant --config ./config/policy-assistant.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `serve` | Start the HTTP server |
//! | `ingest <FILE> --policy-type <TYPE>` | Load, chunk and index a PDF |
//! | `chat --session <ID> "<QUERY>"` | Run one chat turn |
//! | `policies` | List indexed policies |
//! | `delete <NAME>` | Delete every chunk of one document |
//! | `clear` | Delete every indexed chunk |
//!
//! `OPENAI_API_KEY` is required for `serve` and `chat` (and for ingestion
//! when the embedding provider is `openai`). `QDRANT_API_KEY` is optional.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use policy_assistant::admin::{self, DeleteOutcome};
use policy_assistant::config;
use policy_assistant::ingest::IngestPipeline;
use policy_assistant::logging::init_logging;
use policy_assistant::server::{self, AppState};

/// Policy Assistant: answers employee questions from indexed company
/// policy documents.
#[derive(Parser)]
#[command(
    name = "policy-assistant",
    about = "Retrieval-augmented chat over company policy documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Missing file means defaults.
    #[arg(long, global = true, default_value = "./config/policy-assistant.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// Index a PDF policy document.
    Ingest {
        /// Path to the PDF.
        file: PathBuf,

        /// Category tag stored with every chunk (e.g. HR, IT, Compliance).
        #[arg(long)]
        policy_type: String,

        /// Document name to record. Defaults to the file name.
        #[arg(long)]
        name: Option<String>,
    },

    /// Run one chat turn and print the answer.
    Chat {
        /// Session identifier.
        #[arg(long, default_value = "cli")]
        session: String,

        /// The question to ask.
        query: String,
    },

    /// List indexed policies.
    Policies,

    /// Delete every chunk whose filename matches NAME.
    Delete {
        name: String,
    },

    /// Delete every indexed chunk.
    Clear,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    init_logging(&cfg.logging.level);

    match cli.command {
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Ingest {
            file,
            policy_type,
            name,
        } => {
            let filename = match name {
                Some(n) => n,
                None => file
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(str::to_string)
                    .with_context(|| format!("Invalid file path: {}", file.display()))?,
            };
            if !policy_assistant::loader::is_pdf_name(&filename) {
                anyhow::bail!("Only PDF files are allowed: {}", filename);
            }

            let index = server::build_index(&cfg).await?;
            let pipeline = IngestPipeline::from_config(&cfg, index)?;
            let report = pipeline
                .ingest_file(&file, &filename, &policy_type)
                .await
                .with_context(|| format!("Ingestion failed for {}", filename))?;

            println!("ingest {}", report.filename);
            println!("  type: {}", report.policy_type);
            println!("  pages: {}", report.pages);
            println!("  chunks: {}", report.chunks);
            println!("  batches: {}", report.batches);
            println!("  uploaded_at: {}", report.uploaded_at);
        }
        Commands::Chat { session, query } => {
            let state = AppState::from_config(&cfg).await?;
            let turn = state.engine.chat(&session, &query).await?;
            println!("{}", turn.answer);
        }
        Commands::Policies => {
            let index = server::build_index(&cfg).await?;
            let policies = admin::list_policies(index.as_ref(), cfg.retrieval.listing_limit).await?;
            if policies.is_empty() {
                println!("No policies indexed.");
            }
            for p in policies {
                println!(
                    "{}  [{}]  uploaded {}  ~{} pages  {:.1} KB  {} chunks",
                    p.name, p.policy_type, p.uploaded_at, p.pages, p.size, p.chunks
                );
            }
        }
        Commands::Delete { name } => {
            let index = server::build_index(&cfg).await?;
            match admin::delete_policy(index.as_ref(), &name).await? {
                DeleteOutcome::Deleted(n) => println!("Deleted {} chunks for '{}'", n, name),
                DeleteOutcome::NotFound => println!("No documents found with filename: {}", name),
            }
        }
        Commands::Clear => {
            let index = server::build_index(&cfg).await?;
            match admin::clear_all(index.as_ref()).await? {
                DeleteOutcome::Deleted(n) => println!("Deleted {} chunks", n),
                DeleteOutcome::NotFound => println!("No documents found in vector store"),
            }
        }
    }

    Ok(())
}
