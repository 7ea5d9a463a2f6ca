use anyhow::Result;
use clap::{Parser, Subcommand};
use pdf_rag::commands::{ask_question, ingest_documents, serve, show_status};
use pdf_rag::config::settings::CONFIG_DIR_ENV;
use pdf_rag::config::{Config, get_config_dir, run_interactive_config, show_config};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pdf-rag")]
#[command(about = "Answer questions over a folder of PDF documents with retrieval-augmented generation")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml and the default vector database
    #[arg(long, global = true, env = CONFIG_DIR_ENV)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Ollama connection, models and the vector index
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Rebuild the vector index from the documents directory
    Ingest,
    /// Answer a single question from the indexed documents
    Ask {
        /// The question to answer
        question: String,
    },
    /// Start the HTTP server for the chat widget
    Serve,
    /// Show configured backends and index status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config_dir = get_config_dir(cli.config_dir)?;

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&config_dir)?;
            } else {
                run_interactive_config(&config_dir)?;
            }
        }
        Commands::Ingest => {
            ingest_documents(&Config::load(&config_dir)?).await?;
        }
        Commands::Ask { question } => {
            ask_question(&Config::load(&config_dir)?, &question).await?;
        }
        Commands::Serve => {
            serve(&Config::load(&config_dir)?).await?;
        }
        Commands::Status => {
            show_status(&Config::load(&config_dir)?).await?;
        }
    }

    Ok(())
}
