use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ganaterm_core::config::get_config;

pub mod ask;
pub mod chat;

/// Ganaterm - a lightweight terminal AI assistant.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Show verbose logs.
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ask a single question and review the response.
    Ask {
        /// Question to ask.
        question: Vec<String>,
        /// Model to use, must be defined in the config.
        #[arg(short, long)]
        model: Option<String>,
    },
    /// Chat with an AI model.
    Chat {
        /// Model to use for chat, must be defined in the config.
        #[arg(short, long)]
        model: Option<String>,
        /// Start a fresh conversation instead of resuming the saved one.
        #[arg(long)]
        no_history: bool,
    },
}

pub async fn run_app() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        crate::log::setup_logging().context("Failed to set up logging")?;
    }

    // Load configuration
    let config = get_config(None).context("Failed to load configuration")?;

    match &cli.command {
        Commands::Ask { question, model } => {
            ask::execute(question.clone(), model.clone(), &config).await
        }
        Commands::Chat { model, no_history } => {
            chat::execute(model.clone(), *no_history, &config).await
        }
    }
}
