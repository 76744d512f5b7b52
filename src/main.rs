use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use lorekeeper::{cli, config, server};

#[derive(Parser)]
#[command(name = "lorekeeper", version, about = "Fact-grounded writing assistant")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP server
    Serve,
    /// Manage the embedding model
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },
    /// Retrieve the passages a query would pull into context
    Search {
        /// Query text
        query: String,
    },
    /// Manage stored facts
    Facts {
        #[command(subcommand)]
        action: FactsAction,
    },
}

#[derive(Subcommand)]
enum ModelAction {
    /// Download the embedding model to ~/.lorekeeper/models/
    Download,
}

#[derive(Subcommand)]
enum FactsAction {
    /// Import facts from a JSON array of {category, text}
    Import {
        /// Path to the JSON file
        file: PathBuf,
    },
    /// Export all facts as JSON to stdout
    Export,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = config::LoreConfig::load()?;

    // Log to stderr so stdout stays clean for exports
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve => server::serve(config).await?,
        Command::Model { action } => match action {
            ModelAction::Download => cli::model_download(&config.embedding).await?,
        },
        Command::Search { query } => cli::search::search(&config, &query).await?,
        Command::Facts { action } => match action {
            FactsAction::Import { file } => cli::import::import(&config, &file)?,
            FactsAction::Export => cli::export::export(&config)?,
        },
    }

    Ok(())
}
