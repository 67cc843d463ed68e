//! # folio CLI
//!
//! Command-line interface for inspecting and maintaining folio exports.

mod commands;
mod json;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "folio")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(long, default_value = "folio.yml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show what an export would do, without rendering anything
    Plan {
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Summarize the last export
    Status {
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Search the exported site
    Search {
        /// Search query
        query: String,

        /// Maximum results to return
        #[arg(long, default_value_t = 10)]
        limit: usize,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Resolve a link as it would be written in a source document
    Resolve {
        /// Link as written, e.g. "Guide#Install"
        link: String,

        /// Source path of the document containing the link
        #[arg(long)]
        from: String,

        /// Resolve as an embed (prefer attachments over pages)
        #[arg(long)]
        embed: bool,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Delete every file of the last export
    Purge {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },

    /// Forget the last export so the next one starts from scratch
    ClearCache,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(if cli.verbose {
                tracing::Level::DEBUG.into()
            } else {
                tracing::Level::INFO.into()
            }),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Plan { json } => commands::plan(&cli.config, json).await,
        Commands::Status { json } => commands::status(&cli.config, json).await,
        Commands::Search { query, limit, json } => {
            commands::search_site(&cli.config, &query, limit, json).await
        }
        Commands::Resolve {
            link,
            from,
            embed,
            json,
        } => commands::resolve_link(&cli.config, &link, &from, embed, json).await,
        Commands::Purge { yes } => commands::purge(&cli.config, yes).await,
        Commands::ClearCache => commands::clear_cache(&cli.config).await,
    }
}
