use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::core::{Engine, Source};

#[derive(Parser)]
#[command(name = "driftwatch")]
#[command(about = "Change tracking for document platforms that don't expose diffs")]
#[command(version)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a default configuration file
    Init {
        /// Target file (defaults to Driftwatch.toml)
        #[arg(short, long)]
        path: Option<PathBuf>,
    },

    /// Check one document once and print the result
    Check {
        /// Source platform (platform_a or platform_b)
        #[arg(short, long)]
        source: Source,

        /// Document id on that platform
        document_id: String,
    },

    /// Poll all enabled sources on the configured interval
    Watch,

    /// List tracked documents
    List,
}

impl Cli {
    pub async fn execute(self, engine: Engine) -> Result<()> {
        match self.command {
            Commands::Init { path } => engine.init(path).await,
            Commands::Check {
                source,
                document_id,
            } => engine.check(source, &document_id).await,
            Commands::Watch => engine.watch().await,
            Commands::List => engine.list().await,
        }
    }
}
