//! Command line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "media-archive")]
#[command(about = "Ingest uploads into the media archive", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Register files as assets and extract their metadata
    Ingest {
        /// Files to ingest
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Declared content type; guessed from the extension when omitted
        #[arg(long)]
        content_type: Option<String>,
    },
    /// Print an asset and its audio metadata
    Show { id: i64 },
}
