//! Media archive command line entry point

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;

use media_archive::config::Config;
use media_archive::db::Database;
use media_archive::ingest::ingest_file;
use media_archive::media::HandlerChain;
use media_archive::services::{LocalThumbnailManager, init_tracing};

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    dotenvy::dotenv().ok();
    let config = Config::from_env().context("Invalid configuration")?;
    init_tracing(config.log_format);

    tracing::info!("Starting media archive");

    let db = Database::connect(&config.database_url).await?;
    tracing::info!("Database connected");

    match cli.command {
        Commands::Ingest {
            files,
            content_type,
        } => {
            let thumbnails = LocalThumbnailManager::new(&config.thumbnail_path);
            let chain = HandlerChain::from_config(config.audio.clone());
            chain
                .deploy_all(&db, &thumbnails)
                .await
                .context("Failed to deploy metadata handlers")?;

            for file in &files {
                let report = ingest_file(&db, &chain, file, content_type.as_deref()).await?;
                println!("{}", serde_json::to_string(&report)?);
            }
        }
        Commands::Show { id } => {
            let asset = db
                .assets()
                .get(id)
                .await?
                .with_context(|| format!("Asset {} not found", id))?;
            let audio = db.audio_data().get(id).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({ "asset": asset, "audio": audio }))?
            );
        }
    }

    Ok(())
}
