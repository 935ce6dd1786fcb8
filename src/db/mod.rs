//! Database connection and operations

pub mod assets;
pub mod audio_data;
pub mod registry;
pub mod schema;

use std::str::FromStr;

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

pub use assets::{AssetRecord, AssetRepository, CreateAsset};
pub use audio_data::{AudioDataRecord, AudioDataRepository};
pub use registry::{MediaTypeRecord, ThumbnailFormatRecord};

/// Database wrapper providing connection pool access
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Get the maximum connection pool size from environment or default
    fn get_max_connections() -> u32 {
        std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5)
    }

    /// Create a new database connection pool and bring the schema up to date
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("Invalid database URL '{}'", url))?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(Self::get_max_connections())
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to connect to '{}'", url))?;

        let db = Self { pool };
        db.sync_schema().await?;
        Ok(db)
    }

    /// Single-connection in-memory database. Every pooled connection to
    /// `sqlite::memory:` is a separate database, so the pool is pinned to one.
    pub async fn connect_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .context("Failed to open in-memory database")?;

        let db = Self { pool };
        db.sync_schema().await?;
        Ok(db)
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Get an asset repository
    pub fn assets(&self) -> AssetRepository {
        AssetRepository::new(self.pool.clone())
    }

    /// Get an audio data repository
    pub fn audio_data(&self) -> AudioDataRepository {
        AudioDataRepository::new(self.pool.clone())
    }

    /// Create any missing tables
    pub async fn sync_schema(&self) -> Result<()> {
        schema::sync_schema(&self.pool).await
    }
}
