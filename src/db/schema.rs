//! Static schema for the archive tables
//!
//! Tables are created when missing; existing tables are left alone.

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::debug;

const TABLES: &[(&str, &str)] = &[
    (
        "meta_type",
        r#"
        CREATE TABLE IF NOT EXISTS meta_type (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            key TEXT NOT NULL UNIQUE
        )
        "#,
    ),
    (
        "thumbnail_format",
        r#"
        CREATE TABLE IF NOT EXISTS thumbnail_format (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            format TEXT NOT NULL UNIQUE
        )
        "#,
    ),
    (
        "meta_data",
        r#"
        CREATE TABLE IF NOT EXISTS meta_data (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            content TEXT,
            type_id INTEGER REFERENCES meta_type(id),
            thumbnail_format_id INTEGER REFERENCES thumbnail_format(id),
            is_available BOOLEAN NOT NULL DEFAULT 0
        )
        "#,
    ),
    (
        "audio_data",
        r#"
        CREATE TABLE IF NOT EXISTS audio_data (
            id INTEGER PRIMARY KEY REFERENCES meta_data(id) ON DELETE CASCADE,
            title TEXT,
            artist TEXT,
            track INTEGER,
            album TEXT,
            genre TEXT,
            tcmp INTEGER,
            album_artist TEXT,
            year INTEGER,
            disk INTEGER,
            tbpm INTEGER,
            composer TEXT,
            audio_encoding TEXT NOT NULL,
            sample_rate INTEGER NOT NULL,
            channels TEXT NOT NULL,
            audio_bitrate INTEGER,
            length INTEGER NOT NULL
        )
        "#,
    ),
];

/// Create every archive table that does not exist yet
pub async fn sync_schema(pool: &SqlitePool) -> Result<()> {
    for &(table, ddl) in TABLES {
        debug!(table, "Ensuring table exists");
        sqlx::query(ddl)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to create table {}", table))?;
    }
    Ok(())
}
