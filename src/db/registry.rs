//! Media type and thumbnail format registry
//!
//! Both lookups are get-or-create and are only called while handlers deploy.

use anyhow::{Context, Result};
use serde::Serialize;
use sqlx::SqlitePool;

/// Media type row (e.g. key `audio`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct MediaTypeRecord {
    pub id: i64,
    pub key: String,
}

/// Thumbnail format row, keyed by its path template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct ThumbnailFormatRecord {
    pub id: i64,
    pub format: String,
}

/// Resolve the media type for `key`, creating it when missing
pub async fn media_type_for(pool: &SqlitePool, key: &str) -> Result<MediaTypeRecord> {
    sqlx::query("INSERT OR IGNORE INTO meta_type (key) VALUES (?1)")
        .bind(key)
        .execute(pool)
        .await
        .with_context(|| format!("Failed to register media type '{}'", key))?;

    let record =
        sqlx::query_as::<_, MediaTypeRecord>("SELECT id, key FROM meta_type WHERE key = ?1")
            .bind(key)
            .fetch_one(pool)
            .await
            .with_context(|| format!("Failed to load media type '{}'", key))?;

    Ok(record)
}

/// Resolve the thumbnail format for a path template, creating it when missing
pub async fn thumbnail_format_for(
    pool: &SqlitePool,
    format: &str,
) -> Result<ThumbnailFormatRecord> {
    sqlx::query("INSERT OR IGNORE INTO thumbnail_format (format) VALUES (?1)")
        .bind(format)
        .execute(pool)
        .await
        .with_context(|| format!("Failed to register thumbnail format '{}'", format))?;

    let record = sqlx::query_as::<_, ThumbnailFormatRecord>(
        "SELECT id, format FROM thumbnail_format WHERE format = ?1",
    )
    .bind(format)
    .fetch_one(pool)
    .await
    .with_context(|| format!("Failed to load thumbnail format '{}'", format))?;

    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[tokio::test]
    async fn test_lookups_are_stable() {
        let db = Database::connect_in_memory().await.unwrap();

        let first = media_type_for(db.pool(), "audio").await.unwrap();
        let second = media_type_for(db.pool(), "audio").await.unwrap();
        let other = media_type_for(db.pool(), "image").await.unwrap();
        assert_eq!(first, second);
        assert_ne!(first.id, other.id);

        let default = thumbnail_format_for(db.pool(), "{size}/audio.jpg").await.unwrap();
        let again = thumbnail_format_for(db.pool(), "{size}/audio.jpg").await.unwrap();
        assert_eq!(default.id, again.id);
        assert_eq!(default.format, "{size}/audio.jpg");
    }
}
