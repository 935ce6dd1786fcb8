//! Asset (`meta_data`) repository

use anyhow::Result;
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};

use crate::media::storage_path::file_extension;

/// Asset record from database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct AssetRecord {
    pub id: i64,
    /// Display name, usually the uploaded file name with its extension
    pub name: String,
    /// Relative content path inside the archive
    pub content: Option<String>,
    pub type_id: Option<i64>,
    pub thumbnail_format_id: Option<i64>,
    pub is_available: bool,
}

impl AssetRecord {
    /// Extension of the display name (text after the last dot), case preserved
    pub fn extension(&self) -> Option<&str> {
        file_extension(&self.name)
    }
}

/// Input for registering an uploaded asset
#[derive(Debug)]
pub struct CreateAsset {
    pub name: String,
}

pub struct AssetRepository {
    pool: SqlitePool,
}

impl AssetRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Register a new, not yet available asset
    pub async fn create(&self, input: CreateAsset) -> Result<AssetRecord> {
        let result = sqlx::query("INSERT INTO meta_data (name, is_available) VALUES (?1, 0)")
            .bind(&input.name)
            .execute(&self.pool)
            .await?;

        Ok(AssetRecord {
            id: result.last_insert_rowid(),
            name: input.name,
            content: None,
            type_id: None,
            thumbnail_format_id: None,
            is_available: false,
        })
    }

    /// Get an asset by id
    pub async fn get(&self, id: i64) -> Result<Option<AssetRecord>> {
        let record = sqlx::query_as::<_, AssetRecord>(
            r#"
            SELECT id, name, content, type_id, thumbnail_format_id, is_available
            FROM meta_data
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }
}

/// Write the four fields the ingestion pipeline owns
pub async fn update_content_state(
    conn: &mut SqliteConnection,
    asset: &AssetRecord,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE meta_data
        SET content = ?1, type_id = ?2, thumbnail_format_id = ?3, is_available = ?4
        WHERE id = ?5
        "#,
    )
    .bind(&asset.content)
    .bind(asset.type_id)
    .bind(asset.thumbnail_format_id)
    .bind(asset.is_available)
    .bind(asset.id)
    .execute(conn)
    .await?;

    Ok(())
}

/// Flag an asset as unavailable
pub async fn mark_unavailable(conn: &mut SqliteConnection, id: i64) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE meta_data SET is_available = 0 WHERE id = ?1")
        .bind(id)
        .execute(conn)
        .await?;
    Ok(())
}
