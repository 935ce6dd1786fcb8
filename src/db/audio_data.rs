//! Audio metadata repository

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};

/// Audio metadata row, one per asset, sharing the asset's id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct AudioDataRecord {
    pub id: i64,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub track: Option<i32>,
    pub album: Option<String>,
    pub genre: Option<String>,
    /// Compilation flag (iTunes `TCMP`)
    pub tcmp: Option<i32>,
    pub album_artist: Option<String>,
    pub year: Option<i32>,
    pub disk: Option<i32>,
    /// Tempo in beats per minute (`TBPM`)
    pub tbpm: Option<i32>,
    pub composer: Option<String>,
    pub audio_encoding: Option<String>,
    /// Hz
    pub sample_rate: Option<i32>,
    /// Channel layout token, e.g. `stereo`
    pub channels: Option<String>,
    /// kb/s
    pub audio_bitrate: Option<i32>,
    /// Whole seconds
    pub length: Option<i32>,
}

pub struct AudioDataRepository {
    pool: SqlitePool,
}

impl AudioDataRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get the audio metadata for an asset
    pub async fn get(&self, id: i64) -> Result<Option<AudioDataRecord>> {
        let record = sqlx::query_as::<_, AudioDataRecord>(
            r#"
            SELECT id, title, artist, track, album, genre, tcmp, album_artist, year,
                   disk, tbpm, composer, audio_encoding, sample_rate, channels,
                   audio_bitrate, length
            FROM audio_data
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Count stored audio records
    pub async fn count(&self) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM audio_data")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

/// Insert a record through the caller's connection (and therefore its transaction)
pub async fn insert(
    conn: &mut SqliteConnection,
    record: &AudioDataRecord,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO audio_data (
            id, title, artist, track, album, genre, tcmp, album_artist, year,
            disk, tbpm, composer, audio_encoding, sample_rate, channels,
            audio_bitrate, length
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
        "#,
    )
    .bind(record.id)
    .bind(&record.title)
    .bind(&record.artist)
    .bind(record.track)
    .bind(&record.album)
    .bind(&record.genre)
    .bind(record.tcmp)
    .bind(&record.album_artist)
    .bind(record.year)
    .bind(record.disk)
    .bind(record.tbpm)
    .bind(&record.composer)
    .bind(&record.audio_encoding)
    .bind(record.sample_rate)
    .bind(&record.channels)
    .bind(record.audio_bitrate)
    .bind(record.length)
    .execute(conn)
    .await?;

    Ok(())
}
