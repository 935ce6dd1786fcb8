//! Audio metadata handler
//!
//! Probes audio uploads with ffmpeg, stores tags and technical details in
//! `audio_data`, and files the asset under `audio/<shard>/`.

use std::path::Path;

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use sqlx::{Connection, SqliteConnection};
use tracing::{debug, error, info, warn};

use crate::config::AudioHandlerConfig;
use crate::db::{AssetRecord, AudioDataRecord, Database, assets, audio_data, registry};
use crate::error::{HandlerError, PersistError, ProbeError};
use crate::media::handler::{HandlerOutcome, MetaDataHandler};
use crate::media::probe_parser::{ParsedProbe, ProbeParser, ProbedAudio};
use crate::media::storage_path::{content_path, file_extension};
use crate::services::{FfmpegService, ThumbnailManager};

/// Media type key, also the content-type family prefix and the storage root
pub const AUDIO_TYPE_KEY: &str = "audio";

const HANDLER_NAME: &str = "audio";

/// Registry ids resolved at deploy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deployment {
    pub media_type_id: i64,
    pub default_thumbnail_format_id: i64,
    pub thumbnail_format_id: i64,
}

pub struct AudioDataHandler {
    config: AudioHandlerConfig,
    ffmpeg: FfmpegService,
    deployment: OnceCell<Deployment>,
}

impl AudioDataHandler {
    pub fn new(config: AudioHandlerConfig) -> Self {
        let ffmpeg = FfmpegService::new(config.ffmpeg_path.clone(), config.probe_timeout);
        Self {
            config,
            ffmpeg,
            deployment: OnceCell::new(),
        }
    }

    /// Registry ids, once deployed
    pub fn deployment(&self) -> Option<Deployment> {
        self.deployment.get().copied()
    }

    /// Run ffmpeg and feed its output through the parser as it arrives.
    pub async fn probe(&self, content_path: &Path) -> Result<ParsedProbe, ProbeError> {
        let mut parser = ProbeParser::new();
        self.ffmpeg.probe(content_path, |line| parser.feed(line)).await?;
        Ok(parser.finish())
    }
}

#[async_trait]
impl MetaDataHandler for AudioDataHandler {
    fn name(&self) -> &'static str {
        HANDLER_NAME
    }

    async fn deploy(
        &self,
        db: &Database,
        thumbnails: &dyn ThumbnailManager,
    ) -> Result<(), HandlerError> {
        if self.deployment.get().is_some() {
            return Ok(());
        }

        self.ffmpeg.verify().await?;

        let media_type = registry::media_type_for(db.pool(), AUDIO_TYPE_KEY)
            .await
            .map_err(HandlerError::Registry)?;
        let default_format =
            registry::thumbnail_format_for(db.pool(), &self.config.default_format_thumbnail)
                .await
                .map_err(HandlerError::Registry)?;
        let format = registry::thumbnail_format_for(db.pool(), &self.config.format_thumbnail)
            .await
            .map_err(HandlerError::Registry)?;

        thumbnails
            .put_thumbnail(&default_format, &self.config.default_thumbnail_image)
            .await
            .map_err(HandlerError::Thumbnail)?;

        let deployment = Deployment {
            media_type_id: media_type.id,
            default_thumbnail_format_id: default_format.id,
            thumbnail_format_id: format.id,
        };
        // A concurrent deploy resolves the same rows, so losing the race is harmless.
        let _ = self.deployment.set(deployment);

        info!(
            ffmpeg = %self.ffmpeg.ffmpeg_path().display(),
            media_type_id = deployment.media_type_id,
            default_thumbnail_format_id = deployment.default_thumbnail_format_id,
            "Audio handler ready"
        );
        Ok(())
    }

    fn is_applicable(&self, name: &str, content_type: Option<&str>) -> bool {
        if content_type.is_some_and(|t| t.starts_with(AUDIO_TYPE_KEY)) {
            return true;
        }
        file_extension(name).is_some_and(|ext| self.config.supported_extensions().contains(ext))
    }

    async fn process(
        &self,
        conn: &mut SqliteConnection,
        asset: &mut AssetRecord,
        content_path: &Path,
    ) -> Result<HandlerOutcome, HandlerError> {
        let deployment = self
            .deployment
            .get()
            .copied()
            .ok_or(HandlerError::NotDeployed(HANDLER_NAME))?;

        let parsed = match self.probe(content_path).await {
            Ok(parsed) => parsed,
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                warn!(asset_id = asset.id, error = %e, "Could not probe audio file, skipping");
                return Ok(HandlerOutcome::NotHandled);
            }
        };

        if !parsed.anomalies.is_empty() {
            debug!(
                asset_id = asset.id,
                anomalies = parsed.anomalies.len(),
                "Probe output contained unparsable lines"
            );
        }

        let record = build_record(asset.id, parsed.audio);

        let stored_path = content_path_for(&self.config, asset);
        let previous_content = asset.content.replace(stored_path);
        asset.type_id = Some(deployment.media_type_id);
        asset.thumbnail_format_id = Some(deployment.default_thumbnail_format_id);
        asset.is_available = true;

        match persist(conn, &record, asset).await {
            Ok(()) => {
                info!(
                    asset_id = asset.id,
                    content = asset.content.as_deref().unwrap_or_default(),
                    encoding = record.audio_encoding.as_deref().unwrap_or_default(),
                    length = record.length,
                    "Stored audio metadata"
                );
                Ok(HandlerOutcome::Processed(record))
            }
            Err(source) => {
                asset.is_available = false;
                asset.content = previous_content;
                if let Err(e) = assets::mark_unavailable(conn, asset.id).await {
                    warn!(asset_id = asset.id, error = %e, "Failed to flag asset unavailable");
                }

                let err = PersistError {
                    asset_id: asset.id,
                    source,
                };
                error!(
                    asset_id = asset.id,
                    error = %err,
                    "Audio metadata not stored, asset unavailable"
                );
                Ok(HandlerOutcome::Unavailable(err))
            }
        }
    }
}

fn content_path_for(config: &AudioHandlerConfig, asset: &AssetRecord) -> String {
    content_path(
        AUDIO_TYPE_KEY,
        &config.format_file_name,
        asset.id,
        &asset.name,
        asset.extension(),
    )
}

/// Attach the parser output to an asset id
fn build_record(id: i64, audio: ProbedAudio) -> AudioDataRecord {
    AudioDataRecord {
        id,
        title: audio.title,
        artist: audio.artist,
        track: audio.track,
        album: audio.album,
        genre: audio.genre,
        tcmp: audio.tcmp,
        album_artist: audio.album_artist,
        year: audio.year,
        disk: audio.disk,
        tbpm: audio.tbpm,
        composer: audio.composer,
        audio_encoding: audio.audio_encoding,
        sample_rate: audio.sample_rate,
        channels: audio.channels,
        audio_bitrate: audio.audio_bitrate,
        length: audio.length,
    }
}

/// Insert the audio row and update the asset under a savepoint of the caller's transaction.
async fn persist(
    conn: &mut SqliteConnection,
    record: &AudioDataRecord,
    asset: &AssetRecord,
) -> Result<(), sqlx::Error> {
    let mut savepoint = conn.begin().await?;

    let written = async {
        audio_data::insert(&mut savepoint, record).await?;
        assets::update_content_state(&mut savepoint, asset).await?;
        Ok::<(), sqlx::Error>(())
    }
    .await;

    match written {
        Ok(()) => savepoint.commit().await,
        Err(e) => {
            if let Err(rollback) = savepoint.rollback().await {
                warn!(asset_id = asset.id, error = %rollback, "Savepoint rollback failed");
            }
            Err(e)
        }
    }
}
