//! Metadata handler chain
//!
//! Every uploaded asset is offered to the registered handlers in order. The
//! first handler whose outcome is handled owns the asset; the rest never see it.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::SqliteConnection;
use tracing::{debug, info};

use crate::config::AudioHandlerConfig;
use crate::db::{AssetRecord, AudioDataRecord, Database};
use crate::error::{HandlerError, PersistError};
use crate::media::audio::AudioDataHandler;
use crate::services::ThumbnailManager;

/// Result of offering an asset to a handler
#[derive(Debug)]
pub enum HandlerOutcome {
    /// Not this handler's asset, or the probe could not read it. Nothing was written.
    NotHandled,
    /// Metadata stored and the asset is available
    Processed(AudioDataRecord),
    /// The handler took the asset but storing its metadata failed; the asset
    /// is marked unavailable.
    Unavailable(PersistError),
}

impl HandlerOutcome {
    /// Whether the handler took ownership of the asset
    pub fn is_handled(&self) -> bool {
        !matches!(self, HandlerOutcome::NotHandled)
    }
}

/// A media-type specific metadata extractor.
///
/// `deploy` runs once at startup and must succeed before `process` is called.
/// `process` works inside the caller's transaction; the handler never commits
/// or rolls back the caller's unit of work.
#[async_trait]
pub trait MetaDataHandler: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &'static str;

    /// Resolve registry entries and install shared resources.
    async fn deploy(
        &self,
        db: &Database,
        thumbnails: &dyn ThumbnailManager,
    ) -> Result<(), HandlerError>;

    /// Cheap check on name and declared content type. No side effects.
    fn is_applicable(&self, name: &str, content_type: Option<&str>) -> bool;

    /// Extract and store metadata for an asset whose content sits at `content_path`.
    async fn process(
        &self,
        conn: &mut SqliteConnection,
        asset: &mut AssetRecord,
        content_path: &Path,
    ) -> Result<HandlerOutcome, HandlerError>;

    /// [`process`](Self::process) guarded by [`is_applicable`](Self::is_applicable).
    async fn process_by_info(
        &self,
        conn: &mut SqliteConnection,
        asset: &mut AssetRecord,
        content_path: &Path,
        content_type: Option<&str>,
    ) -> Result<HandlerOutcome, HandlerError> {
        if !self.is_applicable(&asset.name, content_type) {
            return Ok(HandlerOutcome::NotHandled);
        }
        self.process(conn, asset, content_path).await
    }
}

/// Ordered list of handlers
#[derive(Default)]
pub struct HandlerChain {
    handlers: Vec<Arc<dyn MetaDataHandler>>,
}

impl HandlerChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chain with every built-in handler registered
    pub fn from_config(audio: AudioHandlerConfig) -> Self {
        let mut chain = Self::new();
        chain.register(Arc::new(AudioDataHandler::new(audio)));
        chain
    }

    pub fn register(&mut self, handler: Arc<dyn MetaDataHandler>) {
        self.handlers.push(handler);
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Deploy every handler. The first failure aborts.
    pub async fn deploy_all(
        &self,
        db: &Database,
        thumbnails: &dyn ThumbnailManager,
    ) -> Result<(), HandlerError> {
        for handler in &self.handlers {
            handler.deploy(db, thumbnails).await?;
            info!(handler = handler.name(), "Metadata handler deployed");
        }
        Ok(())
    }

    /// Offer the asset to each handler until one takes it.
    pub async fn process(
        &self,
        conn: &mut SqliteConnection,
        asset: &mut AssetRecord,
        content_path: &Path,
        content_type: Option<&str>,
    ) -> Result<HandlerOutcome, HandlerError> {
        for handler in &self.handlers {
            let outcome = handler
                .process_by_info(conn, asset, content_path, content_type)
                .await?;
            if outcome.is_handled() {
                debug!(asset_id = asset.id, handler = handler.name(), "Asset handled");
                return Ok(outcome);
            }
        }

        debug!(asset_id = asset.id, name = %asset.name, "No handler took asset");
        Ok(HandlerOutcome::NotHandled)
    }
}
