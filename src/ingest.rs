//! Upload ingestion: the unit of work around the handler chain

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::db::{AssetRecord, AudioDataRecord, CreateAsset, Database};
use crate::media::{HandlerChain, HandlerOutcome};

/// What happened to one uploaded file
#[derive(Debug, Serialize)]
pub struct IngestReport {
    pub asset: AssetRecord,
    /// Declared content type, or the one guessed from the extension
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub handled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioDataRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Content type from the declared value or, failing that, the file extension
pub fn detect_content_type(path: &Path, declared: Option<&str>) -> Option<String> {
    declared
        .map(str::to_string)
        .or_else(|| mime_guess::from_path(path).first().map(|m| m.essence_str().to_string()))
}

/// Register `path` as a new asset and run it through the chain inside one transaction.
///
/// Only a declared content type reaches the handlers; a guessed one is reported
/// but never overrides their extension lists. The asset row is created before
/// the transaction so it survives a failed ingest, flagged unavailable.
pub async fn ingest_file(
    db: &Database,
    chain: &HandlerChain,
    path: &Path,
    content_type: Option<&str>,
) -> Result<IngestReport> {
    let path = tokio::fs::canonicalize(path)
        .await
        .with_context(|| format!("Cannot read upload {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .with_context(|| format!("Upload {} has no file name", path.display()))?;
    let detected = detect_content_type(&path, content_type);

    let mut asset = db.assets().create(CreateAsset { name }).await?;
    info!(
        asset_id = asset.id,
        name = %asset.name,
        content_type = ?detected,
        "Ingesting upload"
    );

    let mut tx = db.pool().begin().await.context("Failed to start transaction")?;
    let outcome = chain.process(&mut tx, &mut asset, &path, content_type).await?;
    tx.commit().await.context("Failed to commit ingest")?;

    let handled = outcome.is_handled();
    let (audio, error) = match outcome {
        HandlerOutcome::Processed(record) => (Some(record), None),
        HandlerOutcome::Unavailable(err) => (None, Some(err.to_string())),
        HandlerOutcome::NotHandled => (None, None),
    };

    Ok(IngestReport {
        asset,
        content_type: detected,
        handled,
        audio,
        error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_content_type() {
        assert_eq!(
            detect_content_type(Path::new("song.mp3"), None).as_deref(),
            Some("audio/mpeg")
        );
        assert_eq!(
            detect_content_type(Path::new("song.mp3"), Some("application/octet-stream")).as_deref(),
            Some("application/octet-stream")
        );
        assert_eq!(detect_content_type(Path::new("no_extension"), None), None);
    }
}
