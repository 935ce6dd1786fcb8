//! Error types for the ingestion pipeline
//!
//! Probe and configuration failures are fatal or per-asset depending on the
//! variant; persistence failures never escape the handler as `Err`, they are
//! carried inside [`HandlerOutcome`](crate::media::HandlerOutcome).

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Invalid configuration detected at construction time.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration value {key} must not be empty")]
    Empty { key: &'static str },

    #[error("configuration value {key} is invalid: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Failure while running the external probe.
#[derive(Error, Debug)]
pub enum ProbeError {
    /// The configured executable cannot be used at all. Fatal for the process.
    #[error("probe executable '{}' is not usable: {source}", path.display())]
    Executable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("probe of '{}' exited with status {}", path.display(), code.map(|c| c.to_string()).unwrap_or_else(|| "unknown".to_string()))]
    ExitStatus { path: PathBuf, code: Option<i32> },

    #[error("probe of '{}' timed out after {timeout:?}", path.display())]
    TimedOut { path: PathBuf, timeout: Duration },

    #[error("probe of '{}' failed: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ProbeError {
    /// Configuration failures abort startup; everything else only affects one asset.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ProbeError::Executable { .. })
    }
}

/// Storage-layer failure while committing an audio record.
#[derive(Error, Debug)]
#[error("failed to persist audio data for asset {asset_id}: {source}")]
pub struct PersistError {
    pub asset_id: i64,
    #[source]
    pub source: sqlx::Error,
}

/// Errors a handler propagates to its caller.
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("handler '{0}' used before deploy")]
    NotDeployed(&'static str),

    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error("registry lookup failed: {0:#}")]
    Registry(#[source] anyhow::Error),

    #[error("thumbnail setup failed: {0:#}")]
    Thumbnail(#[source] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_executable_errors_are_fatal() {
        let missing = ProbeError::Executable {
            path: PathBuf::from("/nope/ffmpeg"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        let exit = ProbeError::ExitStatus {
            path: PathBuf::from("song.mp3"),
            code: Some(1),
        };
        let timeout = ProbeError::TimedOut {
            path: PathBuf::from("song.mp3"),
            timeout: Duration::from_secs(1),
        };

        assert!(missing.is_fatal());
        assert!(!exit.is_fatal());
        assert!(!timeout.is_fatal());
    }

    #[test]
    fn test_exit_status_message() {
        let err = ProbeError::ExitStatus {
            path: PathBuf::from("song.mp3"),
            code: None,
        };
        assert_eq!(err.to_string(), "probe of 'song.mp3' exited with status unknown");
    }
}
