//! Application configuration management

use std::collections::HashSet;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

const DEFAULT_SUPPORTED_FILES: &str =
    "3gp, act, AIFF, ALAC, Au, flac, gsm, m4a, m4p, mp3, ogg, ram, raw, vox, wav, wma";

/// Console log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite connection URL
    pub database_url: String,

    /// Root directory the local thumbnail manager writes into
    pub thumbnail_path: PathBuf,

    pub log_format: LogFormat,

    /// Settings for the audio metadata handler
    pub audio: AudioHandlerConfig,
}

/// Settings consumed by the audio metadata handler.
#[derive(Debug, Clone)]
pub struct AudioHandlerConfig {
    /// Path to the ffmpeg executable used for probing
    pub ffmpeg_path: PathBuf,

    /// Template for stored content names (`{id}`, `{name}`, `{ext}`)
    pub format_file_name: String,

    /// Template for the shared audio thumbnail (`{size}`)
    pub default_format_thumbnail: String,

    /// Template for per-asset thumbnails (`{size}`, `{id}`, `{name}`)
    pub format_thumbnail: String,

    /// Image installed as the default audio thumbnail at deploy
    pub default_thumbnail_image: PathBuf,

    /// Wall-clock limit for one probe
    pub probe_timeout: Duration,

    supported_extensions: HashSet<String>,
}

impl AudioHandlerConfig {
    /// Build and validate the handler settings. Every template must be non-empty
    /// and the extension list must name at least one extension.
    pub fn new(
        ffmpeg_path: impl Into<PathBuf>,
        format_file_name: impl Into<String>,
        default_format_thumbnail: impl Into<String>,
        format_thumbnail: impl Into<String>,
        supported_files: &str,
        default_thumbnail_image: impl Into<PathBuf>,
        probe_timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let ffmpeg_path = ffmpeg_path.into();
        if ffmpeg_path.as_os_str().is_empty() {
            return Err(ConfigError::Empty { key: "FFMPEG_PATH" });
        }
        let format_file_name = non_empty("AUDIO_FORMAT_FILE_NAME", format_file_name.into())?;
        let default_format_thumbnail = non_empty(
            "AUDIO_DEFAULT_FORMAT_THUMBNAIL",
            default_format_thumbnail.into(),
        )?;
        let format_thumbnail = non_empty("AUDIO_FORMAT_THUMBNAIL", format_thumbnail.into())?;

        let supported_extensions = parse_extension_list(supported_files);
        if supported_extensions.is_empty() {
            return Err(ConfigError::Empty {
                key: "AUDIO_SUPPORTED_FILES",
            });
        }

        let default_thumbnail_image = default_thumbnail_image.into();
        if default_thumbnail_image.as_os_str().is_empty() {
            return Err(ConfigError::Empty {
                key: "AUDIO_THUMBNAIL_IMAGE",
            });
        }

        if probe_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                key: "PROBE_TIMEOUT_SECS",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            ffmpeg_path,
            format_file_name,
            default_format_thumbnail,
            format_thumbnail,
            default_thumbnail_image,
            probe_timeout,
            supported_extensions,
        })
    }

    /// Extensions accepted by the applicability filter, case as configured
    pub fn supported_extensions(&self) -> &HashSet<String> {
        &self.supported_extensions
    }
}

impl Default for AudioHandlerConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("/usr/bin/ffmpeg"),
            format_file_name: "{id}.{ext}".to_string(),
            default_format_thumbnail: "{size}/audio.jpg".to_string(),
            format_thumbnail: "{size}/{id}.{name}.jpg".to_string(),
            default_thumbnail_image: PathBuf::from("resources/audio.jpg"),
            probe_timeout: Duration::from_secs(60),
            supported_extensions: parse_extension_list(DEFAULT_SUPPORTED_FILES),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup. Unset keys fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let database_url = non_empty(
            "DATABASE_URL",
            var("DATABASE_URL", "sqlite:./data/media_archive.db?mode=rwc"),
        )?;

        let thumbnail_path =
            non_empty("THUMBNAIL_PATH", var("THUMBNAIL_PATH", "./data/thumbnail"))?;

        let log_format = match var("LOG_FORMAT", "json").as_str() {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            other => {
                return Err(ConfigError::Invalid {
                    key: "LOG_FORMAT",
                    value: other.to_string(),
                });
            }
        };

        let timeout_raw = var("PROBE_TIMEOUT_SECS", "60");
        let probe_timeout = timeout_raw
            .trim()
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| ConfigError::Invalid {
                key: "PROBE_TIMEOUT_SECS",
                value: timeout_raw.clone(),
            })?;

        let audio = AudioHandlerConfig::new(
            var("FFMPEG_PATH", "/usr/bin/ffmpeg"),
            var("AUDIO_FORMAT_FILE_NAME", "{id}.{ext}"),
            var("AUDIO_DEFAULT_FORMAT_THUMBNAIL", "{size}/audio.jpg"),
            var("AUDIO_FORMAT_THUMBNAIL", "{size}/{id}.{name}.jpg"),
            &var("AUDIO_SUPPORTED_FILES", DEFAULT_SUPPORTED_FILES),
            var("AUDIO_THUMBNAIL_IMAGE", "resources/audio.jpg"),
            probe_timeout,
        )?;

        Ok(Self {
            database_url,
            thumbnail_path: PathBuf::from(thumbnail_path),
            log_format,
            audio,
        })
    }
}

fn non_empty(key: &'static str, value: String) -> Result<String, ConfigError> {
    if value.trim().is_empty() {
        Err(ConfigError::Empty { key })
    } else {
        Ok(value)
    }
}

/// Split a comma and/or whitespace separated extension list.
fn parse_extension_list(raw: &str) -> HashSet<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|ext| !ext.is_empty())
        .map(str::to_string)
        .collect()
}
