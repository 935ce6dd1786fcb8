//! Media archive ingestion
//!
//! Uploaded files are offered to a chain of metadata handlers. The audio
//! handler probes files with ffmpeg, stores their tags and technical details,
//! and files them under a sharded content path.

pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod media;
pub mod services;

pub use config::Config;
pub use db::Database;
pub use error::{ConfigError, HandlerError, PersistError, ProbeError};
