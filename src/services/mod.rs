//! Services used by the ingestion pipeline

pub mod ffmpeg;
pub mod logging;
pub mod thumbnail;

pub use ffmpeg::FfmpegService;
pub use logging::init_tracing;
pub use thumbnail::{LocalThumbnailManager, ThumbnailManager};
