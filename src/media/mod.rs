//! Media metadata extraction

pub mod audio;
pub mod handler;
pub mod probe_parser;
pub mod storage_path;

pub use audio::{AUDIO_TYPE_KEY, AudioDataHandler};
pub use handler::{HandlerChain, HandlerOutcome, MetaDataHandler};
pub use probe_parser::{ParseAnomaly, ParsedProbe, ProbeParser, ProbedAudio};
