//! Parser for ffmpeg's diagnostic output
//!
//! ffmpeg prints everything it knows about an input on stderr while it opens
//! the file. Three kinds of lines matter:
//!
//! ```text
//!   Metadata:
//!     title           : Song
//!     artist          : Band
//!   Duration: 00:03:30.06, start: 0.025057, bitrate: 128 kb/s
//!     Stream #0:0: Audio: mp3, 44100 Hz, stereo, fltp, 128 kb/s
//! ```
//!
//! The parser is a two-state machine fed one line at a time. Anything it cannot
//! make sense of is recorded as a [`ParseAnomaly`] and skipped; it never fails
//! as a whole.

use std::fmt;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

const METADATA_MARKER: &str = "Metadata";
const SAMPLE_RATE_UNIT: &str = "Hz";
const BITRATE_UNIT: &str = "kb/s";

/// Hours carry the same weight as minutes; stored lengths depend on it.
const HOUR_WEIGHT: i64 = 60;
const MINUTE_WEIGHT: i64 = 60;

/// Where the parser is relative to a metadata block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    OutsideMetadata,
    InsideMetadata,
}

/// Which kind of line an anomaly came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    MetadataTag,
    StreamDescriptor,
    DurationSummary,
}

impl fmt::Display for LineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineKind::MetadataTag => write!(f, "metadata tag"),
            LineKind::StreamDescriptor => write!(f, "stream descriptor"),
            LineKind::DurationSummary => write!(f, "duration summary"),
        }
    }
}

/// A line that looked relevant but could not be parsed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseAnomaly {
    #[error("{kind} line has no {segment} segment")]
    MissingSegment {
        kind: LineKind,
        segment: &'static str,
    },

    #[error("{kind} line has a non-numeric {field}: {value:?}")]
    InvalidNumber {
        kind: LineKind,
        field: &'static str,
        value: String,
    },
}

/// Technical fields from an `Audio` stream line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamDescriptor {
    pub encoding: String,
    pub sample_rate: Option<i32>,
    pub channels: String,
    pub bitrate: Option<i32>,
}

/// Fields from the `Duration: ..., start: ..., bitrate: ...` line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationSummary {
    pub length: i32,
    pub bitrate: Option<i32>,
}

/// Everything the parser managed to extract from one probe
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProbedAudio {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub track: Option<i32>,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub tcmp: Option<i32>,
    pub album_artist: Option<String>,
    pub year: Option<i32>,
    pub disk: Option<i32>,
    pub tbpm: Option<i32>,
    pub composer: Option<String>,
    pub audio_encoding: Option<String>,
    pub sample_rate: Option<i32>,
    pub channels: Option<String>,
    pub audio_bitrate: Option<i32>,
    pub length: Option<i32>,
}

/// Final parser output
#[derive(Debug, Clone, Default)]
pub struct ParsedProbe {
    pub audio: ProbedAudio,
    pub anomalies: Vec<ParseAnomaly>,
}

enum TagOutcome {
    Consumed,
    EndOfBlock,
}

/// Line-driven state machine over probe output
#[derive(Debug)]
pub struct ProbeParser {
    state: ParserState,
    audio: ProbedAudio,
    anomalies: Vec<ParseAnomaly>,
}

impl Default for ProbeParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ProbeParser {
    pub fn new() -> Self {
        Self {
            state: ParserState::OutsideMetadata,
            audio: ProbedAudio::default(),
            anomalies: Vec::new(),
        }
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    /// Consume one line of probe output (trailing newline optional).
    pub fn feed(&mut self, line: &str) {
        let line = line.trim_end_matches(['\r', '\n']);

        match self.state {
            ParserState::InsideMetadata => {
                let (tag, value) = split_tag(line);
                match self.apply_tag(tag, value) {
                    TagOutcome::Consumed => return,
                    // The line that closed the block may still be a stream or duration line.
                    TagOutcome::EndOfBlock => self.state = ParserState::OutsideMetadata,
                }
            }
            ParserState::OutsideMetadata => {
                if line.contains(METADATA_MARKER) {
                    self.state = ParserState::InsideMetadata;
                    return;
                }
            }
        }

        self.evaluate_technical(line);
    }

    /// Finish the stream and hand back what was extracted.
    pub fn finish(self) -> ParsedProbe {
        ParsedProbe {
            audio: self.audio,
            anomalies: self.anomalies,
        }
    }

    fn apply_tag(&mut self, tag: &str, value: &str) -> TagOutcome {
        match tag {
            "title" => self.audio.title = Some(value.to_string()),
            "artist" => self.audio.artist = Some(value.to_string()),
            "album" => self.audio.album = Some(value.to_string()),
            "genre" => self.audio.genre = Some(value.to_string()),
            "album_artist" => self.audio.album_artist = Some(value.to_string()),
            "composer" => self.audio.composer = Some(value.to_string()),
            "track" => self.audio.track = self.tag_number("track", value),
            "TCMP" => self.audio.tcmp = self.tag_number("TCMP", value),
            "date" => self.audio.year = self.tag_number("date", value),
            "disc" => self.audio.disk = self.tag_number("disc", value),
            "TBPM" => self.audio.tbpm = self.tag_number("TBPM", value),
            // "Duration" closes the block explicitly; anything else unknown closes it implicitly.
            _ => return TagOutcome::EndOfBlock,
        }
        TagOutcome::Consumed
    }

    fn tag_number(&mut self, field: &'static str, value: &str) -> Option<i32> {
        let parsed = parse_number(value);
        if parsed.is_none() {
            self.record(ParseAnomaly::InvalidNumber {
                kind: LineKind::MetadataTag,
                field,
                value: value.to_string(),
            });
        }
        parsed
    }

    fn evaluate_technical(&mut self, line: &str) {
        if line.contains("Stream") && line.contains("Audio") {
            match parse_stream_descriptor(line) {
                Ok(stream) => {
                    self.audio.audio_encoding = Some(stream.encoding);
                    self.audio.sample_rate = stream.sample_rate;
                    self.audio.channels = Some(stream.channels);
                    self.audio.audio_bitrate = stream.bitrate;
                }
                Err(anomaly) => self.record(anomaly),
            }
        } else if line.contains("Duration") && line.contains("start") {
            match parse_duration_summary(line) {
                Ok(summary) => {
                    self.audio.length = Some(summary.length);
                    self.audio.audio_bitrate = summary.bitrate;
                }
                Err(anomaly) => self.record(anomaly),
            }
        }
    }

    fn record(&mut self, anomaly: ParseAnomaly) {
        debug!(%anomaly, "Skipping unparsable probe line");
        self.anomalies.push(anomaly);
    }
}

/// Split `tag : value` on the first colon; both sides trimmed.
fn split_tag(line: &str) -> (&str, &str) {
    match line.split_once(':') {
        Some((tag, value)) => (tag.trim(), value.trim()),
        None => (line.trim(), ""),
    }
}

/// Float-tolerant integer parse ("128.0" -> 128), truncating toward zero.
/// Values outside the `i32` range are absent.
pub fn parse_number(value: &str) -> Option<i32> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .map(f64::trunc)
        .filter(|n| (f64::from(i32::MIN)..=f64::from(i32::MAX)).contains(n))
        .map(|n| n as i32)
}

/// `"<number> <unit>"` -> the number when the unit matches, `None` otherwise.
fn value_with_unit(
    segment: &str,
    unit: &str,
    kind: LineKind,
    field: &'static str,
) -> Result<Option<i32>, ParseAnomaly> {
    let mut tokens = segment.split_whitespace();
    let number = tokens.next().unwrap_or_default();
    if tokens.next() != Some(unit) {
        return Ok(None);
    }
    parse_number(number)
        .map(Some)
        .ok_or_else(|| ParseAnomaly::InvalidNumber {
            kind,
            field,
            value: number.to_string(),
        })
}

/// Parse `Stream #0.1(eng): Audio: aac, 44100 Hz, stereo, s16, 61 kb/s`.
pub fn parse_stream_descriptor(line: &str) -> Result<StreamDescriptor, ParseAnomaly> {
    const KIND: LineKind = LineKind::StreamDescriptor;

    let codec_list = line.rsplit_once(':').map_or(line, |(_, rest)| rest);
    let parts: Vec<&str> = codec_list.split(',').collect();

    let encoding = parts[0].trim().to_string();

    let sample_rate = parts.get(1).ok_or(ParseAnomaly::MissingSegment {
        kind: KIND,
        segment: "sample rate",
    })?;
    let sample_rate = value_with_unit(sample_rate, SAMPLE_RATE_UNIT, KIND, "sample rate")?;

    let channels = parts
        .get(2)
        .ok_or(ParseAnomaly::MissingSegment {
            kind: KIND,
            segment: "channel layout",
        })?
        .trim()
        .to_string();

    // Index 3 is the sample format. Lossless streams often omit the bitrate entirely.
    let bitrate = match parts.get(4) {
        Some(segment) => value_with_unit(segment, BITRATE_UNIT, KIND, "bitrate")?,
        None => None,
    };

    Ok(StreamDescriptor {
        encoding,
        sample_rate,
        channels,
        bitrate,
    })
}

/// Parse `Duration: 00:00:30.06, start: 0.000000, bitrate: 585 kb/s`.
pub fn parse_duration_summary(line: &str) -> Result<DurationSummary, ParseAnomaly> {
    const KIND: LineKind = LineKind::DurationSummary;

    let parts: Vec<&str> = line.split(',').collect();

    let clock = parts[0]
        .split_once(':')
        .map(|(_, clock)| clock.trim())
        .ok_or(ParseAnomaly::MissingSegment {
            kind: KIND,
            segment: "duration",
        })?;
    let length = clock_to_seconds(clock)?;

    let bitrate = parts.get(2).ok_or(ParseAnomaly::MissingSegment {
        kind: KIND,
        segment: "bitrate",
    })?;
    let bitrate = bitrate.split_once(':').map_or("", |(_, value)| value);
    let bitrate = value_with_unit(bitrate, BITRATE_UNIT, KIND, "bitrate")?;

    Ok(DurationSummary { length, bitrate })
}

/// `HH:MM:SS(.frac)` -> whole seconds using the archive's hour weighting.
fn clock_to_seconds(clock: &str) -> Result<i32, ParseAnomaly> {
    const KIND: LineKind = LineKind::DurationSummary;

    let invalid = || ParseAnomaly::InvalidNumber {
        kind: KIND,
        field: "duration",
        value: clock.to_string(),
    };

    let mut fields = clock.split(':');
    let (Some(hours), Some(minutes), Some(seconds)) = (fields.next(), fields.next(), fields.next())
    else {
        return Err(invalid());
    };

    let hours: i64 = hours.trim().parse().map_err(|_| invalid())?;
    let minutes: i64 = minutes.trim().parse().map_err(|_| invalid())?;
    let seconds = parse_number(seconds).ok_or_else(invalid)? as i64;

    let total = hours * HOUR_WEIGHT + minutes * MINUTE_WEIGHT + seconds;
    i32::try_from(total).map_err(|_| invalid())
}

/// Run a whole transcript through a fresh parser.
pub fn parse_lines<'a, I>(lines: I) -> ParsedProbe
where
    I: IntoIterator<Item = &'a str>,
{
    let mut parser = ProbeParser::new();
    for line in lines {
        parser.feed(line);
    }
    parser.finish()
}
