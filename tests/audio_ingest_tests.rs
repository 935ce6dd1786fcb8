//! Integration tests for audio ingestion
//!
//! ffmpeg is replaced by small shell scripts that print canned diagnostic
//! output, so these tests only run on unix.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use tokio::sync::Mutex;

use media_archive::config::AudioHandlerConfig;
use media_archive::db::{AssetRecord, CreateAsset, Database, audio_data};
use media_archive::error::{HandlerError, ProbeError};
use media_archive::ingest::ingest_file;
use media_archive::media::{AudioDataHandler, HandlerChain, HandlerOutcome, MetaDataHandler};
use media_archive::media::ProbeParser;
use media_archive::services::{FfmpegService, LocalThumbnailManager};

/// Writing and executing scripts from parallel tests can hit ETXTBSY.
static SCRIPT_LOCK: Mutex<()> = Mutex::const_new(());

const MP3_TRANSCRIPT: &str = r#"ffmpeg version 6.0 Copyright (c) 2000-2023 the FFmpeg developers
Input #0, mp3, from 'song.mp3':
  Metadata:
    title           : Song
    artist          : Band
    track           : 3
    album           : Record
    date            : 2011
  Duration: 00:03:30.06, start: 0.025057, bitrate: 128 kb/s
    Stream #0:0: Audio: mp3, 44100 Hz, stereo, fltp, 128 kb/s
Output #0, rawvideo, to '/dev/null':"#;

struct Fixture {
    dir: TempDir,
    db: Database,
    ffmpeg: PathBuf,
    thumbnails: LocalThumbnailManager,
}

impl Fixture {
    /// Fake ffmpeg printing `stderr` and exiting with `code`
    async fn with_output(stderr: &str, code: i32) -> Self {
        Self::with_script(&format!("cat >&2 <<'EOF'\n{}\nEOF\nexit {}\n", stderr, code)).await
    }

    async fn with_script(body: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let ffmpeg = dir.path().join("ffmpeg");
        std::fs::write(&ffmpeg, format!("#!/bin/sh\n{}", body)).unwrap();
        std::fs::set_permissions(&ffmpeg, std::fs::Permissions::from_mode(0o755)).unwrap();

        std::fs::write(dir.path().join("audio.jpg"), b"placeholder").unwrap();
        let thumbnails = LocalThumbnailManager::new(dir.path().join("thumbs"));
        let db = Database::connect_in_memory().await.unwrap();

        Self {
            dir,
            db,
            ffmpeg,
            thumbnails,
        }
    }

    fn config(&self, timeout: Duration) -> AudioHandlerConfig {
        self.config_with("mp3, ogg, flac", timeout)
    }

    fn config_with(&self, extensions: &str, timeout: Duration) -> AudioHandlerConfig {
        AudioHandlerConfig::new(
            &self.ffmpeg,
            "{id}.{ext}",
            "{size}/audio.jpg",
            "{size}/{id}.{name}.jpg",
            extensions,
            self.dir.path().join("audio.jpg"),
            timeout,
        )
        .unwrap()
    }

    async fn deployed_handler(&self) -> AudioDataHandler {
        let handler = AudioDataHandler::new(self.config(Duration::from_secs(10)));
        handler.deploy(&self.db, &self.thumbnails).await.unwrap();
        handler
    }

    /// An uploaded file plus its freshly registered asset
    async fn upload(&self, name: &str) -> (PathBuf, AssetRecord) {
        let path = self.dir.path().join(name);
        std::fs::write(&path, b"not really audio").unwrap();
        let asset = self
            .db
            .assets()
            .create(CreateAsset {
                name: name.to_string(),
            })
            .await
            .unwrap();
        (path, asset)
    }

    /// Run the handler inside a committed transaction
    async fn process(
        &self,
        handler: &AudioDataHandler,
        asset: &mut AssetRecord,
        path: &Path,
    ) -> Result<HandlerOutcome, HandlerError> {
        let mut tx = self.db.pool().begin().await.unwrap();
        let outcome = handler.process(&mut tx, asset, path).await;
        tx.commit().await.unwrap();
        outcome
    }

    async fn stored_asset(&self, id: i64) -> AssetRecord {
        self.db.assets().get(id).await.unwrap().unwrap()
    }
}

#[tokio::test]
async fn test_ingest_stores_audio_metadata() {
    let _guard = SCRIPT_LOCK.lock().await;
    let fx = Fixture::with_output(MP3_TRANSCRIPT, 0).await;
    let chain = HandlerChain::from_config(fx.config(Duration::from_secs(10)));
    chain.deploy_all(&fx.db, &fx.thumbnails).await.unwrap();

    let upload = fx.dir.path().join("song.mp3");
    std::fs::write(&upload, b"not really audio").unwrap();

    let report = ingest_file(&fx.db, &chain, &upload, None).await.unwrap();
    assert!(report.handled);
    assert_eq!(report.error, None);

    let audio = report.audio.unwrap();
    assert_eq!(audio.id, report.asset.id);
    assert_eq!(audio.title.as_deref(), Some("Song"));
    assert_eq!(audio.artist.as_deref(), Some("Band"));
    assert_eq!(audio.track, Some(3));
    assert_eq!(audio.album.as_deref(), Some("Record"));
    assert_eq!(audio.year, Some(2011));
    assert_eq!(audio.audio_encoding.as_deref(), Some("mp3"));
    assert_eq!(audio.sample_rate, Some(44100));
    assert_eq!(audio.channels.as_deref(), Some("stereo"));
    assert_eq!(audio.audio_bitrate, Some(128));
    assert_eq!(audio.length, Some(210));

    let stored = fx.stored_asset(report.asset.id).await;
    assert_eq!(stored, report.asset);
    assert!(stored.is_available);
    assert_eq!(
        stored.content,
        Some(format!("audio/000/{}.mp3", stored.id))
    );
    assert!(stored.type_id.is_some());
    assert!(stored.thumbnail_format_id.is_some());

    let persisted = fx.db.audio_data().get(stored.id).await.unwrap().unwrap();
    assert_eq!(persisted, audio);

    // Deploy installed the shared thumbnail.
    assert!(fx.dir.path().join("thumbs/original/audio.jpg").is_file());
}

#[tokio::test]
async fn test_deploy_resolves_registry_once() {
    let _guard = SCRIPT_LOCK.lock().await;
    let fx = Fixture::with_output(MP3_TRANSCRIPT, 0).await;
    let handler = fx.deployed_handler().await;
    let first = handler.deployment().unwrap();

    handler.deploy(&fx.db, &fx.thumbnails).await.unwrap();
    assert_eq!(handler.deployment(), Some(first));
    assert_ne!(first.default_thumbnail_format_id, first.thumbnail_format_id);

    let other = AudioDataHandler::new(fx.config(Duration::from_secs(10)));
    other.deploy(&fx.db, &fx.thumbnails).await.unwrap();
    assert_eq!(other.deployment(), Some(first));
}

#[tokio::test]
async fn test_nonzero_exit_leaves_asset_untouched() {
    let _guard = SCRIPT_LOCK.lock().await;
    let fx = Fixture::with_output("song.mp3: Invalid data found when processing input", 1).await;
    let handler = fx.deployed_handler().await;
    let (path, mut asset) = fx.upload("song.mp3").await;
    let before = asset.clone();

    let outcome = fx.process(&handler, &mut asset, &path).await.unwrap();

    assert_matches!(outcome, HandlerOutcome::NotHandled);
    assert_eq!(asset, before);
    assert_eq!(fx.stored_asset(asset.id).await, before);
    assert_eq!(fx.db.audio_data().count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_missing_technical_fields_marks_unavailable() {
    let _guard = SCRIPT_LOCK.lock().await;
    let transcript = "  Metadata:\n    title           : Only Tags\n";
    let fx = Fixture::with_output(transcript, 0).await;
    let handler = fx.deployed_handler().await;
    let (path, mut asset) = fx.upload("song.mp3").await;

    let outcome = fx.process(&handler, &mut asset, &path).await.unwrap();

    assert!(outcome.is_handled());
    assert_matches!(outcome, HandlerOutcome::Unavailable(err) if err.asset_id == asset.id);
    assert!(!asset.is_available);
    assert_eq!(asset.content, None);

    let stored = fx.stored_asset(asset.id).await;
    assert!(!stored.is_available);
    assert_eq!(stored.content, None);
    assert_eq!(fx.db.audio_data().count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_duplicate_record_marks_unavailable() {
    let _guard = SCRIPT_LOCK.lock().await;
    let fx = Fixture::with_output(MP3_TRANSCRIPT, 0).await;
    let handler = fx.deployed_handler().await;
    let (path, mut asset) = fx.upload("song.ogg").await;

    let first = fx.process(&handler, &mut asset, &path).await.unwrap();
    assert_matches!(first, HandlerOutcome::Processed(_));
    let after_first = fx.stored_asset(asset.id).await;
    assert!(after_first.is_available);

    // A second run collides with the stored row.
    let second = fx.process(&handler, &mut asset, &path).await.unwrap();
    assert_matches!(second, HandlerOutcome::Unavailable(_));
    assert!(!asset.is_available);
    assert_eq!(asset.content, after_first.content);

    let stored = fx.stored_asset(asset.id).await;
    assert!(!stored.is_available);
    assert_eq!(stored.content, after_first.content);
    assert_eq!(fx.db.audio_data().count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_persist_failure_keeps_outer_transaction_usable() {
    let _guard = SCRIPT_LOCK.lock().await;
    let fx = Fixture::with_output(MP3_TRANSCRIPT, 0).await;
    let handler = fx.deployed_handler().await;
    let (path, mut asset) = fx.upload("song.mp3").await;

    let mut tx = fx.db.pool().begin().await.unwrap();
    audio_data::insert(
        &mut tx,
        &media_archive::db::AudioDataRecord {
            id: asset.id,
            audio_encoding: Some("flac".into()),
            sample_rate: Some(48000),
            channels: Some("mono".into()),
            length: Some(1),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let outcome = handler.process(&mut tx, &mut asset, &path).await.unwrap();
    assert_matches!(outcome, HandlerOutcome::Unavailable(_));
    tx.commit().await.unwrap();

    // The caller's own write survived the rolled back savepoint.
    let kept = fx.db.audio_data().get(asset.id).await.unwrap().unwrap();
    assert_eq!(kept.audio_encoding.as_deref(), Some("flac"));
    assert!(!fx.stored_asset(asset.id).await.is_available);
}

#[tokio::test]
async fn test_missing_executable_is_fatal_at_deploy() {
    let _guard = SCRIPT_LOCK.lock().await;
    let fx = Fixture::with_output(MP3_TRANSCRIPT, 0).await;
    std::fs::remove_file(&fx.ffmpeg).unwrap();

    let handler = AudioDataHandler::new(fx.config(Duration::from_secs(10)));
    let err = handler.deploy(&fx.db, &fx.thumbnails).await.unwrap_err();

    assert_matches!(err, HandlerError::Probe(ref e) if e.is_fatal());
    assert_eq!(handler.deployment(), None);
}

#[tokio::test]
async fn test_missing_executable_is_fatal_at_process() {
    let _guard = SCRIPT_LOCK.lock().await;
    let fx = Fixture::with_output(MP3_TRANSCRIPT, 0).await;
    let handler = fx.deployed_handler().await;
    let (path, mut asset) = fx.upload("song.mp3").await;
    let before = asset.clone();
    std::fs::remove_file(&fx.ffmpeg).unwrap();

    let err = fx.process(&handler, &mut asset, &path).await.unwrap_err();

    assert_matches!(err, HandlerError::Probe(ProbeError::Executable { .. }));
    assert_eq!(asset, before);
}

#[tokio::test]
async fn test_timeout_is_not_processed() {
    let _guard = SCRIPT_LOCK.lock().await;
    let fx = Fixture::with_script("echo '  Metadata:' >&2\nexec sleep 5\n").await;
    let handler = AudioDataHandler::new(fx.config(Duration::from_millis(500)));
    handler.deploy(&fx.db, &fx.thumbnails).await.unwrap();
    let (path, mut asset) = fx.upload("song.mp3").await;

    let started = Instant::now();
    let outcome = fx.process(&handler, &mut asset, &path).await.unwrap();

    assert_matches!(outcome, HandlerOutcome::NotHandled);
    assert!(started.elapsed() < Duration::from_secs(4));
    assert!(!fx.stored_asset(asset.id).await.is_available);
}

#[tokio::test]
async fn test_probe_error_classification() {
    let _guard = SCRIPT_LOCK.lock().await;
    let fx = Fixture::with_output("garbage", 3).await;
    let handler = fx.deployed_handler().await;

    let err = handler.probe(&fx.dir.path().join("x.mp3")).await.unwrap_err();
    assert_matches!(err, ProbeError::ExitStatus { code: Some(3), .. });
    assert!(!err.is_fatal());
}

#[tokio::test]
async fn test_probe_streams_invalid_utf8() {
    let _guard = SCRIPT_LOCK.lock().await;
    let fx = Fixture::with_script(
        "printf '  Metadata:\\n    title           : Caf\\351\\n' >&2\n\
         printf '    Stream #0:0: Audio: vorbis, 44100 Hz, stereo, fltp, 112 kb/s\\n'\n",
    )
    .await;
    let handler = fx.deployed_handler().await;

    let parsed = handler.probe(&fx.dir.path().join("x.ogg")).await.unwrap();
    assert_eq!(parsed.audio.title.as_deref(), Some("Caf\u{FFFD}"));
    assert_eq!(parsed.audio.audio_encoding.as_deref(), Some("vorbis"));
    assert_eq!(parsed.audio.audio_bitrate, Some(112));
}

#[tokio::test]
async fn test_non_audio_upload_skips_probe() {
    let _guard = SCRIPT_LOCK.lock().await;
    let fx = Fixture::with_script("touch \"$(dirname \"$0\")/invoked\"\nexit 0\n").await;
    let chain = HandlerChain::from_config(fx.config(Duration::from_secs(10)));
    chain.deploy_all(&fx.db, &fx.thumbnails).await.unwrap();

    let upload = fx.dir.path().join("notes.txt");
    std::fs::write(&upload, b"plain text").unwrap();

    let report = ingest_file(&fx.db, &chain, &upload, None).await.unwrap();
    assert!(!report.handled);
    assert!(!report.asset.is_available);
    assert!(!fx.dir.path().join("invoked").exists());
}

#[tokio::test]
async fn test_declared_audio_type_overrides_extension() {
    let _guard = SCRIPT_LOCK.lock().await;
    let fx = Fixture::with_output(MP3_TRANSCRIPT, 0).await;
    let chain = HandlerChain::from_config(fx.config(Duration::from_secs(10)));
    chain.deploy_all(&fx.db, &fx.thumbnails).await.unwrap();

    let upload = fx.dir.path().join("recording.bin");
    std::fs::write(&upload, b"not really audio").unwrap();

    let report = ingest_file(&fx.db, &chain, &upload, Some("audio/mpeg")).await.unwrap();
    assert!(report.handled);
    assert_eq!(
        report.asset.content,
        Some(format!("audio/000/{}.bin", report.asset.id))
    );
}

#[tokio::test]
async fn test_guessed_type_does_not_bypass_extension_list() {
    let _guard = SCRIPT_LOCK.lock().await;
    let fx = Fixture::with_script("touch \"$(dirname \"$0\")/invoked\"\nexit 0\n").await;
    let chain = HandlerChain::from_config(fx.config_with("mp3", Duration::from_secs(10)));
    chain.deploy_all(&fx.db, &fx.thumbnails).await.unwrap();

    let upload = fx.dir.path().join("take.wav");
    std::fs::write(&upload, b"not really audio").unwrap();

    let report = ingest_file(&fx.db, &chain, &upload, None).await.unwrap();

    // The extension maps to an audio type, but only a declared type may widen the list.
    assert!(report.content_type.as_deref().unwrap().starts_with("audio/"));
    assert!(!report.handled);
    assert_eq!(report.asset.content, None);
    assert!(!fx.dir.path().join("invoked").exists());

    let upload = fx.dir.path().join("take.MP3");
    std::fs::write(&upload, b"not really audio").unwrap();
    let report = ingest_file(&fx.db, &chain, &upload, None).await.unwrap();
    assert!(!report.handled);
    assert!(!fx.dir.path().join("invoked").exists());
}

#[tokio::test]
async fn test_verbose_output_on_both_pipes_is_drained() {
    let _guard = SCRIPT_LOCK.lock().await;
    // Roughly 128 KiB per pipe, well past the default pipe buffer.
    let fx = Fixture::with_script(
        "yes 'frame=    0 fps=0.0 q=0.0 size=       0kB time=00:00:00.00 bitrate=N/A' | head -n 2000\n\
         yes '  Side data: replaygain track gain - -7.400000, track peak - unknown' | head -n 2000 >&2\n\
         echo '    Stream #0:0: Audio: flac, 48000 Hz, stereo, s16' >&2\n\
         exit 0\n",
    )
    .await;
    let timeout = Duration::from_secs(10);

    let mut lines = 0usize;
    let mut parser = ProbeParser::new();
    let started = Instant::now();
    FfmpegService::new(&fx.ffmpeg, timeout)
        .probe(&fx.dir.path().join("x.flac"), |line| {
            lines += 1;
            parser.feed(line);
        })
        .await
        .unwrap();

    assert!(started.elapsed() < timeout);
    assert_eq!(lines, 4001);

    let parsed = parser.finish();
    assert_eq!(parsed.audio.audio_encoding.as_deref(), Some("flac"));
    assert_eq!(parsed.audio.sample_rate, Some(48000));
    assert_eq!(parsed.audio.channels.as_deref(), Some("stereo"));
    assert_eq!(parsed.audio.audio_bitrate, None);
}

#[tokio::test]
async fn test_non_executable_ffmpeg_fails_deploy() {
    let _guard = SCRIPT_LOCK.lock().await;
    let fx = Fixture::with_output(MP3_TRANSCRIPT, 0).await;
    std::fs::set_permissions(&fx.ffmpeg, std::fs::Permissions::from_mode(0o644)).unwrap();

    let chain = HandlerChain::from_config(fx.config(Duration::from_secs(10)));
    let err = chain.deploy_all(&fx.db, &fx.thumbnails).await.unwrap_err();

    assert_matches!(err, HandlerError::Probe(ProbeError::Executable { .. }));
}
