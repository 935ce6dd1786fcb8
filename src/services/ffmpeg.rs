//! FFmpeg-based probe service
//!
//! Runs ffmpeg against a file with a throwaway single-frame raw output so that
//! it prints its complete diagnostic description of the input. Output lines
//! are streamed to the caller while the process runs; nothing is buffered as a
//! whole and no output file is produced.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::ProbeError;

#[cfg(windows)]
const NULL_SINK: &str = "NUL";
#[cfg(not(windows))]
const NULL_SINK: &str = "/dev/null";

/// Lines in flight between the pipe readers and the consumer.
const LINE_BUFFER: usize = 64;

/// FFmpeg-based probe service
#[derive(Debug, Clone)]
pub struct FfmpegService {
    /// Path to ffmpeg executable
    ffmpeg_path: PathBuf,
    /// Wall-clock limit for a single probe
    timeout: Duration,
}

impl FfmpegService {
    /// Create a probe service for the given executable
    pub fn new(ffmpeg_path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            timeout,
        }
    }

    pub fn ffmpeg_path(&self) -> &Path {
        &self.ffmpeg_path
    }

    /// Check that the configured executable exists and is a readable file with
    /// an execute bit set (unix).
    pub async fn verify(&self) -> Result<(), ProbeError> {
        let metadata = tokio::fs::metadata(&self.ffmpeg_path)
            .await
            .map_err(|source| self.executable_error(source))?;

        if !metadata.is_file() {
            return Err(self.executable_error(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "not a regular file",
            )));
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if metadata.permissions().mode() & 0o111 == 0 {
                return Err(self.executable_error(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "no execute permission",
                )));
            }
        }

        // Readability is checked by actually opening the file.
        tokio::fs::File::open(&self.ffmpeg_path)
            .await
            .map_err(|source| self.executable_error(source))?;

        Ok(())
    }

    /// Probe `file`, handing every output line (stdout and stderr) to `on_line`
    /// as it arrives.
    ///
    /// A non-zero exit or an expired timeout is a per-file failure. A missing or
    /// unusable executable comes back as [`ProbeError::Executable`].
    pub async fn probe<F>(&self, file: &Path, mut on_line: F) -> Result<(), ProbeError>
    where
        F: FnMut(&str),
    {
        debug!(path = %file.display(), ffmpeg = %self.ffmpeg_path.display(), "Probing media file");

        let mut child = Command::new(&self.ffmpeg_path)
            .arg("-i")
            .arg(file)
            // Fake output: without one ffmpeg exits with an error before describing the input.
            .args(["-y", "-f", "rawvideo", "-vframes", "1", NULL_SINK])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| match source.kind() {
                std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                    self.executable_error(source)
                }
                _ => ProbeError::Io {
                    path: file.to_path_buf(),
                    source,
                },
            })?;

        let (tx, mut rx) = mpsc::channel::<String>(LINE_BUFFER);
        let mut readers: Vec<JoinHandle<()>> = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(forward_lines(stdout, tx.clone())));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(forward_lines(stderr, tx.clone())));
        }
        // Only the readers hold senders now, so the channel closes when both pipes hit EOF.
        drop(tx);

        let run = async {
            while let Some(line) = rx.recv().await {
                on_line(&line);
            }
            child.wait().await
        };
        let outcome = tokio::time::timeout(self.timeout, run).await;

        let status = match outcome {
            Ok(status) => status.map_err(|source| ProbeError::Io {
                path: file.to_path_buf(),
                source,
            })?,
            Err(_) => {
                warn!(
                    path = %file.display(),
                    timeout = ?self.timeout,
                    "Probe timed out, killing ffmpeg"
                );
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "Failed to kill timed out ffmpeg");
                }
                for reader in &readers {
                    reader.abort();
                }
                return Err(ProbeError::TimedOut {
                    path: file.to_path_buf(),
                    timeout: self.timeout,
                });
            }
        };

        for reader in readers {
            let _ = reader.await;
        }

        check_status(file, status)
    }

    fn executable_error(&self, source: std::io::Error) -> ProbeError {
        ProbeError::Executable {
            path: self.ffmpeg_path.clone(),
            source,
        }
    }
}

fn check_status(file: &Path, status: ExitStatus) -> Result<(), ProbeError> {
    if status.success() {
        Ok(())
    } else {
        Err(ProbeError::ExitStatus {
            path: file.to_path_buf(),
            code: status.code(),
        })
    }
}

/// Read `reader` line by line and forward each line, decoded lossily as UTF-8.
async fn forward_lines<R>(reader: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf).into_owned();
                if tx.send(line).await.is_err() {
                    // Consumer is gone (timeout); stop reading.
                    break;
                }
            }
            Err(e) => {
                debug!(error = %e, "Probe output stream closed with error");
                break;
            }
        }
    }
}
