//! Bulk transfer collaborator: moves a resolved track onto local storage.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::retry::ErrorKind;
use crate::search::ResolvedTrack;

use super::DownloadError;
use super::filename::track_file_stem;

/// Default audio container produced by the transfer.
pub const DEFAULT_AUDIO_FORMAT: &str = "mp3";

/// Default target bitrate.
pub const DEFAULT_AUDIO_QUALITY: &str = "192K";

/// Fragments of yt-dlp errors that will not go away on retry.
const PERMANENT_MARKERS: &[&str] = &[
    "video unavailable",
    "private video",
    "sign in to confirm your age",
    "copyright",
    "not available in your country",
    "ffprobe and ffmpeg not found",
    "ffmpeg not found",
];

/// Something that can write a track's audio into a directory.
#[async_trait]
pub trait TrackTransfer: Send + Sync {
    /// Downloads `track` into `destination` and returns the written file.
    async fn transfer(&self, track: &ResolvedTrack, destination: &Path)
    -> Result<PathBuf, DownloadError>;
}

/// Extracts audio with `yt-dlp -x`.
#[derive(Debug, Clone)]
pub struct YtDlpTransfer {
    binary: String,
    audio_format: String,
    audio_quality: String,
}

impl YtDlpTransfer {
    /// Creates a transfer using `binary` with the default mp3/192K output.
    #[must_use]
    pub fn new(binary: &str) -> Self {
        Self {
            binary: binary.to_string(),
            audio_format: DEFAULT_AUDIO_FORMAT.to_string(),
            audio_quality: DEFAULT_AUDIO_QUALITY.to_string(),
        }
    }

    /// Overrides the output format and quality.
    #[must_use]
    pub fn with_audio(mut self, format: &str, quality: &str) -> Self {
        self.audio_format = format.to_string();
        self.audio_quality = quality.to_string();
        self
    }

    fn output_template(&self, track: &ResolvedTrack, destination: &Path) -> String {
        // yt-dlp expands `%` sequences; a literal percent must be doubled.
        let stem = track_file_stem(track).replace('%', "%%");
        destination
            .join(format!("{stem}.%(ext)s"))
            .to_string_lossy()
            .into_owned()
    }
}

#[async_trait]
impl TrackTransfer for YtDlpTransfer {
    #[tracing::instrument(skip(self, track, destination), fields(media_id = %track.media_id))]
    async fn transfer(
        &self,
        track: &ResolvedTrack,
        destination: &Path,
    ) -> Result<PathBuf, DownloadError> {
        let template = self.output_template(track, destination);
        let url = track.url();
        let output = Command::new(&self.binary)
            .args([
                "-x",
                "--audio-format",
                self.audio_format.as_str(),
                "--audio-quality",
                self.audio_quality.as_str(),
                "--no-playlist",
                "--no-progress",
                "--no-warnings",
                "-o",
                template.as_str(),
                "--print",
                "after_move:filepath",
                url.as_str(),
            ])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    DownloadError::ToolMissing {
                        tool: self.binary.clone(),
                    }
                } else {
                    DownloadError::Io {
                        path: PathBuf::from(&self.binary),
                        source: e,
                    }
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let cause = last_error_line(&stderr)
                .unwrap_or_else(|| format!("yt-dlp exited with {}", output.status));
            return Err(DownloadError::Transfer {
                title: track.title.clone(),
                kind: classify_tool_failure(&cause),
                cause,
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let path = stdout
            .lines()
            .map(str::trim)
            .rfind(|line| !line.is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| DownloadError::EmptyOutput {
                title: track.title.clone(),
                path: destination.to_path_buf(),
            })?;
        debug!(path = %path.display(), "yt-dlp finished");
        Ok(path)
    }
}

/// Confirms that `path` is an existing, non-empty file.
///
/// # Errors
///
/// Returns [`DownloadError::EmptyOutput`] when the file is missing or empty.
pub async fn verify_output(path: &Path, title: &str) -> Result<(), DownloadError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(()),
        _ => Err(DownloadError::EmptyOutput {
            title: title.to_string(),
            path: path.to_path_buf(),
        }),
    }
}

fn last_error_line(stderr: &str) -> Option<String> {
    let lines: Vec<&str> = stderr.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    lines
        .iter()
        .rev()
        .find(|line| line.starts_with("ERROR"))
        .or_else(|| lines.last())
        .map(|line| (*line).to_string())
}

fn classify_tool_failure(cause: &str) -> ErrorKind {
    let lowered = cause.to_lowercase();
    if lowered.contains("http error 429") {
        ErrorKind::RateLimited
    } else if PERMANENT_MARKERS.iter().any(|marker| lowered.contains(marker)) {
        ErrorKind::Permanent
    } else {
        ErrorKind::TransientNetwork
    }
}
