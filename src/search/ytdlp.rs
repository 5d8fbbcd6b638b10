//! Heuristic search tier backed by the `yt-dlp` command-line tool.

use std::io;
use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use tokio::process::Command;
use tracing::debug;

use super::metadata::FormatInfo;
use super::{HeuristicExtractor, SearchError};

const NAME: &str = "yt-dlp";

/// Default binary looked up on `PATH`.
pub const DEFAULT_YTDLP_BINARY: &str = "yt-dlp";

/// One search result as printed by `yt-dlp --dump-json`.
///
/// Every field is optional. Streams, tags and size are only present in
/// full extraction output, which is why searches do not use `--flat-playlist`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ExtractedEntry {
    /// Media id.
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    /// Upload title.
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    /// Artist from music metadata.
    #[serde(default)]
    pub artist: Option<String>,
    /// Uploader display name.
    #[serde(default)]
    pub uploader: Option<String>,
    /// Channel display name.
    #[serde(default)]
    pub channel: Option<String>,
    /// Duration in seconds.
    #[serde(default)]
    pub duration: Option<f64>,
    /// Primary thumbnail URL.
    #[serde(default)]
    pub thumbnail: Option<String>,
    /// Alternative thumbnails, smallest first.
    #[serde(default, deserialize_with = "null_as_default")]
    pub thumbnails: Vec<ThumbnailEntry>,
    /// Uploader tags.
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    /// Description text.
    #[serde(default)]
    pub description: Option<String>,
    /// View count.
    #[serde(default)]
    pub view_count: Option<u64>,
    /// Genre from music metadata.
    #[serde(default)]
    pub genre: Option<String>,
    /// Available streams.
    #[serde(default, deserialize_with = "null_as_default")]
    pub formats: Vec<FormatInfo>,
    /// Approximate file size in bytes.
    #[serde(default)]
    pub filesize_approx: Option<u64>,
}

/// A thumbnail listed by the extractor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ThumbnailEntry {
    /// Image URL.
    pub url: String,
}

impl ExtractedEntry {
    /// Returns the best thumbnail: the primary one, else the largest listed.
    #[must_use]
    pub fn best_thumbnail(&self) -> Option<String> {
        self.thumbnail
            .clone()
            .or_else(|| self.thumbnails.last().map(|thumb| thumb.url.clone()))
    }

    /// Returns the duration rounded to whole seconds.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn duration_secs(&self) -> Option<u64> {
        self.duration
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(|secs| secs.round() as u64)
    }
}

/// yt-dlp prints `null` for absent lists and strings.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Runs `yt-dlp` searches.
#[derive(Debug, Clone)]
pub struct YtDlpExtractor {
    binary: String,
}

impl YtDlpExtractor {
    /// Creates an extractor that runs `binary`.
    #[must_use]
    pub fn new(binary: &str) -> Self {
        Self {
            binary: binary.to_string(),
        }
    }
}

impl Default for YtDlpExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_YTDLP_BINARY)
    }
}

#[async_trait]
impl HeuristicExtractor for YtDlpExtractor {
    fn name(&self) -> &str {
        NAME
    }

    #[tracing::instrument(skip(self), fields(binary = %self.binary))]
    async fn extract(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<ExtractedEntry>, SearchError> {
        let output = Command::new(&self.binary)
            .args(search_args(query, max_results))
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| spawn_error(&self.binary, &e))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let entries = parse_dump_lines(&stdout);

        // --ignore-errors exits non-zero when some entries failed; keep what parsed.
        if !output.status.success() && entries.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SearchError::ToolFailed {
                tool: self.binary.clone(),
                status: output.status.to_string(),
                stderr: last_line(&stderr),
            });
        }
        debug!(count = entries.len(), "yt-dlp returned entries");
        Ok(entries)
    }
}

/// Arguments for a full-extraction search printing one JSON object per result.
fn search_args(query: &str, max_results: usize) -> Vec<String> {
    vec![
        "--dump-json".to_string(),
        "--skip-download".to_string(),
        "--no-playlist".to_string(),
        "--no-warnings".to_string(),
        "--ignore-errors".to_string(),
        format!("ytsearch{}:{query}", max_results.max(1)),
    ]
}

/// Maps a spawn failure to a search error.
fn spawn_error(binary: &str, error: &io::Error) -> SearchError {
    if error.kind() == io::ErrorKind::NotFound {
        SearchError::ToolMissing {
            tool: binary.to_string(),
        }
    } else {
        SearchError::ToolFailed {
            tool: binary.to_string(),
            status: "not started".to_string(),
            stderr: error.to_string(),
        }
    }
}

/// Parses one JSON object per line, skipping lines that are not entries.
fn parse_dump_lines(stdout: &str) -> Vec<ExtractedEntry> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with('{'))
        .filter_map(|line| match serde_json::from_str::<ExtractedEntry>(line) {
            Ok(entry) if !entry.id.is_empty() => Some(entry),
            Ok(_) => None,
            Err(error) => {
                debug!(error = %error, "Skipping unreadable yt-dlp line");
                None
            }
        })
        .collect()
}

/// Returns the last non-empty line of tool output.
fn last_line(text: &str) -> String {
    text.lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::retry::{Classify, ErrorKind};
    use crate::search::metadata::{best_audio_quality, derive_genre};

    /// Trimmed shape of one full-extraction `--dump-json` line.
    const FULL_ENTRY: &str = r#"{"id": "pm1", "title": "Pink Moon", "channel": "Nick Drake - Topic", "uploader": "Nick Drake - Topic", "duration": 124, "view_count": 2500000, "tags": ["Nick Drake", "Folk", "Pink Moon"], "description": "Provided to YouTube by Island Records", "filesize_approx": 2071234, "thumbnail": "https://i.ytimg.com/vi/pm1/maxresdefault.jpg", "formats": [{"format_id": "139", "ext": "m4a", "acodec": "mp4a.40.5", "vcodec": "none", "abr": 48.8, "asr": 22050}, {"format_id": "251", "ext": "webm", "acodec": "opus", "vcodec": "none", "abr": 134.2, "asr": 48000}, {"format_id": "18", "ext": "mp4", "acodec": "mp4a.40.2", "vcodec": "avc1.42001E", "abr": 96.0, "asr": 44100}]}"#;

    /// Trimmed shape of one `--flat-playlist` line: no streams, tags or size.
    const FLAT_ENTRY: &str = r#"{"_type": "url", "ie_key": "Youtube", "id": "pm1", "url": "https://www.youtube.com/watch?v=pm1", "title": "Pink Moon", "description": null, "duration": 124.0, "channel": "Nick Drake - Topic", "uploader": null, "view_count": 2500000, "thumbnails": [{"url": "https://i.ytimg.com/vi/pm1/hqdefault.jpg", "height": 360, "width": 480}]}"#;

    #[test]
    fn test_search_runs_full_extraction() {
        let args = search_args("nick drake", 5);
        assert!(!args.iter().any(|arg| arg == "--flat-playlist"));
        assert!(args.iter().any(|arg| arg == "--dump-json"));
        assert_eq!(args.last().map(String::as_str), Some("ytsearch5:nick drake"));
    }

    #[test]
    fn test_full_entry_carries_quality_genre_and_size() {
        let entries = parse_dump_lines(FULL_ENTRY);
        let entry = &entries[0];
        let (quality, format) = best_audio_quality(&entry.formats);
        assert_eq!(quality.as_deref(), Some("134k/48000Hz"));
        assert_eq!(format.as_deref(), Some("webm"));
        assert_eq!(entry.filesize_approx, Some(2_071_234));
        assert_eq!(
            derive_genre(None, &entry.tags, entry.description.as_deref().unwrap_or_default()),
            Some("folk".to_string())
        );
    }

    #[test]
    fn test_flat_entry_lacks_stream_metadata() {
        let entries = parse_dump_lines(FLAT_ENTRY);
        let entry = &entries[0];
        assert_eq!(best_audio_quality(&entry.formats), (None, None));
        assert!(entry.tags.is_empty());
        assert_eq!(entry.filesize_approx, None);
        assert_eq!(entry.duration_secs(), Some(124));
    }

    #[test]
    fn test_parse_dump_lines_tolerates_missing_fields_and_noise() {
        let stdout = concat!(
            r#"{"id": "a1", "title": "Nick Drake - Pink Moon", "duration": 124.6}"#,
            "\n",
            "WARNING: something unrelated\n",
            r#"{"id": "b2", "title": "Untitled", "uploader": null, "tags": ["folk"], "formats": null}"#,
            "\n",
            r#"{"title": "no id"}"#,
            "\n",
            "{not json\n",
        );
        let entries = parse_dump_lines(stdout);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].duration_secs(), Some(125));
        assert_eq!(entries[1].duration_secs(), None);
        assert_eq!(entries[1].tags, vec!["folk"]);
    }

    #[test]
    fn test_best_thumbnail_falls_back_to_largest() {
        let entry: ExtractedEntry = serde_json::from_str(
            r#"{"id": "x", "thumbnails": [{"url": "small.jpg"}, {"url": "large.jpg"}]}"#,
        )
        .unwrap();
        assert_eq!(entry.best_thumbnail().as_deref(), Some("large.jpg"));
    }

    #[test]
    fn test_negative_duration_is_unknown() {
        let entry = ExtractedEntry {
            duration: Some(-1.0),
            ..ExtractedEntry::default()
        };
        assert_eq!(entry.duration_secs(), None);
    }

    #[test]
    fn test_last_line_skips_trailing_blank_lines() {
        assert_eq!(last_line("first\nERROR: boom\n\n"), "ERROR: boom");
        assert_eq!(last_line(""), "");
    }

    #[tokio::test]
    async fn test_missing_binary_is_tool_missing() {
        let extractor = YtDlpExtractor::new("/nonexistent/mixhound-yt-dlp");
        let error = extractor.extract("anything", 3).await.unwrap_err();
        assert!(matches!(error, SearchError::ToolMissing { .. }));
        assert_eq!(error.kind(), ErrorKind::Permanent);
    }
}
