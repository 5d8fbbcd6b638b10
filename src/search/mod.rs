//! Two-tier search resolution into playable tracks.
//!
//! # Architecture
//!
//! - [`StructuredSearch`] - Keyed search API with a batched detail lookup (tier 1)
//! - [`HeuristicExtractor`] - Scraping extractor that tolerates missing fields (tier 2)
//! - [`SearchResolver`] - Runs tier 1, falls through to tier 2, filters, ranks and caches
//! - [`YouTubeDataApi`] / [`YtDlpExtractor`] - The concrete tiers
//!
//! Tier 1 is disabled for the rest of the process after its first failure.

mod error;
pub mod metadata;
mod ranking;
mod resolver;
mod youtube_api;
mod ytdlp;

pub use error::SearchError;
pub use ranking::{PlausibilityWindow, rank_tracks, relevance_score};
pub use resolver::{SearchResolver, TierState};
pub use youtube_api::YouTubeDataApi;
pub use ytdlp::{DEFAULT_YTDLP_BINARY, ExtractedEntry, ThumbnailEntry, YtDlpExtractor};

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cache::Cache;
use crate::config::Configuration;
use crate::parser::SongCandidate;

/// Watch-page prefix for media ids.
const WATCH_URL_PREFIX: &str = "https://www.youtube.com/watch?v=";

/// Which tier produced a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackSource {
    /// The structured search API.
    Structured,
    /// The heuristic extractor.
    Heuristic,
}

/// A playable item with normalized metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedTrack {
    /// Platform media id; the deduplication key.
    pub media_id: String,
    /// Track title.
    pub title: String,
    /// Performing artist.
    pub artist: String,
    /// Rendered duration (`M:SS`, `H:MM:SS`, or `--:--` when unknown).
    pub duration: String,
    /// Duration in seconds, when known.
    pub duration_secs: Option<u64>,
    /// Thumbnail image URL.
    pub thumbnail_url: Option<String>,
    /// Best audio stream description, e.g. `160k/48000Hz`.
    pub audio_quality: Option<String>,
    /// Best audio stream container.
    pub audio_format: Option<String>,
    /// Genre label, `None` when nothing matched.
    pub genre: Option<String>,
    /// Up to three tags.
    pub tags: Vec<String>,
    /// View count, when reported.
    pub view_count: Option<u64>,
    /// Uploading channel.
    pub channel: Option<String>,
    /// Approximate download size in bytes.
    pub estimated_size_bytes: Option<u64>,
    /// Tier that produced the track.
    pub source: TrackSource,
}

impl ResolvedTrack {
    /// Returns the watch URL handed to the transfer tool.
    #[must_use]
    pub fn url(&self) -> String {
        format!("{WATCH_URL_PREFIX}{}", self.media_id)
    }

    /// Returns the genre for display, `"no information"` when unknown.
    #[must_use]
    pub fn genre_label(&self) -> &str {
        self.genre.as_deref().unwrap_or("no information")
    }
}

impl fmt::Display for ResolvedTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {} [{}]", self.artist, self.title, self.duration)
    }
}

/// One item from a structured search call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    /// Platform media id.
    pub media_id: String,
    /// Title as listed.
    pub title: String,
    /// Channel name.
    pub channel: Option<String>,
    /// Snippet description.
    pub description: String,
    /// Thumbnail URL.
    pub thumbnail_url: Option<String>,
}

/// Per-item details from the batched lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VideoDetails {
    /// Duration in seconds.
    pub duration_secs: Option<u64>,
    /// Uploader tags.
    pub tags: Vec<String>,
    /// Full description.
    pub description: String,
    /// View count.
    pub view_count: Option<u64>,
}

/// Keyed search API (tier 1).
#[async_trait]
pub trait StructuredSearch: Send + Sync {
    /// Returns the source name used in logs and errors.
    fn name(&self) -> &str;

    /// Searches for up to `max_results` items.
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, SearchError>;

    /// Looks up durations and statistics for `ids` in as few calls as possible.
    async fn video_details(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, VideoDetails>, SearchError>;
}

/// Scraping extractor (tier 2).
#[async_trait]
pub trait HeuristicExtractor: Send + Sync {
    /// Returns the extractor name used in logs and errors.
    fn name(&self) -> &str;

    /// Extracts up to `max_results` entries for `query`.
    async fn extract(&self, query: &str, max_results: usize)
    -> Result<Vec<ExtractedEntry>, SearchError>;
}

/// What to resolve.
#[derive(Debug, Clone, Copy)]
pub enum SearchTarget<'a> {
    /// Free-text user query.
    Query {
        /// Query text.
        text: &'a str,
        /// Skip the `music audio` suffix.
        unfiltered: bool,
    },
    /// A parsed recommendation.
    Candidate(&'a SongCandidate),
}

impl SearchTarget<'_> {
    /// Returns the text sent to the search tiers.
    #[must_use]
    pub fn query_text(&self) -> String {
        match self {
            Self::Query { text, unfiltered: true } => text.trim().to_string(),
            Self::Query { text, unfiltered: false } => format!("{} music audio", text.trim()),
            Self::Candidate(candidate) => candidate.search_query(),
        }
    }

    /// Returns a short label for logs and cache keys.
    #[must_use]
    pub fn mode(&self) -> &'static str {
        match self {
            Self::Query { unfiltered: true, .. } => "raw",
            Self::Query { unfiltered: false, .. } => "music",
            Self::Candidate(_) => "candidate",
        }
    }
}

/// Builds the default resolver from configuration.
///
/// The API tier is only attached when a YouTube key is configured.
#[must_use]
pub fn build_default_resolver(config: &Configuration, cache: Option<Arc<Cache>>) -> SearchResolver {
    let extractor = YtDlpExtractor::new(&config.ytdlp_path);
    let mut resolver = SearchResolver::new(Box::new(extractor)).with_window(config.plausibility_window);

    if let Some(key) = config.credentials.youtube.as_deref() {
        match YouTubeDataApi::new(key, config.http_timeouts) {
            Ok(api) => resolver = resolver.with_structured(Box::new(api)),
            Err(error) => warn!(error = %error, "YouTube API tier unavailable; using yt-dlp only"),
        }
    }
    if let Some(cache) = cache {
        resolver = resolver.with_cache(cache);
    }
    resolver
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_text_appends_music_audio_unless_unfiltered() {
        let filtered = SearchTarget::Query {
            text: " nick drake ",
            unfiltered: false,
        };
        let raw = SearchTarget::Query {
            text: "nick drake",
            unfiltered: true,
        };
        assert_eq!(filtered.query_text(), "nick drake music audio");
        assert_eq!(raw.query_text(), "nick drake");
    }

    #[test]
    fn test_candidate_query_uses_official_suffix() {
        let candidate = SongCandidate::new("Pink Moon", "Nick Drake", "");
        assert_eq!(
            SearchTarget::Candidate(&candidate).query_text(),
            "Nick Drake Pink Moon official"
        );
    }

    #[test]
    fn test_default_resolver_without_key_has_no_api_tier() {
        let resolver = build_default_resolver(&Configuration::default(), None);
        assert_eq!(resolver.tier_state(), TierState::NotConfigured);
    }
}
