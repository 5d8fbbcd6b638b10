//! Two-tier search with a process-wide fallback switch.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use crate::cache::Cache;
use crate::parser::SongCandidate;
use crate::retry::{RetryError, RetryExecutor, RetryPolicy};

use super::metadata::{
    MAX_TAGS, best_audio_quality, derive_artist_and_title, derive_genre, format_duration,
};
use super::{
    ExtractedEntry, HeuristicExtractor, PlausibilityWindow, ResolvedTrack, SearchError, SearchHit,
    SearchTarget, StructuredSearch, TrackSource, VideoDetails, rank_tracks,
};

/// Results requested from the tiers when resolving a single candidate.
const CANDIDATE_SEARCH_WIDTH: usize = 5;

/// Whether the structured tier is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierState {
    /// No structured tier was configured.
    NotConfigured,
    /// The structured tier is tried first.
    Available,
    /// The structured tier failed once and is skipped for the rest of the process.
    DisabledForProcess,
}

/// Resolves queries and song candidates into ranked, deduplicated tracks.
pub struct SearchResolver {
    structured: Option<Box<dyn StructuredSearch>>,
    extractor: Box<dyn HeuristicExtractor>,
    structured_disabled: AtomicBool,
    executor: RetryExecutor,
    api_policy: RetryPolicy,
    extract_policy: RetryPolicy,
    window: PlausibilityWindow,
    cache: Option<Arc<Cache>>,
}

impl SearchResolver {
    /// Creates a resolver that only uses the heuristic tier.
    #[must_use]
    pub fn new(extractor: Box<dyn HeuristicExtractor>) -> Self {
        Self {
            structured: None,
            extractor,
            structured_disabled: AtomicBool::new(false),
            executor: RetryExecutor::new(),
            api_policy: RetryPolicy::api(),
            extract_policy: RetryPolicy::network(),
            window: PlausibilityWindow::default(),
            cache: None,
        }
    }

    /// Adds a structured tier tried before the extractor.
    #[must_use]
    pub fn with_structured(mut self, structured: Box<dyn StructuredSearch>) -> Self {
        self.structured = Some(structured);
        self
    }

    /// Caches resolved results in `cache`.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Sets the duration window applied to recommended songs.
    #[must_use]
    pub fn with_window(mut self, window: PlausibilityWindow) -> Self {
        self.window = window;
        self
    }

    /// Overrides the retry policies for the structured and heuristic tiers.
    #[must_use]
    pub fn with_retry_policies(mut self, api: RetryPolicy, extract: RetryPolicy) -> Self {
        self.api_policy = api;
        self.extract_policy = extract;
        self
    }

    /// Returns the structured tier state.
    #[must_use]
    pub fn tier_state(&self) -> TierState {
        match (&self.structured, self.structured_disabled.load(Ordering::Relaxed)) {
            (None, _) => TierState::NotConfigured,
            (Some(_), false) => TierState::Available,
            (Some(_), true) => TierState::DisabledForProcess,
        }
    }

    /// Searches free text, appending `music audio` unless `unfiltered`.
    ///
    /// # Errors
    ///
    /// See [`SearchResolver::resolve`].
    pub async fn search(
        &self,
        query: &str,
        max_results: usize,
        unfiltered: bool,
    ) -> Result<Vec<ResolvedTrack>, SearchError> {
        self.resolve(
            SearchTarget::Query {
                text: query,
                unfiltered,
            },
            max_results,
        )
        .await
    }

    /// Finds the best plausible track for a recommended song.
    ///
    /// # Errors
    ///
    /// See [`SearchResolver::resolve`].
    pub async fn resolve_candidate(
        &self,
        candidate: &SongCandidate,
    ) -> Result<Option<ResolvedTrack>, SearchError> {
        let mut tracks = self.resolve(SearchTarget::Candidate(candidate), 1).await?;
        Ok(tracks.pop())
    }

    /// Resolves `target` into at most `max_results` tracks, best first.
    ///
    /// Candidates are resolved against a wider result set, filtered to the
    /// plausibility window, and keep the recommended title, artist and genre.
    ///
    /// # Errors
    ///
    /// Returns the heuristic tier's error when it fails and the structured
    /// tier produced nothing.
    #[tracing::instrument(skip(self, target), fields(mode = target.mode(), query = tracing::field::Empty))]
    pub async fn resolve(
        &self,
        target: SearchTarget<'_>,
        max_results: usize,
    ) -> Result<Vec<ResolvedTrack>, SearchError> {
        let max_results = max_results.max(1);
        let query = target.query_text();
        tracing::Span::current().record("query", query.as_str());

        let cache_key = format!(
            "search:{}:{max_results}:{}",
            target.mode(),
            normalize_query(&query)
        );
        if let Some(cache) = &self.cache
            && let Some(cached) = cache.get::<Vec<ResolvedTrack>>(&cache_key)
            && !cached.is_empty()
        {
            info!(count = cached.len(), "Using cached search results");
            return Ok(cached);
        }

        let width = match target {
            SearchTarget::Candidate(_) => max_results.max(CANDIDATE_SEARCH_WIDTH),
            SearchTarget::Query { .. } => max_results,
        };
        let mut tracks = self.gather(&query, width).await?;

        let ranking_query = match target {
            SearchTarget::Query { text, .. } => text.trim().to_string(),
            SearchTarget::Candidate(candidate) => candidate.title.clone(),
        };
        if let SearchTarget::Candidate(_) = target {
            let before = tracks.len();
            tracks.retain(|track| self.window.contains(track.duration_secs));
            debug!(
                dropped = before - tracks.len(),
                "Filtered implausible durations"
            );
        }
        rank_tracks(&ranking_query, &mut tracks);
        tracks.truncate(max_results);
        if let SearchTarget::Candidate(candidate) = target {
            for track in &mut tracks {
                adopt_candidate(track, candidate);
            }
        }

        if let Some(cache) = &self.cache
            && !tracks.is_empty()
        {
            cache.set(&cache_key, &tracks);
        }
        Ok(tracks)
    }

    /// Collects up to `width` unique tracks from tier 1 then tier 2.
    async fn gather(&self, query: &str, width: usize) -> Result<Vec<ResolvedTrack>, SearchError> {
        let mut tracks = Vec::new();

        if let Some(structured) = &self.structured
            && !self.structured_disabled.load(Ordering::Relaxed)
        {
            match self.structured_tier(structured.as_ref(), query, width).await {
                Ok(found) => tracks = found,
                Err(error) => {
                    self.structured_disabled.store(true, Ordering::Relaxed);
                    warn!(
                        source = structured.name(),
                        attempts = error.attempts(),
                        error = %error.inner(),
                        "Structured search failed; disabled for this session, using {}",
                        self.extractor.name()
                    );
                }
            }
        }

        if tracks.len() < width {
            match self.heuristic_tier(query, width).await {
                Ok(found) => merge_unique(&mut tracks, found),
                Err(error) if !tracks.is_empty() => {
                    warn!(error = %error.inner(), "Heuristic search failed; keeping structured results");
                }
                Err(error) => {
                    warn!(
                        attempts = error.attempts(),
                        error = %error.inner(),
                        "Heuristic search failed"
                    );
                    return Err(error.into_inner());
                }
            }
        } else {
            dedup_in_place(&mut tracks);
        }
        Ok(tracks)
    }

    async fn structured_tier(
        &self,
        structured: &dyn StructuredSearch,
        query: &str,
        width: usize,
    ) -> Result<Vec<ResolvedTrack>, RetryError<SearchError>> {
        let hits = self
            .executor
            .execute("structured search", &self.api_policy, || {
                structured.search(query, width)
            })
            .await?;
        if hits.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = hits.iter().map(|hit| hit.media_id.clone()).collect();
        let details = self
            .executor
            .execute("structured details", &self.api_policy, || {
                structured.video_details(&ids)
            })
            .await?;

        Ok(hits
            .into_iter()
            .map(|hit| {
                let detail = details.get(&hit.media_id).cloned().unwrap_or_default();
                track_from_hit(hit, detail)
            })
            .collect())
    }

    async fn heuristic_tier(
        &self,
        query: &str,
        width: usize,
    ) -> Result<Vec<ResolvedTrack>, RetryError<SearchError>> {
        let entries = self
            .executor
            .execute("heuristic search", &self.extract_policy, || {
                self.extractor.extract(query, width)
            })
            .await?;
        Ok(entries.into_iter().map(track_from_entry).collect())
    }
}

impl std::fmt::Debug for SearchResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchResolver")
            .field("structured", &self.structured.as_ref().map(|s| s.name().to_string()))
            .field("extractor", &self.extractor.name())
            .field("tier_state", &self.tier_state())
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}

fn track_from_hit(hit: SearchHit, detail: VideoDetails) -> ResolvedTrack {
    let (artist, title) = derive_artist_and_title(None, hit.channel.as_deref(), &hit.title);
    let description = if detail.description.is_empty() {
        hit.description
    } else {
        detail.description
    };
    let genre = derive_genre(None, &detail.tags, &description);
    ResolvedTrack {
        media_id: hit.media_id,
        title,
        artist,
        duration: format_duration(detail.duration_secs),
        duration_secs: detail.duration_secs,
        thumbnail_url: hit.thumbnail_url,
        audio_quality: None,
        audio_format: None,
        genre,
        tags: detail.tags.into_iter().take(MAX_TAGS).collect(),
        view_count: detail.view_count,
        channel: hit.channel,
        estimated_size_bytes: None,
        source: TrackSource::Structured,
    }
}

fn track_from_entry(entry: ExtractedEntry) -> ResolvedTrack {
    let channel = entry.channel.clone().or_else(|| entry.uploader.clone());
    let (artist, title) =
        derive_artist_and_title(entry.artist.as_deref(), channel.as_deref(), &entry.title);
    let duration_secs = entry.duration_secs();
    let (audio_quality, audio_format) = best_audio_quality(&entry.formats);
    let genre = derive_genre(
        entry.genre.as_deref(),
        &entry.tags,
        entry.description.as_deref().unwrap_or_default(),
    );
    let thumbnail_url = entry.best_thumbnail();
    ResolvedTrack {
        media_id: entry.id,
        title,
        artist,
        duration: format_duration(duration_secs),
        duration_secs,
        thumbnail_url,
        audio_quality,
        audio_format,
        genre,
        tags: entry.tags.into_iter().take(MAX_TAGS).collect(),
        view_count: entry.view_count,
        channel,
        estimated_size_bytes: entry.filesize_approx,
        source: TrackSource::Heuristic,
    }
}

/// Recommended names win over upload titles.
fn adopt_candidate(track: &mut ResolvedTrack, candidate: &SongCandidate) {
    track.title.clone_from(&candidate.title);
    track.artist.clone_from(&candidate.artist);
    if let Some(genre) = &candidate.genre {
        track.genre = Some(genre.to_lowercase());
    }
}

/// Appends tracks whose media id is not already present.
fn merge_unique(tracks: &mut Vec<ResolvedTrack>, more: Vec<ResolvedTrack>) {
    dedup_in_place(tracks);
    let mut seen: HashSet<String> = tracks.iter().map(|t| t.media_id.clone()).collect();
    tracks.extend(
        more.into_iter()
            .filter(|track| !track.media_id.is_empty() && seen.insert(track.media_id.clone())),
    );
}

fn dedup_in_place(tracks: &mut Vec<ResolvedTrack>) {
    let mut seen = HashSet::new();
    tracks.retain(|track| !track.media_id.is_empty() && seen.insert(track.media_id.clone()));
}

fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::retry::ErrorKind;

    struct FakeApi {
        hits: Result<Vec<SearchHit>, SearchError>,
        durations: HashMap<String, u64>,
        searches: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl StructuredSearch for FakeApi {
        fn name(&self) -> &str {
            "fake-api"
        }

        async fn search(&self, _query: &str, _max: usize) -> Result<Vec<SearchHit>, SearchError> {
            self.searches.fetch_add(1, Ordering::SeqCst);
            self.hits.clone()
        }

        async fn video_details(
            &self,
            ids: &[String],
        ) -> Result<HashMap<String, VideoDetails>, SearchError> {
            Ok(ids
                .iter()
                .map(|id| {
                    let detail = VideoDetails {
                        duration_secs: self.durations.get(id).copied(),
                        ..VideoDetails::default()
                    };
                    (id.clone(), detail)
                })
                .collect())
        }
    }

    struct FakeExtractor {
        entries: Result<Vec<ExtractedEntry>, SearchError>,
        calls: Arc<AtomicUsize>,
        queries: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl HeuristicExtractor for FakeExtractor {
        fn name(&self) -> &str {
            "fake-extractor"
        }

        async fn extract(
            &self,
            query: &str,
            _max: usize,
        ) -> Result<Vec<ExtractedEntry>, SearchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.queries.lock().unwrap().push(query.to_string());
            self.entries.clone()
        }
    }

    fn hit(id: &str, title: &str) -> SearchHit {
        SearchHit {
            media_id: id.to_string(),
            title: title.to_string(),
            channel: Some("Some Channel".to_string()),
            description: String::new(),
            thumbnail_url: None,
        }
    }

    fn entry(id: &str, title: &str, secs: Option<f64>) -> ExtractedEntry {
        ExtractedEntry {
            id: id.to_string(),
            title: title.to_string(),
            duration: secs,
            ..ExtractedEntry::default()
        }
    }

    fn no_retry() -> RetryPolicy {
        RetryPolicy::new(1, Duration::ZERO, 1.0, [])
    }

    struct Harness {
        resolver: SearchResolver,
        api_searches: Arc<AtomicUsize>,
        extractor_calls: Arc<AtomicUsize>,
        queries: Arc<Mutex<Vec<String>>>,
    }

    fn harness(
        api: Option<(Result<Vec<SearchHit>, SearchError>, HashMap<String, u64>)>,
        entries: Result<Vec<ExtractedEntry>, SearchError>,
    ) -> Harness {
        let api_searches = Arc::new(AtomicUsize::new(0));
        let extractor_calls = Arc::new(AtomicUsize::new(0));
        let queries = Arc::new(Mutex::new(Vec::new()));
        let mut resolver = SearchResolver::new(Box::new(FakeExtractor {
            entries,
            calls: Arc::clone(&extractor_calls),
            queries: Arc::clone(&queries),
        }))
        .with_retry_policies(no_retry(), no_retry());
        if let Some((hits, durations)) = api {
            resolver = resolver.with_structured(Box::new(FakeApi {
                hits,
                durations,
                searches: Arc::clone(&api_searches),
            }));
        }
        Harness {
            resolver,
            api_searches,
            extractor_calls,
            queries,
        }
    }

    #[tokio::test]
    async fn test_structured_results_win_duplicates() {
        let h = harness(
            Some((
                Ok(vec![hit("dup", "Pink Moon"), hit("api-only", "Pink Moon live")]),
                HashMap::from([("dup".to_string(), 124), ("api-only".to_string(), 200)]),
            )),
            Ok(vec![
                entry("dup", "Pink Moon (scraped)", Some(124.0)),
                entry("scraped-only", "Pink Moon cover", Some(180.0)),
            ]),
        );

        let tracks = h.resolver.search("pink moon", 3, false).await.unwrap();
        assert_eq!(tracks.len(), 3);
        let dup = tracks.iter().find(|t| t.media_id == "dup").unwrap();
        assert_eq!(dup.source, TrackSource::Structured);
        assert_eq!(dup.duration, "2:04");
        assert_eq!(h.extractor_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_full_structured_page_skips_extractor() {
        let h = harness(
            Some((Ok(vec![hit("a", "A"), hit("b", "B")]), HashMap::new())),
            Ok(Vec::new()),
        );
        let tracks = h.resolver.search("anything", 2, false).await.unwrap();
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].duration, "--:--");
        assert_eq!(h.extractor_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_structured_failure_disables_tier_for_process() {
        let h = harness(
            Some((
                Err(SearchError::http_status("fake-api", 403, "quotaExceeded")),
                HashMap::new(),
            )),
            Ok(vec![entry("x", "Nick Drake - Pink Moon", Some(124.0))]),
        );
        assert_eq!(h.resolver.tier_state(), TierState::Available);

        let first = h.resolver.search("pink moon", 1, false).await.unwrap();
        assert_eq!(first[0].artist, "Nick Drake");
        assert_eq!(first[0].title, "Pink Moon");
        assert_eq!(h.resolver.tier_state(), TierState::DisabledForProcess);

        h.resolver.search("something else", 1, false).await.unwrap();
        assert_eq!(h.api_searches.load(Ordering::SeqCst), 1);
        assert_eq!(h.extractor_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_candidate_filters_implausible_durations() {
        let h = harness(
            None,
            Ok(vec![
                entry("short", "Intro", Some(45.0)),
                entry("long", "Live set", Some(700.0)),
                entry("song", "Holy Wars", Some(200.0)),
                entry("unknown", "Holy Wars?", None),
            ]),
        );
        let mut candidate = SongCandidate::new("Holy Wars", "Megadeth", "");
        candidate.genre = Some("Thrash Metal".to_string());

        let track = h.resolver.resolve_candidate(&candidate).await.unwrap().unwrap();
        assert_eq!(track.media_id, "song");
        assert_eq!(track.artist, "Megadeth");
        assert_eq!(track.genre.as_deref(), Some("thrash metal"));
        assert_eq!(
            h.queries.lock().unwrap().as_slice(),
            ["Megadeth Holy Wars official"]
        );
    }

    #[tokio::test]
    async fn test_candidate_with_no_plausible_match_is_none() {
        let h = harness(None, Ok(vec![entry("short", "Intro", Some(45.0))]));
        let candidate = SongCandidate::new("Intro", "Someone", "");
        assert!(h.resolver.resolve_candidate(&candidate).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_extractor_failure_without_structured_results_is_error() {
        let h = harness(
            None,
            Err(SearchError::ToolMissing {
                tool: "yt-dlp".to_string(),
            }),
        );
        let error = h.resolver.search("x", 3, false).await.unwrap_err();
        assert!(matches!(error, SearchError::ToolMissing { .. }));
        assert_eq!(crate::retry::Classify::kind(&error), ErrorKind::Permanent);
    }

    #[tokio::test]
    async fn test_cached_results_skip_tiers() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(Cache::open(dir.path(), Duration::from_secs(3600)));
        let h = harness(None, Ok(vec![entry("a", "Song", Some(200.0))]));
        let resolver = h.resolver.with_cache(cache);

        resolver.search("Song", 1, true).await.unwrap();
        let again = resolver.search("  song ", 1, true).await.unwrap();
        assert_eq!(again[0].media_id, "a");
        assert_eq!(h.extractor_calls.load(Ordering::SeqCst), 1);
    }
}
