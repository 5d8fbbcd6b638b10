//! End-to-end discovery: request → recommendations → resolved tracks → files.
//!
//! One request runs at a time. Provider fallback, parsing and per-candidate
//! resolution are sequential; only acquisition fans out.

use std::collections::HashSet;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::cache::Cache;
use crate::config::Configuration;
use crate::download::{AcquireReport, Acquirer, build_default_acquirer};
use crate::parser::SongCandidate;
use crate::provider::{ProviderOrchestrator, RecommendError, build_default_orchestrator};
use crate::search::{ResolvedTrack, SearchError, SearchResolver, build_default_resolver};

/// Errors that end a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// No provider produced recommendations.
    #[error(transparent)]
    Recommend(#[from] RecommendError),

    /// Search failed in a way that affects every candidate.
    #[error(transparent)]
    Search(#[from] SearchError),

    /// Acquisition was requested but the pipeline has no acquirer.
    #[error("downloads are not enabled for this pipeline\n  Suggestion: Build the pipeline with an acquirer (pass --download)")]
    DownloadsDisabled,

    /// A local directory could not be prepared.
    #[error("Cannot prepare '{}': {source}\n  Suggestion: Check the path exists and is writable", .path.display())]
    Setup {
        /// Directory that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
}

/// A recommended song that did not resolve to a playable track.
#[derive(Debug, Clone, PartialEq)]
pub struct Unresolved {
    /// The recommendation.
    pub candidate: SongCandidate,
    /// Why it was dropped.
    pub reason: String,
}

/// Result of [`DiscoveryPipeline::discover`].
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    /// Recommendations in provider order.
    pub candidates: Vec<SongCandidate>,
    /// One track per resolved candidate, unique by media id, in recommendation order.
    pub tracks: Vec<ResolvedTrack>,
    /// Candidates with no plausible match or a failed search.
    pub unresolved: Vec<Unresolved>,
}

/// Recommendation, resolution and acquisition wired together.
#[derive(Debug)]
pub struct DiscoveryPipeline {
    orchestrator: ProviderOrchestrator,
    resolver: SearchResolver,
    acquirer: Option<Acquirer>,
}

impl DiscoveryPipeline {
    /// Creates a pipeline without downloads.
    #[must_use]
    pub fn new(orchestrator: ProviderOrchestrator, resolver: SearchResolver) -> Self {
        Self {
            orchestrator,
            resolver,
            acquirer: None,
        }
    }

    /// Enables acquisition through `acquirer`.
    #[must_use]
    pub fn with_acquirer(mut self, acquirer: Acquirer) -> Self {
        self.acquirer = Some(acquirer);
        self
    }

    /// Builds the default pipeline: a shared cache, every configured provider,
    /// both search tiers and, when `downloads` is set, an acquirer.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Setup`] when the music directory or its ledger
    /// cannot be opened.
    pub fn from_config(config: &Configuration, downloads: bool) -> Result<Self, PipelineError> {
        let cache = Arc::new(Cache::open(&config.cache_dir, config.cache_max_age));
        let orchestrator = build_default_orchestrator(config, Some(Arc::clone(&cache)));
        let resolver = build_default_resolver(config, Some(cache));
        let mut pipeline = Self::new(orchestrator, resolver);
        if downloads {
            let acquirer = build_default_acquirer(config).map_err(|source| PipelineError::Setup {
                path: config.music_dir.clone(),
                source,
            })?;
            pipeline = pipeline.with_acquirer(acquirer);
        }
        Ok(pipeline)
    }

    /// Returns the provider orchestrator.
    #[must_use]
    pub fn orchestrator(&self) -> &ProviderOrchestrator {
        &self.orchestrator
    }

    /// Returns the orchestrator for reconfiguration before a run.
    pub fn orchestrator_mut(&mut self) -> &mut ProviderOrchestrator {
        &mut self.orchestrator
    }

    /// Returns the search resolver.
    #[must_use]
    pub fn resolver(&self) -> &SearchResolver {
        &self.resolver
    }

    /// Returns the acquirer, if downloads are enabled.
    #[must_use]
    pub fn acquirer(&self) -> Option<&Acquirer> {
        self.acquirer.as_ref()
    }

    /// Turns a mood or genre request into resolved tracks.
    ///
    /// At most `limit` recommendations are resolved. Each candidate yields at
    /// most one track; a track already produced by an earlier candidate is
    /// not repeated.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Recommend`] when no provider answered and
    /// [`PipelineError::Search`] when the extractor tool is missing. Other
    /// per-candidate search failures are reported in [`Discovery::unresolved`].
    #[instrument(skip(self), fields(request = %request))]
    pub async fn discover(
        &self,
        request: &str,
        limit: Option<usize>,
    ) -> Result<Discovery, PipelineError> {
        let mut candidates = self.orchestrator.recommend(request).await?;
        if let Some(limit) = limit {
            candidates.truncate(limit.max(1));
        }
        info!(count = candidates.len(), "Resolving recommendations");

        let mut discovery = Discovery::default();
        let mut seen = HashSet::new();
        for candidate in &candidates {
            match self.resolver.resolve_candidate(candidate).await {
                Ok(Some(track)) => {
                    if seen.insert(track.media_id.clone()) {
                        debug!(media_id = %track.media_id, candidate = %candidate, "Resolved");
                        discovery.tracks.push(track);
                    } else {
                        debug!(media_id = %track.media_id, "Duplicate track dropped");
                    }
                }
                Ok(None) => discovery.unresolved.push(Unresolved {
                    candidate: candidate.clone(),
                    reason: "no plausible match".to_string(),
                }),
                Err(error @ SearchError::ToolMissing { .. }) => return Err(error.into()),
                Err(error) => {
                    warn!(candidate = %candidate, error = %error, "Search failed; skipping candidate");
                    discovery.unresolved.push(Unresolved {
                        candidate: candidate.clone(),
                        reason: first_line(&error.to_string()),
                    });
                }
            }
        }
        discovery.candidates = candidates;

        info!(
            resolved = discovery.tracks.len(),
            unresolved = discovery.unresolved.len(),
            "Discovery complete"
        );
        Ok(discovery)
    }

    /// Searches free text through the resolver.
    ///
    /// # Errors
    ///
    /// See [`SearchResolver::search`].
    pub async fn search(
        &self,
        query: &str,
        max_results: usize,
        unfiltered: bool,
    ) -> Result<Vec<ResolvedTrack>, PipelineError> {
        Ok(self.resolver.search(query, max_results, unfiltered).await?)
    }

    /// Returns the tracks not yet in the download ledger.
    ///
    /// Without an acquirer every track is new.
    #[must_use]
    pub fn new_tracks(&self, tracks: &[ResolvedTrack]) -> Vec<ResolvedTrack> {
        tracks
            .iter()
            .filter(|track| {
                self.acquirer
                    .as_ref()
                    .is_none_or(|acquirer| !acquirer.is_downloaded(&track.media_id))
            })
            .cloned()
            .collect()
    }

    /// Downloads `tracks`, calling `on_report` as each one finishes.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DownloadsDisabled`] without an acquirer.
    /// Per-track failures are reported, not returned.
    pub async fn acquire(
        &self,
        tracks: Vec<ResolvedTrack>,
        on_report: impl FnMut(&AcquireReport),
    ) -> Result<Vec<AcquireReport>, PipelineError> {
        let acquirer = self
            .acquirer
            .as_ref()
            .ok_or(PipelineError::DownloadsDisabled)?;
        Ok(acquirer.acquire_all(tracks, on_report).await)
    }
}

fn first_line(message: &str) -> String {
    message.lines().next().unwrap_or_default().to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use tempfile::TempDir;

    use super::*;
    use crate::download::{
        AcquireOutcome, DownloadError, DownloadLedger, SpaceProbe, TrackTransfer,
    };
    use crate::provider::{ProviderError, RecommendationProvider};
    use crate::retry::RetryPolicy;
    use crate::search::{ExtractedEntry, HeuristicExtractor};

    const SONGS: &str = "1. \"Master of Puppets\" od Metallica\n\
                         2. \"Holy Wars\" od Megadeth\n\
                         3. \"Battery\" od Metallica\n\
                         4. \"Unknown Demo\" od Nobody";

    struct FixedProvider;

    #[async_trait]
    impl RecommendationProvider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        fn priority(&self) -> u8 {
            10
        }

        fn setup_hint(&self) -> String {
            String::new()
        }

        async fn is_available(&self) -> bool {
            true
        }

        async fn complete(&self, _prompt: &str) -> Result<String, ProviderError> {
            Ok(SONGS.to_string())
        }
    }

    /// Returns canned entries keyed by a substring of the query.
    struct KeyedExtractor {
        missing_tool: bool,
    }

    #[async_trait]
    impl HeuristicExtractor for KeyedExtractor {
        fn name(&self) -> &str {
            "keyed"
        }

        async fn extract(&self, query: &str, _max: usize) -> Result<Vec<ExtractedEntry>, SearchError> {
            if self.missing_tool {
                return Err(SearchError::ToolMissing {
                    tool: "yt-dlp".to_string(),
                });
            }
            let entry = |id: &str, title: &str, secs: f64| ExtractedEntry {
                id: id.to_string(),
                title: title.to_string(),
                duration: Some(secs),
                ..ExtractedEntry::default()
            };
            let entries = if query.contains("Master of Puppets") || query.contains("Battery") {
                // Both Metallica songs land on the same upload.
                vec![entry("mop", "Metallica - Master of Puppets", 515.0)]
            } else if query.contains("Holy Wars") {
                vec![entry("hw", "Megadeth - Holy Wars", 392.0)]
            } else {
                vec![entry("demo", "Nobody - Unknown Demo (full album)", 3600.0)]
            };
            Ok(entries)
        }
    }

    fn resolver(missing_tool: bool) -> SearchResolver {
        let no_retry = RetryPolicy::new(1, Duration::ZERO, 1.0, []);
        SearchResolver::new(Box::new(KeyedExtractor { missing_tool }))
            .with_retry_policies(no_retry.clone(), no_retry)
    }

    fn pipeline(missing_tool: bool) -> DiscoveryPipeline {
        let mut orchestrator = ProviderOrchestrator::new();
        orchestrator.register(Box::new(FixedProvider));
        DiscoveryPipeline::new(orchestrator, resolver(missing_tool))
    }

    struct PlentyOfSpace;

    impl SpaceProbe for PlentyOfSpace {
        fn available_bytes(&self, _path: &Path) -> io::Result<u64> {
            Ok(u64::MAX)
        }
    }

    #[derive(Default)]
    struct CountingTransfer {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TrackTransfer for CountingTransfer {
        async fn transfer(
            &self,
            track: &ResolvedTrack,
            destination: &Path,
        ) -> Result<PathBuf, DownloadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let path = destination.join(format!("{}.mp3", track.media_id));
            tokio::fs::write(&path, b"ID3").await.unwrap();
            Ok(path)
        }
    }

    #[tokio::test]
    async fn test_discover_dedups_and_reports_unresolved() {
        let discovery = pipeline(false).discover("thrash metal", None).await.unwrap();

        assert_eq!(discovery.candidates.len(), 4);
        let ids: Vec<&str> = discovery.tracks.iter().map(|t| t.media_id.as_str()).collect();
        assert_eq!(ids, vec!["mop", "hw"]);
        assert_eq!(discovery.tracks[0].title, "Master of Puppets");
        assert_eq!(discovery.tracks[0].artist, "Metallica");

        assert_eq!(discovery.unresolved.len(), 1);
        assert_eq!(discovery.unresolved[0].candidate.title, "Unknown Demo");
    }

    #[tokio::test]
    async fn test_discover_respects_limit() {
        let discovery = pipeline(false).discover("thrash metal", Some(1)).await.unwrap();
        assert_eq!(discovery.candidates.len(), 1);
        assert_eq!(discovery.tracks.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_tool_aborts_discovery() {
        let error = pipeline(true).discover("thrash metal", None).await.unwrap_err();
        assert!(matches!(error, PipelineError::Search(SearchError::ToolMissing { .. })));
    }

    #[tokio::test]
    async fn test_acquire_without_acquirer_is_rejected() {
        let error = pipeline(false).acquire(Vec::new(), |_| {}).await.unwrap_err();
        assert!(matches!(error, PipelineError::DownloadsDisabled));
    }

    #[tokio::test]
    async fn test_acquire_then_new_tracks_excludes_downloaded() {
        let dir = TempDir::new().unwrap();
        let transfer = Arc::new(CountingTransfer::default());
        let ledger = DownloadLedger::with_probe(dir.path(), Arc::new(PlentyOfSpace)).unwrap();
        let pipeline = pipeline(false).with_acquirer(Acquirer::new(ledger, transfer.clone()));

        let discovery = pipeline.discover("thrash metal", None).await.unwrap();
        assert_eq!(pipeline.new_tracks(&discovery.tracks).len(), 2);

        let first = discovery.tracks[..1].to_vec();
        let reports = pipeline.acquire(first, |_| {}).await.unwrap();
        assert!(matches!(
            reports[0].result,
            Ok(AcquireOutcome::Downloaded { .. })
        ));

        let fresh = pipeline.new_tracks(&discovery.tracks);
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].media_id, "hw");
        assert_eq!(transfer.calls.load(Ordering::SeqCst), 1);
    }
}
