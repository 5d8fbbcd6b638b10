//! Integration tests for two-tier search resolution with a mocked search API.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use mixhound_core::http_client::HttpTimeouts;
use mixhound_core::search::{
    ExtractedEntry, HeuristicExtractor, TierState, TrackSource, YouTubeDataApi,
};
use mixhound_core::{RetryPolicy, SearchError, SearchResolver, SongCandidate};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct CannedExtractor {
    entries: Vec<ExtractedEntry>,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl HeuristicExtractor for CannedExtractor {
    fn name(&self) -> &str {
        "canned"
    }

    async fn extract(&self, _query: &str, max: usize) -> Result<Vec<ExtractedEntry>, SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.entries.iter().take(max).cloned().collect())
    }
}

fn entry(id: &str, title: &str, secs: f64) -> ExtractedEntry {
    ExtractedEntry {
        id: id.to_string(),
        title: title.to_string(),
        duration: Some(secs),
        ..ExtractedEntry::default()
    }
}

fn resolver(server: &MockServer, entries: Vec<ExtractedEntry>) -> (SearchResolver, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let api = YouTubeDataApi::new("yt-key", HttpTimeouts::default())
        .unwrap()
        .with_base_url(&server.uri());
    let no_retry = RetryPolicy::new(1, Duration::ZERO, 1.0, []);
    let resolver = SearchResolver::new(Box::new(CannedExtractor {
        entries,
        calls: Arc::clone(&calls),
    }))
    .with_structured(Box::new(api))
    .with_retry_policies(no_retry.clone(), no_retry);
    (resolver, calls)
}

fn search_item(id: &str, title: &str, channel: &str) -> serde_json::Value {
    json!({
        "id": {"kind": "youtube#video", "videoId": id},
        "snippet": {"title": title, "channelTitle": channel, "description": "", "thumbnails": {}}
    })
}

fn video_item(id: &str, duration: &str, views: &str) -> serde_json::Value {
    json!({
        "id": id,
        "contentDetails": {"duration": duration},
        "snippet": {"title": "", "tags": ["folk", "acoustic"], "description": ""},
        "statistics": {"viewCount": views}
    })
}

#[tokio::test]
async fn test_candidate_resolves_to_plausible_structured_track() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "Nick Drake Pink Moon official"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                search_item("clip", "Pink Moon (snippet)", "fan uploads"),
                search_item("topic", "Pink Moon", "Nick Drake - Topic"),
                search_item("album", "Nick Drake - full album", "archive"),
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/videos"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                video_item("clip", "PT45S", "100"),
                video_item("topic", "PT2M4S", "2500000"),
                video_item("album", "PT40M", "50000"),
            ]
        })))
        .mount(&server)
        .await;

    let (resolver, _) = resolver(&server, Vec::new());
    let mut candidate = SongCandidate::new("Pink Moon", "Nick Drake", "");
    candidate.genre = Some("Folk".to_string());

    let track = resolver.resolve_candidate(&candidate).await.unwrap().unwrap();

    assert_eq!(track.media_id, "topic");
    assert_eq!(track.title, "Pink Moon");
    assert_eq!(track.artist, "Nick Drake");
    assert_eq!(track.genre.as_deref(), Some("folk"));
    assert_eq!(track.duration, "2:04");
    assert_eq!(track.view_count, Some(2_500_000));
    assert_eq!(track.source, TrackSource::Structured);
    assert_eq!(resolver.tier_state(), TierState::Available);
}

#[tokio::test]
async fn test_full_structured_page_skips_extractor() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "nick drake music audio"))
        .and(query_param("maxResults", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                search_item("a", "Nick Drake - River Man", "Nick Drake - Topic"),
                search_item("b", "Nick Drake - Northern Sky", "Nick Drake - Topic"),
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/videos"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [video_item("a", "PT4M21S", "10"), video_item("b", "PT3M47S", "10")]
        })))
        .mount(&server)
        .await;

    let (resolver, extractor_calls) = resolver(&server, vec![entry("x", "unused", 200.0)]);
    let tracks = resolver.search("nick drake", 2, false).await.unwrap();

    assert_eq!(tracks.len(), 2);
    assert_eq!(extractor_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_quota_failure_disables_api_for_the_process() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": {"code": 403, "errors": [{"reason": "quotaExceeded"}]}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (resolver, extractor_calls) = resolver(
        &server,
        vec![entry("e1", "Nick Drake - Hazey Jane II", 207.0), entry("e2", "Nick Drake - Fly", 180.0)],
    );

    let first = resolver.search("nick drake", 2, true).await.unwrap();
    assert_eq!(first.len(), 2);
    assert!(first.iter().all(|track| track.source == TrackSource::Heuristic));
    assert_eq!(resolver.tier_state(), TierState::DisabledForProcess);

    let second = resolver.search("pink moon", 1, true).await.unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(extractor_calls.load(Ordering::SeqCst), 2);
}
