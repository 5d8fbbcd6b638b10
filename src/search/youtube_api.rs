//! Structured search tier backed by the YouTube Data API v3.
//!
//! A search call returns ids and snippets; a second batched `videos` call
//! fills in durations, tags and view counts.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::http_client::{HttpTimeouts, build_http_client};

use super::metadata::{parse_iso8601_duration, unescape_html};
use super::{SearchError, SearchHit, StructuredSearch, VideoDetails};

const NAME: &str = "youtube-api";
const ENV_VAR: &str = "YOUTUBE_API_KEY";
const BASE_URL: &str = "https://www.googleapis.com/youtube/v3";

/// Music category id on YouTube.
const MUSIC_CATEGORY_ID: &str = "10";

/// The API caps `maxResults` at 50.
const MAX_PAGE_SIZE: usize = 50;

/// YouTube Data API client.
#[derive(Debug)]
pub struct YouTubeDataApi {
    base_url: String,
    api_key: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct SearchListResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchItemId,
    #[serde(default)]
    snippet: Option<Snippet>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchItemId {
    #[serde(default)]
    video_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    #[serde(default)]
    title: String,
    #[serde(default)]
    channel_title: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    thumbnails: HashMap<String, Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

#[derive(Debug, Deserialize)]
struct VideoListResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoItem {
    id: String,
    #[serde(default)]
    content_details: Option<ContentDetails>,
    #[serde(default)]
    snippet: Option<Snippet>,
    #[serde(default)]
    statistics: Option<Statistics>,
}

#[derive(Debug, Deserialize)]
struct ContentDetails {
    #[serde(default)]
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Statistics {
    // The API encodes counts as strings.
    #[serde(default)]
    view_count: Option<String>,
}

impl YouTubeDataApi {
    /// Creates the client.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::MissingCredential`] for a blank key and
    /// [`SearchError::Malformed`] if the HTTP client cannot be built.
    pub fn new(api_key: &str, timeouts: HttpTimeouts) -> Result<Self, SearchError> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(SearchError::MissingCredential {
                source_name: NAME.to_string(),
                env_var: ENV_VAR.to_string(),
            });
        }
        let client = build_http_client(timeouts)
            .map_err(|e| SearchError::malformed(NAME, format!("HTTP client construction failed: {e}")))?;
        Ok(Self {
            base_url: BASE_URL.to_string(),
            api_key: api_key.to_string(),
            client,
        })
    }

    /// Points the client at a different API root (for tests).
    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self, resource: &str, params: &[(&str, &str)]) -> Result<Url, SearchError> {
        let mut url = Url::parse(&format!("{}/{resource}", self.base_url))
            .map_err(|e| SearchError::malformed(NAME, format!("invalid API URL: {e}")))?;
        url.query_pairs_mut()
            .extend_pairs(params)
            .append_pair("key", &self.api_key);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, SearchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SearchError::request(NAME, &e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::http_status(NAME, status.as_u16(), &body));
        }
        let body = response
            .text()
            .await
            .map_err(|e| SearchError::request(NAME, &e))?;
        serde_json::from_str(&body).map_err(|e| SearchError::malformed(NAME, e.to_string()))
    }
}

#[async_trait]
impl StructuredSearch for YouTubeDataApi {
    fn name(&self) -> &str {
        NAME
    }

    #[tracing::instrument(skip(self), fields(source = NAME))]
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, SearchError> {
        let max_results = max_results.clamp(1, MAX_PAGE_SIZE).to_string();
        let url = self.endpoint(
            "search",
            &[
                ("part", "snippet"),
                ("q", query),
                ("maxResults", &max_results),
                ("type", "video"),
                ("videoCategoryId", MUSIC_CATEGORY_ID),
            ],
        )?;
        let response: SearchListResponse = self.get_json(url).await?;

        let hits: Vec<SearchHit> = response
            .items
            .into_iter()
            .filter_map(|item| {
                let media_id = item.id.video_id.filter(|id| !id.is_empty())?;
                let snippet = item.snippet.unwrap_or_default();
                let thumbnail_url = ["high", "medium", "default"]
                    .iter()
                    .find_map(|size| snippet.thumbnails.get(*size))
                    .map(|thumb| thumb.url.clone());
                Some(SearchHit {
                    media_id,
                    title: unescape_html(&snippet.title),
                    channel: snippet.channel_title.map(|c| unescape_html(&c)),
                    description: snippet.description,
                    thumbnail_url,
                })
            })
            .collect();
        debug!(count = hits.len(), "API search returned hits");
        Ok(hits)
    }

    #[tracing::instrument(skip(self, ids), fields(source = NAME, id_count = ids.len()))]
    async fn video_details(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, VideoDetails>, SearchError> {
        let mut details = HashMap::new();
        for chunk in ids.chunks(MAX_PAGE_SIZE) {
            let joined = chunk.join(",");
            let url = self.endpoint(
                "videos",
                &[("part", "contentDetails,snippet,statistics"), ("id", &joined)],
            )?;
            let response: VideoListResponse = self.get_json(url).await?;
            for item in response.items {
                let snippet = item.snippet.unwrap_or_default();
                details.insert(
                    item.id,
                    VideoDetails {
                        duration_secs: item
                            .content_details
                            .and_then(|c| c.duration)
                            .and_then(|d| parse_iso8601_duration(&d)),
                        tags: snippet.tags,
                        description: snippet.description,
                        view_count: item
                            .statistics
                            .and_then(|s| s.view_count)
                            .and_then(|v| v.parse().ok()),
                    },
                );
            }
        }
        Ok(details)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::retry::{Classify, ErrorKind};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn api(server: &MockServer) -> YouTubeDataApi {
        YouTubeDataApi::new("yt-key", HttpTimeouts::default())
            .unwrap()
            .with_base_url(&server.uri())
    }

    #[test]
    fn test_blank_key_rejected() {
        let error = YouTubeDataApi::new("  ", HttpTimeouts::default()).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::QuotaOrAuth);
    }

    #[tokio::test]
    async fn test_search_sends_music_category_and_decodes_hits() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "nick drake music audio"))
            .and(query_param("videoCategoryId", "10"))
            .and(query_param("type", "video"))
            .and(query_param("key", "yt-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [
                    {"id": {"kind": "youtube#video", "videoId": "abc123"},
                     "snippet": {"title": "Pink Moon &amp; More", "channelTitle": "Nick Drake - Topic",
                                 "description": "", "thumbnails": {"default": {"url": "https://i.ytimg.com/a.jpg"}}}},
                    {"id": {"kind": "youtube#channel", "channelId": "zzz"}, "snippet": {"title": "channel"}}
                ]
            })))
            .mount(&server)
            .await;

        let hits = api(&server).search("nick drake music audio", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].media_id, "abc123");
        assert_eq!(hits[0].title, "Pink Moon & More");
        assert_eq!(hits[0].thumbnail_url.as_deref(), Some("https://i.ytimg.com/a.jpg"));
    }

    #[tokio::test]
    async fn test_video_details_parses_duration_and_views() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/videos"))
            .and(query_param("id", "a,b"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [
                    {"id": "a", "contentDetails": {"duration": "PT3M24S"},
                     "snippet": {"title": "t", "tags": ["folk"], "description": "d"},
                     "statistics": {"viewCount": "123456"}},
                    {"id": "b", "contentDetails": {"duration": "P0D"}}
                ]
            })))
            .mount(&server)
            .await;

        let details = api(&server)
            .video_details(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(details["a"].duration_secs, Some(204));
        assert_eq!(details["a"].view_count, Some(123_456));
        assert_eq!(details["a"].tags, vec!["folk"]);
        assert_eq!(details["b"].duration_secs, Some(0));
        assert!(details["b"].tags.is_empty());
    }

    #[tokio::test]
    async fn test_quota_exceeded_is_quota_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
                "error": {"code": 403, "errors": [{"reason": "quotaExceeded"}]}
            })))
            .mount(&server)
            .await;

        let error = api(&server).search("x", 5).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::QuotaOrAuth);
    }
}
