//! Relevance scoring and ordering of search results.

use serde::{Deserialize, Serialize};
use strsim::normalized_levenshtein;

use super::ResolvedTrack;

/// Duration band (inclusive, seconds) a recommended song must fall in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlausibilityWindow {
    /// Shortest accepted duration.
    pub min_secs: u64,
    /// Longest accepted duration.
    pub max_secs: u64,
}

impl Default for PlausibilityWindow {
    fn default() -> Self {
        Self {
            min_secs: 60,
            max_secs: 600,
        }
    }
}

impl PlausibilityWindow {
    /// Returns true if `duration_secs` is known and inside the window.
    ///
    /// An unknown or zero duration is never plausible.
    #[must_use]
    pub fn contains(&self, duration_secs: Option<u64>) -> bool {
        duration_secs.is_some_and(|secs| secs > 0 && (self.min_secs..=self.max_secs).contains(&secs))
    }
}

/// Weight of the fuzzy query/title similarity in the score.
const SIMILARITY_WEIGHT: f64 = 0.5;

/// Inclusive duration band (seconds) that looks like a regular song.
const SONG_LENGTH_SECS: std::ops::RangeInclusive<u64> = 120..=480;

/// Scores how well `track` answers `query`. Higher is better.
///
/// | Signal | Points |
/// |--------|--------|
/// | query contained in title (case-insensitive) | 1.0 |
/// | duration 2-8 minutes | 0.5 |
/// | more than 10 000 views | 0.3 |
/// | auto-generated `- Topic` channel | 0.8 |
/// | fuzzy similarity of query to "artist title" | up to 0.5 |
#[must_use]
pub fn relevance_score(query: &str, track: &ResolvedTrack) -> f64 {
    let query = query.trim().to_lowercase();
    let title = track.title.to_lowercase();
    let mut score = 0.0;

    if !query.is_empty() && title.contains(&query) {
        score += 1.0;
    }
    if track
        .duration_secs
        .is_some_and(|secs| SONG_LENGTH_SECS.contains(&secs))
    {
        score += 0.5;
    }
    if track.view_count.is_some_and(|views| views > 10_000) {
        score += 0.3;
    }
    if track
        .channel
        .as_deref()
        .is_some_and(|channel| channel.trim_end().ends_with("- Topic"))
    {
        score += 0.8;
    }

    let label = format!("{} {}", track.artist, track.title).to_lowercase();
    score += SIMILARITY_WEIGHT * normalized_levenshtein(&query, &label);
    score
}

/// Sorts `tracks` by descending relevance to `query`.
///
/// The sort is stable: equally scored tracks keep their original order.
pub fn rank_tracks(query: &str, tracks: &mut Vec<ResolvedTrack>) {
    let mut scored: Vec<(f64, ResolvedTrack)> = tracks
        .drain(..)
        .map(|track| (relevance_score(query, &track), track))
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    tracks.extend(scored.into_iter().map(|(_, track)| track));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::TrackSource;

    fn track(id: &str, title: &str, secs: Option<u64>) -> ResolvedTrack {
        ResolvedTrack {
            media_id: id.to_string(),
            title: title.to_string(),
            artist: "Artist".to_string(),
            duration: String::new(),
            duration_secs: secs,
            thumbnail_url: None,
            audio_quality: None,
            audio_format: None,
            genre: None,
            tags: Vec::new(),
            view_count: None,
            channel: None,
            estimated_size_bytes: None,
            source: TrackSource::Heuristic,
        }
    }

    #[test]
    fn test_plausibility_window_bounds() {
        let window = PlausibilityWindow::default();
        assert!(!window.contains(Some(45)));
        assert!(window.contains(Some(60)));
        assert!(window.contains(Some(200)));
        assert!(window.contains(Some(600)));
        assert!(!window.contains(Some(700)));
        assert!(!window.contains(None));
        let zero_floor = PlausibilityWindow {
            min_secs: 0,
            max_secs: 600,
        };
        assert!(!zero_floor.contains(Some(0)));
    }

    #[test]
    fn test_title_match_and_song_length_score() {
        let hit = track("a", "Pink Moon", Some(200));
        let miss = track("b", "Something else", Some(30));
        assert!(relevance_score("pink moon", &hit) > relevance_score("pink moon", &miss) + 1.4);
    }

    #[test]
    fn test_topic_channel_bonus() {
        let plain = track("a", "One", None);
        let mut topic = plain.clone();
        topic.channel = Some("Metallica - Topic".to_string());
        let delta = relevance_score("one", &topic) - relevance_score("one", &plain);
        assert!((delta - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_views_bonus_requires_more_than_threshold() {
        let mut at = track("a", "x", None);
        at.view_count = Some(10_000);
        let mut above = at.clone();
        above.view_count = Some(10_001);
        let delta = relevance_score("q", &above) - relevance_score("q", &at);
        assert!((delta - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_rank_is_stable_for_ties() {
        let mut tracks = vec![
            track("first", "zzz", None),
            track("second", "zzz", None),
            track("best", "Pink Moon", Some(200)),
        ];
        rank_tracks("pink moon", &mut tracks);
        let ids: Vec<&str> = tracks.iter().map(|t| t.media_id.as_str()).collect();
        assert_eq!(ids, vec!["best", "first", "second"]);
    }
}
