//! Recommendation parsing.
//!
//! Providers answer in free text. This module turns that text into an ordered,
//! deduplicated list of [`SongCandidate`]s. Parsing never fails: lines that do
//! not look like a song are skipped and reported as [`ParseAmbiguity`].

mod candidate;
mod matchers;
mod structured;

use std::collections::HashSet;

use tracing::debug;

pub use candidate::{MIN_FIELD_CHARS, SongCandidate};
pub use matchers::{Annotation, LineMatch, MatcherKind, match_annotation, match_line};

use candidate::fields_long_enough;
use matchers::{clean_artist, clean_title, normalize_line};
use structured::parse_structured;

/// Why a non-empty line produced no candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseAmbiguity {
    /// No matcher recognized the line.
    NoPattern,
    /// Title or artist was too short after cleanup.
    FieldTooShort,
    /// The same title/artist pair was already accepted.
    Duplicate,
}

/// A line that did not become a candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedLine {
    /// The trimmed input line.
    pub line: String,
    /// Why it was skipped.
    pub reason: ParseAmbiguity,
}

/// Result of recommendation parsing.
#[derive(Debug, Clone, Default)]
pub struct RecommendationParseResult {
    /// Accepted candidates in first-seen order.
    pub candidates: Vec<SongCandidate>,
    /// Lines that were not accepted.
    pub skipped: Vec<SkippedLine>,
}

/// Parses provider text into deduplicated song candidates.
#[must_use]
pub fn parse_recommendations(raw: &str) -> Vec<SongCandidate> {
    parse_recommendations_detailed(raw).candidates
}

/// Parses provider text and reports skipped lines alongside the candidates.
#[tracing::instrument(skip(raw), fields(input_len = raw.len()))]
#[must_use]
pub fn parse_recommendations_detailed(raw: &str) -> RecommendationParseResult {
    let mut result = RecommendationParseResult::default();
    let mut seen: HashSet<(String, String)> = HashSet::new();

    if let Some(structured) = parse_structured(raw)
        && !structured.is_empty()
    {
        for candidate in structured {
            if !fields_long_enough(&candidate.title, &candidate.artist) {
                result.skipped.push(SkippedLine {
                    line: candidate.source_text,
                    reason: ParseAmbiguity::FieldTooShort,
                });
            } else if seen.insert(candidate.identity()) {
                result.candidates.push(candidate);
            } else {
                result.skipped.push(SkippedLine {
                    line: candidate.source_text,
                    reason: ParseAmbiguity::Duplicate,
                });
            }
        }
        debug!(
            accepted = result.candidates.len(),
            skipped = result.skipped.len(),
            "parsed structured recommendations"
        );
        return result;
    }

    // Annotations only attach while the most recent song line was accepted.
    let mut last_accepted: Option<usize> = None;

    for raw_line in raw.lines() {
        let trimmed = raw_line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let line = normalize_line(trimmed);

        if let Some(annotation) = match_annotation(&line) {
            if let Some(index) = last_accepted {
                let candidate = &mut result.candidates[index];
                match annotation {
                    Annotation::Genre(genre) => candidate.genre = Some(genre),
                    Annotation::Reason(reason) => candidate.reason = Some(reason),
                }
            }
            continue;
        }

        let Some(matched) = match_line(&line) else {
            result.skipped.push(SkippedLine {
                line: trimmed.to_string(),
                reason: ParseAmbiguity::NoPattern,
            });
            last_accepted = None;
            continue;
        };

        let title = clean_title(&matched.title);
        let artist = clean_artist(&matched.artist);
        if !fields_long_enough(&title, &artist) {
            result.skipped.push(SkippedLine {
                line: trimmed.to_string(),
                reason: ParseAmbiguity::FieldTooShort,
            });
            last_accepted = None;
            continue;
        }

        let candidate = SongCandidate::new(title, artist, trimmed);
        if seen.insert(candidate.identity()) {
            result.candidates.push(candidate);
            last_accepted = Some(result.candidates.len() - 1);
        } else {
            result.skipped.push(SkippedLine {
                line: trimmed.to_string(),
                reason: ParseAmbiguity::Duplicate,
            });
            last_accepted = None;
        }
    }

    debug!(
        accepted = result.candidates.len(),
        skipped = result.skipped.len(),
        "parsed recommendation lines"
    );
    result
}
