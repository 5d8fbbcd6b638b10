//! Song candidate type produced by recommendation parsing.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Minimum number of characters a title or artist must exceed to be accepted.
pub const MIN_FIELD_CHARS: usize = 2;

/// A provisional song suggestion extracted from provider output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongCandidate {
    /// Song title.
    pub title: String,
    /// Performing artist.
    pub artist: String,
    /// Genre label supplied by the provider, if any.
    pub genre: Option<String>,
    /// Why the provider picked this song, if stated.
    pub reason: Option<String>,
    /// The line (or JSON object) the candidate was read from.
    pub source_text: String,
}

impl SongCandidate {
    /// Creates a candidate with no genre or reason.
    #[must_use]
    pub fn new(
        title: impl Into<String>,
        artist: impl Into<String>,
        source_text: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
            genre: None,
            reason: None,
            source_text: source_text.into(),
        }
    }

    /// Returns the case-insensitive identity used for deduplication.
    #[must_use]
    pub fn identity(&self) -> (String, String) {
        (normalize_for_identity(&self.title), normalize_for_identity(&self.artist))
    }

    /// Returns the search query used to resolve this candidate.
    #[must_use]
    pub fn search_query(&self) -> String {
        format!("{} {} official", self.artist, self.title)
    }
}

impl fmt::Display for SongCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\" by {}", self.title, self.artist)
    }
}

/// Returns true when both fields are longer than [`MIN_FIELD_CHARS`].
pub(crate) fn fields_long_enough(title: &str, artist: &str) -> bool {
    title.chars().count() > MIN_FIELD_CHARS && artist.chars().count() > MIN_FIELD_CHARS
}

fn normalize_for_identity(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_ignores_case_and_spacing() {
        let a = SongCandidate::new("Master  of Puppets", "Metallica", "");
        let b = SongCandidate::new("master of puppets", "METALLICA", "");
        assert_eq!(a.identity(), b.identity());
    }

    #[test]
    fn test_search_query_shape() {
        let candidate = SongCandidate::new("Hurt", "Johnny Cash", "");
        assert_eq!(candidate.search_query(), "Johnny Cash Hurt official");
    }

    #[test]
    fn test_fields_long_enough_boundary() {
        assert!(!fields_long_enough("Up", "Metallica"));
        assert!(fields_long_enough("One", "Metallica"));
        assert!(!fields_long_enough("Hurt", "U2"));
        assert!(fields_long_enough("Hurt", "ABC"));
    }

    #[test]
    fn test_display() {
        let candidate = SongCandidate::new("Hurt", "Johnny Cash", "");
        assert_eq!(candidate.to_string(), "\"Hurt\" by Johnny Cash");
    }
}
