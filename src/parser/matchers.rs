//! Line matchers for free-text recommendation output.
//!
//! Matchers are tried in a fixed order and the first match wins. Each one
//! returns the raw title and artist text; cleanup happens in [`clean_title`]
//! and [`clean_artist`].

use std::sync::LazyLock;

use regex::Regex;

/// Which line shape produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatcherKind {
    /// `"Title" od Artist`
    QuotedOd,
    /// `"Title" by Artist`
    QuotedBy,
    /// `Title od Artist`
    BareOd,
    /// `Title - Artist`
    Dash,
    /// `Title by Artist`
    By,
}

/// A successful line match before cleanup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineMatch {
    /// Which matcher fired.
    pub kind: MatcherKind,
    /// Raw title text.
    pub title: String,
    /// Raw artist text, possibly with trailing qualifiers.
    pub artist: String,
}

/// A follow-up line that annotates the previous candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Annotation {
    /// `Genre: ...` / `Žánr: ...`
    Genre(String),
    /// `Reason: ...` / `Důvod: ...` / `Description: ...`
    Reason(String),
}

#[allow(clippy::expect_used)]
static LIST_PREFIX_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:\d{1,3}[.)]|[-*•])\s*").expect("list prefix regex is valid")
});

#[allow(clippy::expect_used)]
static QUOTED_OD_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)^["“„](?P<title>[^"“”„]+)["“”]\s+od\s+(?P<artist>.+)$"#)
        .expect("quoted od regex is valid")
});

#[allow(clippy::expect_used)]
static QUOTED_BY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)^["“„](?P<title>[^"“”„]+)["“”]\s+by\s+(?P<artist>.+)$"#)
        .expect("quoted by regex is valid")
});

#[allow(clippy::expect_used)]
static BARE_OD_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?P<title>.+?)\s+od\s+(?P<artist>.+)$").expect("bare od regex is valid")
});

#[allow(clippy::expect_used)]
static DASH_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<title>.+?)\s+[-–—]\s+(?P<artist>.+)$").expect("dash regex is valid")
});

#[allow(clippy::expect_used)]
static BY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?P<title>.+?)\s+by\s+(?P<artist>.+)$").expect("by regex is valid")
});

#[allow(clippy::expect_used)]
static GENRE_LINE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:genre|žánr|zanr)\s*:\s*(?P<value>.+)$").expect("genre line regex is valid")
});

#[allow(clippy::expect_used)]
static REASON_LINE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:reason|důvod|duvod|description|popis|why)\s*:\s*(?P<value>.+)$")
        .expect("reason line regex is valid")
});

#[allow(clippy::expect_used)]
static TRAILING_DASH_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s[-–—]").expect("trailing dash regex is valid"));

/// Ordered matcher table. Earlier entries take priority.
static MATCHERS: [(MatcherKind, &LazyLock<Regex>); 5] = [
    (MatcherKind::QuotedOd, &QUOTED_OD_PATTERN),
    (MatcherKind::QuotedBy, &QUOTED_BY_PATTERN),
    (MatcherKind::BareOd, &BARE_OD_PATTERN),
    (MatcherKind::Dash, &DASH_PATTERN),
    (MatcherKind::By, &BY_PATTERN),
];

/// Strips list numbering/bullets and markdown emphasis from a line.
#[must_use]
pub fn normalize_line(line: &str) -> String {
    let without_emphasis = line.replace("**", "").replace("__", "");
    LIST_PREFIX_PATTERN
        .replace(without_emphasis.trim(), "")
        .trim()
        .to_string()
}

/// Runs the matcher table against a normalized line.
#[must_use]
pub fn match_line(line: &str) -> Option<LineMatch> {
    MATCHERS.iter().find_map(|(kind, pattern)| {
        pattern.captures(line).map(|captures| LineMatch {
            kind: *kind,
            title: captures["title"].to_string(),
            artist: captures["artist"].to_string(),
        })
    })
}

/// Recognizes `Genre:` / `Reason:` style follow-up lines.
#[must_use]
pub fn match_annotation(line: &str) -> Option<Annotation> {
    if let Some(captures) = GENRE_LINE_PATTERN.captures(line) {
        let value = clean_field(&captures["value"]);
        return (!value.is_empty()).then_some(Annotation::Genre(value));
    }
    if let Some(captures) = REASON_LINE_PATTERN.captures(line) {
        let value = captures["value"].trim().to_string();
        return (!value.is_empty()).then_some(Annotation::Reason(value));
    }
    None
}

/// Removes surrounding quotes, emphasis and trailing punctuation from a title.
#[must_use]
pub fn clean_title(raw: &str) -> String {
    clean_field(raw)
}

/// Cleans an artist and cuts off trailing qualifiers such as `(Live)` or
/// `- Remastered`.
///
/// A dash only ends the artist when whitespace precedes it, so hyphenated
/// names like `Jay-Z` stay intact.
#[must_use]
pub fn clean_artist(raw: &str) -> String {
    let mut end = raw.len();
    if let Some(paren) = raw.find('(') {
        end = end.min(paren);
    }
    if let Some(dash) = TRAILING_DASH_PATTERN.find(raw) {
        end = end.min(dash.start());
    }
    clean_field(&raw[..end])
}

fn clean_field(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c: char| matches!(c, '"' | '“' | '”' | '„' | '*' | '_' | '`'))
        .trim_end_matches(|c: char| matches!(c, ',' | '.' | ';' | ':'))
        .trim()
        .to_string()
}
