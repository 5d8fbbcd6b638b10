//! Metadata derivation shared by both search tiers.
//!
//! Durations, genres, artist names and audio quality are all best-effort:
//! anything that cannot be derived is left unknown rather than guessed.

use std::sync::LazyLock;

use regex::Regex;

/// Rendering of an unknown duration.
pub const UNKNOWN_DURATION: &str = "--:--";

/// Fallback artist when nothing better is available.
pub const UNKNOWN_ARTIST: &str = "Unknown artist";

/// Maximum tags kept per track.
pub const MAX_TAGS: usize = 3;

/// Closed genre vocabulary, most specific entries first.
const GENRE_VOCABULARY: &[&str] = &[
    "singer-songwriter",
    "folk-rock",
    "hip hop",
    "alternative",
    "electronic",
    "classical",
    "acoustic",
    "chanson",
    "country",
    "reggae",
    "blues",
    "indie",
    "metal",
    "funk",
    "folk",
    "jazz",
    "punk",
    "rock",
    "soul",
    "pop",
    "rap",
];

/// Context words that suggest a genre when no vocabulary term matches.
const CONTEXT_HINTS: &[(&str, &str)] = &[
    ("concert", "live"),
    ("koncert", "live"),
    ("live", "live"),
    ("unplugged", "acoustic"),
    ("acoustic", "acoustic"),
    ("songwriter", "folk"),
    ("písničkář", "folk"),
    ("folk", "folk"),
];

#[allow(clippy::expect_used)]
static ISO_DURATION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^P(?:(?P<days>\d+)D)?(?:T(?:(?P<hours>\d+)H)?(?:(?P<minutes>\d+)M)?(?:(?P<seconds>\d+)S)?)?$")
        .expect("ISO-8601 duration regex is valid")
});

/// Parses an ISO-8601 duration such as `PT3M24S` into seconds.
///
/// Returns `None` for anything that is not a duration with at least one component.
#[must_use]
pub fn parse_iso8601_duration(value: &str) -> Option<u64> {
    let captures = ISO_DURATION_PATTERN.captures(value.trim())?;
    let component = |name: &str, scale: u64| -> Option<Option<u64>> {
        captures
            .name(name)
            .map(|m| m.as_str().parse::<u64>().ok().and_then(|n| n.checked_mul(scale)))
    };

    let mut total = 0u64;
    let mut seen = false;
    for (name, scale) in [("days", 86_400), ("hours", 3600), ("minutes", 60), ("seconds", 1)] {
        if let Some(parsed) = component(name, scale) {
            total = total.checked_add(parsed?)?;
            seen = true;
        }
    }
    seen.then_some(total)
}

/// Renders seconds as `M:SS`, or `H:MM:SS` from one hour up.
#[must_use]
pub fn format_duration(seconds: Option<u64>) -> String {
    let Some(seconds) = seconds else {
        return UNKNOWN_DURATION.to_string();
    };
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes}:{secs:02}")
    }
}

/// Derives a genre label from an explicit genre, tags, or description.
///
/// Order: explicit value, exact tag match, vocabulary term inside a tag,
/// vocabulary term in the description, then context hints. Terms match on
/// word boundaries so `rap` does not fire on `trap` or `wrap`.
#[must_use]
pub fn derive_genre(explicit: Option<&str>, tags: &[String], description: &str) -> Option<String> {
    if let Some(genre) = explicit.map(str::trim).filter(|g| !g.is_empty()) {
        return Some(genre.to_lowercase());
    }

    let lowered_tags: Vec<String> = tags.iter().map(|tag| tag.trim().to_lowercase()).collect();

    for tag in &lowered_tags {
        if GENRE_VOCABULARY.contains(&tag.as_str()) {
            return Some(tag.clone());
        }
    }

    for tag in &lowered_tags {
        if let Some(genre) = GENRE_VOCABULARY.iter().find(|genre| contains_term(tag, genre)) {
            return Some((*genre).to_string());
        }
    }

    let description = description.to_lowercase();
    if let Some(genre) = GENRE_VOCABULARY
        .iter()
        .find(|genre| contains_term(&description, genre))
    {
        return Some((*genre).to_string());
    }

    CONTEXT_HINTS
        .iter()
        .find(|(word, _)| {
            lowered_tags.iter().any(|tag| contains_term(tag, word)) || contains_term(&description, word)
        })
        .map(|(_, genre)| (*genre).to_string())
}

/// Returns true if `term` occurs in `haystack` with no letter or digit on either side.
fn contains_term(haystack: &str, term: &str) -> bool {
    haystack.match_indices(term).any(|(start, matched)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + matched.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

/// Picks an artist and title for a search result.
///
/// Uses the explicit artist, then the uploader/channel (without a `- Topic`
/// suffix), then an `Artist - Title` split of the title.
#[must_use]
pub fn derive_artist_and_title(
    explicit_artist: Option<&str>,
    channel: Option<&str>,
    title: &str,
) -> (String, String) {
    let title = title.trim();
    if let Some(artist) = explicit_artist.map(str::trim).filter(|a| !a.is_empty()) {
        return (artist.to_string(), title.to_string());
    }
    if let Some(channel) = channel.map(str::trim).filter(|c| !c.is_empty()) {
        let artist = channel.strip_suffix("- Topic").map_or(channel, str::trim);
        return (artist.to_string(), title.to_string());
    }
    if let Some((artist, rest)) = title.split_once(" - ")
        && !artist.trim().is_empty()
        && !rest.trim().is_empty()
    {
        return (artist.trim().to_string(), rest.trim().to_string());
    }
    (UNKNOWN_ARTIST.to_string(), title.to_string())
}

/// Audio-only stream description from an extractor.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize)]
pub struct FormatInfo {
    /// Video codec, `"none"` for audio-only streams.
    #[serde(default)]
    pub vcodec: Option<String>,
    /// Audio codec, `"none"` for video-only streams.
    #[serde(default)]
    pub acodec: Option<String>,
    /// Average audio bitrate in kbit/s.
    #[serde(default)]
    pub abr: Option<f64>,
    /// Audio sampling rate in Hz.
    #[serde(default)]
    pub asr: Option<u64>,
    /// Container extension.
    #[serde(default)]
    pub ext: Option<String>,
}

/// Describes the best audio-only stream as `(quality, format)`.
///
/// Quality renders as `"{abr}k/{asr}Hz"`; both are `None` when no audio-only
/// stream with a bitrate is listed.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn best_audio_quality(formats: &[FormatInfo]) -> (Option<String>, Option<String>) {
    let best = formats
        .iter()
        .filter(|f| f.vcodec.as_deref() == Some("none"))
        .filter(|f| f.acodec.as_deref().is_some_and(|codec| codec != "none"))
        .filter(|f| f.abr.is_some_and(|abr| abr > 0.0))
        .max_by(|a, b| a.abr.unwrap_or(0.0).total_cmp(&b.abr.unwrap_or(0.0)));

    let Some(best) = best else {
        return (None, None);
    };
    let abr = best.abr.unwrap_or(0.0).round() as u64;
    let quality = match best.asr {
        Some(asr) => format!("{abr}k/{asr}Hz"),
        None => format!("{abr}k"),
    };
    (Some(quality), best.ext.clone())
}

/// Decodes the handful of HTML entities the search API puts in titles.
#[must_use]
pub fn unescape_html(value: &str) -> String {
    value
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#039;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
