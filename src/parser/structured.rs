//! JSON-shaped recommendation output.
//!
//! Some providers answer with `{"recommendations": [{"artist": ..., "title": ...}]}`,
//! sometimes wrapped in prose or a code fence. The outermost braces are
//! extracted and decoded; anything that does not fit returns `None` so line
//! matching can take over.

use serde::Deserialize;

use super::SongCandidate;
use super::matchers::{clean_artist, clean_title};

#[derive(Debug, Deserialize)]
struct RecommendationsDocument {
    recommendations: Vec<JsonRecommendation>,
}

#[derive(Debug, Deserialize)]
struct JsonRecommendation {
    #[serde(default)]
    title: String,
    #[serde(default)]
    artist: String,
    #[serde(default)]
    genre: Option<String>,
    #[serde(default)]
    mood_match: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

/// Decodes a JSON recommendations document embedded in `raw`.
///
/// Returns `None` when no decodable document is present.
pub(crate) fn parse_structured(raw: &str) -> Option<Vec<SongCandidate>> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }
    let document: RecommendationsDocument = serde_json::from_str(&raw[start..=end]).ok()?;

    Some(
        document
            .recommendations
            .into_iter()
            .map(|rec| {
                let source_text = format!("{} - {}", rec.title, rec.artist);
                SongCandidate {
                    title: clean_title(&rec.title),
                    artist: clean_artist(&rec.artist),
                    genre: non_empty(rec.genre),
                    reason: non_empty(rec.description).or_else(|| non_empty(rec.mood_match)),
                    source_text,
                }
            })
            .collect(),
    )
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_structured_in_code_fence() {
        let raw = r#"Sure!
```json
{"recommendations": [
  {"artist": "Nick Drake", "title": "Pink Moon", "genre": "folk", "mood_match": "quiet", "description": "sparse guitar"}
]}
```"#;
        let candidates = parse_structured(raw).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].title, "Pink Moon");
        assert_eq!(candidates[0].artist, "Nick Drake");
        assert_eq!(candidates[0].genre.as_deref(), Some("folk"));
        assert_eq!(candidates[0].reason.as_deref(), Some("sparse guitar"));
    }

    #[test]
    fn test_parse_structured_rejects_other_json() {
        assert!(parse_structured(r#"{"songs": []}"#).is_none());
        assert!(parse_structured("no json here").is_none());
        assert!(parse_structured("} backwards {").is_none());
    }

    #[test]
    fn test_fields_are_cleaned_like_lines() {
        let raw = r#"{"recommendations":[{"title":"\"Hurt\"","artist":"**Johnny Cash** (Live)"}]}"#;
        let candidates = parse_structured(raw).unwrap();
        assert_eq!(candidates[0].title, "Hurt");
        assert_eq!(candidates[0].artist, "Johnny Cash");
    }

    #[test]
    fn test_mood_match_used_when_description_missing() {
        let raw = r#"{"recommendations":[{"artist":"Low","title":"Words","mood_match":"slow"}]}"#;
        let candidates = parse_structured(raw).unwrap();
        assert_eq!(candidates[0].reason.as_deref(), Some("slow"));
        assert!(candidates[0].genre.is_none());
    }
}
