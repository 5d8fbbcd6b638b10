//! Prompt text sent to providers and post-processing of mood answers.

/// Number of songs requested per recommendation prompt.
pub const DEFAULT_SONG_COUNT: usize = 5;

/// Maximum mood labels kept from an answer.
pub const MAX_MOOD_LABELS: usize = 5;

/// Builds the recommendation prompt for a user request.
#[must_use]
pub fn recommendation_prompt(request: &str) -> String {
    format!(
        "Recommend {DEFAULT_SONG_COUNT} songs that fit this request: \"{}\".\n\
         Answer with a numbered list, one song per entry, exactly in this form:\n\
         1. \"Song Title\" by Artist\n\
         Genre: genre of the song\n\
         Reason: one short sentence on why it fits\n\
         Only recommend songs that really exist. Do not add any other text.",
        request.trim()
    )
}

/// Builds the mood-analysis prompt for a piece of text.
#[must_use]
pub fn mood_prompt(text: &str) -> String {
    format!(
        "Describe the mood of the following text with at most {MAX_MOOD_LABELS} single-word \
         labels, comma separated, nothing else.\n\n{}",
        text.trim()
    )
}

/// Splits a mood answer into lowercase, deduplicated labels.
#[must_use]
pub fn split_mood_labels(raw: &str) -> Vec<String> {
    let mut labels: Vec<String> = Vec::new();
    for piece in raw.split([',', '\n', ';']) {
        let label = piece
            .trim()
            .trim_start_matches(|c: char| c.is_ascii_digit() || matches!(c, '.' | ')' | '-' | '*'))
            .trim()
            .trim_end_matches('.')
            .to_lowercase();
        if label.is_empty() || labels.contains(&label) {
            continue;
        }
        labels.push(label);
        if labels.len() == MAX_MOOD_LABELS {
            break;
        }
    }
    labels
}
