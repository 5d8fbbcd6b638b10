//! File naming for downloaded tracks.

use std::path::{Component, Path};

use crate::search::ResolvedTrack;

/// Longest file stem, in characters.
const MAX_STEM_CHARS: usize = 120;

/// Returns a safe file stem `Artist - Title` for `track`.
///
/// Falls back to the media id when nothing printable is left.
#[must_use]
pub fn track_file_stem(track: &ResolvedTrack) -> String {
    let stem = sanitize_filename(&format!("{} - {}", track.artist.trim(), track.title.trim()));
    let stem: String = stem.chars().take(MAX_STEM_CHARS).collect();
    let stem = stem.trim().trim_matches('.').to_string();
    if stem.trim_matches(|c: char| c == '_' || c == '-' || c.is_whitespace()).is_empty() {
        return sanitize_filename(&track.media_id);
    }
    stem
}

/// Replaces characters that are invalid on common file systems.
pub(crate) fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if sanitized.is_empty() {
        return "_".to_string();
    }
    if is_safe_filename_segment(&sanitized) {
        sanitized
    } else {
        sanitized.replace('.', "_")
    }
}

fn is_safe_filename_segment(name: &str) -> bool {
    !Path::new(name).components().any(|component| {
        matches!(
            component,
            Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}
