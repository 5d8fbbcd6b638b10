//! Human-readable output on stdout.

use mixhound_core::download::{AcquireOutcome, AcquireReport};
use mixhound_core::provider::ProviderDescriptor;
use mixhound_core::{ResolvedTrack, Unresolved};

const NOT_AVAILABLE: &str = "N/A";

pub(crate) fn format_track(rank: usize, track: &ResolvedTrack) -> String {
    format!(
        "{rank:>2}. {track}\n    genre: {} | quality: {} | {}",
        track.genre_label(),
        track.audio_quality.as_deref().unwrap_or(NOT_AVAILABLE),
        track.url()
    )
}

pub(crate) fn print_tracks(tracks: &[ResolvedTrack]) {
    for (index, track) in tracks.iter().enumerate() {
        println!("{}", format_track(index + 1, track));
    }
}

pub(crate) fn print_unresolved(unresolved: &[Unresolved]) {
    if unresolved.is_empty() {
        return;
    }
    println!("\nNot found ({}):", unresolved.len());
    for item in unresolved {
        println!("  - {} ({})", item.candidate, item.reason);
    }
}

/// Counts of a finished batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DownloadTally {
    pub(crate) downloaded: usize,
    pub(crate) already_present: usize,
    pub(crate) failed: usize,
}

pub(crate) fn tally(reports: &[AcquireReport]) -> DownloadTally {
    let mut tally = DownloadTally::default();
    for report in reports {
        match &report.result {
            Ok(AcquireOutcome::Downloaded { .. }) => tally.downloaded += 1,
            Ok(AcquireOutcome::AlreadyPresent) => tally.already_present += 1,
            Err(_) => tally.failed += 1,
        }
    }
    tally
}

pub(crate) fn print_download_summary(reports: &[AcquireReport]) -> DownloadTally {
    for report in reports {
        match &report.result {
            Ok(AcquireOutcome::Downloaded { path }) => {
                println!("  saved  {}", path.display());
            }
            Ok(AcquireOutcome::AlreadyPresent) => {}
            Err(error) => println!("  failed {}: {error}", report.track),
        }
    }
    let tally = tally(reports);
    println!(
        "Downloads: {} new, {} already present, {} failed",
        tally.downloaded, tally.already_present, tally.failed
    );
    tally
}

pub(crate) fn format_provider(descriptor: &ProviderDescriptor) -> String {
    let state = if descriptor.available {
        "available"
    } else {
        "unavailable"
    };
    let mut line = format!("{:<12} {state}", descriptor.name);
    if let Some(status) = &descriptor.status
        && status.attempts > 0
    {
        line.push_str(&format!(
            " ({} ok / {} failed, ~${:.4})",
            status.successes, status.failures, status.estimated_cost_usd
        ));
    }
    if !descriptor.available {
        line.push_str(&format!("\n             {}", descriptor.setup_hint));
    }
    line
}

#[allow(clippy::cast_precision_loss)]
pub(crate) fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
