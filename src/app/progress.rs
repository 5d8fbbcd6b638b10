//! Progress bar for batch downloads.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use mixhound_core::download::{AcquireOutcome, AcquireReport};

/// Creates a bar for `total` downloads, hidden when `enabled` is false.
pub(crate) fn download_bar(total: usize, enabled: bool) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(total as u64);
    bar.set_style(
        ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

/// Advances the bar for one finished download.
pub(crate) fn record(bar: &ProgressBar, report: &AcquireReport) {
    let status = match &report.result {
        Ok(AcquireOutcome::Downloaded { .. }) => "downloaded",
        Ok(AcquireOutcome::AlreadyPresent) => "already present",
        Err(_) => "failed",
    };
    bar.set_message(format!("{status}: {}", report.track));
    bar.inc(1);
}
