//! Downloaded-items ledger, space guard and track acquisition.
//!
//! # Features
//!
//! - Append-only ledger of media ids, persisted as versioned JSON
//! - Free-space guard requiring 1.5 x the expected file size
//! - Retried, idempotent transfers through a pluggable [`TrackTransfer`]
//! - Bounded-concurrency batch acquisition with a single ledger writer
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use mixhound_core::download::{Acquirer, DownloadLedger, YtDlpTransfer};
//!
//! # async fn example(track: mixhound_core::ResolvedTrack) -> Result<(), Box<dyn std::error::Error>> {
//! let ledger = DownloadLedger::open("/home/me/Music/mixhound")?;
//! let acquirer = Acquirer::new(ledger, Arc::new(YtDlpTransfer::new("yt-dlp")));
//! let outcome = acquirer.acquire(&track).await?;
//! println!("{outcome:?}");
//! # Ok(())
//! # }
//! ```

mod acquire;
mod error;
mod filename;
mod ledger;
mod space;
mod transfer;

pub use acquire::{
    AcquireOutcome, AcquireReport, Acquirer, DEFAULT_CONCURRENCY, DEFAULT_REQUIRED_BYTES,
    MAX_CONCURRENCY, MIN_CONCURRENCY,
};
pub use error::{AcquireError, DownloadError};
pub use filename::track_file_stem;
pub use ledger::{DownloadLedger, LEDGER_FILE_NAME};
pub use space::{SpaceProbe, VolumeSpaceProbe, has_sufficient_space};
pub use transfer::{
    DEFAULT_AUDIO_FORMAT, DEFAULT_AUDIO_QUALITY, TrackTransfer, YtDlpTransfer, verify_output,
};

use std::io;
use std::sync::Arc;

use crate::config::Configuration;

/// Builds an acquirer for the configured music directory.
///
/// # Errors
///
/// Returns an error if the music directory or its ledger cannot be opened.
pub fn build_default_acquirer(config: &Configuration) -> io::Result<Acquirer> {
    let ledger = DownloadLedger::open(&config.music_dir)?;
    let transfer = YtDlpTransfer::new(&config.ytdlp_path)
        .with_audio(&config.audio_format, &config.audio_quality);
    Ok(Acquirer::new(ledger, Arc::new(transfer)).with_concurrency(config.concurrency))
}
