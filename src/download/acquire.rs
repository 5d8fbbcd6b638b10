//! Idempotent, space-guarded acquisition of resolved tracks.
//!
//! # Concurrency Model
//!
//! - A semaphore bounds concurrent transfers
//! - Duplicate media ids in one batch are collapsed before any task starts
//! - Workers only transfer; every ledger write happens in the collecting task

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, info, instrument, warn};

use crate::retry::{RetryError, RetryExecutor, RetryPolicy};
use crate::search::ResolvedTrack;

use super::transfer::verify_output;
use super::{AcquireError, DownloadError, DownloadLedger, TrackTransfer};

/// Size assumed for a track whose size is unknown (50 MiB).
pub const DEFAULT_REQUIRED_BYTES: u64 = 50 * 1024 * 1024;

/// Minimum allowed concurrency.
pub const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency.
pub const MAX_CONCURRENCY: usize = 8;

/// Default number of concurrent transfers.
pub const DEFAULT_CONCURRENCY: usize = 3;

/// What happened to a track that was acquired successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// The ledger already listed the media id; nothing was transferred.
    AlreadyPresent,
    /// The track was transferred and recorded.
    Downloaded {
        /// Written file.
        path: PathBuf,
    },
}

/// Per-track result of a batch.
#[derive(Debug)]
pub struct AcquireReport {
    /// The track.
    pub track: ResolvedTrack,
    /// Outcome or terminal error.
    pub result: Result<AcquireOutcome, AcquireError>,
}

type Finished = (usize, ResolvedTrack, Result<PathBuf, AcquireError>);

/// Downloads tracks at most once each, recording them in the ledger.
pub struct Acquirer {
    ledger: Mutex<DownloadLedger>,
    destination: PathBuf,
    transfer: Arc<dyn TrackTransfer>,
    executor: RetryExecutor,
    policy: RetryPolicy,
    concurrency: usize,
}

impl Acquirer {
    /// Creates an acquirer writing into the ledger's directory.
    #[must_use]
    pub fn new(ledger: DownloadLedger, transfer: Arc<dyn TrackTransfer>) -> Self {
        let destination = ledger.dir().to_path_buf();
        Self {
            ledger: Mutex::new(ledger),
            destination,
            transfer,
            executor: RetryExecutor::new(),
            policy: RetryPolicy::download(),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Overrides the retry policy around each transfer.
    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the number of concurrent transfers, clamped to 1..=8.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.clamp(MIN_CONCURRENCY, MAX_CONCURRENCY);
        self
    }

    /// Returns the concurrency limit.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Returns the directory tracks are written to.
    #[must_use]
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Returns true if `media_id` is already recorded.
    #[must_use]
    pub fn is_downloaded(&self, media_id: &str) -> bool {
        self.lock_ledger().is_downloaded(media_id)
    }

    /// Returns the number of recorded downloads.
    #[must_use]
    pub fn downloaded_count(&self) -> usize {
        self.lock_ledger().len()
    }

    /// Acquires one track.
    ///
    /// A track already in the ledger succeeds without a transfer.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError::InsufficientSpace`] before any transfer when the
    /// volume is too full, [`AcquireError::Transfer`] when the transfer fails
    /// under the download retry policy, and [`AcquireError::Ledger`] when the
    /// file was written but could not be recorded.
    #[instrument(skip(self, track), fields(media_id = %track.media_id, title = %track.title))]
    pub async fn acquire(&self, track: &ResolvedTrack) -> Result<AcquireOutcome, AcquireError> {
        if self.is_downloaded(&track.media_id) {
            info!("Already downloaded; skipping transfer");
            return Ok(AcquireOutcome::AlreadyPresent);
        }
        self.check_space(track)?;

        let path = run_transfer(
            self.transfer.as_ref(),
            self.executor,
            &self.policy,
            track,
            &self.destination,
        )
        .await?;
        self.record(track, path)
    }

    /// Acquires a batch with bounded concurrency.
    ///
    /// `on_report` is called once per unique track as results arrive.
    /// Reports are returned in input order, with duplicates collapsed.
    #[instrument(skip(self, tracks, on_report), fields(count = tracks.len(), concurrency = self.concurrency))]
    pub async fn acquire_all(
        &self,
        tracks: Vec<ResolvedTrack>,
        mut on_report: impl FnMut(&AcquireReport),
    ) -> Vec<AcquireReport> {
        let mut seen = HashSet::new();
        let unique: Vec<ResolvedTrack> = tracks
            .into_iter()
            .filter(|track| seen.insert(track.media_id.clone()))
            .collect();

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let (tx, mut rx) = mpsc::unbounded_channel::<Finished>();
        let mut slots: Vec<Option<AcquireReport>> = Vec::with_capacity(unique.len());
        let mut handles = Vec::new();

        for (index, track) in unique.into_iter().enumerate() {
            slots.push(None);

            if self.is_downloaded(&track.media_id) {
                debug!(media_id = %track.media_id, "Already downloaded; skipping transfer");
                let report = AcquireReport {
                    track,
                    result: Ok(AcquireOutcome::AlreadyPresent),
                };
                on_report(&report);
                slots[index] = Some(report);
                continue;
            }
            if let Err(error) = self.check_space(&track) {
                let report = AcquireReport {
                    track,
                    result: Err(error),
                };
                on_report(&report);
                slots[index] = Some(report);
                continue;
            }

            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                let report = AcquireReport {
                    result: Err(AcquireError::TaskFailed {
                        title: track.title.clone(),
                        reason: "worker pool closed".to_string(),
                    }),
                    track,
                };
                on_report(&report);
                slots[index] = Some(report);
                continue;
            };

            let tx = tx.clone();
            let transfer = Arc::clone(&self.transfer);
            let policy = self.policy.clone();
            let executor = self.executor;
            let destination = self.destination.clone();
            let task_track = track.clone();
            handles.push((
                index,
                track,
                tokio::spawn(async move {
                    let _permit = permit;
                    let result = run_transfer(
                        transfer.as_ref(),
                        executor,
                        &policy,
                        &task_track,
                        &destination,
                    )
                    .await
                    .map_err(AcquireError::from);
                    let _ = tx.send((index, task_track, result));
                }),
            ));

            while let Ok(finished) = rx.try_recv() {
                self.collect(finished, &mut slots, &mut on_report);
            }
        }

        drop(tx);
        while let Some(finished) = rx.recv().await {
            self.collect(finished, &mut slots, &mut on_report);
        }

        for (index, track, handle) in handles {
            if let Err(error) = handle.await {
                warn!(media_id = %track.media_id, error = %error, "download task panicked");
                if slots[index].is_none() {
                    let report = AcquireReport {
                        result: Err(AcquireError::TaskFailed {
                            title: track.title.clone(),
                            reason: error.to_string(),
                        }),
                        track,
                    };
                    on_report(&report);
                    slots[index] = Some(report);
                }
            }
        }

        let reports: Vec<AcquireReport> = slots.into_iter().flatten().collect();
        let downloaded = reports
            .iter()
            .filter(|r| matches!(r.result, Ok(AcquireOutcome::Downloaded { .. })))
            .count();
        let failed = reports.iter().filter(|r| r.result.is_err()).count();
        info!(
            downloaded,
            failed,
            skipped = reports.len() - downloaded - failed,
            "batch acquisition complete"
        );
        reports
    }

    fn collect(
        &self,
        (index, track, result): Finished,
        slots: &mut [Option<AcquireReport>],
        on_report: &mut impl FnMut(&AcquireReport),
    ) {
        let result = result.and_then(|path| self.record(&track, path));
        let report = AcquireReport { track, result };
        on_report(&report);
        slots[index] = Some(report);
    }

    fn check_space(&self, track: &ResolvedTrack) -> Result<(), AcquireError> {
        let required_bytes = track.estimated_size_bytes.unwrap_or(DEFAULT_REQUIRED_BYTES);
        let ledger = self.lock_ledger();
        if ledger.has_sufficient_space(required_bytes) {
            return Ok(());
        }
        Err(AcquireError::InsufficientSpace {
            title: track.title.clone(),
            required_bytes,
            available_bytes: ledger.available_bytes(),
        })
    }

    fn record(&self, track: &ResolvedTrack, path: PathBuf) -> Result<AcquireOutcome, AcquireError> {
        self.lock_ledger()
            .mark_downloaded(&track.media_id)
            .map_err(|source| AcquireError::Ledger {
                title: track.title.clone(),
                source,
            })?;
        info!(media_id = %track.media_id, path = %path.display(), "download completed");
        Ok(AcquireOutcome::Downloaded { path })
    }

    fn lock_ledger(&self) -> std::sync::MutexGuard<'_, DownloadLedger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Acquirer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Acquirer")
            .field("destination", &self.destination)
            .field("concurrency", &self.concurrency)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

async fn run_transfer(
    transfer: &dyn TrackTransfer,
    executor: RetryExecutor,
    policy: &RetryPolicy,
    track: &ResolvedTrack,
    destination: &Path,
) -> Result<PathBuf, RetryError<DownloadError>> {
    let operation = format!("download \"{}\"", track.title);
    executor
        .execute(&operation, policy, move || async move {
            let path = transfer.transfer(track, destination).await?;
            verify_output(&path, &track.title).await?;
            Ok::<PathBuf, DownloadError>(path)
        })
        .await
}
