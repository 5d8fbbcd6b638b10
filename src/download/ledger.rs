//! Persistent record of media ids already downloaded.
//!
//! The ledger lives next to the music files as `.downloaded.json`:
//!
//! ```json
//! {"version": 1, "media_ids": ["abc123", "def456"]}
//! ```
//!
//! Ledgers written as a bare JSON array are read transparently and upgraded
//! on the next write.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::persist::write_atomic;

use super::space::{SpaceProbe, VolumeSpaceProbe, has_sufficient_space};

/// Ledger file name inside the music directory.
pub const LEDGER_FILE_NAME: &str = ".downloaded.json";

const LEDGER_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct LedgerDocument {
    version: u32,
    media_ids: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredLedger {
    Versioned(LedgerDocument),
    Legacy(Vec<String>),
}

/// Append-only set of downloaded media ids.
pub struct DownloadLedger {
    dir: PathBuf,
    path: PathBuf,
    order: Vec<String>,
    known: HashSet<String>,
    probe: Arc<dyn SpaceProbe>,
}

impl DownloadLedger {
    /// Opens (or creates) the ledger in `dir`, probing the real volume for space.
    ///
    /// # Errors
    ///
    /// Returns an error if `dir` cannot be created, the ledger cannot be read,
    /// or its contents are not a ledger.
    pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        Self::with_probe(dir, Arc::new(VolumeSpaceProbe))
    }

    /// Opens the ledger with a custom space probe.
    ///
    /// # Errors
    ///
    /// See [`DownloadLedger::open`].
    pub fn with_probe(dir: impl Into<PathBuf>, probe: Arc<dyn SpaceProbe>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let path = dir.join(LEDGER_FILE_NAME);

        let order = match fs::read(&path) {
            Ok(bytes) => parse_ledger(&bytes).map_err(|e| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("{} is not a download ledger: {e}", path.display()),
                )
            })?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e),
        };

        let mut known = HashSet::with_capacity(order.len());
        let order: Vec<String> = order.into_iter().filter(|id| known.insert(id.clone())).collect();
        debug!(path = %path.display(), entries = order.len(), "Opened download ledger");

        Ok(Self {
            dir,
            path,
            order,
            known,
            probe,
        })
    }

    /// Returns the ledger file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the directory downloads are written to.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the number of recorded media ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns true if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Returns true if `media_id` was downloaded before.
    #[must_use]
    pub fn is_downloaded(&self, media_id: &str) -> bool {
        self.known.contains(media_id)
    }

    /// Records `media_id` and persists the ledger.
    ///
    /// Returns `false` without writing when the id is already recorded.
    ///
    /// # Errors
    ///
    /// Returns the write error; the in-memory entry is rolled back so the
    /// ledger never claims more than is on disk.
    pub fn mark_downloaded(&mut self, media_id: &str) -> io::Result<bool> {
        if !self.known.insert(media_id.to_string()) {
            return Ok(false);
        }
        self.order.push(media_id.to_string());

        if let Err(error) = self.save() {
            self.order.pop();
            self.known.remove(media_id);
            return Err(error);
        }
        Ok(true)
    }

    /// Returns the free bytes in the music directory, or `None` if the probe failed.
    #[must_use]
    pub fn available_bytes(&self) -> Option<u64> {
        match self.probe.available_bytes(&self.dir) {
            Ok(bytes) => Some(bytes),
            Err(error) => {
                warn!(dir = %self.dir.display(), error = %error, "Could not read free space");
                None
            }
        }
    }

    /// Returns true if the music directory has at least 1.5 x `required_bytes` free.
    ///
    /// An unreadable volume counts as insufficient.
    #[must_use]
    pub fn has_sufficient_space(&self, required_bytes: u64) -> bool {
        self.available_bytes()
            .is_some_and(|available| has_sufficient_space(available, required_bytes))
    }

    fn save(&self) -> io::Result<()> {
        let document = LedgerDocument {
            version: LEDGER_VERSION,
            media_ids: self.order.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&document)?;
        write_atomic(&self.path, &bytes)
    }
}

impl std::fmt::Debug for DownloadLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadLedger")
            .field("path", &self.path)
            .field("entries", &self.order.len())
            .finish_non_exhaustive()
    }
}

fn parse_ledger(bytes: &[u8]) -> Result<Vec<String>, serde_json::Error> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    Ok(match serde_json::from_slice::<StoredLedger>(bytes)? {
        StoredLedger::Versioned(document) => document.media_ids,
        StoredLedger::Legacy(ids) => ids,
    })
}
