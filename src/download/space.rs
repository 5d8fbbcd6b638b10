//! Free-space probing for the music directory.

use std::io;
use std::path::Path;

/// Reports free bytes on the volume holding a path.
pub trait SpaceProbe: Send + Sync {
    /// Returns the bytes available to the current user at `path`.
    ///
    /// # Errors
    ///
    /// Returns the underlying OS error when the volume cannot be queried.
    fn available_bytes(&self, path: &Path) -> io::Result<u64>;
}

/// Queries the real file system.
#[derive(Debug, Clone, Copy, Default)]
pub struct VolumeSpaceProbe;

impl SpaceProbe for VolumeSpaceProbe {
    fn available_bytes(&self, path: &Path) -> io::Result<u64> {
        fs2::available_space(path)
    }
}

/// Returns true when `available` is at least 1.5 times `required`.
///
/// Exactly 1.5 times is sufficient.
#[must_use]
pub fn has_sufficient_space(available: u64, required: u64) -> bool {
    u128::from(available) * 2 >= u128::from(required) * 3
}
