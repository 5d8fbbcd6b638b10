//! Error types for track acquisition.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::retry::{Classify, ErrorKind, RetryError};

/// Errors raised by a single transfer attempt.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The transfer tool reported a failure.
    #[error("download of \"{title}\" failed: {cause}")]
    Transfer {
        /// Track title.
        title: String,
        /// Tool output explaining the failure.
        cause: String,
        /// Classified failure kind.
        kind: ErrorKind,
    },

    /// The transfer tool is not installed.
    #[error("{tool} was not found on PATH\n  Suggestion: Install {tool} and ffmpeg, or set the yt-dlp path in the config file")]
    ToolMissing {
        /// Binary name.
        tool: String,
    },

    /// The tool reported success but left no usable file.
    #[error("download of \"{title}\" produced no audio file at {}", .path.display())]
    EmptyOutput {
        /// Track title.
        title: String,
        /// Path the tool reported.
        path: PathBuf,
    },

    /// Local file system failure.
    #[error("IO error at {}: {source}", .path.display())]
    Io {
        /// Path involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
}

impl Classify for DownloadError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Transfer { kind, .. } => *kind,
            Self::EmptyOutput { .. } => ErrorKind::TransientNetwork,
            Self::ToolMissing { .. } | Self::Io { .. } => ErrorKind::Permanent,
        }
    }
}

/// Terminal failure to acquire one track.
#[derive(Debug, Error)]
pub enum AcquireError {
    /// Not enough free space for the expected file.
    #[error(
        "not enough free space for \"{title}\": need 1.5 x {required_bytes} bytes, {} available\n  Suggestion: Free disk space or choose another music directory with --music-dir",
        .available_bytes.map_or_else(|| "unknown".to_string(), |b| b.to_string())
    )]
    InsufficientSpace {
        /// Track title.
        title: String,
        /// Expected file size.
        required_bytes: u64,
        /// Free bytes reported by the volume, when known.
        available_bytes: Option<u64>,
    },

    /// The transfer failed after the download retry policy.
    #[error(transparent)]
    Transfer(#[from] RetryError<DownloadError>),

    /// The file was transferred but could not be recorded.
    #[error("downloaded \"{title}\" but could not update the ledger: {source}")]
    Ledger {
        /// Track title.
        title: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The worker running the transfer stopped unexpectedly.
    #[error("download task for \"{title}\" stopped: {reason}")]
    TaskFailed {
        /// Track title.
        title: String,
        /// Join failure description.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let missing = DownloadError::ToolMissing {
            tool: "yt-dlp".to_string(),
        };
        assert_eq!(missing.kind(), ErrorKind::Permanent);
        let empty = DownloadError::EmptyOutput {
            title: "One".to_string(),
            path: PathBuf::from("/tmp/one.mp3"),
        };
        assert_eq!(empty.kind(), ErrorKind::TransientNetwork);
        let blocked = DownloadError::Transfer {
            title: "One".to_string(),
            cause: "Video unavailable".to_string(),
            kind: ErrorKind::Permanent,
        };
        assert_eq!(blocked.kind(), ErrorKind::Permanent);
    }

    #[test]
    fn test_insufficient_space_message_is_actionable() {
        let error = AcquireError::InsufficientSpace {
            title: "Pink Moon".to_string(),
            required_bytes: 100,
            available_bytes: Some(149),
        };
        let message = error.to_string();
        assert!(message.contains("149 available"));
        assert!(message.contains("Suggestion:"));
    }
}
