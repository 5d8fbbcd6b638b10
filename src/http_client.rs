//! Shared HTTP client construction policy.
//!
//! Providers and the search API client use the same timeout, user-agent and
//! compression defaults.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::user_agent;

/// Default connect timeout (10 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default whole-request timeout (30 seconds).
pub const READ_TIMEOUT_SECS: u64 = 30;

/// Timeouts applied to a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpTimeouts {
    /// Seconds allowed to establish a connection.
    pub connect_timeout_secs: u64,
    /// Seconds allowed for the full request.
    pub read_timeout_secs: u64,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
            read_timeout_secs: READ_TIMEOUT_SECS,
        }
    }
}

impl HttpTimeouts {
    /// Returns a copy with a longer read timeout, keeping the connect timeout.
    #[must_use]
    pub fn with_read_timeout_secs(self, read_timeout_secs: u64) -> Self {
        Self {
            read_timeout_secs,
            ..self
        }
    }
}

/// Builds an HTTP client using the shared project policy.
///
/// # Errors
///
/// Returns the reqwest error when the TLS backend cannot be initialized.
pub fn build_http_client(timeouts: HttpTimeouts) -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(Duration::from_secs(timeouts.connect_timeout_secs))
        .timeout(Duration::from_secs(timeouts.read_timeout_secs))
        .user_agent(user_agent::default_user_agent())
        .gzip(true)
        .build()
}
