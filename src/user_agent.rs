//! Shared User-Agent string for provider and search HTTP clients.

/// Project URL for User-Agent identification.
const PROJECT_UA_URL: &str = "https://github.com/fierce/mixhound";

/// Default User-Agent for every outbound HTTP request.
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("mixhound/{version} (music-discovery-tool; +{PROJECT_UA_URL})")
}
