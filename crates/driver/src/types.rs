//! Value types exchanged across the driver boundary.

use serde::{Deserialize, Serialize};

/// Result of a committed navigation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationOutcome {
    /// Final URL after redirects.
    pub url: String,
    /// HTTP status of the top-level response. Zero for URLs that produce
    /// no response (about:blank, data URLs).
    pub status: u16,
    /// HTTP status text.
    pub status_text: String,
}

impl NavigationOutcome {
    /// Returns true if the top-level response was 2xx, or if the URL
    /// produced no response at all.
    pub fn ok(&self) -> bool {
        self.status == 0 || (200..300).contains(&self.status)
    }
}

/// Opaque cookie/storage snapshot for one isolation context.
///
/// The orchestrator never interprets the contents; it ferries the blob
/// between the caller and the driver so authentication state can be
/// exported from one session and seeded into another.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageState(pub serde_json::Value);

impl StorageState {
    /// Returns true if the snapshot carries no data.
    pub fn is_empty(&self) -> bool {
        self.0.is_null()
    }
}
