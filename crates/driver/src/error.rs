//! Error type for driver operations.

use thiserror::Error;

/// Errors surfaced by a browser-control driver.
///
/// These are the only failures a driver may report; everything richer
/// (timeouts, state-transition failures, session races) is diagnosed by
/// the orchestrator on top of them.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Operation attempted on a page or context the driver already closed.
    #[error("target closed: {0}")]
    TargetClosed(String),

    /// The element snapshot no longer corresponds to a live node.
    #[error("element detached from document")]
    Detached,

    /// The selector expression could not be evaluated.
    #[error("invalid selector: {0}")]
    InvalidSelector(String),

    /// Navigation failed before it was committed (DNS, refusal, abort).
    #[error("navigation to '{url}' failed: {reason}")]
    NavigationFailed {
        /// Requested URL.
        url: String,
        /// Engine-reported reason.
        reason: String,
    },

    /// Any other engine-level failure.
    #[error("driver error: {0}")]
    Internal(String),
}

impl DriverError {
    /// Returns true if the failure means the target is gone for good.
    pub fn is_target_closed(&self) -> bool {
        matches!(self, DriverError::TargetClosed(_))
    }
}
