//! Error types for the orchestrator.

use std::time::Duration;

use thiserror::Error;
use tiller_driver::DriverError;

use crate::events::EventKind;

/// Result type alias for orchestrator operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while orchestrating sessions, pages, and waits.
///
/// Every variant is recoverable by the caller and carries enough context
/// to diagnose the failure without re-running: what was queried, how many
/// candidates matched last, how long the wait ran.
#[derive(Debug, Error)]
pub enum Error {
    /// A locator condition never held within its deadline.
    #[error(
        "locator timeout: '{selector}' did not resolve within {elapsed:?} (last match count: {last_match_count})"
    )]
    LocatorTimeout {
        /// Selector expression, including filter description.
        selector: String,
        /// Number of candidates the final poll observed.
        last_match_count: usize,
        /// Total time spent polling.
        elapsed: Duration,
    },

    /// An element resolved but never became actionable within the deadline.
    #[error("element '{selector}' not actionable after {elapsed:?}: {reason}")]
    NotActionable {
        /// Selector expression.
        selector: String,
        /// Which actionability gate failed (e.g. "disabled", "unstable").
        reason: String,
        /// Total time spent polling.
        elapsed: Duration,
    },

    /// Operation attempted on a closed page handle.
    #[error("cannot perform operation on closed {what}")]
    ClosedHandle {
        /// What was closed ("page", "element scope").
        what: &'static str,
    },

    /// Page creation raced with session close.
    #[error("session is closed")]
    SessionClosed,

    /// A load-state wait expired before the page reached the state.
    #[error("timed out after {elapsed:?} waiting for load state '{state}'")]
    LoadState {
        /// Load state that was awaited.
        state: crate::page::LoadState,
        /// Time waited.
        elapsed: Duration,
    },

    /// An expected asynchronous event never arrived.
    #[error("timed out after {elapsed:?} waiting for '{kind}' event")]
    EventTimeout {
        /// Event kind that was awaited.
        kind: EventKind,
        /// Time waited.
        elapsed: Duration,
    },

    /// A page-object action could not confirm its expected resulting state.
    #[error("action '{action}' on {from_state} did not reach {expected_state}")]
    StateTransition {
        /// State the action started from.
        from_state: &'static str,
        /// Action name.
        action: &'static str,
        /// State the action promised to reach.
        expected_state: &'static str,
    },

    /// Navigation itself failed at the protocol level (strict mode).
    #[error("navigation to '{url}' returned status {status}")]
    Navigation {
        /// Requested URL.
        url: String,
        /// Top-level response status.
        status: u16,
    },

    /// Failure reported by the underlying browser driver.
    #[error(transparent)]
    Driver(#[from] DriverError),
}

impl Error {
    /// Returns true if this error is a deadline expiry of some wait.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Error::LocatorTimeout { .. }
                | Error::NotActionable { .. }
                | Error::EventTimeout { .. }
                | Error::LoadState { .. }
        )
    }

    /// Returns true if this error means the target (page, session, or
    /// driver-side object) is gone.
    pub fn is_closed(&self) -> bool {
        match self {
            Error::ClosedHandle { .. } | Error::SessionClosed => true,
            Error::Driver(e) => e.is_target_closed(),
            _ => false,
        }
    }
}
