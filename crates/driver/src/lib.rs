//! Driver contract for the tiller orchestrator.
//!
//! tiller does not implement a browser. It consumes one through the traits
//! in this crate: a [`BrowserDriver`] opens isolation contexts, a
//! [`ContextDriver`] creates pages inside one context, and a [`PageDriver`]
//! exposes the per-document surface (point-in-time element queries,
//! actions, navigation, push events).
//!
//! All trait methods are synchronous from the driver's point of view.
//! Asynchrony — poll loops, deadlines, event waits — lives entirely in the
//! orchestrator, which calls these methods from its own tasks. Drivers push
//! asynchronous browser-originated events (new page, dialog, console,
//! request, load progress) through the [`EventSink`] registered with
//! [`PageDriver::subscribe`].
//!
//! Element queries return [`RawElement`] snapshots. A snapshot describes an
//! element at one instant and carries no liveness guarantee; callers that
//! need a current view must re-query.

mod action;
mod element;
mod error;
mod event;
mod options;
mod types;

use std::sync::Arc;

pub use action::Action;
pub use element::{BoundingBox, RawElement};
pub use error::DriverError;
pub use event::{ConsoleKind, ConsoleMessage, DialogInfo, DialogKind, EventSink, LoadPhase, PageEvent, RequestInfo};
pub use options::{SessionOptions, SessionOptionsBuilder};
pub use types::{NavigationOutcome, StorageState};

/// Result type alias for driver operations.
pub type Result<T> = std::result::Result<T, DriverError>;

/// Entry point into a browser engine: opens isolated browsing contexts.
///
/// A context is an isolation boundary (cookies, storage, cache). Opening
/// one allocates browser-level resources and is expensive relative to
/// opening a page, which is why pages are a separate, cheaper entity.
pub trait BrowserDriver: Send + Sync {
    /// Opens a new isolation context. Two contexts opened from the same
    /// driver must not share any backing store.
    fn open_session(&self, options: &SessionOptions) -> Result<Arc<dyn ContextDriver>>;
}

/// One isolation context: creates pages and owns the storage boundary.
pub trait ContextDriver: Send + Sync {
    /// Creates a new blank page inside this context.
    fn new_page(&self) -> Result<Arc<dyn PageDriver>>;

    /// Exports the context's cookie/storage snapshot as an opaque blob.
    /// tiller hands the blob back to callers without interpreting it.
    fn storage_state(&self) -> Result<StorageState>;

    /// Releases the context and everything it owns. Idempotent.
    fn close(&self);
}

/// One navigable document (tab/window).
pub trait PageDriver: Send + Sync {
    /// Evaluates `selector` against the live document and returns a
    /// point-in-time snapshot of every match, in document order.
    fn query(&self, selector: &str) -> Result<Vec<RawElement>>;

    /// Evaluates `selector` against the descendants of `scope`.
    /// Used by the orchestrator's `has`/`has_not` locator filters.
    fn query_within(&self, scope: &RawElement, selector: &str) -> Result<Vec<RawElement>>;

    /// Performs `action` on `target`. Fails with
    /// [`DriverError::Detached`] if the snapshot no longer corresponds to
    /// a live element.
    fn act(&self, target: &RawElement, action: &Action) -> Result<()>;

    /// Starts a navigation to `url` and returns once it is committed.
    /// Load progress past commit is reported through
    /// [`PageEvent::Load`] events.
    fn navigate(&self, url: &str) -> Result<NavigationOutcome>;

    /// Closes the page. Idempotent.
    fn close(&self);

    /// Registers a sink for events originating from this page. A driver
    /// may deliver events from any thread; sinks must be cheap and must
    /// not call back into the emitting page's driver. Calls into other
    /// pages of the same context (e.g. adopting a just-opened popup) are
    /// allowed.
    fn subscribe(&self, sink: EventSink);
}
