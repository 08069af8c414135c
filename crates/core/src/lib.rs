//! Browser session and page-state orchestrator.
//!
//! `tiller` sits between test code and a browser driver, providing the
//! layer that makes end-to-end flows deterministic:
//!
//! - [`SessionManager`] creates isolated [`Session`]s (nothing shared
//!   between sessions: cookies, storage, pages).
//! - [`PageHandle`] tracks per-page lifecycle and a monotonic
//!   [`LoadState`] machine, reset on every navigation.
//! - [`Locator`] queries auto-wait: they re-resolve from scratch on every
//!   poll and accept an element only once it is attached, visible, and
//!   stable. Actions gate on actionability and act exactly once.
//! - Each session's [`EventBroker`] delivers asynchronous browser events
//!   (popups, dialogs, console) with a register-before-trigger pattern
//!   that cannot miss events.
//! - [`PageState`] and [`state::confirm`] give page objects typed,
//!   verified transitions.
//!
//! The browser itself is abstracted behind the [`tiller_driver`] traits;
//! anything that can enumerate elements and perform actions can back the
//! orchestrator.
//!
//! # Example
//!
//! ```ignore
//! let manager = SessionManager::new(driver);
//! let session = manager.create_session(SessionOptions::default())?;
//! let page = session.create_page()?;
//! page.navigate("https://app.example/login", NavigateOptions::default()).await?;
//! page.locator("#user").fill("alice", None).await?;
//! page.locator("#submit").click(None).await?;
//! ```

pub mod error;
pub mod events;
pub mod locator;
pub mod page;
pub mod session;
pub mod state;
pub mod timeouts;

pub use error::{Error, Result};
pub use events::{EventBroker, EventKind, EventStream, EventWaiter, SessionEvent, Subscription};
pub use locator::{ClickOptions, ElementRef, FillOptions, Locator, LocatorQuery, TextMatch};
pub use page::{LoadState, NavigateOptions, NavigationResult, PageHandle};
pub use session::{Session, SessionManager};
pub use state::PageState;
pub use timeouts::{DEFAULT_POLL_INTERVAL, DEFAULT_TIMEOUT, Deadline, RetryPolicy};

pub use tiller_driver::{
    Action, BoundingBox, BrowserDriver, ConsoleKind, ConsoleMessage, ContextDriver, DialogInfo,
    DialogKind, DriverError, EventSink, LoadPhase, NavigationOutcome, PageDriver, PageEvent,
    RawElement, RequestInfo, SessionOptions, StorageState,
};
