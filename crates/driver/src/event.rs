//! Push events a driver delivers through a page's event sink.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::PageDriver;

/// Callback registered via [`PageDriver::subscribe`].
///
/// [`PageDriver::subscribe`]: crate::PageDriver::subscribe
pub type EventSink = Arc<dyn Fn(PageEvent) + Send + Sync>;

/// Load progress milestones past navigation commit.
///
/// Drivers report these in order; the orchestrator folds them into its
/// monotonic load-state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LoadPhase {
    /// DOM parsed, subresources may still be loading.
    DomReady,
    /// No network activity for the engine's idle window.
    NetworkIdle,
}

/// One asynchronous event originating from a page.
#[derive(Clone)]
pub enum PageEvent {
    /// The page committed a navigation (including client-side ones).
    Navigated {
        /// New document URL.
        url: String,
    },
    /// Load progress for the current document.
    Load(LoadPhase),
    /// The page opened another page (popup, `target=_blank`).
    Opened {
        /// Driver handle for the new page.
        page: Arc<dyn PageDriver>,
        /// Initial URL of the new page.
        url: String,
    },
    /// A native dialog appeared.
    Dialog(DialogInfo),
    /// A console message was emitted.
    Console(ConsoleMessage),
    /// A network request was issued.
    Request(RequestInfo),
    /// The page was closed from the browser side.
    Closed,
}

impl std::fmt::Debug for PageEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PageEvent::Navigated { url } => f.debug_struct("Navigated").field("url", url).finish(),
            PageEvent::Load(phase) => f.debug_tuple("Load").field(phase).finish(),
            PageEvent::Opened { url, .. } => f.debug_struct("Opened").field("url", url).finish(),
            PageEvent::Dialog(info) => f.debug_tuple("Dialog").field(info).finish(),
            PageEvent::Console(msg) => f.debug_tuple("Console").field(msg).finish(),
            PageEvent::Request(req) => f.debug_tuple("Request").field(req).finish(),
            PageEvent::Closed => write!(f, "Closed"),
        }
    }
}

/// Kind of native dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DialogKind {
    Alert,
    Confirm,
    Prompt,
    BeforeUnload,
}

/// A native dialog event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogInfo {
    /// Dialog kind.
    pub kind: DialogKind,
    /// Message shown to the user.
    pub message: String,
}

/// Severity of a console message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConsoleKind {
    Log,
    Debug,
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for ConsoleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConsoleKind::Log => "log",
            ConsoleKind::Debug => "debug",
            ConsoleKind::Info => "info",
            ConsoleKind::Warning => "warning",
            ConsoleKind::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// A `console.*` call from page JavaScript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleMessage {
    /// Message severity.
    pub kind: ConsoleKind,
    /// Message text.
    pub text: String,
}

/// A network request issued by the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestInfo {
    /// HTTP method.
    pub method: String,
    /// Request URL.
    pub url: String,
}
