//! Sessions: isolated browser contexts owning pages and an event broker.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tiller_driver::{BrowserDriver, ContextDriver, PageDriver, SessionOptions, StorageState};

use crate::error::{Error, Result};
use crate::events::{EventBroker, EventWaiter, SessionEvent};
use crate::page::PageHandle;
use crate::timeouts::DEFAULT_TIMEOUT;

/// Entry point: creates isolated [`Session`]s on top of a browser driver.
pub struct SessionManager {
    driver: Arc<dyn BrowserDriver>,
    default_timeout: Duration,
}

impl SessionManager {
    /// Creates a manager over a browser driver.
    pub fn new(driver: Arc<dyn BrowserDriver>) -> Self {
        Self {
            driver,
            default_timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Overrides the default deadline inherited by every session.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Creates a new isolated session.
    ///
    /// Sessions share nothing: cookies, storage, and pages of one session
    /// are invisible to every other session over the same driver.
    pub fn create_session(&self, options: SessionOptions) -> Result<Session> {
        let context = self.driver.open_session(&options)?;
        tracing::debug!(
            base_url = options.base_url.as_deref().unwrap_or(""),
            "session created"
        );
        Ok(Session {
            inner: Arc::new(SessionInner {
                context,
                broker: EventBroker::new(),
                state: Mutex::new(SessionState {
                    pages: Vec::new(),
                    closed: false,
                }),
                default_timeout: self.default_timeout,
            }),
        })
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}

struct SessionState {
    pages: Vec<PageHandle>,
    closed: bool,
}

pub(crate) struct SessionInner {
    context: Arc<dyn ContextDriver>,
    broker: EventBroker,
    // Guards page creation against close: both take this lock, so a page
    // can never be created in a session that has started closing.
    state: Mutex<SessionState>,
    default_timeout: Duration,
}

impl SessionInner {
    pub(crate) fn broker(&self) -> &EventBroker {
        &self.broker
    }

    /// Adopts a driver-opened page (popup, `target=_blank`) into the
    /// session and announces it. If the session already started closing,
    /// the orphan page is closed instead.
    pub(crate) fn adopt_opened(self: &Arc<Self>, raw: Arc<dyn PageDriver>, url: String) {
        let page = {
            let mut state = self.state.lock();
            if state.closed {
                raw.close();
                return;
            }
            let page = PageHandle::new(
                Arc::clone(&raw),
                Arc::downgrade(self),
                url.clone(),
                self.default_timeout,
            );
            state.pages.push(page.clone());
            page
        };
        page.wire_events();
        tracing::debug!(%url, "adopted opened page");
        self.broker.emit(SessionEvent::NewPage(page));
    }

    /// Removes a closed page from the session's list and announces the
    /// closure. Reached from both `PageHandle::close` and the driver's
    /// `Closed` event; the announcement happens once per page either way.
    pub(crate) fn handle_page_closed(&self, page: PageHandle) {
        {
            let mut state = self.state.lock();
            state.pages.retain(|p| !p.same_page(&page));
        }
        if page.mark_close_announced() {
            self.broker.emit(SessionEvent::Close(page));
        }
    }
}

/// One isolated browser session.
///
/// Cheap to clone; all clones refer to the same session. Owns its pages
/// and a per-session [`EventBroker`]. Closing the session closes every
/// owned page first, then the underlying context.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Creates a new page in this session.
    ///
    /// # Errors
    ///
    /// [`Error::SessionClosed`] if the session is closed or closing; a
    /// create that races a concurrent close fails rather than leaking a
    /// page.
    pub fn create_page(&self) -> Result<PageHandle> {
        let page = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return Err(Error::SessionClosed);
            }
            let raw = self.inner.context.new_page()?;
            let page = PageHandle::new(
                raw,
                Arc::downgrade(&self.inner),
                "about:blank".to_string(),
                self.inner.default_timeout,
            );
            state.pages.push(page.clone());
            page
        };
        page.wire_events();
        Ok(page)
    }

    /// Every open page in creation/adoption order.
    pub fn all_pages(&self) -> Vec<PageHandle> {
        self.inner.state.lock().pages.clone()
    }

    /// The most recently created or adopted open page.
    pub fn most_recent_page(&self) -> Option<PageHandle> {
        self.inner.state.lock().pages.last().cloned()
    }

    /// The session's event broker.
    pub fn events(&self) -> EventBroker {
        self.inner.broker.clone()
    }

    /// Registers an expectation for the next page to appear in this
    /// session. Register before the triggering action.
    pub fn expect_page(&self, timeout: Option<Duration>) -> EventWaiter {
        self.inner
            .broker
            .once(crate::events::EventKind::NewPage, timeout.unwrap_or(self.inner.default_timeout))
    }

    /// Exports the session's cookies and storage for later reuse.
    ///
    /// # Errors
    ///
    /// [`Error::SessionClosed`] if the session is closed.
    pub fn storage_state(&self) -> Result<StorageState> {
        if self.is_closed() {
            return Err(Error::SessionClosed);
        }
        Ok(self.inner.context.storage_state()?)
    }

    /// Whether the session has been closed.
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Closes the session: every owned page first (each emits a close
    /// event), then the driver context, then the broker. Idempotent.
    pub fn close(&self) {
        let pages = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            std::mem::take(&mut state.pages)
        };
        tracing::debug!(pages = pages.len(), "closing session");
        for page in &pages {
            page.close();
        }
        self.inner.context.close();
        self.inner.broker.shutdown();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Session")
            .field("pages", &state.pages.len())
            .field("closed", &state.closed)
            .finish()
    }
}
