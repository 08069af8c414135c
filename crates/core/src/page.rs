//! Page handles: load-state tracking, navigation, and locator creation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::RwLock;
use tiller_driver::{EventSink, LoadPhase, PageDriver, PageEvent};
use tokio::sync::watch;

use crate::error::{Error, Result};
use crate::events::{EventKind, EventWaiter, SessionEvent};
use crate::locator::{Locator, LocatorQuery};
use crate::session::SessionInner;
use crate::timeouts::Deadline;

/// Document load progress, ordered: a page that reached `NetworkIdle` has
/// also reached `DomReady`. Navigation resets the state to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LoadState {
    /// Navigation committed, document still loading.
    Pending,
    /// DOM parsed; subresources may still be loading.
    DomReady,
    /// No in-flight network activity for a quiet window.
    NetworkIdle,
}

impl std::fmt::Display for LoadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LoadState::Pending => "pending",
            LoadState::DomReady => "domReady",
            LoadState::NetworkIdle => "networkIdle",
        };
        write!(f, "{s}")
    }
}

/// Options for [`PageHandle::navigate`].
#[derive(Debug, Clone)]
pub struct NavigateOptions {
    /// Deadline override for the whole navigation including the load wait.
    pub timeout: Option<Duration>,
    /// Load state to wait for before returning. Defaults to
    /// [`LoadState::NetworkIdle`].
    pub wait_until: Option<LoadState>,
    /// Fail with [`Error::Navigation`] on a non-2xx top-level response.
    /// Off by default: a 404 error page is still a page.
    pub strict: bool,
}

impl Default for NavigateOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            wait_until: None,
            strict: false,
        }
    }
}

impl NavigateOptions {
    /// Overrides the navigation deadline.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the load state navigation waits for.
    pub fn wait_until(mut self, state: LoadState) -> Self {
        self.wait_until = Some(state);
        self
    }

    /// Turns non-2xx top-level responses into [`Error::Navigation`].
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }
}

/// Outcome of a completed navigation.
#[derive(Debug, Clone)]
pub struct NavigationResult {
    /// Final URL after redirects.
    pub url: String,
    /// Top-level response status.
    pub status: u16,
    /// Status text reported by the browser.
    pub status_text: String,
}

impl NavigationResult {
    /// Whether the top-level response was successful.
    pub fn ok(&self) -> bool {
        self.status == 0 || (200..300).contains(&self.status)
    }
}

pub(crate) struct PageInner {
    driver: Arc<dyn PageDriver>,
    url: RwLock<String>,
    load_tx: watch::Sender<LoadState>,
    closed_tx: watch::Sender<bool>,
    action_lock: tokio::sync::Mutex<()>,
    close_announced: AtomicBool,
    session: Weak<SessionInner>,
    default_timeout: Duration,
}

/// Cheap cloneable handle to one page (tab) inside a session.
///
/// All clones refer to the same page: closing through one clone closes
/// them all. Once closed, a handle stays closed; every operation on it
/// fails with [`Error::ClosedHandle`], and blocking operations in flight
/// observe the closure at their next poll.
#[derive(Clone)]
pub struct PageHandle {
    inner: Arc<PageInner>,
}

impl PageHandle {
    pub(crate) fn new(
        driver: Arc<dyn PageDriver>,
        session: Weak<SessionInner>,
        initial_url: String,
        default_timeout: Duration,
    ) -> Self {
        let (load_tx, _) = watch::channel(LoadState::Pending);
        let (closed_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(PageInner {
                driver,
                url: RwLock::new(initial_url),
                load_tx,
                closed_tx,
                action_lock: tokio::sync::Mutex::new(()),
                close_announced: AtomicBool::new(false),
                session,
                default_timeout,
            }),
        }
    }

    /// Hooks this handle up to its driver's event push channel. Must be
    /// called exactly once, after the handle is registered with its
    /// session.
    pub(crate) fn wire_events(&self) {
        let weak = Arc::downgrade(&self.inner);
        let sink: EventSink = Arc::new(move |event| {
            if let Some(inner) = weak.upgrade() {
                PageHandle { inner }.on_driver_event(event);
            }
        });
        self.inner.driver.subscribe(sink);
    }

    fn on_driver_event(&self, event: PageEvent) {
        match event {
            PageEvent::Navigated { url } => {
                tracing::trace!(%url, "page navigated");
                *self.inner.url.write() = url;
                // Client-side navigations also start a fresh document, so
                // the previous document's load progress no longer applies.
                self.inner.load_tx.send_replace(LoadState::Pending);
            }
            PageEvent::Load(phase) => {
                let state = match phase {
                    LoadPhase::DomReady => LoadState::DomReady,
                    LoadPhase::NetworkIdle => LoadState::NetworkIdle,
                };
                // Monotonic within one navigation; navigate() resets it.
                self.inner.load_tx.send_modify(|current| {
                    if state > *current {
                        *current = state;
                    }
                });
            }
            PageEvent::Opened { page, url } => {
                if let Some(session) = self.inner.session.upgrade() {
                    SessionInner::adopt_opened(&session, page, url);
                }
            }
            PageEvent::Dialog(dialog) => {
                self.emit(SessionEvent::Dialog {
                    page: self.clone(),
                    dialog,
                });
            }
            PageEvent::Console(message) => {
                self.emit(SessionEvent::Console {
                    page: self.clone(),
                    message,
                });
            }
            PageEvent::Request(request) => {
                self.emit(SessionEvent::Request {
                    page: self.clone(),
                    request,
                });
            }
            PageEvent::Closed => {
                self.inner.closed_tx.send_replace(true);
                if let Some(session) = self.inner.session.upgrade() {
                    session.handle_page_closed(self.clone());
                }
            }
        }
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(session) = self.inner.session.upgrade() {
            session.broker().emit(event);
        }
    }

    /// Navigates to `url` and waits for the requested load state.
    ///
    /// The load state is reset to [`LoadState::Pending`] before the
    /// navigation is issued, so a stale `NetworkIdle` from the previous
    /// document can never satisfy this navigation's wait.
    ///
    /// # Errors
    ///
    /// - [`Error::Navigation`] on a non-2xx response in strict mode
    /// - [`Error::LoadState`] if the load wait exceeds the deadline
    /// - [`Error::ClosedHandle`] if the page is closed
    pub async fn navigate(&self, url: &str, options: NavigateOptions) -> Result<NavigationResult> {
        self.ensure_open()?;
        let _guard = self.inner.action_lock.lock().await;
        self.ensure_open()?;

        let timeout = options.timeout.unwrap_or(self.inner.default_timeout);
        let deadline = Deadline::start(timeout);

        self.inner.load_tx.send_replace(LoadState::Pending);
        tracing::debug!(%url, "navigating");

        let outcome = self.inner.driver.navigate(url)?;
        *self.inner.url.write() = outcome.url.clone();

        if options.strict && !outcome.ok() {
            return Err(Error::Navigation {
                url: outcome.url,
                status: outcome.status,
            });
        }

        let wait_until = options.wait_until.unwrap_or(LoadState::NetworkIdle);
        self.wait_for_load_state_within(wait_until, &deadline).await?;

        Ok(NavigationResult {
            url: outcome.url,
            status: outcome.status,
            status_text: outcome.status_text,
        })
    }

    /// Waits until the page's load state is at least `state`.
    ///
    /// Returns immediately if the state was already reached. Fails with
    /// [`Error::LoadState`] at the deadline and [`Error::ClosedHandle`] if
    /// the page closes while waiting.
    pub async fn wait_for_load_state(&self, state: LoadState, timeout: Option<Duration>) -> Result<()> {
        self.ensure_open()?;
        let deadline = Deadline::start(timeout.unwrap_or(self.inner.default_timeout));
        self.wait_for_load_state_within(state, &deadline).await
    }

    async fn wait_for_load_state_within(&self, state: LoadState, deadline: &Deadline) -> Result<()> {
        let mut load_rx = self.inner.load_tx.subscribe();
        let mut closed_rx = self.inner.closed_tx.subscribe();

        let wait = async {
            tokio::select! {
                reached = load_rx.wait_for(|current| *current >= state) => {
                    reached.map(|_| ()).map_err(|_| Error::ClosedHandle { what: "page" })
                }
                _ = closed_rx.wait_for(|closed| *closed) => {
                    Err(Error::ClosedHandle { what: "page" })
                }
            }
        };

        match tokio::time::timeout(deadline.remaining(), wait).await {
            Ok(result) => result,
            Err(_) => Err(Error::LoadState {
                state,
                elapsed: deadline.elapsed(),
            }),
        }
    }

    /// Current load state.
    pub fn load_state(&self) -> LoadState {
        *self.inner.load_tx.borrow()
    }

    /// Current URL of the page's document.
    pub fn current_url(&self) -> String {
        self.inner.url.read().clone()
    }

    /// Whether the page has been closed, through this handle or any clone.
    pub fn is_closed(&self) -> bool {
        *self.inner.closed_tx.borrow()
    }

    /// Closes the page. Idempotent: further calls are no-ops, and every
    /// clone of this handle reports closed afterwards.
    ///
    /// The page is removed from its session's list here rather than from a
    /// driver `Closed` echo: the driver contract does not require one for
    /// orchestrator-initiated closes.
    pub fn close(&self) {
        if self.inner.closed_tx.send_replace(true) {
            return;
        }
        tracing::debug!(url = %self.current_url(), "closing page");
        self.inner.driver.close();
        if let Some(session) = self.inner.session.upgrade() {
            session.handle_page_closed(self.clone());
        }
    }

    /// Creates a locator for a selector. The locator inherits this page's
    /// default timeout; combinators can override it per query.
    pub fn locator(&self, selector: impl Into<Arc<str>>) -> Locator {
        Locator::new(
            self.clone(),
            LocatorQuery::new(selector).timeout(self.inner.default_timeout),
        )
    }

    /// Creates a locator from a pre-built query.
    pub fn locator_query(&self, query: LocatorQuery) -> Locator {
        Locator::new(self.clone(), query)
    }

    /// Registers an expectation for the next page opened in this page's
    /// session. Register before triggering the popup, then await.
    ///
    /// # Errors
    ///
    /// [`Error::SessionClosed`] if the owning session is gone.
    pub fn expect_popup(&self, timeout: Option<Duration>) -> Result<EventWaiter> {
        self.expect_event(EventKind::NewPage, timeout)
    }

    /// Registers an expectation for the next session event of `kind`.
    pub fn expect_event(&self, kind: EventKind, timeout: Option<Duration>) -> Result<EventWaiter> {
        let session = self.inner.session.upgrade().ok_or(Error::SessionClosed)?;
        Ok(session
            .broker()
            .once(kind, timeout.unwrap_or(self.inner.default_timeout)))
    }

    /// Default deadline for operations on this page.
    pub fn default_timeout(&self) -> Duration {
        self.inner.default_timeout
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(Error::ClosedHandle { what: "page" })
        } else {
            Ok(())
        }
    }

    pub(crate) fn driver(&self) -> &Arc<dyn PageDriver> {
        &self.inner.driver
    }

    /// First caller wins: true exactly once per page, regardless of whether
    /// the closure was local or a driver `Closed` event.
    pub(crate) fn mark_close_announced(&self) -> bool {
        !self.inner.close_announced.swap(true, Ordering::SeqCst)
    }

    /// Serializes actions and navigations on this page. One actor per
    /// document.
    pub(crate) async fn action_guard(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.inner.action_lock.lock().await
    }

    /// Identity comparison: true if both handles refer to the same page.
    pub fn same_page(&self, other: &PageHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    #[cfg(test)]
    pub(crate) fn detached_for_tests(url: &str) -> Self {
        struct NullDriver;
        impl PageDriver for NullDriver {
            fn query(&self, _selector: &str) -> tiller_driver::Result<Vec<tiller_driver::RawElement>> {
                Ok(Vec::new())
            }
            fn query_within(
                &self,
                _scope: &tiller_driver::RawElement,
                _selector: &str,
            ) -> tiller_driver::Result<Vec<tiller_driver::RawElement>> {
                Ok(Vec::new())
            }
            fn act(
                &self,
                _target: &tiller_driver::RawElement,
                _action: &tiller_driver::Action,
            ) -> tiller_driver::Result<()> {
                Ok(())
            }
            fn navigate(&self, url: &str) -> tiller_driver::Result<tiller_driver::NavigationOutcome> {
                Ok(tiller_driver::NavigationOutcome {
                    url: url.to_string(),
                    status: 200,
                    status_text: "OK".to_string(),
                })
            }
            fn close(&self) {}
            fn subscribe(&self, _sink: EventSink) {}
        }

        PageHandle::new(
            Arc::new(NullDriver),
            Weak::new(),
            url.to_string(),
            crate::timeouts::DEFAULT_TIMEOUT,
        )
    }
}

impl std::fmt::Debug for PageHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageHandle")
            .field("url", &self.current_url())
            .field("load_state", &self.load_state())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl PartialEq for PageHandle {
    fn eq(&self, other: &Self) -> bool {
        self.same_page(other)
    }
}

impl Eq for PageHandle {}
