//! Session-scoped pub/sub for asynchronous browser-originated events.
//!
//! Browser events (a popup opened by `target=_blank`, a native dialog, a
//! console message) are push-based and arrive asynchronously relative to
//! the action that triggered them. [`EventBroker`] supports the
//! register-before-trigger pattern: register an expectation with
//! [`once`](EventBroker::once), perform the triggering action, then await
//! the expectation. Registration and delivery share one lock, so there is
//! no window in which the event can be missed.
//!
//! Delivery is in strict registration order: a `once` waiter resolves
//! before any handler registered after it and after any registered before
//! it, regardless of handler style.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::sync::{broadcast, oneshot};
use tiller_driver::{ConsoleMessage, DialogInfo, RequestInfo};

use crate::error::{Error, Result};
use crate::page::PageHandle;
use crate::timeouts::Deadline;

/// Unique identifier for broker registrations.
pub type HandlerId = u64;

/// Kind of session event, used as the subscription key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A browser-initiated page joined the session (popup, `target=_blank`).
    /// Pages created explicitly through `Session::create_page` are returned
    /// to the caller directly and not announced here.
    NewPage,
    /// A native dialog opened on some page.
    Dialog,
    /// A console message was emitted on some page.
    Console,
    /// A network request was issued by some page.
    Request,
    /// A page in the session was closed.
    Close,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventKind::NewPage => "newPage",
            EventKind::Dialog => "dialog",
            EventKind::Console => "console",
            EventKind::Request => "request",
            EventKind::Close => "close",
        };
        write!(f, "{s}")
    }
}

/// One event delivered through a session's broker.
#[derive(Clone)]
pub enum SessionEvent {
    /// A new page joined the session.
    NewPage(PageHandle),
    /// A native dialog appeared.
    Dialog {
        /// Page the dialog belongs to.
        page: PageHandle,
        /// Dialog kind and message.
        dialog: DialogInfo,
    },
    /// A console message was emitted.
    Console {
        /// Originating page.
        page: PageHandle,
        /// Severity and text.
        message: ConsoleMessage,
    },
    /// A network request was issued.
    Request {
        /// Originating page.
        page: PageHandle,
        /// Method and URL.
        request: RequestInfo,
    },
    /// A page was closed.
    Close(PageHandle),
}

impl SessionEvent {
    /// The kind this event is delivered under.
    pub fn kind(&self) -> EventKind {
        match self {
            SessionEvent::NewPage(_) => EventKind::NewPage,
            SessionEvent::Dialog { .. } => EventKind::Dialog,
            SessionEvent::Console { .. } => EventKind::Console,
            SessionEvent::Request { .. } => EventKind::Request,
            SessionEvent::Close(_) => EventKind::Close,
        }
    }

    /// The page this event concerns.
    pub fn page(&self) -> &PageHandle {
        match self {
            SessionEvent::NewPage(page)
            | SessionEvent::Dialog { page, .. }
            | SessionEvent::Console { page, .. }
            | SessionEvent::Request { page, .. }
            | SessionEvent::Close(page) => page,
        }
    }
}

impl std::fmt::Debug for SessionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionEvent")
            .field("kind", &self.kind().to_string())
            .field("url", &self.page().current_url())
            .finish()
    }
}

/// Persistent handler callback.
pub type HandlerFn = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

enum Slot {
    Persistent(HandlerFn),
    Once(Option<oneshot::Sender<SessionEvent>>),
}

struct Registration {
    kind: EventKind,
    slot: Slot,
}

struct BrokerShared {
    registrations: Mutex<IndexMap<HandlerId, Registration>>,
    next_id: AtomicU64,
    tx: broadcast::Sender<SessionEvent>,
}

/// Per-session event dispatcher.
///
/// Three consumption patterns, all keyed by [`EventKind`]:
///
/// 1. **Persistent handlers** via [`on`](Self::on), cancelled by dropping
///    the returned [`Subscription`].
/// 2. **One-shot waits** via [`once`](Self::once), resolving exactly once
///    or failing at the deadline.
/// 3. **Streams** via [`subscribe`](Self::subscribe), a lag-tolerant
///    broadcast for observers that must not block delivery.
#[derive(Clone)]
pub struct EventBroker {
    shared: Arc<BrokerShared>,
}

impl EventBroker {
    pub(crate) fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self {
            shared: Arc::new(BrokerShared {
                registrations: Mutex::new(IndexMap::new()),
                next_id: AtomicU64::new(1),
                tx,
            }),
        }
    }

    /// Registers a persistent handler for `kind`. Handlers for the same
    /// kind fire in registration order. The handler is unregistered when
    /// the returned [`Subscription`] is dropped.
    pub fn on(&self, kind: EventKind, handler: impl Fn(&SessionEvent) + Send + Sync + 'static) -> Subscription {
        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst);
        self.shared.registrations.lock().insert(
            id,
            Registration {
                kind,
                slot: Slot::Persistent(Arc::new(handler)),
            },
        );
        Subscription::new(id, &self.shared)
    }

    /// Registers a one-shot expectation for the next `kind` event.
    ///
    /// Returns a cancellable [`EventWaiter`]; register it *before*
    /// performing the triggering action, then await it. The deadline starts
    /// here, not at the await, so time spent between registering and
    /// awaiting counts against `timeout`. The waiter fails with
    /// [`Error::EventTimeout`] at the deadline and is unregistered when
    /// dropped.
    pub fn once(&self, kind: EventKind, timeout: std::time::Duration) -> EventWaiter {
        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst);
        let (complete_tx, complete_rx) = oneshot::channel();
        self.shared.registrations.lock().insert(
            id,
            Registration {
                kind,
                slot: Slot::Once(Some(complete_tx)),
            },
        );
        EventWaiter {
            rx: complete_rx,
            kind,
            deadline: Deadline::start(timeout),
            _registration: Subscription::new(id, &self.shared),
        }
    }

    /// Subscribes to the raw event stream (all kinds).
    pub fn subscribe(&self) -> EventStream {
        EventStream {
            rx: self.shared.tx.subscribe(),
        }
    }

    /// Delivers `event` to every matching registration in registration
    /// order, then broadcasts it to streams. One-shot registrations are
    /// consumed by their first matching event.
    pub(crate) fn emit(&self, event: SessionEvent) {
        enum Delivery {
            Handler(HandlerFn),
            Once(oneshot::Sender<SessionEvent>),
        }

        let kind = event.kind();
        let mut deliveries = Vec::new();
        {
            let mut registrations = self.shared.registrations.lock();
            let mut spent = Vec::new();
            for (id, registration) in registrations.iter_mut() {
                if registration.kind != kind {
                    continue;
                }
                match &mut registration.slot {
                    Slot::Persistent(handler) => deliveries.push(Delivery::Handler(Arc::clone(handler))),
                    Slot::Once(sender) => {
                        if let Some(tx) = sender.take() {
                            deliveries.push(Delivery::Once(tx));
                            spent.push(*id);
                        }
                    }
                }
            }
            for id in spent {
                registrations.shift_remove(&id);
            }
        }

        // Invoke outside the lock so handlers may register or cancel
        // subscriptions; collected order preserves registration order.
        for delivery in deliveries {
            match delivery {
                Delivery::Handler(handler) => handler(&event),
                Delivery::Once(tx) => {
                    let _ = tx.send(event.clone());
                }
            }
        }

        let _ = self.shared.tx.send(event);
    }

    /// Drops every registration. Pending one-shot waiters fail with
    /// [`Error::SessionClosed`]; streams end.
    pub(crate) fn shutdown(&self) {
        self.shared.registrations.lock().clear();
    }

    #[cfg(test)]
    fn registration_count(&self) -> usize {
        self.shared.registrations.lock().len()
    }
}

impl std::fmt::Debug for EventBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBroker")
            .field("registrations", &self.shared.registrations.lock().len())
            .finish()
    }
}

/// RAII handle that unregisters a broker registration on drop.
///
/// Holds a weak reference to the broker, so outliving the session is safe
/// (drop becomes a no-op).
pub struct Subscription {
    id: HandlerId,
    shared: std::sync::Weak<BrokerShared>,
}

impl Subscription {
    fn new(id: HandlerId, shared: &Arc<BrokerShared>) -> Self {
        Self {
            id,
            shared: Arc::downgrade(shared),
        }
    }

    /// Returns this registration's ID.
    pub fn id(&self) -> HandlerId {
        self.id
    }

    /// Explicitly unregisters. Equivalent to dropping.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.registrations.lock().shift_remove(&self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// One-shot event expectation with a deadline.
///
/// Created by [`EventBroker::once`]. Dropping the waiter cancels the
/// registration, so an expectation that is never awaited does not leak.
pub struct EventWaiter {
    rx: oneshot::Receiver<SessionEvent>,
    kind: EventKind,
    deadline: Deadline,
    _registration: Subscription,
}

impl EventWaiter {
    /// Waits for the expected event.
    ///
    /// The deadline was started at registration, so only the remaining
    /// budget is waited here.
    ///
    /// # Errors
    ///
    /// - [`Error::EventTimeout`] if the deadline elapses first
    /// - [`Error::SessionClosed`] if the session shuts down while waiting
    pub async fn wait(self) -> Result<SessionEvent> {
        match tokio::time::timeout(self.deadline.remaining(), self.rx).await {
            Ok(Ok(event)) => Ok(event),
            Ok(Err(_)) => Err(Error::SessionClosed),
            Err(_) => Err(Error::EventTimeout {
                kind: self.kind,
                elapsed: self.deadline.elapsed(),
            }),
        }
    }

    /// The kind this waiter expects.
    pub fn kind(&self) -> EventKind {
        self.kind
    }
}

impl std::fmt::Debug for EventWaiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventWaiter")
            .field("kind", &self.kind.to_string())
            .field("remaining", &self.deadline.remaining())
            .finish()
    }
}

/// Lag-tolerant wrapper around the broker's broadcast stream.
///
/// Broadcast lag is logged and skipped rather than surfaced, so slow
/// observers cannot break their own receive loops.
pub struct EventStream {
    rx: broadcast::Receiver<SessionEvent>,
}

impl EventStream {
    /// Receives the next event, or `None` once the session is gone.
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(dropped = n, "event stream lagged, dropped events");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Receives an event if one is immediately available.
    pub fn try_recv(&mut self) -> Option<SessionEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    tracing::warn!(dropped = n, "event stream lagged, dropped events");
                }
                Err(broadcast::error::TryRecvError::Empty | broadcast::error::TryRecvError::Closed) => {
                    return None;
                }
            }
        }
    }
}
