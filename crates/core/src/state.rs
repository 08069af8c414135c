//! Typed page-object states and confirmed transitions.
//!
//! A page object is a plain struct wrapping a [`PageHandle`] and
//! implementing [`PageState`]. Actions that move the browser to a
//! different logical page return the new state's type, and [`confirm`]
//! makes that promise checkable: it waits for a marker element that only
//! exists on the destination and converts a marker timeout into
//! [`Error::StateTransition`] naming both states and the action.

use crate::error::{Error, Result};
use crate::locator::LocatorQuery;
use crate::page::{LoadState, PageHandle};

/// A typed view of one logical page state.
///
/// States are composition-only: they wrap a handle rather than extending
/// a base page, and expose domain operations as inherent methods.
pub trait PageState: Sized {
    /// Name used in transition errors (e.g. `"LoginPage"`).
    const NAME: &'static str;

    /// The underlying page handle.
    fn handle(&self) -> &PageHandle;

    /// Current URL of the underlying page.
    fn current_url(&self) -> String {
        self.handle().current_url()
    }

    /// Whether the current URL contains `fragment`.
    fn url_contains(&self, fragment: &str) -> bool {
        self.current_url().contains(fragment)
    }

    /// Waits for the underlying page to reach a load state.
    fn wait_for_load(
        &self,
        state: LoadState,
    ) -> impl std::future::Future<Output = Result<()>> + Send {
        self.handle().wait_for_load_state(state, None)
    }
}

/// Confirms a state transition on the page the action ran on.
///
/// Resolves `marker` — an element that exists only in the destination
/// state — then constructs the destination from the same handle. A marker
/// timeout becomes [`Error::StateTransition`]; other failures (closed
/// page, driver error) pass through unchanged.
pub async fn confirm<From, To>(
    from: &From,
    action: &'static str,
    marker: LocatorQuery,
    into: impl FnOnce(PageHandle) -> To,
) -> Result<To>
where
    From: PageState,
    To: PageState,
{
    confirm_on(from.handle(), From::NAME, action, marker, into).await
}

/// Confirms a state transition onto an explicit handle.
///
/// For transitions that land on a different page than the one the action
/// ran on, such as a popup adopted through the session's event broker.
pub async fn confirm_on<To>(
    handle: &PageHandle,
    from_state: &'static str,
    action: &'static str,
    marker: LocatorQuery,
    into: impl FnOnce(PageHandle) -> To,
) -> Result<To>
where
    To: PageState,
{
    match handle.locator_query(marker).resolve().await {
        Ok(_) => {
            tracing::debug!(from = from_state, to = To::NAME, action, "state transition confirmed");
            Ok(into(handle.clone()))
        }
        Err(e) if e.is_timeout() => Err(Error::StateTransition {
            from_state,
            action,
            expected_state: To::NAME,
        }),
        Err(e) => Err(e),
    }
}
