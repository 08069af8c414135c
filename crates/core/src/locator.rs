//! Declarative element queries with auto-waiting resolution.
//!
//! A [`LocatorQuery`] describes *which* elements — selector, filters, and
//! retry policy — and is re-evaluated from scratch on every poll. It never
//! caches element references, which is what makes it safe across DOM
//! mutation: if a matched node is replaced between polls, the next poll
//! simply matches the replacement.
//!
//! A [`Locator`] binds a query to one [`PageHandle`] and performs the
//! polling. Resolution accepts a candidate only once it is simultaneously
//! attached, visible, and stable (bounding box unchanged across two
//! consecutive polls, which removes races with in-flight animation and
//! reflow). Actions re-resolve, gate on actionability, then act exactly
//! once.

use std::sync::Arc;
use std::time::Duration;

use tiller_driver::{Action, BoundingBox, RawElement};

use crate::error::{Error, Result};
use crate::page::PageHandle;
use crate::timeouts::{Deadline, RetryPolicy};

/// Text predicate for the `has_text` filter.
#[derive(Debug, Clone)]
pub enum TextMatch {
    /// Case-sensitive substring match.
    Substring(String),
    /// Whole-text equality after trimming.
    Exact(String),
    /// Regular expression match.
    Pattern(regex::Regex),
}

impl TextMatch {
    fn matches(&self, text: &str) -> bool {
        match self {
            TextMatch::Substring(needle) => text.contains(needle.as_str()),
            TextMatch::Exact(expected) => text.trim() == expected,
            TextMatch::Pattern(re) => re.is_match(text),
        }
    }

    fn describe(&self) -> String {
        match self {
            TextMatch::Substring(s) => format!("hasText~\"{s}\""),
            TextMatch::Exact(s) => format!("hasText=\"{s}\""),
            TextMatch::Pattern(re) => format!("hasText=/{re}/"),
        }
    }
}

#[derive(Debug, Clone)]
enum Filter {
    HasText(TextMatch),
    Has(Arc<str>),
    HasNot(Arc<str>),
}

/// How a multi-match query picks its subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pick {
    /// Require exactly one match (strict mode).
    Single,
    /// Deterministically take index 0.
    First,
    /// Deterministically take index `n`.
    Nth(usize),
}

/// Immutable description of an element selection strategy plus its retry
/// policy. Combinators return a new query; existing values never mutate.
#[derive(Debug, Clone)]
pub struct LocatorQuery {
    selector: Arc<str>,
    filters: Vec<Filter>,
    pick: Pick,
    policy: RetryPolicy,
}

impl LocatorQuery {
    /// Creates a query for a selector expression.
    pub fn new(selector: impl Into<Arc<str>>) -> Self {
        Self {
            selector: selector.into(),
            filters: Vec::new(),
            pick: Pick::Single,
            policy: RetryPolicy::default(),
        }
    }

    /// Keeps only candidates whose text contains `needle`.
    pub fn has_text(mut self, needle: impl Into<String>) -> Self {
        self.filters.push(Filter::HasText(TextMatch::Substring(needle.into())));
        self
    }

    /// Keeps only candidates whose trimmed text equals `expected`.
    pub fn has_text_exact(mut self, expected: impl Into<String>) -> Self {
        self.filters.push(Filter::HasText(TextMatch::Exact(expected.into())));
        self
    }

    /// Keeps only candidates whose text matches `pattern`.
    pub fn has_text_matching(mut self, pattern: regex::Regex) -> Self {
        self.filters.push(Filter::HasText(TextMatch::Pattern(pattern)));
        self
    }

    /// Keeps only candidates containing a descendant matching `selector`.
    pub fn has(mut self, selector: impl Into<Arc<str>>) -> Self {
        self.filters.push(Filter::Has(selector.into()));
        self
    }

    /// Drops candidates containing a descendant matching `selector`.
    pub fn has_not(mut self, selector: impl Into<Arc<str>>) -> Self {
        self.filters.push(Filter::HasNot(selector.into()));
        self
    }

    /// Opts out of strict single-match mode: deterministically picks the
    /// first match.
    pub fn first(mut self) -> Self {
        self.pick = Pick::First;
        self
    }

    /// Deterministically picks match `index`.
    pub fn nth(mut self, index: usize) -> Self {
        self.pick = Pick::Nth(index);
        self
    }

    /// Overrides the resolution deadline.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.policy = self.policy.with_timeout(timeout);
        self
    }

    /// Overrides the poll interval.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.policy = self.policy.with_poll_interval(interval);
        self
    }

    /// The retry policy attached to this query.
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Human-readable form used in logs and error messages.
    pub fn describe(&self) -> String {
        let mut out = self.selector.to_string();
        for filter in &self.filters {
            match filter {
                Filter::HasText(m) => {
                    out.push_str(" >> ");
                    out.push_str(&m.describe());
                }
                Filter::Has(sel) => {
                    out.push_str(" >> has=");
                    out.push_str(sel);
                }
                Filter::HasNot(sel) => {
                    out.push_str(" >> hasNot=");
                    out.push_str(sel);
                }
            }
        }
        match self.pick {
            Pick::Single => {}
            Pick::First => out.push_str(" >> first"),
            Pick::Nth(n) => out.push_str(&format!(" >> nth={n}")),
        }
        out
    }
}

/// Transient, non-owning result of one resolution attempt.
///
/// An `ElementRef` describes a node at one instant and must never be
/// retained across a wait or retry boundary. It is deliberately not
/// `Clone`: anything longer-lived belongs in a [`LocatorQuery`], which can
/// be re-resolved.
#[derive(Debug)]
pub struct ElementRef {
    raw: RawElement,
}

impl ElementRef {
    /// Driver-assigned node identity.
    pub fn node_id(&self) -> u64 {
        self.raw.node_id
    }

    /// Text content at resolution time.
    pub fn text(&self) -> &str {
        &self.raw.text
    }

    /// Form value at resolution time.
    pub fn value(&self) -> Option<&str> {
        self.raw.value.as_deref()
    }

    /// Whether the element accepted input at resolution time.
    pub fn is_enabled(&self) -> bool {
        self.raw.enabled
    }

    /// Layout box at resolution time.
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        self.raw.bounding_box
    }

    pub(crate) fn raw(&self) -> &RawElement {
        &self.raw
    }
}

/// Options for [`Locator::click`].
#[derive(Debug, Clone, Default)]
pub struct ClickOptions {
    /// Deadline override for this action.
    pub timeout: Option<Duration>,
    /// Skip the visibility/stability/enabled gates.
    pub force: bool,
}

/// Options for [`Locator::fill`].
#[derive(Debug, Clone, Default)]
pub struct FillOptions {
    /// Deadline override for this action.
    pub timeout: Option<Duration>,
    /// Skip the visibility/stability/enabled gates.
    pub force: bool,
}

/// A [`LocatorQuery`] bound to one [`PageHandle`].
///
/// Cheap to create and clone; holds no element state. Every operation
/// re-runs the query against the live page.
#[derive(Debug, Clone)]
pub struct Locator {
    page: PageHandle,
    query: LocatorQuery,
}

impl Locator {
    pub(crate) fn new(page: PageHandle, query: LocatorQuery) -> Self {
        Self { page, query }
    }

    /// The underlying query.
    pub fn query(&self) -> &LocatorQuery {
        &self.query
    }

    fn map_query(self, f: impl FnOnce(LocatorQuery) -> LocatorQuery) -> Self {
        Self {
            page: self.page,
            query: f(self.query),
        }
    }

    /// Returns a locator with an extra `has_text` substring filter.
    pub fn has_text(self, needle: impl Into<String>) -> Self {
        self.map_query(|q| q.has_text(needle))
    }

    /// Returns a locator with an extra exact-text filter.
    pub fn has_text_exact(self, expected: impl Into<String>) -> Self {
        self.map_query(|q| q.has_text_exact(expected))
    }

    /// Returns a locator with an extra descendant filter.
    pub fn has(self, selector: impl Into<Arc<str>>) -> Self {
        self.map_query(|q| q.has(selector))
    }

    /// Returns a locator with an extra negated descendant filter.
    pub fn has_not(self, selector: impl Into<Arc<str>>) -> Self {
        self.map_query(|q| q.has_not(selector))
    }

    /// Returns a locator that deterministically picks the first match.
    pub fn first(self) -> Self {
        self.map_query(LocatorQuery::first)
    }

    /// Returns a locator that deterministically picks match `index`.
    pub fn nth(self, index: usize) -> Self {
        self.map_query(|q| q.nth(index))
    }

    /// Returns a locator with a different deadline.
    pub fn timeout(self, timeout: Duration) -> Self {
        self.map_query(|q| q.timeout(timeout))
    }

    /// Returns a locator with a different poll interval.
    pub fn poll_interval(self, interval: Duration) -> Self {
        self.map_query(|q| q.poll_interval(interval))
    }

    /// Resolves the query to a single element.
    ///
    /// Polls until the query matches (strictly one candidate, unless the
    /// query opted into `first`/`nth`) and the candidate is attached,
    /// visible, and stable across two consecutive polls.
    ///
    /// # Errors
    ///
    /// [`Error::LocatorTimeout`] with the last observed match count if the
    /// condition never holds within the deadline; [`Error::ClosedHandle`]
    /// as soon as a poll observes the page closed.
    pub async fn resolve(&self) -> Result<ElementRef> {
        let deadline = Deadline::start(self.query.policy.timeout);
        self.resolve_within(&deadline, false).await
    }

    /// Resolves the query to every current match, waiting until at least
    /// one visible match exists. Uniqueness is never enforced.
    pub async fn resolve_all(&self) -> Result<Vec<ElementRef>> {
        let deadline = Deadline::start(self.query.policy.timeout);
        loop {
            let matches = self.filtered_candidates(true)?;
            if !matches.is_empty() {
                return Ok(matches.into_iter().map(|raw| ElementRef { raw }).collect());
            }
            match deadline.next_pause(self.query.policy.poll_interval) {
                Some(pause) => tokio::time::sleep(pause).await,
                None => {
                    return Err(Error::LocatorTimeout {
                        selector: self.query.describe(),
                        last_match_count: 0,
                        elapsed: deadline.elapsed(),
                    });
                }
            }
        }
    }

    /// Number of elements currently matching the query and its filters.
    /// Resolves immediately and never waits.
    pub fn count(&self) -> Result<usize> {
        Ok(self.filtered_candidates(false)?.len())
    }

    /// Whether a matching element is visible right now. Never waits.
    pub fn is_visible(&self) -> Result<bool> {
        Ok(!self.filtered_candidates(true)?.is_empty())
    }

    /// Clicks the element.
    pub async fn click(&self, options: Option<ClickOptions>) -> Result<()> {
        let options = options.unwrap_or_default();
        self.perform(Action::Click, options.timeout, options.force).await
    }

    /// Replaces the element's value with `value`.
    pub async fn fill(&self, value: impl Into<String>, options: Option<FillOptions>) -> Result<()> {
        let options = options.unwrap_or_default();
        self.perform(Action::Fill { value: value.into() }, options.timeout, options.force)
            .await
    }

    /// Sets a checkbox/radio checked state.
    pub async fn set_checked(&self, checked: bool) -> Result<()> {
        self.perform(Action::SetChecked { checked }, None, false).await
    }

    /// Checks a checkbox or radio button.
    pub async fn check(&self) -> Result<()> {
        self.set_checked(true).await
    }

    /// Unchecks a checkbox.
    pub async fn uncheck(&self) -> Result<()> {
        self.set_checked(false).await
    }

    /// Presses a key with the element focused.
    pub async fn press(&self, key: impl Into<String>) -> Result<()> {
        self.perform(Action::Press { key: key.into() }, None, false).await
    }

    /// Selects a `<select>` option by value.
    pub async fn select_option(&self, value: impl Into<String>) -> Result<()> {
        self.perform(Action::SelectOption { value: value.into() }, None, false).await
    }

    /// Resolves and returns the element's text content.
    pub async fn text_content(&self) -> Result<String> {
        Ok(self.resolve().await?.text().to_string())
    }

    /// Resolves and returns the element's form value.
    pub async fn input_value(&self) -> Result<Option<String>> {
        Ok(self.resolve().await?.value().map(str::to_string))
    }

    /// Resolves and reports whether the element accepts input.
    pub async fn is_enabled(&self) -> Result<bool> {
        Ok(self.resolve().await?.is_enabled())
    }

    /// Resolve-then-act with a shared deadline: re-resolves the query,
    /// gates on actionability, performs the action exactly once, and
    /// retries resolution (never the action) if the element detaches
    /// between the two steps.
    async fn perform(&self, action: Action, timeout: Option<Duration>, force: bool) -> Result<()> {
        let budget = timeout.unwrap_or(self.query.policy.timeout);
        let deadline = Deadline::start(budget);

        // One actor per document: concurrent callers queue here.
        let _guard = self.page.action_guard().await;

        loop {
            let element = self.resolve_within(&deadline, force).await?;

            if !force && !element.is_enabled() {
                match deadline.next_pause(self.query.policy.poll_interval) {
                    Some(pause) => {
                        tokio::time::sleep(pause).await;
                        continue;
                    }
                    None => {
                        return Err(Error::NotActionable {
                            selector: self.query.describe(),
                            reason: "element is disabled".into(),
                            elapsed: deadline.elapsed(),
                        });
                    }
                }
            }

            match self.page.driver().act(element.raw(), &action) {
                Ok(()) => {
                    tracing::debug!(
                        selector = %self.query.describe(),
                        action = action.name(),
                        "action performed"
                    );
                    return Ok(());
                }
                Err(tiller_driver::DriverError::Detached) => {
                    // Node replaced between resolve and act: re-query.
                    match deadline.next_pause(self.query.policy.poll_interval) {
                        Some(pause) => tokio::time::sleep(pause).await,
                        None => {
                            return Err(Error::NotActionable {
                                selector: self.query.describe(),
                                reason: "element detached during action".into(),
                                elapsed: deadline.elapsed(),
                            });
                        }
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn resolve_within(&self, deadline: &Deadline, force: bool) -> Result<ElementRef> {
        let mut previous: Option<(u64, Option<BoundingBox>)> = None;
        let mut polls = 0u32;

        loop {
            let matches = self.filtered_candidates(!force)?;
            let last_count = matches.len();
            polls += 1;

            let chosen = match self.query.pick {
                Pick::Single if matches.len() == 1 => matches.into_iter().next(),
                Pick::Single => None,
                Pick::First => matches.into_iter().next(),
                Pick::Nth(n) => matches.into_iter().nth(n),
            };

            if let Some(raw) = chosen {
                let fingerprint = (raw.node_id, raw.bounding_box);
                if force || previous == Some(fingerprint) {
                    tracing::trace!(
                        selector = %self.query.describe(),
                        polls,
                        "locator resolved"
                    );
                    return Ok(ElementRef { raw });
                }
                // Same node must hold the same box on the next poll.
                previous = Some(fingerprint);
            } else {
                previous = None;
            }

            match deadline.next_pause(self.query.policy.poll_interval) {
                Some(pause) => tokio::time::sleep(pause).await,
                None => {
                    tracing::debug!(
                        selector = %self.query.describe(),
                        last_count,
                        polls,
                        "locator timed out"
                    );
                    return Err(Error::LocatorTimeout {
                        selector: self.query.describe(),
                        last_match_count: last_count,
                        elapsed: deadline.elapsed(),
                    });
                }
            }
        }
    }

    /// One fresh evaluation of the query: raw matches intersected with
    /// every filter, optionally gated on visibility. Nothing is memoized
    /// between calls.
    fn filtered_candidates(&self, require_displayed: bool) -> Result<Vec<RawElement>> {
        self.page.ensure_open()?;
        let driver = self.page.driver();
        let mut out = Vec::new();
        for raw in driver.query(&self.query.selector)? {
            if require_displayed && !raw.is_displayed() {
                continue;
            }
            if !require_displayed && !raw.attached {
                continue;
            }
            let mut keep = true;
            for filter in &self.query.filters {
                let pass = match filter {
                    Filter::HasText(m) => m.matches(&raw.text),
                    Filter::Has(sel) => !driver.query_within(&raw, sel)?.is_empty(),
                    Filter::HasNot(sel) => driver.query_within(&raw, sel)?.is_empty(),
                };
                if !pass {
                    keep = false;
                    break;
                }
            }
            if keep {
                out.push(raw);
            }
        }
        Ok(out)
    }
}
