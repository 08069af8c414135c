//! Options for opening an isolation context.

use serde::{Deserialize, Serialize};

use crate::StorageState;

/// Options for [`BrowserDriver::open_session`].
///
/// Storage state is an explicit value with caller-owned lifecycle; the
/// orchestrator never reads ambient state files itself.
///
/// [`BrowserDriver::open_session`]: crate::BrowserDriver::open_session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOptions {
    /// Cookie/storage snapshot to seed the context with.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_state: Option<StorageState>,

    /// Base URL resolved against relative navigation targets.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// User agent override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    /// Locale override (e.g. "en-GB").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
}

impl SessionOptions {
    /// Creates a new builder.
    pub fn builder() -> SessionOptionsBuilder {
        SessionOptionsBuilder::default()
    }
}

/// Builder for [`SessionOptions`].
#[derive(Debug, Clone, Default)]
pub struct SessionOptionsBuilder {
    inner: SessionOptions,
}

impl SessionOptionsBuilder {
    /// Seeds the context with a previously exported storage snapshot.
    pub fn storage_state(mut self, state: StorageState) -> Self {
        self.inner.storage_state = Some(state);
        self
    }

    /// Sets the base URL for relative navigation.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.inner.base_url = Some(url.into());
        self
    }

    /// Sets the user agent.
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.inner.user_agent = Some(agent.into());
        self
    }

    /// Sets the locale.
    pub fn locale(mut self, locale: impl Into<String>) -> Self {
        self.inner.locale = Some(locale.into());
        self
    }

    /// Builds the options.
    pub fn build(self) -> SessionOptions {
        self.inner
    }
}
