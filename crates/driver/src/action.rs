//! Actions the orchestrator can ask a driver to perform on an element.

use serde::{Deserialize, Serialize};

/// One input action against a resolved element.
///
/// Actionability checks (visible, enabled, stable) happen in the
/// orchestrator before the action is issued; drivers perform the action
/// exactly once or fail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Action {
    /// Single primary-button click at the element's center.
    Click,
    /// Replaces the element's value with `value`.
    Fill {
        /// Text to set.
        value: String,
    },
    /// Sets a checkbox/radio checked state.
    SetChecked {
        /// Desired state.
        checked: bool,
    },
    /// Presses a single key (or combination, e.g. "Control+a") with the
    /// element focused.
    Press {
        /// Key descriptor.
        key: String,
    },
    /// Selects an option of a `<select>` element by value.
    SelectOption {
        /// Option value to select.
        value: String,
    },
}

impl Action {
    /// Short name used in logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Action::Click => "click",
            Action::Fill { .. } => "fill",
            Action::SetChecked { .. } => "setChecked",
            Action::Press { .. } => "press",
            Action::SelectOption { .. } => "selectOption",
        }
    }
}
