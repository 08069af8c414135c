//! Point-in-time element snapshots returned by driver queries.

use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box of an element, in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// X coordinate of the top-left corner.
    pub x: f64,
    /// Y coordinate of the top-left corner.
    pub y: f64,
    /// Box width.
    pub width: f64,
    /// Box height.
    pub height: f64,
}

impl BoundingBox {
    /// Returns true if the box encloses a non-zero area.
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// Snapshot of one element at one query instant.
///
/// The `node_id` is stable for the lifetime of the underlying DOM node:
/// two snapshots with the same id refer to the same node, and a node that
/// is removed and replaced by an equivalent one gets a fresh id. Nothing
/// else about a snapshot stays valid once the document mutates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawElement {
    /// Driver-assigned identifier for the underlying node.
    pub node_id: u64,
    /// Whether the node is still attached to the document.
    pub attached: bool,
    /// Computed visibility (non-zero box, not display:none / visibility:hidden).
    pub visible: bool,
    /// Whether the element accepts input (not disabled).
    pub enabled: bool,
    /// Layout box at query time, if the element is rendered.
    pub bounding_box: Option<BoundingBox>,
    /// Text content at query time.
    pub text: String,
    /// Current input value, for form controls.
    pub value: Option<String>,
}

impl RawElement {
    /// Returns true if the snapshot passed the visibility gate at query
    /// time: attached, visible, and occupying a non-zero box.
    pub fn is_displayed(&self) -> bool {
        self.attached && self.visible && self.bounding_box.is_some_and(|b| !b.is_empty())
    }
}
