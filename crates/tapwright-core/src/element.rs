//! Element handles and geometry shared by every session backend.
//!
//! An [`ElementHandle`] is only meaningful for the screen state it was
//! fetched from. Callers resolve, use and drop it; nothing in this crate keeps
//! handles across polling iterations.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque reference to a live UI element, as issued by the device session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementHandle(String);

impl ElementHandle {
    /// Wraps a backend-issued element id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The backend element id (W3C `element-6066-…` value for Appium).
    pub fn id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The frame (position and dimensions) of a UI element in screen coordinates.
///
/// Deserializes directly from a W3C `GET /element/{id}/rect` payload.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElementFrame {
    /// The x-coordinate of the element's top-left corner.
    pub x: f64,
    /// The y-coordinate of the element's top-left corner.
    pub y: f64,
    /// The width of the element.
    pub width: f64,
    /// The height of the element.
    pub height: f64,
}

impl ElementFrame {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Center point of the frame.
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Whether the point lies inside the frame. Edges are inclusive.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.x <= x && x <= self.x + self.width && self.y <= y && y <= self.y + self.height
    }
}
