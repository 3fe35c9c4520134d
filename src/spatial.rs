//! Spatial value types and the clamping / z-order helpers.
//!
//! Everything here is pure: no ids, no I/O. Mutations elsewhere always route
//! positions through [`clamp_position`], so [`within_bounds`] is expected to
//! hold for every element that has passed through the store.

#[cfg(test)]
#[path = "spatial_test.rs"]
mod spatial_test;

use serde::{Deserialize, Serialize};

use crate::consts::MIN_ELEMENT_SIZE;

/// A point in canvas space, or an offset between two such points.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Component-wise `self - other`.
    #[must_use]
    pub fn sub(self, other: Point) -> Point {
        Point { x: self.x - other.x, y: self.y - other.y }
    }
}

/// Placement of an element: top-left corner plus stacking order.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    /// Stacking order; higher values render above lower ones. Unique per canvas.
    pub z: i64,
}

impl Position {
    #[must_use]
    pub fn new(x: f64, y: f64, z: i64) -> Self {
        Self { x, y, z }
    }

    /// The planar part of the position.
    #[must_use]
    pub fn point(self) -> Point {
        Point { x: self.x, y: self.y }
    }
}

/// Width and height of an element's bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    #[must_use]
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Raise both dimensions to at least [`MIN_ELEMENT_SIZE`].
    #[must_use]
    pub fn normalized(self) -> Size {
        Size { width: min_dim(self.width), height: min_dim(self.height) }
    }
}

/// Dimensions of the canvas an element is clamped against.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub width: f64,
    pub height: f64,
}

impl Bounds {
    #[must_use]
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

fn min_dim(v: f64) -> f64 {
    if v.is_finite() { v.max(MIN_ELEMENT_SIZE) } else { MIN_ELEMENT_SIZE }
}

fn clamp_axis(value: f64, canvas_extent: f64, element_extent: f64) -> f64 {
    let max = (canvas_extent - element_extent).max(0.0);
    if !value.is_finite() {
        return 0.0;
    }
    value.clamp(0.0, max)
}

/// Clamp a candidate top-left corner so the element stays on the canvas.
///
/// Axes are clamped independently. An element wider (or taller) than the
/// canvas is pinned to 0 on that axis. Non-finite coordinates become 0.
#[must_use]
pub fn clamp_position(canvas: Bounds, size: Size, pos: Point) -> Point {
    Point {
        x: clamp_axis(pos.x, canvas.width, size.width),
        y: clamp_axis(pos.y, canvas.height, size.height),
    }
}

/// Next free z value: one above the current maximum, or 1 for an empty canvas.
///
/// Saturates at `i64::MAX`; stores renumber before a canvas gets there.
#[must_use]
pub fn next_z<I>(zs: I) -> i64
where
    I: IntoIterator<Item = i64>,
{
    zs.into_iter().max().unwrap_or(0).saturating_add(1)
}

/// Whether an element at `position` with `size` lies fully on the canvas.
///
/// Always false for an element larger than the canvas, even once clamped.
#[must_use]
pub fn within_bounds(canvas: Bounds, position: Position, size: Size) -> bool {
    position.x >= 0.0
        && position.y >= 0.0
        && position.x <= canvas.width - size.width
        && position.y <= canvas.height - size.height
}
