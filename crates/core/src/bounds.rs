//! Axis-aligned bounding box implementation using glam
//!
//! This module provides a simple AABB (Axis-Aligned Bounding Box)
//! implementation for 2D rectangles. Map objects never rotate, so all
//! bounds stay axis-aligned, keeping containment and overlap tests cheap.

use glam::Vec2;

/// An axis-aligned bounding box represented by minimum and maximum points
///
/// Containment follows the half-open convention used by the selection
/// code: a point on the minimum edge is inside, a point on the maximum
/// edge is not. This keeps adjacent objects from both claiming the pixel
/// on their shared edge.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Bounds {
    /// The minimum point (top-left in screen coordinates)
    pub min: Vec2,
    /// The maximum point (bottom-right in screen coordinates)
    pub max: Vec2,
}

impl Bounds {
    /// Creates a new bounds from minimum and maximum points
    ///
    /// Note: This doesn't validate that min is actually less than max.
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    /// Creates bounds from an origin point and size
    pub fn from_origin_size(origin: Vec2, size: Vec2) -> Self {
        Self {
            min: origin,
            max: origin + size,
        }
    }

    /// Creates an empty bounds at the origin
    pub fn zero() -> Self {
        Self {
            min: Vec2::ZERO,
            max: Vec2::ZERO,
        }
    }

    /// Returns the origin (minimum point) of the bounds
    pub fn origin(&self) -> Vec2 {
        self.min
    }

    /// Returns the size of the bounds
    pub fn size(&self) -> Vec2 {
        self.max - self.min
    }

    /// Returns the width of the bounds
    pub fn width(&self) -> f32 {
        self.max.x - self.min.x
    }

    /// Returns the height of the bounds
    pub fn height(&self) -> f32 {
        self.max.y - self.min.y
    }

    /// Tests if this bounds overlaps another
    ///
    /// Edges are open: two bounds that merely touch do not intersect.
    pub fn intersects(&self, other: &Self) -> bool {
        self.min.x < other.max.x
            && self.max.x > other.min.x
            && self.min.y < other.max.y
            && self.max.y > other.min.y
    }

    /// Tests if a point is contained within the bounds
    ///
    /// Half-open: the minimum edge is inside, the maximum edge is not.
    pub fn contains_point(&self, point: Vec2) -> bool {
        point.x >= self.min.x
            && point.y >= self.min.y
            && point.x < self.max.x
            && point.y < self.max.y
    }

    /// Expands the bounds by a given amount in all directions
    pub fn expand(&self, amount: f32) -> Self {
        Self {
            min: self.min - Vec2::splat(amount),
            max: self.max + Vec2::splat(amount),
        }
    }

    /// Translates the bounds by a given offset
    pub fn translate(&self, offset: Vec2) -> Self {
        Self {
            min: self.min + offset,
            max: self.max + offset,
        }
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::zero()
    }
}
