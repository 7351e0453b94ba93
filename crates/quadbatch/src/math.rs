//! Math types and glam re-exports.
//!
//! We re-export [glam](https://docs.rs/glam) types so users don't need to
//! depend on it directly. Two rectangle types cover the two coordinate
//! spaces the crate works in: [`Rect`] for floating-point pixel space
//! (source and destination rectangles of a sprite) and [`AtlasRect`] for the
//! integer texel grid of an atlas canvas.

pub use glam::{Mat4, Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// An axis-aligned rectangle in pixel space: top-left corner plus size.
///
/// Coordinates follow screen conventions: `(0, 0)` is the top-left corner
/// and Y grows downward.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    /// Create a rectangle from its top-left corner and size.
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// A rectangle at the origin with the given size.
    pub const fn from_size(width: f32, height: f32) -> Self {
        Self::new(0.0, 0.0, width, height)
    }

    /// Top-left corner.
    pub fn position(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    /// Width and height as a vector.
    pub fn size(&self) -> Vec2 {
        Vec2::new(self.width, self.height)
    }

    /// Shrink by half a texel on every side so bilinear sampling stays on
    /// texel centers and never reads a neighbouring atlas entry.
    pub fn texel_inset(self) -> Self {
        Self {
            x: self.x + 0.5,
            y: self.y + 0.5,
            width: self.width - 1.0,
            height: self.height - 1.0,
        }
    }
}

impl From<AtlasRect> for Rect {
    fn from(r: AtlasRect) -> Self {
        Self::new(r.x as f32, r.y as f32, r.width as f32, r.height as f32)
    }
}

/// An integer rectangle on an atlas canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct AtlasRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl AtlasRect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// One past the right-most column.
    pub const fn right(&self) -> u32 {
        self.x + self.width
    }

    /// One past the bottom-most row.
    pub const fn bottom(&self) -> u32 {
        self.y + self.height
    }

    /// Half-open overlap test. Rectangles that only share an edge do not
    /// intersect.
    pub const fn intersects(&self, other: &AtlasRect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    /// True if `other` lies entirely inside `self`.
    pub const fn contains(&self, other: &AtlasRect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    pub const fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}
