//! # Vertex — Per-Corner Data Sent to the GPU
//!
//! Every queued sprite becomes four vertices. Each vertex carries a position,
//! a tint color, and a texture coordinate, packed into a flat `#[repr(C)]`
//! struct so a slice of them can be handed to the GPU as raw bytes.
//!
//! ## Memory Layout
//!
//! ```text
//! SpriteVertex (40 bytes per vertex)
//! ┌────────────────────┬────────────────────┬──────────────┐
//! │ position           │ color              │ uv           │
//! │ [f32; 4]           │ [f32; 4]           │ [f32; 2]     │
//! │ 16 bytes           │ 16 bytes           │ 8 bytes      │
//! │ offset 0           │ offset 16          │ offset 32    │
//! │ location(0)        │ location(1)        │ location(2)  │
//! └────────────────────┴────────────────────┴──────────────┘
//!
//! AtlasSpriteVertex (44 bytes per vertex) = SpriteVertex + slice
//! ┌──────────────────────────────────────────┬──────────────┐
//! │ position, color, uv (as above)           │ slice: f32   │
//! │                                          │ offset 40    │
//! │                                          │ location(3)  │
//! └──────────────────────────────────────────┴──────────────┘
//! ```
//!
//! Position is a full `(x, y, depth, 1)` so the shader can multiply by the
//! frame's view-projection directly. The atlas variant adds the array slice
//! the fragment shader samples from when all atlas pages live in one
//! texture array.

use bytemuck::{Pod, Zeroable};

/// A vertex the batch engine knows how to write.
pub trait QuadVertex: Pod + Send + Sync {
    /// Assemble one vertex. `slice` is ignored by formats without an array
    /// slice attribute.
    fn new(position: [f32; 4], color: [f32; 4], uv: [f32; 2], slice: u32) -> Self;
}

/// Vertex for sprites drawn from a single 2D texture.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SpriteVertex {
    pub position: [f32; 4],
    pub color: [f32; 4],
    pub uv: [f32; 2],
}

impl QuadVertex for SpriteVertex {
    fn new(position: [f32; 4], color: [f32; 4], uv: [f32; 2], _slice: u32) -> Self {
        Self { position, color, uv }
    }
}

/// Vertex for sprites drawn from a shared atlas texture array.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct AtlasSpriteVertex {
    pub position: [f32; 4],
    pub color: [f32; 4],
    pub uv: [f32; 2],
    /// Array slice as a float; the shader truncates it back to an integer.
    pub slice: f32,
}

impl QuadVertex for AtlasSpriteVertex {
    fn new(position: [f32; 4], color: [f32; 4], uv: [f32; 2], slice: u32) -> Self {
        Self {
            position,
            color,
            uv,
            slice: slice as f32,
        }
    }
}
