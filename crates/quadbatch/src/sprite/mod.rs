//! # Sprite — The Batch Engine
//!
//! A sprite batch turns many small draw requests into few GPU draw calls.
//! Each request is a textured quad: four vertices, positioned, rotated and
//! tinted on the CPU. Quads that sample the same texture and sit next to each
//! other in draw order share one draw call.
//!
//! ## Architecture
//!
//! ```text
//!   draw / draw_ex / fill_rectangle / draw_line / draw_text
//!         │
//!         ▼
//!   ┌───────────────┐  records + texture identities (parallel arrays)
//!   │  SpriteQueue  │
//!   └───────┬───────┘
//!           │ end()
//!           ▼
//!   ┌───────────────┐  stable merge sort over a permutation
//!   │  BatchSorter  │  (skipped for SubmissionOrder)
//!   └───────┬───────┘
//!           ▼
//!   ┌───────────────┐  texture runs → chunks of ≤ max_batch_size quads
//!   │    Flusher    │  lock device, bind state, map, fill, unmap, draw
//!   └───────┬───────┘
//!           ▼
//!   ┌───────────────┐  record → 4 vertices (origin, rotation, flips)
//!   │  emit_quad    │  one or two rayon workers per chunk
//!   └───────────────┘
//! ```
//!
//! ## Design Decisions
//!
//! **CPU-side vertex transform.** Rotation, origin and flips are applied
//! while emitting, so the shader only multiplies by the frame's
//! view-projection. Sprites with different transforms but one texture share
//! a draw call.
//!
//! **Records are never moved.** Sorting produces a permutation of indices;
//! the flusher reads records through it. Swapping a 4-byte index is cheaper
//! than swapping a whole record.
//!
//! **One static index buffer.** Every quad uses the same six-index pattern,
//! so the index buffer is built once per engine and every chunk draws from
//! index 0.
//!
//! ## Comparison
//!
//! - **MonoGame / XNA `SpriteBatch`**: Same Begin/Draw/End contract and sort
//!   modes. Vertex fill is single-threaded there.
//! - **Bevy** (`bevy_sprite`): Instanced rendering with a per-instance
//!   transform buffer. Scales further but needs a more complex shader.
//! - **Love2D**: Automatic batching of consecutive same-texture draws, very
//!   similar to `SortPolicy::SubmissionOrder`.

pub mod batch;
pub mod emit;
pub mod flush;
pub mod index;
pub mod record;
pub mod sort;
pub mod state;
pub mod text;
pub mod vertex;

pub use batch::{Destination, DrawParams, SpriteBatch};
pub use flush::FlushStats;
pub use record::{SpriteEffects, SpriteRecord, TextureIdentity};
pub use state::{
    BeginParams, BlendMode, DepthMode, FrameState, RasterizerMode, RenderState, SamplerMode,
    ScissorRect, SortPolicy, screen_projection,
};
pub use text::{Glyph, GlyphGrid, GlyphProvider};
pub use vertex::{AtlasSpriteVertex, QuadVertex, SpriteVertex};

use serde::{Deserialize, Serialize};

/// An RGBA color with floating-point components in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const WHITE: Self = Self { r: 1.0, g: 1.0, b: 1.0, a: 1.0 };
    pub const BLACK: Self = Self { r: 0.0, g: 0.0, b: 0.0, a: 1.0 };
    pub const RED: Self = Self { r: 1.0, g: 0.0, b: 0.0, a: 1.0 };
    pub const GREEN: Self = Self { r: 0.0, g: 1.0, b: 0.0, a: 1.0 };
    pub const BLUE: Self = Self { r: 0.0, g: 0.0, b: 1.0, a: 1.0 };

    /// Create a color from RGB (alpha = 1).
    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    /// Create a color from RGBA.
    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::WHITE
    }
}
