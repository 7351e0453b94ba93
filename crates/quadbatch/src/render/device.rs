//! # Device — The GPU Seam
//!
//! The batch engine and the atlas never talk to a graphics API directly.
//! They go through [`RenderDevice`], which exposes the handful of operations
//! a sprite renderer needs:
//!
//! ```text
//!  SpriteBatch::end()                        RenderDevice
//!  ──────────────────                        ────────────
//!  for each chunk of one texture run:
//!      lock device
//!      bind frame state    ────────────────► apply_frame_state
//!      map vertex region   ────────────────► map_vertices(texture, quads)
//!      fill (1 or 2 workers, no device calls)
//!      unmap               ────────────────► unmap_vertices
//!      draw                ────────────────► draw_indexed(quads * 6)
//!      unlock
//!  finish ─────────────────────────────────► finish_frame
//! ```
//!
//! The mapped region is returned as `&mut [Vertex]` borrowed from the device,
//! so the borrow checker guarantees every fill worker has returned before
//! `unmap_vertices` can be called.
//!
//! ## Sharing
//!
//! One device is shared by every batch engine and atlas that renders to it.
//! Concurrent submission to one GPU context is unsafe, so the device lives
//! behind a [`SharedDevice`] (`Arc<parking_lot::Mutex<_>>`) and every
//! state/map/fill/unmap/draw sequence runs under one lock acquisition.
//! Engines interleave at chunk granularity, so each chunk binds its own
//! engine's frame state first; a chunk never draws under another engine's
//! state, and `finish_frame` only ever sees whole chunks.
//!
//! ## Implementations
//!
//! - [`RecordingDevice`](super::RecordingDevice): headless, records every
//!   draw call. Used by tests and tooling.
//! - `WgpuDevice` (feature `wgpu-backend`): renders to an offscreen target.

use std::sync::Arc;

use parking_lot::Mutex;

use super::texture::{Texture, TextureHandle};
use crate::error::DeviceResult;
use crate::math::AtlasRect;
use crate::sprite::state::FrameState;
use crate::sprite::vertex::QuadVertex;

/// A device shared between batch engines and atlases.
pub type SharedDevice<D> = Arc<Mutex<D>>;

/// Wrap a device for sharing.
pub fn share<D: RenderDevice>(device: D) -> SharedDevice<D> {
    Arc::new(Mutex::new(device))
}

/// Parameters for creating an RGBA8 texture.
#[derive(Debug, Clone, Copy)]
pub struct TextureDesc<'a> {
    pub label: &'a str,
    pub width: u32,
    pub height: u32,
    /// Array layers. 1 for a plain 2D texture.
    pub layers: u32,
    /// Initial pixels, tightly packed RGBA8, layer-major. `None` leaves the
    /// texture transparent black.
    pub data: Option<&'a [u8]>,
}

impl<'a> TextureDesc<'a> {
    /// A single-layer texture initialised from `data`.
    pub fn rgba(label: &'a str, width: u32, height: u32, data: &'a [u8]) -> Self {
        Self {
            label,
            width,
            height,
            layers: 1,
            data: Some(data),
        }
    }

    /// An empty texture of the given size and layer count.
    pub fn empty(label: &'a str, width: u32, height: u32, layers: u32) -> Self {
        Self {
            label,
            width,
            height,
            layers,
            data: None,
        }
    }

    pub(crate) fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * self.layers.max(1) as usize * 4
    }
}

/// Upstream graphics-device abstraction consumed by the batch engine and
/// the atlas.
pub trait RenderDevice: Send {
    /// Vertex format written by the batch engine for this device.
    type Vertex: QuadVertex;

    /// Create an RGBA8 texture.
    fn create_texture(&mut self, desc: &TextureDesc<'_>) -> DeviceResult<Texture>;

    /// Overwrite a sub-rectangle of one layer. `data` is tightly packed RGBA8
    /// covering exactly `region`.
    fn write_texture_region(
        &mut self,
        texture: Texture,
        layer: u32,
        region: AtlasRect,
        data: &[u8],
    ) -> DeviceResult<()>;

    /// Release a texture. Its handle stops resolving.
    fn destroy_texture(&mut self, texture: Texture) -> DeviceResult<()>;

    /// Resolve a handle, or `None` if it is stale.
    fn texture(&self, handle: TextureHandle) -> Option<Texture>;

    /// Upload the shared quad index buffer. Called once per batch engine.
    fn upload_indices(&mut self, indices: &[u16]);

    /// Bind render state and matrices for the draws that follow.
    ///
    /// Called before every chunk, so consecutive calls usually carry equal
    /// states. Implementations group draws under equal consecutive states.
    fn apply_frame_state(&mut self, state: &FrameState);

    /// Map a vertex region for `quad_count` quads sampling `texture`.
    /// The returned slice holds exactly `quad_count * 4` vertices.
    fn map_vertices(
        &mut self,
        texture: Texture,
        quad_count: usize,
    ) -> DeviceResult<&mut [Self::Vertex]>;

    /// Make the last mapped region visible to the GPU.
    fn unmap_vertices(&mut self);

    /// Draw `index_count` indices starting at index 0 over the last
    /// unmapped region.
    fn draw_indexed(&mut self, index_count: u32);

    /// Submit every draw recorded since the last submission.
    fn finish_frame(&mut self) -> DeviceResult<()>;
}

/// Built-in textures every batch engine needs, created once per device and
/// handed to each engine at construction.
#[derive(Debug, Clone, Copy)]
pub struct DefaultResources {
    /// 1x1 opaque white. Filled rectangles and lines sample this so the
    /// shader's `texture × tint` yields the tint.
    pub white: Texture,
    /// 1x1 opaque black.
    pub black: Texture,
}

impl DefaultResources {
    pub fn new<D: RenderDevice + ?Sized>(device: &mut D) -> DeviceResult<Self> {
        let white = device.create_texture(&TextureDesc::rgba("white 1x1", 1, 1, &[255, 255, 255, 255]))?;
        let black = device.create_texture(&TextureDesc::rgba("black 1x1", 1, 1, &[0, 0, 0, 255]))?;
        Ok(Self { white, black })
    }
}
