//! # Batch — The Begin / Draw / End Contract
//!
//! [`SpriteBatch`] is the front door of the engine. A frame is bracketed by
//! `begin` and `end`; every draw in between appends one record to the queue
//! and nothing touches the device until `end`:
//!
//! ```text
//!            begin(params)                 end()
//!   Idle ───────────────────► Recording ──────────► Idle
//!     ▲                        │    ▲               │
//!     │                        └────┘               │
//!     │                   draw / draw_ex /          │
//!     │                   fill_rectangle / ...      │
//!     │                                             │
//!     └──── sort (unless SubmissionOrder) ◄─────────┘
//!           flush runs in chunks, each binding
//!             this frame's state under the lock
//!           finish frame, clear queue
//! ```
//!
//! Calling things out of order (`draw` before `begin`, nested `begin`, `end`
//! without `begin`) fails the call with a [`BatchError`] and changes nothing.
//!
//! ## Design Decisions
//!
//! **Frame state is captured at `begin`.** The projection, view, transform,
//! render-state overrides and scissor are snapshotted into a [`FrameState`]
//! when the frame opens. A `resize` in the middle of a frame applies to the
//! next `begin`. Every chunk re-binds that snapshot, so engines sharing a
//! device never draw under each other's state.
//!
//! **Textures are validated once per cycle.** The first draw with a given
//! texture asks the device whether the handle is still live and caches the
//! resulting identity. Later draws with the same handle hit the cache and
//! never take the device lock.
//!
//! **The queue is always cleared.** If flushing fails part way through, the
//! error is returned, the queue is still emptied and the engine is back in
//! `Idle`, ready for the next frame.

use super::emit::RecordView;
use super::flush::{FlushStats, Flusher};
use super::index::quad_indices;
use super::record::{SpriteEffects, SpriteQueue, SpriteRecord, TextureIdentity};
use super::sort::BatchSorter;
use super::state::{BeginParams, FrameState, SortPolicy, screen_projection};
use super::Color;
use crate::config::BatchConfig;
use crate::error::{BatchError, BatchResult, DeviceError};
use crate::math::{Mat4, Rect, Vec2};
use crate::render::{DefaultResources, RenderDevice, SharedDevice, Texture};

/// Where a sprite lands on the render target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Destination {
    /// Explicit rectangle in render-target pixels.
    Rect(Rect),
    /// Top-left position; size is the source size times `scale`.
    Position { position: Vec2, scale: Vec2 },
}

/// Full parameter set for [`SpriteBatch::draw_ex`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawParams {
    pub destination: Destination,
    /// Texture region in texels. `None` is the whole texture.
    pub source: Option<Rect>,
    pub color: Color,
    /// Radians, clockwise on screen.
    pub rotation: f32,
    /// Pivot in source texels.
    pub origin: Vec2,
    pub opacity: f32,
    pub effects: SpriteEffects,
    pub depth: f32,
    pub atlas_index: u32,
    /// Sample texel centers by shrinking the source half a texel per side.
    pub texel_inset: bool,
}

impl DrawParams {
    pub fn new(destination: Destination) -> Self {
        Self {
            destination,
            source: None,
            color: Color::WHITE,
            rotation: 0.0,
            origin: Vec2::ZERO,
            opacity: 1.0,
            effects: SpriteEffects::NONE,
            depth: 0.0,
            atlas_index: 0,
            texel_inset: false,
        }
    }

    /// Draw at `position` with the source's own size.
    pub fn at(position: Vec2) -> Self {
        Self::new(Destination::Position {
            position,
            scale: Vec2::ONE,
        })
    }

    pub fn source(mut self, source: Rect) -> Self {
        self.source = Some(source);
        self
    }

    pub fn color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }

    pub fn rotation(mut self, rotation: f32) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn origin(mut self, origin: Vec2) -> Self {
        self.origin = origin;
        self
    }

    pub fn opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity;
        self
    }

    pub fn effects(mut self, effects: SpriteEffects) -> Self {
        self.effects = effects;
        self
    }

    pub fn depth(mut self, depth: f32) -> Self {
        self.depth = depth;
        self
    }

    pub fn atlas_index(mut self, atlas_index: u32) -> Self {
        self.atlas_index = atlas_index;
        self
    }

    pub fn texel_inset(mut self, texel_inset: bool) -> Self {
        self.texel_inset = texel_inset;
        self
    }
}

enum Phase {
    Idle,
    Recording { sort: SortPolicy, frame: FrameState },
}

/// A sprite batch engine bound to one shared device.
///
/// Several engines may share a device; each owns its own queue and sorter.
pub struct SpriteBatch<D: RenderDevice> {
    device: SharedDevice<D>,
    defaults: DefaultResources,
    config: BatchConfig,
    queue: SpriteQueue,
    sorter: BatchSorter,
    flusher: Flusher,
    phase: Phase,
    viewport: (u32, u32),
    projection: Mat4,
    last_stats: FlushStats,
}

impl<D: RenderDevice> SpriteBatch<D> {
    /// Create an engine for a `viewport` sized render target.
    ///
    /// Validates `config` and uploads the shared quad index buffer.
    pub fn new(
        device: SharedDevice<D>,
        defaults: DefaultResources,
        config: BatchConfig,
        viewport: (u32, u32),
    ) -> BatchResult<Self> {
        config.validate()?;
        let indices = quad_indices(config.max_batch_size)?;
        device.lock().upload_indices(&indices);
        log::debug!(
            "sprite batch created: {} quads per draw, viewport {}x{}",
            config.max_batch_size,
            viewport.0,
            viewport.1
        );

        Ok(Self {
            defaults,
            queue: SpriteQueue::with_capacity(config.initial_capacity),
            sorter: BatchSorter::new(config.sort_sequential_threshold),
            flusher: Flusher {
                max_batch_size: config.max_batch_size,
                parallel_fill_threshold: config.parallel_fill_threshold,
            },
            phase: Phase::Idle,
            projection: screen_projection(viewport.0, viewport.1),
            viewport,
            last_stats: FlushStats::default(),
            device,
            config,
        })
    }

    pub fn device(&self) -> &SharedDevice<D> {
        &self.device
    }

    pub fn defaults(&self) -> &DefaultResources {
        &self.defaults
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.phase, Phase::Recording { .. })
    }

    /// Sprites queued since `begin`.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Counters from the most recent `end`.
    pub fn last_stats(&self) -> FlushStats {
        self.last_stats
    }

    /// Recompute the projection for a new viewport. Zero sizes are clamped
    /// to 1. Takes effect at the next `begin`.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.viewport = (width, height);
        self.projection = screen_projection(width, height);
        log::debug!("sprite batch viewport resized to {width}x{height}");
    }

    /// Open a frame.
    pub fn begin(&mut self, params: BeginParams) -> BatchResult<()> {
        if self.is_recording() {
            return Err(BatchError::AlreadyRecording);
        }
        let frame = FrameState {
            render_state: params.render_state(),
            projection: self.projection,
            view: params.view.unwrap_or(Mat4::IDENTITY),
            transform: params.transform.unwrap_or(Mat4::IDENTITY),
            scissor: params.scissor,
        };
        self.phase = Phase::Recording {
            sort: params.sort,
            frame,
        };
        Ok(())
    }

    /// Draw `source` of `texture` stretched over `destination`.
    pub fn draw(
        &mut self,
        texture: Texture,
        destination: Rect,
        source: Option<Rect>,
        color: Color,
    ) -> BatchResult<()> {
        let mut params = DrawParams::new(Destination::Rect(destination)).color(color);
        params.source = source;
        self.draw_ex(texture, &params)
    }

    /// Draw `source` of `texture` at `position`, unscaled.
    pub fn draw_at(
        &mut self,
        texture: Texture,
        position: Vec2,
        source: Option<Rect>,
        color: Color,
    ) -> BatchResult<()> {
        let mut params = DrawParams::at(position).color(color);
        params.source = source;
        self.draw_ex(texture, &params)
    }

    /// Queue one sprite with the full parameter set. Every other draw call
    /// ends up here.
    pub fn draw_ex(&mut self, texture: Texture, params: &DrawParams) -> BatchResult<()> {
        if !self.is_recording() {
            return Err(BatchError::NotRecording { operation: "draw" });
        }
        let identity = self.resolve(texture)?;
        let texture = identity.texture;

        let full = Rect::from_size(texture.width() as f32, texture.height() as f32);
        let source = params.source.unwrap_or(full);
        let destination = match params.destination {
            Destination::Rect(rect) => rect,
            Destination::Position { position, scale } => Rect::new(
                position.x,
                position.y,
                source.width * scale.x,
                source.height * scale.y,
            ),
        };
        let source = if params.texel_inset {
            source.texel_inset()
        } else {
            source
        };

        self.queue.push(
            SpriteRecord {
                source,
                destination,
                origin: params.origin.to_array(),
                rotation: params.rotation,
                depth: params.depth,
                effects: params.effects,
                color: params.color,
                opacity: params.opacity,
                atlas_index: params.atlas_index,
            },
            identity,
        );
        Ok(())
    }

    /// Solid rectangle from the default white texture.
    pub fn fill_rectangle(&mut self, rect: Rect, color: Color, depth: f32) -> BatchResult<()> {
        let white = self.defaults.white;
        let params = DrawParams::new(Destination::Rect(rect))
            .color(color)
            .depth(depth)
            .texel_inset(true);
        self.draw_ex(white, &params)
    }

    /// Straight line of `thickness` pixels centered on the segment.
    pub fn draw_line(
        &mut self,
        start: Vec2,
        end: Vec2,
        color: Color,
        thickness: f32,
        depth: f32,
    ) -> BatchResult<()> {
        let delta = end - start;
        let angle = delta.y.atan2(delta.x);
        let (sin, cos) = angle.sin_cos();
        let half = thickness * 0.5;
        // Shift the top-left corner so the segment runs through the middle
        // of the quad's thickness.
        let corner = Vec2::new(start.x + half * sin, start.y - half * cos);

        let white = self.defaults.white;
        let params = DrawParams::new(Destination::Rect(Rect::new(
            corner.x,
            corner.y,
            delta.length(),
            thickness,
        )))
        .color(color)
        .rotation(angle)
        .depth(depth)
        .texel_inset(true);
        self.draw_ex(white, &params)
    }

    /// Close the frame: sort, flush, clear. Returns the flush counters.
    pub fn end(&mut self) -> BatchResult<FlushStats> {
        let (sort, frame) = match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Recording { sort, frame } => (sort, frame),
            Phase::Idle => return Err(BatchError::NotRecording { operation: "end" }),
        };

        let result = self.flush(sort, &frame);
        self.queue.clear();

        let stats = result?;
        self.last_stats = stats;
        log::trace!(
            "sprite batch end: {} sprites in {} draw calls ({:?})",
            stats.sprites,
            stats.draw_calls,
            sort
        );
        Ok(stats)
    }

    fn flush(&mut self, sort: SortPolicy, frame: &FrameState) -> BatchResult<FlushStats> {
        if self.queue.is_empty() {
            return Ok(FlushStats::default());
        }

        let records = self.queue.records();
        let textures = self.queue.textures();
        let order = if sort.needs_sort() {
            Some(self.sorter.sort(sort, records, textures))
        } else {
            None
        };
        let view = RecordView {
            records,
            textures,
            order,
        };

        let stats = self.flusher.flush(&self.device, frame, view)?;
        self.device.lock().finish_frame()?;
        Ok(stats)
    }

    /// Cached identity, or a fresh one checked against the device.
    fn resolve(&mut self, texture: Texture) -> BatchResult<TextureIdentity> {
        let handle = texture.handle();
        if let Some(identity) = self.queue.cached(handle) {
            return Ok(identity);
        }
        let live = self
            .device
            .lock()
            .texture(handle)
            .ok_or(DeviceError::UnknownTexture(handle))?;
        Ok(self.queue.identity(live))
    }
}
