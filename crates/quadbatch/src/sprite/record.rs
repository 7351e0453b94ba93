//! The frame-scoped sprite queue.
//!
//! `draw` calls append a [`SpriteRecord`] and the [`TextureIdentity`] it
//! samples to two parallel arrays. Records are never touched again until
//! `end` sorts, flushes, and clears them.
//!
//! ```text
//! SpriteQueue
//!   records:    [ r0 ][ r1 ][ r2 ][ r3 ] ...   len == textures.len()
//!   textures:   [ t0 ][ t0 ][ t1 ][ t0 ] ...
//!   identities: { handle(t0) → t0, handle(t1) → t1 }   (per begin/end)
//! ```

use std::collections::HashMap;

use super::Color;
use crate::math::Rect;
use crate::render::{Texture, TextureHandle};

/// Flip flags, two bits: bit 0 flips horizontally, bit 1 vertically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SpriteEffects(u8);

impl SpriteEffects {
    pub const NONE: Self = Self(0);
    pub const FLIP_HORIZONTAL: Self = Self(1);
    pub const FLIP_VERTICAL: Self = Self(2);
    pub const FLIP_BOTH: Self = Self(3);

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for SpriteEffects {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// One queued draw request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpriteRecord {
    /// Region of the texture, in texels.
    pub source: Rect,
    /// Where the quad lands, in render-target pixels, already scaled.
    pub destination: Rect,
    /// Pivot in source texels, relative to the source's top-left corner.
    pub origin: [f32; 2],
    /// Radians, clockwise in screen space.
    pub rotation: f32,
    /// Sort key for the depth policies, also written as vertex Z.
    pub depth: f32,
    pub effects: SpriteEffects,
    pub color: Color,
    /// Multiplied into every color channel at emission time.
    pub opacity: f32,
    /// Texture array slice for the shared-atlas path.
    pub atlas_index: u32,
}

/// Cached per-texture data used while walking and emitting a batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureIdentity {
    pub texture: Texture,
    /// Handle-derived identity. Runs break where this changes.
    pub key: u64,
    pub inv_width: f32,
    pub inv_height: f32,
}

impl TextureIdentity {
    pub fn new(texture: Texture) -> Self {
        Self {
            texture,
            key: texture.handle().key(),
            inv_width: 1.0 / texture.width().max(1) as f32,
            inv_height: 1.0 / texture.height().max(1) as f32,
        }
    }
}

/// Growable parallel arrays of records and their texture identities.
pub struct SpriteQueue {
    records: Vec<SpriteRecord>,
    textures: Vec<TextureIdentity>,
    identities: HashMap<TextureHandle, TextureIdentity>,
}

impl SpriteQueue {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: Vec::with_capacity(capacity),
            textures: Vec::with_capacity(capacity),
            identities: HashMap::new(),
        }
    }

    /// Identity for `texture`, built on first use in this cycle.
    pub fn identity(&mut self, texture: Texture) -> TextureIdentity {
        *self
            .identities
            .entry(texture.handle())
            .or_insert_with(|| TextureIdentity::new(texture))
    }

    /// Identity already built for `handle` in this cycle, if any.
    pub fn cached(&self, handle: TextureHandle) -> Option<TextureIdentity> {
        self.identities.get(&handle).copied()
    }

    pub fn push(&mut self, record: SpriteRecord, texture: TextureIdentity) {
        if self.records.len() == self.records.capacity() {
            self.grow();
        }
        self.records.push(record);
        self.textures.push(texture);
    }

    /// Double both arrays together so they always share a capacity.
    fn grow(&mut self) {
        let additional = self.records.capacity().max(1);
        self.records.reserve_exact(additional);
        self.textures.reserve_exact(additional);
        log::trace!("sprite queue grown to {} records", self.records.capacity());
    }

    pub fn records(&self) -> &[SpriteRecord] {
        &self.records
    }

    pub fn textures(&self) -> &[TextureIdentity] {
        &self.textures
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.records.capacity()
    }

    /// Drop all records and the identity cache. Capacity is kept.
    pub fn clear(&mut self) {
        self.records.clear();
        self.textures.clear();
        self.identities.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{RecordingDevice, RenderDevice, TextureDesc};
    use crate::sprite::SpriteVertex;

    fn record(depth: f32) -> SpriteRecord {
        SpriteRecord {
            source: Rect::from_size(1.0, 1.0),
            destination: Rect::from_size(1.0, 1.0),
            origin: [0.0, 0.0],
            rotation: 0.0,
            depth,
            effects: SpriteEffects::NONE,
            color: Color::WHITE,
            opacity: 1.0,
            atlas_index: 0,
        }
    }

    #[test]
    fn arrays_stay_parallel_across_growth() {
        let mut device = RecordingDevice::<SpriteVertex>::new();
        let tex = device
            .create_texture(&TextureDesc::empty("t", 4, 2, 1))
            .unwrap();
        let mut queue = SpriteQueue::with_capacity(2);
        for i in 0..37 {
            let id = queue.identity(tex);
            queue.push(record(i as f32), id);
            assert_eq!(queue.records().len(), queue.textures().len());
        }
        assert_eq!(queue.len(), 37);
        assert!(queue.capacity() >= 37);
        assert_eq!(queue.records()[36].depth, 36.0);
    }

    #[test]
    fn identity_is_cached_and_cleared() {
        let mut device = RecordingDevice::<SpriteVertex>::new();
        let tex = device
            .create_texture(&TextureDesc::empty("t", 4, 2, 1))
            .unwrap();
        let mut queue = SpriteQueue::with_capacity(4);
        let id = queue.identity(tex);
        assert_eq!(id.inv_width, 0.25);
        assert_eq!(id.inv_height, 0.5);
        assert_eq!(id.key, tex.handle().key());

        queue.push(record(0.0), id);
        let cap = queue.capacity();
        queue.clear();
        assert!(queue.is_empty());
        assert!(queue.identities.is_empty());
        assert_eq!(queue.capacity(), cap);
    }

    #[test]
    fn effects_combine() {
        let both = SpriteEffects::FLIP_HORIZONTAL | SpriteEffects::FLIP_VERTICAL;
        assert_eq!(both, SpriteEffects::FLIP_BOTH);
        assert!(both.contains(SpriteEffects::FLIP_VERTICAL));
        assert_eq!(both.bits(), 3);
    }
}
