//! # Emit — One Sprite Record to Four Vertices
//!
//! ```text
//!   corner 0 (0,0) ─────── corner 1 (1,0)
//!        │                      │
//!        │    origin ✕          │      offset_k = (corner_k - origin) × dst.size
//!        │                      │      position_k = dst.xy + rotate(offset_k)
//!   corner 3 (0,1) ─────── corner 2 (1,1)
//! ```
//!
//! Corners are listed in winding order so the index pattern
//! `{0, 1, 2, 0, 2, 3}` produces two triangles per quad.
//!
//! ## Flips Without Branches
//!
//! Each corner is also encoded as two bits, `x` in bit 0 and `y` in bit 1.
//! XOR-ing those bits with the record's [`SpriteEffects`](super::SpriteEffects)
//! picks the mirrored source corner: bit 0 swaps left and right, bit 1 swaps
//! top and bottom, both rotates by 180°.
//!
//! ## Rotation Fast Path
//!
//! A rotation of exactly zero skips `sin_cos` entirely. The general path
//! evaluated at zero gives the same positions, which the tests check.

use super::record::{SpriteRecord, TextureIdentity};
use super::vertex::QuadVertex;

/// Quad corners in winding order, as fractions of the destination size.
const CORNERS: [[f32; 2]; 4] = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];

/// The same corners as `y << 1 | x`.
const CORNER_BITS: [u8; 4] = [0b00, 0b01, 0b11, 0b10];

/// Stand-in divisor for a zero-sized source axis.
const SMALLEST_POSITIVE: f32 = f32::from_bits(1);

/// Records viewed in flush order: directly, or through a sort permutation.
#[derive(Clone, Copy)]
pub struct RecordView<'a> {
    pub records: &'a [SpriteRecord],
    pub textures: &'a [TextureIdentity],
    pub order: Option<&'a [u32]>,
}

impl<'a> RecordView<'a> {
    pub fn len(&self) -> usize {
        self.order.map_or(self.records.len(), <[u32]>::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record index at flush position `i`.
    #[inline]
    pub fn index(&self, i: usize) -> usize {
        match self.order {
            Some(order) => order[i] as usize,
            None => i,
        }
    }

    #[inline]
    pub fn record(&self, i: usize) -> &'a SpriteRecord {
        &self.records[self.index(i)]
    }

    #[inline]
    pub fn texture(&self, i: usize) -> &'a TextureIdentity {
        &self.textures[self.index(i)]
    }
}

/// Write the four vertices of one record into `out[..4]`.
#[inline]
pub fn emit_quad<V: QuadVertex>(record: &SpriteRecord, texture: &TextureIdentity, out: &mut [V]) {
    if record.rotation == 0.0 {
        emit_quad_unrotated(record, texture, out);
    } else {
        emit_quad_rotated(record, texture, out, record.rotation);
    }
}

pub(crate) fn emit_quad_unrotated<V: QuadVertex>(
    record: &SpriteRecord,
    texture: &TextureIdentity,
    out: &mut [V],
) {
    let origin = normalized_origin(record);
    let dst = record.destination;
    let color = tint(record);
    for (k, vertex) in out[..4].iter_mut().enumerate() {
        let dx = (CORNERS[k][0] - origin[0]) * dst.width;
        let dy = (CORNERS[k][1] - origin[1]) * dst.height;
        *vertex = V::new(
            [dst.x + dx, dst.y + dy, record.depth, 1.0],
            color,
            texcoord(record, texture, k),
            record.atlas_index,
        );
    }
}

pub(crate) fn emit_quad_rotated<V: QuadVertex>(
    record: &SpriteRecord,
    texture: &TextureIdentity,
    out: &mut [V],
    rotation: f32,
) {
    let (sin, cos) = rotation.sin_cos();
    let origin = normalized_origin(record);
    let dst = record.destination;
    let color = tint(record);
    for (k, vertex) in out[..4].iter_mut().enumerate() {
        let dx = (CORNERS[k][0] - origin[0]) * dst.width;
        let dy = (CORNERS[k][1] - origin[1]) * dst.height;
        let rx = dx * cos - dy * sin;
        let ry = dx * sin + dy * cos;
        *vertex = V::new(
            [dst.x + rx, dst.y + ry, record.depth, 1.0],
            color,
            texcoord(record, texture, k),
            record.atlas_index,
        );
    }
}

#[inline]
fn normalized_origin(record: &SpriteRecord) -> [f32; 2] {
    let w = non_zero(record.source.width);
    let h = non_zero(record.source.height);
    [record.origin[0] / w, record.origin[1] / h]
}

#[inline]
fn non_zero(v: f32) -> f32 {
    if v == 0.0 { SMALLEST_POSITIVE } else { v }
}

/// Color times opacity. Not clamped.
#[inline]
fn tint(record: &SpriteRecord) -> [f32; 4] {
    let c = record.color;
    let o = record.opacity;
    [c.r * o, c.g * o, c.b * o, c.a * o]
}

#[inline]
fn texcoord(record: &SpriteRecord, texture: &TextureIdentity, corner: usize) -> [f32; 2] {
    let bits = CORNER_BITS[corner] ^ record.effects.bits();
    let fx = (bits & 1) as f32;
    let fy = ((bits >> 1) & 1) as f32;
    let src = record.source;
    [
        (src.x + fx * src.width) * texture.inv_width,
        (src.y + fy * src.height) * texture.inv_height,
    ]
}

/// Fill `out` with the quads for flush positions `start..start + out.len() / 4`.
///
/// Every record in the range must sample `texture`. When the range holds
/// more than `parallel_threshold` quads it is split into two disjoint halves
/// filled on two rayon workers; the call returns only after both finish.
pub fn fill_vertices<V: QuadVertex>(
    view: RecordView<'_>,
    texture: &TextureIdentity,
    start: usize,
    out: &mut [V],
    parallel_threshold: usize,
) {
    let quads = out.len() / 4;
    if quads > parallel_threshold {
        let mid = quads / 2;
        let (first, second) = out.split_at_mut(mid * 4);
        rayon::join(
            || fill_sequential(view, texture, start, first),
            || fill_sequential(view, texture, start + mid, second),
        );
    } else {
        fill_sequential(view, texture, start, out);
    }
}

fn fill_sequential<V: QuadVertex>(
    view: RecordView<'_>,
    texture: &TextureIdentity,
    start: usize,
    out: &mut [V],
) {
    for (i, quad) in out.chunks_exact_mut(4).enumerate() {
        emit_quad(view.record(start + i), texture, quad);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Rect;
    use crate::render::{RecordingDevice, RenderDevice, TextureDesc};
    use crate::sprite::{AtlasSpriteVertex, Color, SpriteEffects, SpriteVertex};

    fn identity(width: u32, height: u32) -> TextureIdentity {
        let mut device = RecordingDevice::<SpriteVertex>::new();
        let tex = device
            .create_texture(&TextureDesc::empty("t", width, height, 1))
            .unwrap();
        TextureIdentity::new(tex)
    }

    fn record() -> SpriteRecord {
        SpriteRecord {
            source: Rect::new(16.0, 32.0, 16.0, 32.0),
            destination: Rect::new(100.0, 50.0, 32.0, 64.0),
            origin: [0.0, 0.0],
            rotation: 0.0,
            depth: 0.25,
            effects: SpriteEffects::NONE,
            color: Color::rgba(1.0, 0.5, 0.25, 1.0),
            opacity: 0.5,
            atlas_index: 2,
        }
    }

    fn emit(r: &SpriteRecord, t: &TextureIdentity) -> [SpriteVertex; 4] {
        let mut out = [SpriteVertex::new([0.0; 4], [0.0; 4], [0.0; 2], 0); 4];
        emit_quad(r, t, &mut out);
        out
    }

    #[test]
    fn unrotated_positions_and_uvs() {
        let t = identity(64, 128);
        let v = emit(&record(), &t);
        assert_eq!(v[0].position, [100.0, 50.0, 0.25, 1.0]);
        assert_eq!(v[1].position, [132.0, 50.0, 0.25, 1.0]);
        assert_eq!(v[2].position, [132.0, 114.0, 0.25, 1.0]);
        assert_eq!(v[3].position, [100.0, 114.0, 0.25, 1.0]);

        assert_eq!(v[0].uv, [0.25, 0.25]);
        assert_eq!(v[1].uv, [0.5, 0.25]);
        assert_eq!(v[2].uv, [0.5, 0.5]);
        assert_eq!(v[3].uv, [0.25, 0.5]);
    }

    #[test]
    fn opacity_scales_every_channel() {
        let t = identity(64, 128);
        let v = emit(&record(), &t);
        assert_eq!(v[0].color, [0.5, 0.25, 0.125, 0.5]);
    }

    #[test]
    fn zero_rotation_paths_agree() {
        let t = identity(64, 128);
        let mut r = record();
        r.origin = [4.0, 8.0];
        r.effects = SpriteEffects::FLIP_VERTICAL;

        let mut fast = [SpriteVertex::new([0.0; 4], [0.0; 4], [0.0; 2], 0); 4];
        let mut general = fast;
        emit_quad_unrotated(&r, &t, &mut fast);
        emit_quad_rotated(&r, &t, &mut general, 0.0);

        for (a, b) in fast.iter().zip(general.iter()) {
            for axis in 0..4 {
                assert!((a.position[axis] - b.position[axis]).abs() <= f32::EPSILON);
            }
            assert_eq!(a.uv, b.uv);
            assert_eq!(a.color, b.color);
        }
    }

    #[test]
    fn origin_is_the_pivot() {
        let t = identity(64, 128);
        let mut r = record();
        // Pivot at the source center.
        r.origin = [8.0, 16.0];
        r.rotation = std::f32::consts::FRAC_PI_2;
        let v = emit(&r, &t);
        // Top-left corner offset (-16, -32) rotated 90° clockwise in
        // screen space becomes (32, -16).
        assert!((v[0].position[0] - 132.0).abs() < 1e-4);
        assert!((v[0].position[1] - 34.0).abs() < 1e-4);
    }

    #[test]
    fn horizontal_flip_mirrors_u_only() {
        let t = identity(64, 128);
        let mut r = record();
        r.effects = SpriteEffects::FLIP_HORIZONTAL;
        let v = emit(&r, &t);
        assert_eq!(v[0].uv, [0.5, 0.25]);
        assert_eq!(v[1].uv, [0.25, 0.25]);
        assert_eq!(v[2].uv, [0.25, 0.5]);
        assert_eq!(v[3].uv, [0.5, 0.5]);
    }

    #[test]
    fn vertical_flip_mirrors_v_only() {
        let t = identity(64, 128);
        let mut r = record();
        r.effects = SpriteEffects::FLIP_VERTICAL;
        let v = emit(&r, &t);
        assert_eq!(v[0].uv, [0.25, 0.5]);
        assert_eq!(v[1].uv, [0.5, 0.5]);
        assert_eq!(v[2].uv, [0.5, 0.25]);
        assert_eq!(v[3].uv, [0.25, 0.25]);
    }

    #[test]
    fn both_flips_rotate_uvs_half_a_turn() {
        let t = identity(64, 128);
        let mut r = record();
        r.effects = SpriteEffects::FLIP_BOTH;
        let v = emit(&r, &t);
        assert_eq!(v[0].uv, [0.5, 0.5]);
        assert_eq!(v[2].uv, [0.25, 0.25]);
    }

    #[test]
    fn zero_sized_source_does_not_divide_by_zero() {
        let t = identity(1, 1);
        let mut r = record();
        r.source = Rect::new(0.0, 0.0, 0.0, 0.0);
        r.origin = [0.0, 0.0];
        let v = emit(&r, &t);
        assert!(v.iter().all(|v| v.position.iter().all(|c| c.is_finite())));
    }

    #[test]
    fn atlas_vertices_carry_the_slice() {
        let t = identity(64, 128);
        let mut out = [AtlasSpriteVertex::new([0.0; 4], [0.0; 4], [0.0; 2], 0); 4];
        emit_quad(&record(), &t, &mut out);
        assert!(out.iter().all(|v| v.slice == 2.0));
    }

    #[test]
    fn parallel_fill_matches_sequential() {
        let t = identity(64, 128);
        let records: Vec<SpriteRecord> = (0..100)
            .map(|i| {
                let mut r = record();
                r.destination.x = i as f32;
                r.rotation = i as f32 * 0.1;
                r
            })
            .collect();
        let textures = vec![t; records.len()];
        let order: Vec<u32> = (0..records.len() as u32).rev().collect();
        let view = RecordView {
            records: &records,
            textures: &textures,
            order: Some(&order),
        };

        let blank = SpriteVertex::new([0.0; 4], [0.0; 4], [0.0; 2], 0);
        let mut parallel = vec![blank; 60 * 4];
        let mut sequential = vec![blank; 60 * 4];
        fill_vertices(view, &t, 10, &mut parallel, 8);
        fill_vertices(view, &t, 10, &mut sequential, usize::MAX);
        assert_eq!(parallel, sequential);

        // Position 10 in reversed order is record 89.
        let mut first = [blank; 4];
        emit_quad(&records[89], &t, &mut first);
        assert_eq!(&parallel[..4], &first);
    }
}
