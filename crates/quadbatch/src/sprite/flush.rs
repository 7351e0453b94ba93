//! # Flush — Texture Runs to Draw Calls
//!
//! The flusher walks the queued records in flush order (sorted or not),
//! cuts them into maximal runs that share one texture identity, and turns
//! each run into one or more draw calls:
//!
//! ```text
//!  flush order:  t0 t0 t0 t1 t1 t0 t0 t0 t0 t0 t0
//!                └─ run ─┘└run┘└────── run ──────┘
//!                                 │
//!             run longer than max_batch_size splits into chunks
//!                                 ▼
//!                          [chunk][chunk][rest]
//!
//!  per chunk:  lock device → frame state → map → fill (1 or 2 workers)
//!              → unmap → draw → unlock
//! ```
//!
//! Runs break on the handle-derived key, never on deep equality, so two
//! textures with the same size never merge.

use super::emit::{RecordView, fill_vertices};
use super::index::INDICES_PER_QUAD;
use super::state::FrameState;
use crate::error::BatchResult;
use crate::render::{RenderDevice, SharedDevice};

/// Counters for one flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
    pub sprites: usize,
    pub draw_calls: usize,
}

/// Iterator over `(start, end)` flush positions of maximal same-texture runs.
pub struct TextureRuns<'a> {
    view: RecordView<'a>,
    next: usize,
}

impl<'a> TextureRuns<'a> {
    pub fn new(view: RecordView<'a>) -> Self {
        Self { view, next: 0 }
    }
}

impl Iterator for TextureRuns<'_> {
    type Item = (usize, usize);

    fn next(&mut self) -> Option<Self::Item> {
        let len = self.view.len();
        if self.next >= len {
            return None;
        }
        let start = self.next;
        let key = self.view.texture(start).key;
        let mut end = start + 1;
        while end < len && self.view.texture(end).key == key {
            end += 1;
        }
        self.next = end;
        Some((start, end))
    }
}

/// Chunk sizes and draw parameters for one flush.
#[derive(Debug, Clone, Copy)]
pub struct Flusher {
    pub max_batch_size: usize,
    pub parallel_fill_threshold: usize,
}

impl Flusher {
    /// Emit and draw every record in `view` under `frame`.
    ///
    /// The device lock is taken once per chunk and held while the frame
    /// state is bound and the chunk is mapped, filled, unmapped and drawn.
    pub fn flush<D: RenderDevice>(
        &self,
        device: &SharedDevice<D>,
        frame: &FrameState,
        view: RecordView<'_>,
    ) -> BatchResult<FlushStats> {
        let mut stats = FlushStats::default();
        for (start, end) in TextureRuns::new(view) {
            let mut offset = start;
            while offset < end {
                let count = (end - offset).min(self.max_batch_size);
                self.draw_chunk(device, frame, view, offset, count)?;
                stats.draw_calls += 1;
                stats.sprites += count;
                offset += count;
            }
        }
        Ok(stats)
    }

    fn draw_chunk<D: RenderDevice>(
        &self,
        device: &SharedDevice<D>,
        frame: &FrameState,
        view: RecordView<'_>,
        offset: usize,
        count: usize,
    ) -> BatchResult<()> {
        let texture = view.texture(offset);
        let mut device = device.lock();
        device.apply_frame_state(frame);

        let vertices = device.map_vertices(texture.texture, count)?;
        fill_vertices(view, texture, offset, vertices, self.parallel_fill_threshold);
        device.unmap_vertices();

        device.draw_indexed((count * INDICES_PER_QUAD) as u32);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Rect;
    use crate::render::{RecordingDevice, TextureDesc, share};
    use crate::sprite::record::{SpriteEffects, SpriteRecord, TextureIdentity};
    use crate::math::Mat4;
    use crate::sprite::state::{RenderState, screen_projection};
    use crate::sprite::{Color, SpriteVertex};

    fn frame() -> FrameState {
        FrameState {
            render_state: RenderState::default(),
            projection: screen_projection(4, 4),
            view: Mat4::IDENTITY,
            transform: Mat4::IDENTITY,
            scissor: None,
        }
    }

    fn record(x: f32) -> SpriteRecord {
        SpriteRecord {
            source: Rect::from_size(1.0, 1.0),
            destination: Rect::new(x, 0.0, 1.0, 1.0),
            origin: [0.0, 0.0],
            rotation: 0.0,
            depth: 0.0,
            effects: SpriteEffects::NONE,
            color: Color::WHITE,
            opacity: 1.0,
            atlas_index: 0,
        }
    }

    /// Build records whose textures follow `pattern` (indices into two textures).
    fn setup(pattern: &[usize]) -> (SharedDevice<RecordingDevice>, Vec<SpriteRecord>, Vec<TextureIdentity>) {
        let mut device = RecordingDevice::<SpriteVertex>::new();
        let textures = [
            device.create_texture(&TextureDesc::empty("a", 2, 2, 1)).unwrap(),
            device.create_texture(&TextureDesc::empty("b", 2, 2, 1)).unwrap(),
        ];
        let records = (0..pattern.len()).map(|i| record(i as f32)).collect();
        let identities = pattern
            .iter()
            .map(|&t| TextureIdentity::new(textures[t]))
            .collect();
        (share(device), records, identities)
    }

    #[test]
    fn runs_follow_texture_transitions() {
        let (_, records, textures) = setup(&[0, 0, 1, 1, 1, 0, 1]);
        let view = RecordView {
            records: &records,
            textures: &textures,
            order: None,
        };
        let runs: Vec<_> = TextureRuns::new(view).collect();
        assert_eq!(runs, vec![(0, 2), (2, 5), (5, 6), (6, 7)]);
    }

    #[test]
    fn one_draw_per_run() {
        let (device, records, textures) = setup(&[0, 0, 1, 1, 1, 0, 1]);
        let view = RecordView {
            records: &records,
            textures: &textures,
            order: None,
        };
        let flusher = Flusher {
            max_batch_size: 4096,
            parallel_fill_threshold: 512,
        };
        let stats = flusher.flush(&device, &frame(), view).unwrap();
        assert_eq!(stats, FlushStats { sprites: 7, draw_calls: 4 });

        let device = device.lock();
        let counts: Vec<u32> = device.draws().iter().map(|d| d.index_count).collect();
        assert_eq!(counts, vec![12, 18, 6, 6]);
        assert_eq!(device.draws()[1].texture, textures[2].texture);
        // Record 2 is the first quad of the second draw.
        assert_eq!(device.draws()[1].vertices[0].position[0], 2.0);
    }

    #[test]
    fn long_runs_split_into_ceil_chunks() {
        let pattern = vec![0; 10];
        let (device, records, textures) = setup(&pattern);
        let view = RecordView {
            records: &records,
            textures: &textures,
            order: None,
        };
        let flusher = Flusher {
            max_batch_size: 4,
            parallel_fill_threshold: 1,
        };
        let stats = flusher.flush(&device, &frame(), view).unwrap();
        assert_eq!(stats.draw_calls, 3);

        let device = device.lock();
        let quads: Vec<usize> = device.draws().iter().map(|d| d.quad_count()).collect();
        assert_eq!(quads, vec![4, 4, 2]);
        // Chunks continue where the previous one stopped.
        assert_eq!(device.draws()[2].vertices[0].position[0], 8.0);
        // Every chunk binds the state; equal consecutive states collapse.
        assert!(device.draws().iter().all(|d| d.frame == frame()));
        assert_eq!(device.frame_states().len(), 1);
    }

    #[test]
    fn permutation_is_followed() {
        let (device, records, textures) = setup(&[0, 1, 0, 1]);
        let order = [0u32, 2, 1, 3];
        let view = RecordView {
            records: &records,
            textures: &textures,
            order: Some(&order),
        };
        let flusher = Flusher {
            max_batch_size: 4096,
            parallel_fill_threshold: 512,
        };
        let stats = flusher.flush(&device, &frame(), view).unwrap();
        assert_eq!(stats.draw_calls, 2);

        let device = device.lock();
        let xs: Vec<f32> = device.draws()[0]
            .vertices
            .chunks(4)
            .map(|q| q[0].position[0])
            .collect();
        assert_eq!(xs, vec![0.0, 2.0]);
    }

    #[test]
    fn empty_view_draws_nothing() {
        let (device, records, textures) = setup(&[]);
        let view = RecordView {
            records: &records,
            textures: &textures,
            order: None,
        };
        let flusher = Flusher {
            max_batch_size: 16,
            parallel_fill_threshold: 4,
        };
        assert_eq!(flusher.flush(&device, &frame(), view).unwrap(), FlushStats::default());
        assert!(device.lock().draws().is_empty());
    }
}
