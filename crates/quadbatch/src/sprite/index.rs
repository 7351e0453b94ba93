//! The shared quad index pattern.
//!
//! Every batch draws through one immutable 16-bit index buffer. Quad `k`
//! uses vertices `4k..4k+4`:
//!
//! ```text
//!   4k ──── 4k+1        triangle A: 4k, 4k+1, 4k+2
//!    │ ╲  B  │          triangle B: 4k, 4k+2, 4k+3
//!    │  A ╲  │
//!   4k+3 ── 4k+2
//! ```

use crate::config::INDEX_RANGE;
use crate::error::{BatchError, BatchResult};

/// Indices per quad.
pub const INDICES_PER_QUAD: usize = 6;

/// Vertices per quad.
pub const VERTICES_PER_QUAD: usize = 4;

/// Build the index buffer for `max_quads` quads.
///
/// Fails if the buffer would need more than [`INDEX_RANGE`] entries, since
/// the last vertex would no longer fit in a 16-bit index.
pub fn quad_indices(max_quads: usize) -> BatchResult<Vec<u16>> {
    let index_count = max_quads * INDICES_PER_QUAD;
    if index_count > INDEX_RANGE {
        return Err(BatchError::IndexRangeExceeded {
            max_batch_size: max_quads,
            index_count,
        });
    }

    let mut indices = Vec::with_capacity(index_count);
    for quad in 0..max_quads {
        let base = (quad * VERTICES_PER_QUAD) as u16;
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    Ok(indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MAX_BATCH_SIZE;

    #[test]
    fn pattern_for_the_first_quads() {
        let indices = quad_indices(2).unwrap();
        assert_eq!(indices, vec![0, 1, 2, 0, 2, 3, 4, 5, 6, 4, 6, 7]);
    }

    #[test]
    fn default_batch_fits() {
        let indices = quad_indices(MAX_BATCH_SIZE).unwrap();
        assert_eq!(indices.len(), MAX_BATCH_SIZE * 6);
        let last = (MAX_BATCH_SIZE * 4 - 1) as u16;
        assert_eq!(indices[indices.len() - 1], last);
    }

    #[test]
    fn oversized_batch_is_rejected() {
        let result = quad_indices(INDEX_RANGE / 6 + 1);
        assert!(matches!(result, Err(BatchError::IndexRangeExceeded { .. })));
    }
}
