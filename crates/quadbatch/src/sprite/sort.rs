//! # Sort — Stable Parallel Merge Sort Over a Permutation
//!
//! Records are never moved. The sorter produces a permutation of record
//! indices and the flusher walks records through it.
//!
//! ## Algorithm
//!
//! Top-down merge sort. A range is split at its midpoint; both halves are
//! sorted, then merged into the matching range of a scratch buffer and copied
//! back. Halves of a range longer than the sequential threshold are sorted on
//! two rayon workers and joined before the merge:
//!
//! ```text
//! sort [0, n)
//!   ├─ n > threshold ─► rayon::join( sort [0, mid) , sort [mid, n) )
//!   └─ otherwise      ─► sort [0, mid) ; sort [mid, n)
//!   merge [0, mid) + [mid, n) ─► scratch[0, n) ─► perm[0, n)
//! ```
//!
//! Each worker owns a disjoint sub-slice of both the permutation and the
//! scratch buffer (`split_at_mut`), so no synchronisation is needed inside a
//! level.
//!
//! ## Stability
//!
//! The merge takes from the right run only when its element sorts strictly
//! before the left run's head. Equal keys therefore keep submission order.
//!
//! ## Comparator
//!
//! The policy is resolved to a comparator once per `end` (see
//! [`BatchSorter::sort`]); the inner merge loop calls a monomorphised closure
//! with no branch on the policy.

use super::record::{SpriteRecord, TextureIdentity};
use super::state::SortPolicy;

/// Ranges at or below this length use insertion sort.
const INSERTION_THRESHOLD: usize = 16;

/// Reusable permutation and scratch buffers.
pub struct BatchSorter {
    permutation: Vec<u32>,
    scratch: Vec<u32>,
    sequential_threshold: usize,
}

impl BatchSorter {
    pub fn new(sequential_threshold: usize) -> Self {
        Self {
            permutation: Vec::new(),
            scratch: Vec::new(),
            sequential_threshold: sequential_threshold.max(1),
        }
    }

    /// Sort `records` according to `policy` and return the permutation.
    ///
    /// `SubmissionOrder` yields the identity permutation.
    pub fn sort(
        &mut self,
        policy: SortPolicy,
        records: &[SpriteRecord],
        textures: &[TextureIdentity],
    ) -> &[u32] {
        debug_assert_eq!(records.len(), textures.len());
        match policy {
            SortPolicy::SubmissionOrder => self.sort_by(records.len(), |_, _| false),
            SortPolicy::ByTexture => {
                self.sort_by(records.len(), |a, b| textures[a as usize].key < textures[b as usize].key)
            }
            SortPolicy::BackToFront => {
                self.sort_by(records.len(), |a, b| records[a as usize].depth > records[b as usize].depth)
            }
            SortPolicy::FrontToBack => {
                self.sort_by(records.len(), |a, b| records[a as usize].depth < records[b as usize].depth)
            }
        }
    }

    /// Sort `0..len` with `before(a, b)` meaning "a must come before b".
    pub fn sort_by<F>(&mut self, len: usize, before: F) -> &[u32]
    where
        F: Fn(u32, u32) -> bool + Sync,
    {
        self.prepare(len);
        let threshold = self.sequential_threshold;
        sort_range(&mut self.permutation, &mut self.scratch, &before, threshold);
        &self.permutation
    }

    /// Reset the permutation to identity, growing buffers before any worker
    /// touches them.
    fn prepare(&mut self, len: usize) {
        if self.permutation.capacity() < len {
            log::trace!("sort buffers grown to {len} entries");
        }
        self.permutation.clear();
        self.permutation.extend(0..len as u32);
        self.scratch.clear();
        self.scratch.resize(len, 0);
    }

    pub fn permutation(&self) -> &[u32] {
        &self.permutation
    }
}

fn sort_range<F>(perm: &mut [u32], scratch: &mut [u32], before: &F, threshold: usize)
where
    F: Fn(u32, u32) -> bool + Sync,
{
    let len = perm.len();
    if len <= INSERTION_THRESHOLD {
        insertion_sort(perm, before);
        return;
    }

    let mid = len / 2;
    {
        let (perm_left, perm_right) = perm.split_at_mut(mid);
        let (scratch_left, scratch_right) = scratch.split_at_mut(mid);
        if len > threshold {
            rayon::join(
                || sort_range(perm_left, scratch_left, before, threshold),
                || sort_range(perm_right, scratch_right, before, threshold),
            );
        } else {
            sort_range(perm_left, scratch_left, before, threshold);
            sort_range(perm_right, scratch_right, before, threshold);
        }
    }

    // Already ordered across the seam: nothing to merge.
    if !before(perm[mid], perm[mid - 1]) {
        return;
    }

    merge(&perm[..mid], &perm[mid..], &mut scratch[..len], before);
    perm.copy_from_slice(&scratch[..len]);
}

fn merge<F>(left: &[u32], right: &[u32], out: &mut [u32], before: &F)
where
    F: Fn(u32, u32) -> bool,
{
    let (mut i, mut j, mut k) = (0, 0, 0);
    while i < left.len() && j < right.len() {
        // Ties take from the left run.
        if before(right[j], left[i]) {
            out[k] = right[j];
            j += 1;
        } else {
            out[k] = left[i];
            i += 1;
        }
        k += 1;
    }
    let rest_left = left.len() - i;
    out[k..k + rest_left].copy_from_slice(&left[i..]);
    k += rest_left;
    out[k..].copy_from_slice(&right[j..]);
}

fn insertion_sort<F>(perm: &mut [u32], before: &F)
where
    F: Fn(u32, u32) -> bool,
{
    for i in 1..perm.len() {
        let value = perm[i];
        let mut j = i;
        while j > 0 && before(value, perm[j - 1]) {
            perm[j] = perm[j - 1];
            j -= 1;
        }
        perm[j] = value;
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    fn sort_keys(keys: &[i32], threshold: usize) -> Vec<u32> {
        let mut sorter = BatchSorter::new(threshold);
        sorter
            .sort_by(keys.len(), |a, b| keys[a as usize] < keys[b as usize])
            .to_vec()
    }

    #[test]
    fn empty_and_single() {
        assert!(sort_keys(&[], 4).is_empty());
        assert_eq!(sort_keys(&[7], 4), vec![0]);
    }

    #[test]
    fn ties_keep_submission_order() {
        let keys = [5, 5, 5];
        assert_eq!(sort_keys(&keys, 1), vec![0, 1, 2]);
    }

    #[test]
    fn matches_std_stable_sort_on_large_input() {
        let mut rng = StdRng::seed_from_u64(7);
        // Few distinct keys so ties are everywhere.
        let keys: Vec<i32> = (0..10_000).map(|_| rng.gen_range(0..20)).collect();

        let mut expected: Vec<u32> = (0..keys.len() as u32).collect();
        expected.sort_by_key(|&i| keys[i as usize]);

        // Small threshold forces the parallel path at several levels.
        assert_eq!(sort_keys(&keys, 64), expected);
        // Huge threshold keeps everything sequential.
        assert_eq!(sort_keys(&keys, usize::MAX), expected);
    }

    #[test]
    fn buffers_are_reused_between_sorts() {
        let mut sorter = BatchSorter::new(8);
        let big: Vec<i32> = (0..1000).rev().collect();
        sorter.sort_by(big.len(), |a, b| big[a as usize] < big[b as usize]);
        assert_eq!(sorter.permutation()[0], 999);

        let small = [3, 1, 2];
        let perm = sorter.sort_by(small.len(), |a, b| small[a as usize] < small[b as usize]);
        assert_eq!(perm, &[1, 2, 0]);
    }
}
