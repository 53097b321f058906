// ============================================================
// Layer 4 — Alignment, Chunking and Rank Sharding
// ============================================================
// Turns one parsed corpus file into the sample list a single rank
// will see. Three pure steps:
//
//   1. Cyclic padding
//      Extend the data to the next multiple of `step` by appending
//      a prefix of itself. Every rank then gets the same number of
//      full samples and nothing is truncated.
//
//   2. Chunking (token streams only)
//      Cut the padded stream into non-overlapping windows of
//      `sample_size = block_size + 1` tokens.
//
//   3. Rank sharding
//      Rank r keeps samples r, r+W, r+2W, ... so the ranks
//      partition the file disjointly and in order.
//
// Example: block_size=4, world_size=2, 9 tokens
//   step      = 2 * 5 = 10
//   padded    = t0..t8, t0          (1 token repeated)
//   windows   = [t0..t4], [t5..t8,t0]
//   rank 0    → window 0
//   rank 1    → window 1
//
// Reference: Rust Book §8 (Vectors), §13 (Iterators)

use std::sync::Arc;

use crate::domain::sample::TokenWindow;

/// Number of items needed to round `len` up to a multiple of `step`.
pub fn padding_needed(len: usize, step: usize) -> usize {
    if step == 0 {
        return 0;
    }
    len.div_ceil(step) * step - len
}

/// Cyclically pad `data` to a multiple of `step` by repeating its prefix.
///
/// Returns the (possibly extended) data and the number of items added.
/// Already aligned data comes back untouched with a padding of 0.
/// `step` must not exceed `data.len()`, so the prefix always exists.
pub fn align_to_step<T: Clone>(mut data: Vec<T>, step: usize) -> (Vec<T>, usize) {
    let padding = padding_needed(data.len(), step);
    debug_assert!(padding <= data.len());
    if padding > 0 {
        data.extend_from_within(..padding);
    }
    (data, padding)
}

/// Cut a shared token buffer into consecutive windows of `sample_size`.
/// A trailing remainder shorter than `sample_size` is dropped; aligned
/// input has none.
pub fn chunk_windows(tokens: Arc<[i32]>, sample_size: usize) -> Vec<TokenWindow> {
    let count = if sample_size == 0 { 0 } else { tokens.len() / sample_size };
    (0..count)
        .map(|i| TokenWindow::new(tokens.clone(), i * sample_size, sample_size))
        .collect()
}

/// Keep every `world_size`-th item starting at `rank`.
pub fn shard_by_rank<T>(items: Vec<T>, rank: usize, world_size: usize) -> Vec<T> {
    if world_size <= 1 {
        return items;
    }
    items
        .into_iter()
        .skip(rank)
        .step_by(world_size)
        .collect()
}
