//! Random-k sparsification.

use ndarray::{Array1, ArrayView1};
use rand::Rng;

use super::top_k::{keep_count, keep_only};

/// `k` distinct indices drawn uniformly from `0..len`, ascending.
pub fn rand_k_indices<R: Rng + ?Sized>(rng: &mut R, len: usize, k: usize) -> Vec<usize> {
    let mut indices = rand::seq::index::sample(rng, len, k.min(len)).into_vec();
    indices.sort_unstable();
    indices
}

/// Keep `round(frac * len)` uniformly chosen coordinates of `v`.
pub fn rand_k<R: Rng + ?Sized>(rng: &mut R, v: ArrayView1<'_, f32>, frac: f32) -> Array1<f32> {
    let indices = rand_k_indices(rng, v.len(), keep_count(v.len(), frac));
    keep_only(v, &indices)
}
