//! Top-k sparsification.

use ndarray::{Array1, ArrayView1};

/// Number of coordinates kept out of `len`: `round(frac * len)`, ties to even.
pub fn keep_count(len: usize, frac: f32) -> usize {
    ((frac * len as f32).round_ties_even() as usize).min(len)
}

/// Indices of the `k` largest-magnitude coordinates, ascending.
///
/// Among equal magnitudes the lower index is preferred.
pub fn top_k_indices(v: ArrayView1<'_, f32>, k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..v.len()).collect();
    order.sort_by(|&a, &b| {
        v[b].abs()
            .partial_cmp(&v[a].abs())
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });
    order.truncate(k);
    order.sort_unstable();
    order
}

/// Copy of `v` with every coordinate outside `indices` set to zero.
pub fn keep_only(v: ArrayView1<'_, f32>, indices: &[usize]) -> Array1<f32> {
    let mut out = Array1::<f32>::zeros(v.len());
    for &i in indices {
        out[i] = v[i];
    }
    out
}

/// Keep the `round(frac * len)` largest-magnitude coordinates of `v`.
pub fn top_k(v: ArrayView1<'_, f32>, frac: f32) -> Array1<f32> {
    let indices = top_k_indices(v, keep_count(v.len(), frac));
    keep_only(v, &indices)
}
