//! Norm and distance computations for gradient rows.
//!
//! Shared by the aggregation rules, the sparse approximation operator and
//! the compression operators.

use ndarray::{ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;

/// Compute the L2 (Euclidean) norm of a vector.
pub fn l2_norm(v: ArrayView1<'_, f32>) -> f32 {
    l2_norm_sq(v).sqrt()
}

/// Compute the squared L2 norm of a vector (avoids sqrt).
pub fn l2_norm_sq(v: ArrayView1<'_, f32>) -> f32 {
    v.iter().map(|x| x * x).sum()
}

/// Squared Euclidean distance between two equally sized vectors.
pub fn dist_sq(a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// L2 norm of every lane along `axis`.
///
/// `Axis(0)` yields one norm per column (taken across rows), `Axis(1)` one
/// norm per row.
pub fn lane_norms(g: ArrayView2<'_, f32>, axis: Axis) -> Vec<f32> {
    let lanes = match axis {
        Axis(0) => g.ncols(),
        _ => g.nrows(),
    };
    (0..lanes)
        .into_par_iter()
        .map(|i| match axis {
            Axis(0) => l2_norm(g.column(i)),
            _ => l2_norm(g.row(i)),
        })
        .collect()
}
