//! Byzantine Fault Tolerant Krum Aggregation
//!
//! Implements Krum and Multi-Krum (Blanchard et al., 2017). Every row is
//! scored by the sum of squared distances to its `n - f - 2` nearest
//! neighbours; a row surrounded by a tight cluster scores low, an outlier
//! scores high.
//!
//! Reference: "Machine Learning with Adversaries: Byzantine Tolerant Gradient Descent"

use ndarray::{Array1, ArrayView2, Axis};
use rayon::prelude::*;
use tracing::warn;

use super::mean::column_mean;
use crate::config::KrumMode;
use crate::error::GarError;
use crate::math::dist_sq;

/// Check whether Krum's theoretical guarantee holds: `n >= 2f + 3`.
pub fn krum_condition_met(n: usize, f: usize) -> bool {
    n >= 2 * f + 3
}

/// Number of assumed Byzantine rows for a configured fraction.
pub fn byzantine_count(n: usize, krum_frac: f32) -> usize {
    (n as f32 * krum_frac).floor() as usize
}

/// Krum score of every row: sum of squared distances to its nearest neighbours.
///
/// The neighbour count `n - f - 2` is clamped to `[1, n - 1]` so that the
/// score stays defined when the Krum condition does not hold.
pub fn krum_scores(g: ArrayView2<'_, f32>, f: usize) -> Vec<f32> {
    let n = g.nrows();
    if n < 2 {
        return vec![0.0; n];
    }
    let k = n.saturating_sub(f + 2).clamp(1, n - 1);

    (0..n)
        .into_par_iter()
        .map(|i| {
            let mut distances: Vec<f32> = (0..n)
                .filter(|&j| j != i)
                .map(|j| dist_sq(g.row(i), g.row(j)))
                .collect();
            distances.sort_unstable_by(|a, b| {
                a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal)
            });
            distances.iter().take(k).sum()
        })
        .collect()
}

/// Krum aggregation.
///
/// # Arguments
/// * `g` - Gradient matrix, one row per worker
/// * `krum_frac` - Assumed Byzantine fraction; `f = floor(krum_frac * n)`
/// * `mode` - [`KrumMode::Select`] returns the best row,
///   [`KrumMode::Average`] averages the `n - f` best rows
///
/// # Krum Condition
/// The guarantee requires `n >= 2f + 3`. If this condition is not met,
/// the rule proceeds with best-effort selection using a clamped neighbour count.
pub fn krum(
    g: ArrayView2<'_, f32>,
    krum_frac: f32,
    mode: KrumMode,
) -> Result<Array1<f32>, GarError> {
    let n = g.nrows();
    if n == 0 {
        return Err(GarError::EmptyUpdates);
    }
    if !(0.0..=1.0).contains(&krum_frac) {
        return Err(GarError::InvalidHyperparameter {
            name: "krum_frac",
            value: krum_frac as f64,
        });
    }

    let f = byzantine_count(n, krum_frac);
    if !krum_condition_met(n, f) {
        warn!(n, f, "Krum condition not met (n < 2f + 3), proceeding best-effort");
    }

    let scores = krum_scores(g, f);
    let mut ranked: Vec<usize> = (0..n).collect();
    // Stable sort keeps the lowest index first among equal scores
    ranked.sort_by(|&a, &b| {
        scores[a]
            .partial_cmp(&scores[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    match mode {
        KrumMode::Select => Ok(g.row(ranked[0]).to_owned()),
        KrumMode::Average => {
            let m = n.saturating_sub(f).max(1);
            let selected = g.select(Axis(0), &ranked[..m]);
            column_mean(selected.view()).ok_or(GarError::EmptyUpdates)
        }
    }
}
