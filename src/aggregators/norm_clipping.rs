//! Norm clipping aggregation.
//!
//! Rescales every row whose L2 norm exceeds `alpha` down to norm `alpha`,
//! keeping its direction, then averages. Bounds the influence of any single
//! row on the mean without discarding it.

use ndarray::{Array1, Array2, ArrayView2, Axis};

use super::mean::column_mean;
use crate::error::GarError;
use crate::math::lane_norms;

/// Clip every row of `g` to L2 norm at most `alpha`.
pub fn clip_rows(g: ArrayView2<'_, f32>, alpha: f32) -> Array2<f32> {
    let norms = lane_norms(g, Axis(1));
    let mut clipped = g.to_owned();
    for (mut row, norm) in clipped.outer_iter_mut().zip(norms) {
        if norm > alpha {
            row *= alpha / norm;
        }
    }
    clipped
}

/// Norm clipping followed by the column mean.
///
/// # Arguments
///
/// * `g` - Gradient matrix, one row per worker
/// * `alpha` - Clipping threshold, must be positive
pub fn norm_clip(g: ArrayView2<'_, f32>, alpha: f32) -> Result<Array1<f32>, GarError> {
    if g.nrows() == 0 {
        return Err(GarError::EmptyUpdates);
    }
    if !alpha.is_finite() || alpha <= 0.0 {
        return Err(GarError::InvalidHyperparameter {
            name: "alpha",
            value: alpha as f64,
        });
    }
    column_mean(clip_rows(g, alpha).view()).ok_or(GarError::EmptyUpdates)
}
