//! Mean baseline aggregation (no Byzantine tolerance)
//!
//! Plain column average of the gradient matrix. A single Byzantine row can
//! move the result arbitrarily far. Included as the baseline every robust
//! rule is compared against.

use ndarray::{Array1, ArrayView2, Axis};

use crate::error::GarError;

/// Column-wise arithmetic mean of the gradient matrix.
///
/// # Arguments
///
/// * `g` - Gradient matrix, one row per worker
pub fn mean(g: ArrayView2<'_, f32>) -> Result<Array1<f32>, GarError> {
    if g.nrows() == 0 {
        return Err(GarError::EmptyUpdates);
    }
    column_mean(g).ok_or(GarError::EmptyUpdates)
}

/// Column mean accumulated in `f64`, `None` for a matrix without rows.
///
/// Rows that are all equal average back to that row exactly.
pub(crate) fn column_mean(g: ArrayView2<'_, f32>) -> Option<Array1<f32>> {
    g.mapv(f64::from)
        .mean_axis(Axis(0))
        .map(|m| m.mapv(|v| v as f32))
}
