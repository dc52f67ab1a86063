//! Coordinate-wise median aggregation
//!
//! Robust to fewer than 50% corrupted values in every column, but each
//! coordinate is handled independently, so the result need not be close to
//! any honest row as a whole.

use ndarray::{Array1, ArrayView2};
use rayon::prelude::*;

use crate::error::GarError;

/// Coordinate-wise median aggregation.
///
/// For each column, sorts the values of all rows and picks the middle one.
/// With an even row count the two middle values are averaged.
///
/// # Arguments
///
/// * `g` - Gradient matrix, one row per worker
pub fn coordinate_median(g: ArrayView2<'_, f32>) -> Result<Array1<f32>, GarError> {
    if g.nrows() == 0 {
        return Err(GarError::EmptyUpdates);
    }

    let result: Vec<f32> = (0..g.ncols())
        .into_par_iter()
        .map(|col| {
            let mut values = g.column(col).to_vec();
            values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

            let mid = values.len() / 2;
            if values.len() % 2 == 0 {
                (values[mid - 1] + values[mid]) / 2.0
            } else {
                values[mid]
            }
        })
        .collect();

    Ok(Array1::from(result))
}
