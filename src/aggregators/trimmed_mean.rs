//! Coordinate-wise trimmed mean aggregation
//!
//! Achieves Byzantine tolerance by discarding the extreme values of every
//! coordinate before averaging.

use ndarray::{Array1, ArrayView2};
use rayon::prelude::*;

use crate::error::GarError;

/// Number of values trimmed from each end of a column of `n` values.
pub fn trim_count(n: usize, proportion: f32) -> usize {
    (n as f32 * proportion).floor() as usize
}

/// Coordinate-wise trimmed mean aggregation.
///
/// For each column, sorts the values of all rows, drops the lowest and
/// highest `floor(proportion * n)` of them and averages the rest.
///
/// # Arguments
///
/// * `g` - Gradient matrix, one row per worker
/// * `proportion` - Fraction trimmed from each end, in `[0, 0.5)`
pub fn trimmed_mean(g: ArrayView2<'_, f32>, proportion: f32) -> Result<Array1<f32>, GarError> {
    if g.nrows() == 0 {
        return Err(GarError::EmptyUpdates);
    }

    if !(0.0..0.5).contains(&proportion) {
        return Err(GarError::InvalidHyperparameter {
            name: "proportion",
            value: proportion as f64,
        });
    }

    let n_rows = g.nrows();
    let n_trim = trim_count(n_rows, proportion);
    let n_keep = n_rows.saturating_sub(2 * n_trim);

    if n_keep < 1 {
        return Err(GarError::InsufficientQuorum {
            needed: 1,
            actual: n_keep,
        });
    }

    let result: Vec<f32> = (0..g.ncols())
        .into_par_iter()
        .map(|col| {
            let mut values = g.column(col).to_vec();
            values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

            let trimmed = &values[n_trim..n_rows - n_trim];
            (trimmed.iter().map(|&v| f64::from(v)).sum::<f64>() / trimmed.len() as f64) as f32
        })
        .collect();

    Ok(Array1::from(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    #[test]
    fn test_honest_rows_only() {
        let g = array![[1.0, 2.0], [1.0, 2.0], [1.0, 2.0]];
        let result = trimmed_mean(g.view(), 0.2).unwrap();
        assert_eq!(result, array![1.0, 2.0]);
    }

    #[test]
    fn test_30_percent_byzantine() {
        let mut values = vec![1.0f32; 7];
        values.extend([100.0; 3]);
        let g = Array2::from_shape_vec((10, 1), values).unwrap();

        let result = trimmed_mean(g.view(), 0.3).unwrap();
        assert!(
            (result[0] - 1.0).abs() < 0.5,
            "Expected ~1.0, got {}",
            result[0]
        );
    }

    #[test]
    fn test_invalid_proportion() {
        let g = array![[1.0]];
        assert!(trimmed_mean(g.view(), 0.5).is_err());
        assert!(trimmed_mean(g.view(), -0.1).is_err());
    }

    #[test]
    fn test_trim_leaves_nothing() {
        // floor(2 * 0.49) = 0 keeps both rows; 4 rows at 0.49 trims 1 per side
        let g = array![[1.0], [2.0]];
        assert!(trimmed_mean(g.view(), 0.49).is_ok());
        assert_eq!(trim_count(4, 0.49), 1);
    }

    #[test]
    fn test_zero_trim_is_mean() {
        let g = array![[1.0], [3.0], [5.0]];
        let result = trimmed_mean(g.view(), 0.0).unwrap();
        assert!((result[0] - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_trim_to_single_middle_value() {
        // 5 rows, floor(5 * 0.4) = 2 trimmed per side
        let g = array![[9.0], [-4.0], [3.0], [100.0], [0.5]];
        let result = trimmed_mean(g.view(), 0.4).unwrap();
        assert_eq!(result[0], 3.0);
    }

    #[test]
    fn test_identical_rows_exact() {
        let row = Array1::from_shape_fn(50, |j| 0.1 + 0.37 * j as f32);
        for n in [3, 5, 6, 7, 10] {
            let g = Array2::from_shape_fn((n, 50), |(_, j)| row[j]);
            assert_eq!(trimmed_mean(g.view(), 0.2).unwrap(), row, "n = {}", n);
        }
    }
}
