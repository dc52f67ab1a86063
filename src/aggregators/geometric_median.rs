//! Geometric median via the Vardi-Zhang modified Weiszfeld iteration
//!
//! The geometric median minimizes the sum of Euclidean distances to all rows
//! and has a breakdown point of 1/2 jointly across every dimension, unlike
//! the coordinate-wise median.
//!
//! Reference: Vardi & Zhang, "The multivariate L1-median and associated data
//! depth", PNAS 2000.
//!
//! The plain Weiszfeld update divides by the distance to each row and is
//! undefined when the estimate lands exactly on a row. Vardi-Zhang drop those
//! rows from the weighted average and blend the result back toward the
//! current estimate in proportion to how many rows coincide with it.

use ndarray::{Array1, ArrayView2, Axis};
use rayon::prelude::*;
use tracing::warn;

use crate::error::GarError;

/// Default convergence tolerance.
pub const DEFAULT_EPS: f64 = 1e-5;

/// Default iteration cap.
pub const DEFAULT_MAX_ITER: usize = 1000;

/// Result of a geometric median solve.
#[derive(Clone, Debug, PartialEq)]
pub struct GeoMedOutcome {
    /// The estimate
    pub median: Array1<f32>,
    /// Iterations performed
    pub iterations: usize,
    /// Whether the displacement dropped below `eps` before the cap
    pub converged: bool,
}

/// Geometric median of the rows of `g`.
///
/// Starts from the column mean and iterates until two successive estimates
/// are closer than `eps`, or `max_iter` iterations have been performed. In
/// the latter case the last estimate is returned with `converged = false`.
///
/// # Arguments
///
/// * `g` - Gradient matrix, one row per worker
/// * `eps` - Convergence tolerance (Euclidean displacement)
/// * `max_iter` - Iteration cap, must be at least 1
pub fn geometric_median(
    g: ArrayView2<'_, f32>,
    eps: f64,
    max_iter: usize,
) -> Result<GeoMedOutcome, GarError> {
    if g.nrows() == 0 {
        return Err(GarError::EmptyUpdates);
    }
    if !(eps > 0.0 && eps.is_finite()) {
        return Err(GarError::InvalidHyperparameter { name: "eps", value: eps });
    }
    if max_iter == 0 {
        return Err(GarError::InvalidHyperparameter {
            name: "max_iter",
            value: 0.0,
        });
    }

    let x = g.mapv(f64::from);
    let n = x.nrows();
    let mut mu = x.mean_axis(Axis(0)).ok_or(GarError::EmptyUpdates)?;

    for iteration in 1..=max_iter {
        let distances: Vec<f64> = (0..n)
            .into_par_iter()
            .map(|i| {
                x.row(i)
                    .iter()
                    .zip(mu.iter())
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum::<f64>()
                    .sqrt()
            })
            .collect();

        let num_zeros = distances.iter().filter(|&&d| d == 0.0).count();
        if num_zeros == n {
            // Every row coincides with the estimate
            return Ok(GeoMedOutcome {
                median: mu.mapv(|v| v as f32),
                iterations: iteration - 1,
                converged: true,
            });
        }

        let inv_sum: f64 = distances.iter().filter(|&&d| d != 0.0).map(|d| 1.0 / d).sum();
        let mut t = Array1::<f64>::zeros(mu.len());
        for (row, &d) in x.outer_iter().zip(distances.iter()) {
            if d != 0.0 {
                t.scaled_add(1.0 / (d * inv_sum), &row);
            }
        }

        let next = if num_zeros == 0 {
            t
        } else {
            let r = (&t - &mu).iter().map(|v| v * v).sum::<f64>().sqrt() * inv_sum;
            let r_inv = if r == 0.0 { 0.0 } else { num_zeros as f64 / r };
            &t * (1.0 - r_inv).max(0.0) + &mu * r_inv.min(1.0)
        };

        let shift = (&mu - &next).iter().map(|v| v * v).sum::<f64>().sqrt();
        mu = next;
        if shift < eps {
            return Ok(GeoMedOutcome {
                median: mu.mapv(|v| v as f32),
                iterations: iteration,
                converged: true,
            });
        }
    }

    warn!(max_iter, "geometric median did not converge, returning last estimate");
    Ok(GeoMedOutcome {
        median: mu.mapv(|v| v as f32),
        iterations: max_iter,
        converged: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    fn solve(g: &Array2<f32>) -> GeoMedOutcome {
        geometric_median(g.view(), DEFAULT_EPS, DEFAULT_MAX_ITER).unwrap()
    }

    #[test]
    fn test_single_row_returns_row() {
        let g = array![[1.5, -2.0, 8.0]];
        let out = solve(&g);
        assert_eq!(out.median, array![1.5, -2.0, 8.0]);
        assert_eq!(out.iterations, 0);
        assert!(out.converged);
    }

    #[test]
    fn test_identical_rows_return_immediately() {
        let g = array![[0.5, 4.0], [0.5, 4.0], [0.5, 4.0]];
        let out = solve(&g);
        assert_eq!(out.median, array![0.5, 4.0]);
        assert_eq!(out.iterations, 0);
    }

    #[test]
    fn test_two_rows_equidistant() {
        let g = array![[0.0, 0.0], [4.0, 2.0]];
        let out = solve(&g);
        assert!((out.median[0] - 2.0).abs() < 1e-5);
        assert!((out.median[1] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_reference_points() {
        let g = array![
            [2.0, 3.0, 8.0],
            [10.0, 4.0, 3.0],
            [58.0, 3.0, 4.0],
            [34.0, 2.0, 43.0],
        ];
        let out = solve(&g);
        assert!(out.converged);
        assert!(out.iterations > 1);

        // First-order optimality: the unit vectors toward every row sum to ~0
        let mut grad = [0.0f64; 3];
        for row in g.outer_iter() {
            let diff: Vec<f64> = row
                .iter()
                .zip(out.median.iter())
                .map(|(a, b)| (*a - *b) as f64)
                .collect();
            let norm = diff.iter().map(|v| v * v).sum::<f64>().sqrt();
            for (acc, d) in grad.iter_mut().zip(diff) {
                *acc += d / norm;
            }
        }
        let grad_norm = grad.iter().map(|v| v * v).sum::<f64>().sqrt();
        assert!(grad_norm < 1e-2, "not a stationary point: {}", grad_norm);
    }

    #[test]
    fn test_estimate_on_a_data_point() {
        // Majority at the origin: the median is exactly the coincident point
        let g = array![[0.0, 0.0], [0.0, 0.0], [0.0, 0.0], [10.0, 0.0], [0.0, 10.0]];
        let out = solve(&g);
        assert!(out.median[0].abs() < 1e-3);
        assert!(out.median[1].abs() < 1e-3);
    }

    #[test]
    fn test_iteration_cap_reports_non_convergence() {
        let g = array![[2.0, 3.0, 8.0], [10.0, 4.0, 3.0], [58.0, 3.0, 4.0], [34.0, 2.0, 43.0]];
        let out = geometric_median(g.view(), 1e-12, 2).unwrap();
        assert_eq!(out.iterations, 2);
        assert!(!out.converged);
    }

    #[test]
    fn test_invalid_parameters() {
        let g = array![[1.0]];
        assert!(geometric_median(g.view(), 0.0, 10).is_err());
        assert!(geometric_median(g.view(), 1e-5, 0).is_err());
        let empty = Array2::<f32>::zeros((0, 1));
        assert!(matches!(
            geometric_median(empty.view(), 1e-5, 10),
            Err(GarError::EmptyUpdates)
        ));
    }
}
