//! Sparse approximation of the gradient matrix.
//!
//! Before aggregation the server keeps only a fraction of the columns
//! (coordinates) or rows (workers) of `G`: either those with the largest L2
//! norm (`active_norm`) or a uniformly random subset (`random`). The robust
//! aggregation rule then runs on far fewer coordinates, which is what makes
//! expensive rules such as the geometric median affordable every round.
//!
//! With server-side error feedback the discarded mass is stored and added
//! back before the next selection, so coordinates that are persistently
//! small but non-zero are eventually selected.

use ndarray::{Array2, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info};

use crate::compression::rand_k::rand_k_indices;
use crate::config::{SelectionAxis, SparseApproxConfig, SparseRule};
use crate::error::GarError;
use crate::math::lane_norms;

/// Output of one sparse approximation call.
#[derive(Clone, Debug, PartialEq)]
pub struct SparseSelection {
    /// Column axis: `G` with unselected columns zeroed. Row axis: the selected rows.
    pub matrix: Array2<f32>,
    /// Selected column or row indices, ascending
    pub indices: Vec<usize>,
    /// Which dimension `indices` refers to
    pub axis: SelectionAxis,
}

impl SparseSelection {
    /// Column subset to hand to the aggregation rule.
    ///
    /// `None` for row selection: the reduced matrix is aggregated in full.
    pub fn column_subset(&self) -> Option<&[usize]> {
        match self.axis {
            SelectionAxis::Column => Some(&self.indices),
            SelectionAxis::Row => None,
        }
    }
}

/// Indices of the `k` largest values, ascending. Ties prefer the lower index.
pub fn top_k_by_norm(norms: &[f32], k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..norms.len()).collect();
    order.sort_by(|&a, &b| {
        norms[b]
            .partial_cmp(&norms[a])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });
    order.truncate(k);
    order.sort_unstable();
    order
}

/// Fraction of the total column-norm mass captured by the top columns.
///
/// Sorts the column norms in descending order, takes their cumulative sum
/// normalized by the total, and samples it at 11 evenly spaced ranks from
/// the first to the last column.
pub fn frac_mass_retained(g: ArrayView2<'_, f32>) -> Vec<f32> {
    let mut norms = lane_norms(g, Axis(0));
    if norms.is_empty() {
        return Vec::new();
    }
    norms.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));

    let mut cumulative = Vec::with_capacity(norms.len());
    let mut acc = 0.0f32;
    for n in &norms {
        acc += n;
        cumulative.push(acc);
    }
    let total = acc;

    let last = (norms.len() - 1) as f32;
    (0..=10)
        .map(|i| {
            let ix = (last * i as f32 / 10.0).floor() as usize;
            if total == 0.0 {
                0.0
            } else {
                cumulative[ix] / total
            }
        })
        .collect()
}

/// Stateful sparse approximation operator.
#[derive(Clone, Debug)]
pub struct SparseApproxMatrix {
    rule: SparseRule,
    axis: SelectionAxis,
    frac: f32,
    ef: bool,
    residual: Option<Array2<f32>>,
    rng: StdRng,
}

impl SparseApproxMatrix {
    /// Create an operator for `rule`.
    pub fn new(rule: SparseRule, config: &SparseApproxConfig) -> Result<Self, GarError> {
        let frac = config.frac_coordinates;
        if !(frac > 0.0 && frac <= 1.0) {
            return Err(GarError::InvalidHyperparameter {
                name: "frac_coordinates",
                value: frac as f64,
            });
        }
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            rule,
            axis: config.axis,
            frac,
            ef: config.ef_server,
            residual: None,
            rng,
        })
    }

    /// Selection rule.
    pub fn rule(&self) -> SparseRule {
        self.rule
    }

    /// Dimension being reduced.
    pub fn axis(&self) -> SelectionAxis {
        self.axis
    }

    /// Current residual, if error feedback has run at least once.
    pub fn residual(&self) -> Option<&Array2<f32>> {
        self.residual.as_ref()
    }

    /// Frobenius norm of the residual (0 before the first call).
    pub fn residual_norm(&self) -> f32 {
        self.residual
            .as_ref()
            .map_or(0.0, |r| r.iter().map(|x| x * x).sum::<f32>().sqrt())
    }

    /// Number of lanes kept out of `len`.
    pub fn selection_count(&self, len: usize) -> Result<usize, GarError> {
        let k = (self.frac * len as f32).floor() as usize;
        if k == 0 {
            return Err(GarError::InsufficientQuorum { needed: 1, actual: 0 });
        }
        Ok(k.min(len))
    }

    /// Select a subset of columns (or rows) of `g`.
    ///
    /// # Errors
    ///
    /// [`GarError::InsufficientQuorum`] when `frac_coordinates` selects no
    /// lane of `g`, [`GarError::ResidualShapeMismatch`] when `g` changed shape
    /// since the residual was created.
    pub fn sparse_approx(
        &mut self,
        g: ArrayView2<'_, f32>,
        lr: f32,
    ) -> Result<SparseSelection, GarError> {
        let lane_axis = match self.axis {
            SelectionAxis::Column => Axis(0),
            SelectionAxis::Row => Axis(1),
        };
        let len = match self.axis {
            SelectionAxis::Column => g.ncols(),
            SelectionAxis::Row => g.nrows(),
        };
        let k = self.selection_count(len)?;

        let h = if self.ef {
            let residual = self
                .residual
                .get_or_insert_with(|| Array2::zeros(g.raw_dim()));
            if residual.dim() != g.dim() {
                return Err(GarError::ResidualShapeMismatch {
                    expected: residual.shape().to_vec(),
                    actual: g.shape().to_vec(),
                });
            }
            let mut h = residual.clone();
            h.scaled_add(lr, &g);
            h
        } else {
            g.to_owned()
        };

        let indices = match self.rule {
            SparseRule::ActiveNorm => top_k_by_norm(&lane_norms(h.view(), lane_axis), k),
            SparseRule::Random => rand_k_indices(&mut self.rng, len, k),
        };

        let mut masked = Array2::<f32>::zeros(h.raw_dim());
        let selection_axis = match self.axis {
            SelectionAxis::Column => Axis(1),
            SelectionAxis::Row => Axis(0),
        };
        for &i in &indices {
            masked
                .index_axis_mut(selection_axis, i)
                .assign(&h.index_axis(selection_axis, i));
        }

        if self.ef {
            self.residual = Some(&h - &masked);
            masked /= lr;
        }

        let matrix = match self.axis {
            SelectionAxis::Column => masked,
            SelectionAxis::Row => masked.select(Axis(0), &indices),
        };

        debug!(rule = ?self.rule, axis = ?self.axis, kept = k, of = len, "sparse approximation");
        Ok(SparseSelection {
            matrix,
            indices,
            axis: self.axis,
        })
    }
}

/// Build the sparse approximation operator, or `None` when no rule is configured.
pub fn get_sparse_approx_operator(
    config: &SparseApproxConfig,
) -> Result<Option<SparseApproxMatrix>, GarError> {
    match config.rule {
        None => Ok(None),
        Some(rule) => {
            info!(
                rule = ?rule,
                axis = ?config.axis,
                frac_coordinates = config.frac_coordinates,
                ef_server = config.ef_server,
                "initializing sparse approximation"
            );
            SparseApproxMatrix::new(rule, config).map(Some)
        }
    }
}
