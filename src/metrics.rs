//! Per-epoch cost bookkeeping.
//!
//! Records the aggregation cost counters the training driver dumps to JSON
//! after every epoch, together with the residual norms of the
//! error-feedback streams.

use serde::{Deserialize, Serialize};

use crate::error::GarError;

/// Costs accumulated over the rounds of the current epoch.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EpochCost {
    /// Seconds spent inside the aggregation rule
    pub agg_cost: f64,
    /// Iterations used by the aggregation rule
    pub gm_iter: usize,
    /// Seconds spent in sparse approximation
    pub sparse_approx_cost: f64,
    /// Aggregation calls
    pub agg_steps: usize,
    /// Calls where an iterative rule hit its cap
    pub non_converged: usize,
}

/// Cost series for a whole run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RunMetrics {
    /// Aggregation wall time per epoch (seconds)
    pub epoch_agg_cost: Vec<f64>,
    /// Aggregation iterations per epoch
    pub epoch_gm_iter: Vec<usize>,
    /// Sparse approximation wall time per epoch (seconds)
    pub epoch_sparse_approx_cost: Vec<f64>,
    /// Mean client residual norm at the end of each epoch
    pub communication_residual: Vec<f32>,
    /// Server residual norm at the end of each epoch
    pub sparse_approx_residual: Vec<f32>,
    /// Column-norm mass profile snapshots
    pub frac_mass_retained: Vec<Vec<f32>>,
    /// Total aggregation calls
    pub num_agg_steps: usize,
    /// Total non-converged aggregation calls
    pub num_non_converged: usize,
}

impl RunMetrics {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the totals of one epoch.
    pub fn push_epoch(&mut self, cost: &EpochCost) {
        self.epoch_agg_cost.push(cost.agg_cost);
        self.epoch_gm_iter.push(cost.gm_iter);
        self.epoch_sparse_approx_cost.push(cost.sparse_approx_cost);
        self.num_agg_steps += cost.agg_steps;
        self.num_non_converged += cost.non_converged;
    }

    /// Number of recorded epochs.
    pub fn len(&self) -> usize {
        self.epoch_agg_cost.len()
    }

    /// Whether no epoch has been recorded.
    pub fn is_empty(&self) -> bool {
        self.epoch_agg_cost.is_empty()
    }

    /// Total aggregation time over all epochs.
    pub fn total_agg_cost(&self) -> f64 {
        self.epoch_agg_cost.iter().sum()
    }

    /// Total aggregation iterations over all epochs.
    pub fn total_gm_iter(&self) -> usize {
        self.epoch_gm_iter.iter().sum()
    }

    /// Total sparse approximation time over all epochs.
    pub fn total_sparse_cost(&self) -> f64 {
        self.epoch_sparse_approx_cost.iter().sum()
    }

    /// Average aggregation time per iteration (0 when nothing ran).
    pub fn avg_gm_cost(&self) -> f64 {
        match self.total_gm_iter() {
            0 => 0.0,
            iters => self.total_agg_cost() / iters as f64,
        }
    }

    /// Serialize the record to JSON.
    pub fn to_json(&self) -> Result<String, GarError> {
        serde_json::to_string_pretty(self).map_err(|e| GarError::Config(e.to_string()))
    }
}
