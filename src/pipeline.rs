//! One communication round, end to end.
//!
//! [`RoundPipeline`] owns every stateful operator of a training run: one
//! compression operator per worker, the attack injector, the server-side
//! sparse approximation and the aggregation rule. Each [`RoundPipeline::step`]
//! takes the raw worker gradients and returns the aggregate the optimizer
//! applies.

use std::time::Instant;

use ndarray::{Array1, Array2, ArrayView2};
use tracing::{debug, info, warn};

use crate::aggregators::{get_gar, GradientAggregator};
use crate::attack::{get_attack, AttackInjector};
use crate::compression::Compressor;
use crate::config::{AggregationConfig, CompressionConfig};
use crate::error::GarError;
use crate::metrics::{EpochCost, RunMetrics};
use crate::sparse::{frac_mass_retained, get_sparse_approx_operator, SparseApproxMatrix};

/// Gradient processing for a full run.
///
/// # Example
///
/// ```rust
/// use gar_fl::config::AggregationConfig;
/// use gar_fl::pipeline::RoundPipeline;
/// use ndarray::array;
///
/// let config = AggregationConfig::from_json(r#"{"gar": "co_med"}"#).unwrap();
/// let mut pipeline = RoundPipeline::from_config(&config).unwrap();
///
/// let g = array![[1.0, 2.0], [1.0, 2.0], [50.0, -50.0]];
/// let agg = pipeline.step(g, 0.1).unwrap();
/// assert_eq!(agg, array![1.0, 2.0]);
///
/// pipeline.end_epoch();
/// assert_eq!(pipeline.metrics().num_agg_steps, 1);
/// ```
#[derive(Debug)]
pub struct RoundPipeline {
    gar: GradientAggregator,
    sparse: Option<SparseApproxMatrix>,
    attack: Option<AttackInjector>,
    compression: CompressionConfig,
    compressors: Vec<Compressor>,
    epoch: EpochCost,
    metrics: RunMetrics,
}

impl RoundPipeline {
    /// Build every operator named in the configuration.
    pub fn from_config(config: &AggregationConfig) -> Result<Self, GarError> {
        let gar = get_gar(config)?;
        let sparse = get_sparse_approx_operator(&config.sparse_approximation_config)?;
        let attack = get_attack(&config.attack_config)?;
        // Reject bad compression settings now rather than on the first round.
        Compressor::with_seed(&config.compression_config, 0)?;

        info!(
            gar = gar.rule().name(),
            sparse = sparse.is_some(),
            attack = attack.is_some(),
            compression = ?config.compression_config.compression_operator,
            "round pipeline ready"
        );
        Ok(Self {
            gar,
            sparse,
            attack,
            compression: config.compression_config.clone(),
            compressors: Vec::new(),
            epoch: EpochCost::default(),
            metrics: RunMetrics::new(),
        })
    }

    /// The aggregation rule.
    pub fn gar(&self) -> &GradientAggregator {
        &self.gar
    }

    /// Per-worker compression operators created so far.
    pub fn compressors(&self) -> &[Compressor] {
        &self.compressors
    }

    /// Rows corrupted in the last round.
    pub fn corrupted_rows(&self) -> &[usize] {
        self.attack.as_ref().map_or(&[][..], |a| a.corrupted_rows())
    }

    /// Costs accumulated in the current epoch.
    pub fn epoch_cost(&self) -> &EpochCost {
        &self.epoch
    }

    /// Metrics of all finished epochs.
    pub fn metrics(&self) -> &RunMetrics {
        &self.metrics
    }

    /// Consume the pipeline, returning its metrics.
    pub fn into_metrics(self) -> RunMetrics {
        self.metrics
    }

    /// Run one round: compress, attack, sparsify, aggregate.
    ///
    /// Row `i` of `g` is worker `i`'s gradient; the worker count must stay
    /// fixed for the whole run once error feedback is active.
    ///
    /// # Errors
    ///
    /// [`GarError::EmptyUpdates`] for a matrix without rows,
    /// [`GarError::InvalidHyperparameter`] for a non-positive learning rate,
    /// plus whatever the individual operators report.
    pub fn step(&mut self, g: Array2<f32>, lr: f32) -> Result<Array1<f32>, GarError> {
        if g.nrows() == 0 {
            return Err(GarError::EmptyUpdates);
        }
        if lr.is_nan() || lr <= 0.0 {
            return Err(GarError::InvalidHyperparameter {
                name: "lr",
                value: lr as f64,
            });
        }

        let g = self.compress(g, lr)?;
        let g = match self.attack.as_mut() {
            Some(attack) => attack.launch_attack(g),
            None => g,
        };

        let agg = match self.sparse.as_mut() {
            Some(sparse) => {
                let start = Instant::now();
                let selection = sparse.sparse_approx(g.view(), lr)?;
                self.epoch.sparse_approx_cost += start.elapsed().as_secs_f64();
                self.gar
                    .aggregate(selection.matrix.view(), selection.column_subset())?
            }
            None => self.gar.aggregate(g.view(), None)?,
        };

        let cost = self.gar.take_cost();
        self.epoch.agg_cost += cost.agg_time.as_secs_f64();
        self.epoch.gm_iter += cost.num_iter;
        self.epoch.agg_steps += 1;
        if !cost.converged {
            self.epoch.non_converged += 1;
            warn!(
                gar = self.gar.rule().name(),
                num_iter = cost.num_iter,
                "aggregation did not converge"
            );
        }
        Ok(agg)
    }

    fn compress(&mut self, mut g: Array2<f32>, lr: f32) -> Result<Array2<f32>, GarError> {
        if self.compressors.len() < g.nrows() {
            for i in self.compressors.len()..g.nrows() {
                let compressor = match self.compression.seed {
                    Some(seed) => {
                        Compressor::with_seed(&self.compression, seed.wrapping_add(i as u64))?
                    }
                    None => Compressor::new(&self.compression)?,
                };
                self.compressors.push(compressor);
            }
        }
        for (mut row, compressor) in g.rows_mut().into_iter().zip(self.compressors.iter_mut()) {
            let out = compressor.compress(row.view(), lr)?;
            row.assign(&out);
        }
        Ok(g)
    }

    /// Snapshot the column-norm mass profile of `g`.
    pub fn record_grad_stats(&mut self, g: ArrayView2<'_, f32>) {
        self.metrics.frac_mass_retained.push(frac_mass_retained(g));
    }

    /// Close the current epoch and append its costs to the metrics.
    pub fn end_epoch(&mut self) {
        let communication_residual = if self.compressors.is_empty() {
            0.0
        } else {
            self.compressors.iter().map(Compressor::residual_norm).sum::<f32>()
                / self.compressors.len() as f32
        };
        let sparse_residual = self.sparse.as_ref().map_or(0.0, |s| s.residual_norm());

        debug!(
            agg_cost = self.epoch.agg_cost,
            gm_iter = self.epoch.gm_iter,
            sparse_approx_cost = self.epoch.sparse_approx_cost,
            communication_residual,
            sparse_residual,
            "epoch closed"
        );
        self.metrics.push_epoch(&self.epoch);
        self.metrics.communication_residual.push(communication_residual);
        self.metrics.sparse_approx_residual.push(sparse_residual);
        self.epoch = EpochCost::default();
    }
}
