//! Gradient aggregation rules (GARs).
//!
//! Each rule reduces a gradient matrix (one row per worker) to a single
//! vector:
//!
//! | Rule | Byzantine Tolerance | Cost |
//! |------|-------------------|------|
//! | [`mean`] | None (baseline) | O(nd) |
//! | [`coordinate_median`] | < 50% per coordinate | O(d n log n), parallel |
//! | [`geometric_median`] | < 50% jointly | O(nd) per iteration |
//! | [`trimmed_mean`] | `proportion` per coordinate | O(d n log n), parallel |
//! | [`krum`] | n >= 2f+3 | O(n^2 d), parallel |
//! | [`norm_clip`] | bounded magnitude only | O(nd) |
//!
//! [`GradientAggregator`] wraps one rule selected from configuration and
//! records the per-call cost the training driver reports.

pub mod geometric_median;
pub mod krum;
pub mod mean;
pub mod median;
pub mod norm_clipping;
pub mod trimmed_mean;

pub use geometric_median::{geometric_median, GeoMedOutcome};
pub use krum::krum;
pub use mean::mean;
pub use median::coordinate_median;
pub use norm_clipping::norm_clip;
pub use trimmed_mean::trimmed_mean;

use std::time::{Duration, Instant};

use ndarray::{Array1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{AggregationConfig, GarKind, GeoMedAlg, KrumMode};
use crate::error::GarError;

/// Aggregation rule together with its hyperparameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum GarRule {
    /// Column mean
    Mean,
    /// Coordinate-wise median
    CoordinateMedian,
    /// Geometric median (Vardi-Zhang)
    GeometricMedian {
        /// Convergence tolerance
        eps: f64,
        /// Iteration cap
        max_iter: usize,
    },
    /// Coordinate-wise trimmed mean
    TrimmedMean {
        /// Fraction trimmed from each end
        proportion: f32,
    },
    /// Krum / multi-Krum
    Krum {
        /// Assumed Byzantine fraction
        krum_frac: f32,
        /// Selection or averaging
        mode: KrumMode,
    },
    /// Norm clipping followed by the mean
    NormClip {
        /// Clipping threshold
        alpha: f32,
    },
}

impl GarRule {
    /// Short rule name, as used in configuration files.
    pub fn name(&self) -> &'static str {
        match self {
            GarRule::Mean => "mean",
            GarRule::CoordinateMedian => "co_med",
            GarRule::GeometricMedian { .. } => "geo_med",
            GarRule::TrimmedMean { .. } => "trimmed_mean",
            GarRule::Krum { .. } => "krum",
            GarRule::NormClip { .. } => "norm_clip",
        }
    }

    /// Check hyperparameters without running the rule.
    pub fn validate(&self) -> Result<(), GarError> {
        match *self {
            GarRule::GeometricMedian { eps, max_iter } => {
                if !(eps > 0.0 && eps.is_finite()) {
                    return Err(GarError::InvalidHyperparameter { name: "eps", value: eps });
                }
                if max_iter == 0 {
                    return Err(GarError::InvalidHyperparameter {
                        name: "max_iter",
                        value: 0.0,
                    });
                }
            }
            GarRule::TrimmedMean { proportion } => {
                if !(0.0..0.5).contains(&proportion) {
                    return Err(GarError::InvalidHyperparameter {
                        name: "proportion",
                        value: proportion as f64,
                    });
                }
            }
            GarRule::Krum { krum_frac, .. } => {
                if !(0.0..=1.0).contains(&krum_frac) {
                    return Err(GarError::InvalidHyperparameter {
                        name: "krum_frac",
                        value: krum_frac as f64,
                    });
                }
            }
            GarRule::NormClip { alpha } => {
                if !(alpha > 0.0 && alpha.is_finite()) {
                    return Err(GarError::InvalidHyperparameter {
                        name: "alpha",
                        value: alpha as f64,
                    });
                }
            }
            GarRule::Mean | GarRule::CoordinateMedian => {}
        }
        Ok(())
    }
}

/// Cost of the most recent aggregation call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AggCost {
    /// Iterations used (1 for non-iterative rules)
    pub num_iter: usize,
    /// Wall time of the call
    pub agg_time: Duration,
    /// False only when an iterative rule hit its cap
    pub converged: bool,
}

/// Stateful aggregation rule used once per communication round.
///
/// # Example
///
/// ```rust
/// use gar_fl::aggregators::{GarRule, GradientAggregator};
/// use ndarray::array;
///
/// let mut gar = GradientAggregator::new(GarRule::CoordinateMedian).unwrap();
///
/// let g = array![
///     [1.0, 2.0],
///     [1.1, 2.1],
///     [0.9, 1.9],
///     [100.0, 200.0], // Byzantine
/// ];
///
/// let result = gar.aggregate(g.view(), None).unwrap();
/// assert!((result[0] - 1.0).abs() < 0.5);
/// assert_eq!(gar.num_iter(), 1);
/// ```
#[derive(Clone, Debug)]
pub struct GradientAggregator {
    rule: GarRule,
    cost: AggCost,
}

impl GradientAggregator {
    /// Create an aggregator, rejecting invalid hyperparameters.
    pub fn new(rule: GarRule) -> Result<Self, GarError> {
        rule.validate()?;
        Ok(Self {
            rule,
            cost: AggCost {
                converged: true,
                ..AggCost::default()
            },
        })
    }

    /// Build the aggregator named by `config.gar`.
    pub fn from_config(config: &AggregationConfig) -> Result<Self, GarError> {
        let rule = match config.gar {
            GarKind::Mean => GarRule::Mean,
            GarKind::CoMed => GarRule::CoordinateMedian,
            GarKind::GeoMed => match config.geo_med_config.geo_med_alg {
                GeoMedAlg::Vardi => GarRule::GeometricMedian {
                    eps: config.geo_med_config.eps,
                    max_iter: config.geo_med_config.max_iter,
                },
            },
            GarKind::TrimmedMean => GarRule::TrimmedMean {
                proportion: config.trimmed_mean_config.proportion,
            },
            GarKind::Krum => GarRule::Krum {
                krum_frac: config.krum_config.krum_frac,
                mode: config.krum_config.krum_mode,
            },
            GarKind::NormClip => GarRule::NormClip {
                alpha: config.norm_clip_config.alpha,
            },
        };
        info!(gar = rule.name(), "initializing GAR");
        Self::new(rule)
    }

    /// The configured rule.
    pub fn rule(&self) -> &GarRule {
        &self.rule
    }

    /// Aggregate the rows of `g` into one vector of length `g.ncols()`.
    ///
    /// With `index_subset = Some(cols)` only those columns are aggregated;
    /// every other coordinate of the result is `0.0`.
    pub fn aggregate(
        &mut self,
        g: ArrayView2<'_, f32>,
        index_subset: Option<&[usize]>,
    ) -> Result<Array1<f32>, GarError> {
        let start = Instant::now();
        let d = g.ncols();

        let (result, num_iter, converged) = match index_subset {
            None => self.run(g)?,
            Some(cols) => {
                if let Some(&index) = cols.iter().find(|&&c| c >= d) {
                    return Err(GarError::IndexOutOfBounds { index, len: d });
                }
                if g.nrows() == 0 {
                    return Err(GarError::EmptyUpdates);
                }
                let mut full = Array1::<f32>::zeros(d);
                if cols.is_empty() {
                    (full, 0, true)
                } else {
                    let reduced = g.select(Axis(1), cols);
                    let (partial, num_iter, converged) = self.run(reduced.view())?;
                    for (&c, v) in cols.iter().zip(partial.iter()) {
                        full[c] = *v;
                    }
                    (full, num_iter, converged)
                }
            }
        };

        self.cost = AggCost {
            num_iter,
            agg_time: start.elapsed(),
            converged,
        };
        debug!(
            gar = self.rule.name(),
            rows = g.nrows(),
            cols = d,
            num_iter,
            agg_time_us = self.cost.agg_time.as_micros() as u64,
            "aggregation done"
        );
        Ok(result)
    }

    fn run(&self, g: ArrayView2<'_, f32>) -> Result<(Array1<f32>, usize, bool), GarError> {
        Ok(match self.rule {
            GarRule::Mean => (mean(g)?, 1, true),
            GarRule::CoordinateMedian => (coordinate_median(g)?, 1, true),
            GarRule::GeometricMedian { eps, max_iter } => {
                let out = geometric_median(g, eps, max_iter)?;
                (out.median, out.iterations, out.converged)
            }
            GarRule::TrimmedMean { proportion } => (trimmed_mean(g, proportion)?, 1, true),
            GarRule::Krum { krum_frac, mode } => (krum(g, krum_frac, mode)?, 1, true),
            GarRule::NormClip { alpha } => (norm_clip(g, alpha)?, 1, true),
        })
    }

    /// Iterations used by the last call.
    pub fn num_iter(&self) -> usize {
        self.cost.num_iter
    }

    /// Wall time of the last call.
    pub fn agg_time(&self) -> Duration {
        self.cost.agg_time
    }

    /// Whether the last call converged (always true for non-iterative rules).
    pub fn converged(&self) -> bool {
        self.cost.converged
    }

    /// Read the counters of the last call and reset them.
    pub fn take_cost(&mut self) -> AggCost {
        let cost = self.cost;
        self.reset_counters();
        cost
    }

    /// Zero `num_iter` and `agg_time`.
    pub fn reset_counters(&mut self) {
        self.cost = AggCost {
            converged: true,
            ..AggCost::default()
        };
    }
}

/// Build the aggregation rule named in the configuration.
pub fn get_gar(config: &AggregationConfig) -> Result<GradientAggregator, GarError> {
    GradientAggregator::from_config(config)
}
