//! Byzantine attack emulation.
//!
//! An [`AttackInjector`] rewrites a fraction of the rows of the gradient
//! matrix before aggregation, standing in for workers that report
//! corrupted gradients. Corrupted rows are drawn without replacement from a
//! seeded RNG, so two injectors built from the same configuration corrupt
//! the same rows with the same values round after round.

use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use tracing::{debug, info};

use crate::config::{AttackConfig, AttackKind};
use crate::error::GarError;

/// Attack together with its parameters.
#[derive(Clone, Debug, PartialEq)]
pub enum AttackModel {
    /// `row <- -scale * row`
    SignFlip {
        /// Magnitude multiplier
        scale: f32,
    },
    /// Every coordinate set to `value`
    Constant {
        /// Value written
        value: f32,
    },
    /// Row replaced by i.i.d. Gaussian samples
    Gaussian {
        /// Mean
        mean: f32,
        /// Standard deviation
        std: f32,
    },
    /// All corrupted rows set to `mu - z * sigma` of the honest rows
    Collusion {
        /// Shift in honest standard deviations
        z: f32,
    },
}

impl AttackModel {
    fn from_config(kind: AttackKind, config: &AttackConfig) -> Self {
        match kind {
            AttackKind::SignFlip => AttackModel::SignFlip {
                scale: config.attack_scale,
            },
            AttackKind::Constant => AttackModel::Constant {
                value: config.attack_value,
            },
            AttackKind::Gaussian => AttackModel::Gaussian {
                mean: config.noise_mean,
                std: config.noise_std,
            },
            AttackKind::Collusion => AttackModel::Collusion {
                z: config.collusion_z,
            },
        }
    }
}

/// Stateful attack injector.
#[derive(Clone, Debug)]
pub struct AttackInjector {
    model: AttackModel,
    frac_adv: f32,
    rng: StdRng,
    noise: Option<Normal<f32>>,
    corrupted: Vec<usize>,
}

impl AttackInjector {
    /// Create an injector corrupting `frac_adv` of the rows every call.
    pub fn new(model: AttackModel, frac_adv: f32, seed: u64) -> Result<Self, GarError> {
        if !(0.0..=1.0).contains(&frac_adv) {
            return Err(GarError::InvalidHyperparameter {
                name: "frac_adv",
                value: frac_adv as f64,
            });
        }
        let noise = match model {
            AttackModel::Gaussian { mean, std } => Some(Normal::new(mean, std).map_err(|_| {
                GarError::InvalidHyperparameter {
                    name: "noise_std",
                    value: std as f64,
                }
            })?),
            _ => None,
        };
        Ok(Self {
            model,
            frac_adv,
            rng: StdRng::seed_from_u64(seed),
            noise,
            corrupted: Vec::new(),
        })
    }

    /// Attack model.
    pub fn model(&self) -> &AttackModel {
        &self.model
    }

    /// Number of rows corrupted out of `n`.
    pub fn num_adversaries(&self, n: usize) -> usize {
        ((n as f32 * self.frac_adv).floor() as usize).min(n)
    }

    /// Rows corrupted by the last call, ascending.
    pub fn corrupted_rows(&self) -> &[usize] {
        &self.corrupted
    }

    /// Corrupt a fraction of the rows of `g`. The shape never changes.
    pub fn launch_attack(&mut self, mut g: Array2<f32>) -> Array2<f32> {
        let n = g.nrows();
        let f = self.num_adversaries(n);
        let mut rows = rand::seq::index::sample(&mut self.rng, n, f).into_vec();
        rows.sort_unstable();

        match self.model {
            AttackModel::SignFlip { scale } => {
                for &i in &rows {
                    g.row_mut(i).mapv_inplace(|x| -scale * x);
                }
            }
            AttackModel::Constant { value } => {
                for &i in &rows {
                    g.row_mut(i).fill(value);
                }
            }
            AttackModel::Gaussian { .. } => {
                if let Some(noise) = self.noise {
                    for &i in &rows {
                        for x in g.row_mut(i).iter_mut() {
                            *x = noise.sample(&mut self.rng);
                        }
                    }
                }
            }
            AttackModel::Collusion { z } => {
                let honest: Vec<usize> = (0..n)
                    .filter(|i| rows.binary_search(i).is_err())
                    .collect();
                // Without honest rows to imitate the colluders report zeros.
                let target = if honest.is_empty() {
                    Array1::zeros(g.ncols())
                } else {
                    let h = g.select(Axis(0), &honest);
                    let mu = h
                        .mean_axis(Axis(0))
                        .unwrap_or_else(|| Array1::zeros(g.ncols()));
                    let sigma = h.std_axis(Axis(0), 0.0);
                    &mu - &(sigma * z)
                };
                for &i in &rows {
                    g.row_mut(i).assign(&target);
                }
            }
        }

        debug!(model = ?self.model, corrupted = rows.len(), of = n, "attack launched");
        self.corrupted = rows;
        g
    }
}

/// Build the attack injector, or `None` when no attack is configured.
pub fn get_attack(config: &AttackConfig) -> Result<Option<AttackInjector>, GarError> {
    match config.attack_model {
        None => Ok(None),
        Some(kind) => {
            info!(
                attack_model = ?kind,
                frac_adv = config.frac_adv,
                seed = config.seed,
                "initializing attack"
            );
            let model = AttackModel::from_config(kind, config);
            AttackInjector::new(model, config.frac_adv, config.seed).map(Some)
        }
    }
}
