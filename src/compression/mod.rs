//! Gradient compression operators with client-side error feedback.
//!
//! A [`Compressor`] is applied to one worker's gradient before it enters
//! the aggregation matrix. The sparsifying operators always compress the
//! learning-rate scaled step; with error feedback enabled they also carry
//! the discarded part of the signal forward:
//!
//! ```text
//! h        = lr * g + residual
//! out      = C(h)
//! residual = h - out          (error feedback only)
//! return out / lr             (error feedback only)
//! ```
//!
//! Without error feedback the residual stays zero and `out` is returned as
//! is. With it, `lr * out + residual_new == lr * g + residual_old` holds every
//! call.

pub mod qsgd;
pub mod rand_k;
pub mod top_k;

pub use qsgd::qsgd;
pub use rand_k::rand_k;
pub use top_k::top_k;

use ndarray::{Array1, ArrayView1};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

use crate::config::{CompressionConfig, CompressionKind};
use crate::error::GarError;
use crate::math::l2_norm;

/// Stateful compression operator for one gradient stream.
#[derive(Clone, Debug)]
pub struct Compressor {
    kind: CompressionKind,
    frac: f32,
    bits: u32,
    ef: bool,
    residual: Option<Array1<f32>>,
    rng: StdRng,
}

impl Compressor {
    /// Create an operator from configuration.
    ///
    /// Randomized operators are seeded from `config.seed` when present.
    pub fn new(config: &CompressionConfig) -> Result<Self, GarError> {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::with_rng(config, rng)
    }

    /// Create an operator with an explicit seed, overriding `config.seed`.
    pub fn with_seed(config: &CompressionConfig, seed: u64) -> Result<Self, GarError> {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: &CompressionConfig, rng: StdRng) -> Result<Self, GarError> {
        let frac = config.frac_coordinates_to_keep;
        let sparsifying = matches!(
            config.compression_operator,
            CompressionKind::TopK | CompressionKind::RandK
        );
        if sparsifying && !(0.0..=1.0).contains(&frac) {
            return Err(GarError::InvalidHyperparameter {
                name: "frac_coordinates_to_keep",
                value: frac as f64,
            });
        }
        let quantizing = config.compression_operator == CompressionKind::Qsgd;
        if quantizing && !(1..=16).contains(&config.bits) {
            return Err(GarError::InvalidHyperparameter {
                name: "bits",
                value: config.bits as f64,
            });
        }

        Ok(Self {
            kind: config.compression_operator,
            frac,
            bits: config.bits,
            ef: config.ef_client,
            residual: None,
            rng,
        })
    }

    /// Operator kind.
    pub fn kind(&self) -> CompressionKind {
        self.kind
    }

    /// Whether error feedback is active.
    pub fn error_feedback(&self) -> bool {
        self.ef && matches!(self.kind, CompressionKind::TopK | CompressionKind::RandK)
    }

    /// Current residual, if error feedback has run at least once.
    pub fn residual(&self) -> Option<&Array1<f32>> {
        self.residual.as_ref()
    }

    /// L2 norm of the residual (0 before the first call).
    pub fn residual_norm(&self) -> f32 {
        self.residual.as_ref().map_or(0.0, |r| l2_norm(r.view()))
    }

    /// Compress one gradient vector.
    ///
    /// # Errors
    ///
    /// [`GarError::ResidualShapeMismatch`] when the stored residual was built
    /// for a vector of a different length.
    pub fn compress(&mut self, g: ArrayView1<'_, f32>, lr: f32) -> Result<Array1<f32>, GarError> {
        match self.kind {
            CompressionKind::Full => Ok(g.to_owned()),
            CompressionKind::Qsgd => Ok(qsgd(&mut self.rng, g, self.bits)),
            CompressionKind::TopK | CompressionKind::RandK => {
                let mut h = g.mapv(|x| lr * x);
                if let Some(residual) = self.residual.as_ref() {
                    if residual.len() != g.len() {
                        return Err(GarError::ResidualShapeMismatch {
                            expected: vec![residual.len()],
                            actual: vec![g.len()],
                        });
                    }
                    h += residual;
                }

                let out = self.sparsify(h.view());
                if !self.error_feedback() {
                    return Ok(out);
                }
                self.residual = Some(&h - &out);
                Ok(out / lr)
            }
        }
    }

    fn sparsify(&mut self, v: ArrayView1<'_, f32>) -> Array1<f32> {
        match self.kind {
            CompressionKind::RandK => rand_k(&mut self.rng, v, self.frac),
            _ => top_k(v, self.frac),
        }
    }
}

/// Build the compression operator named in the configuration.
pub fn get_compression_operator(config: &CompressionConfig) -> Result<Compressor, GarError> {
    info!(
        compression_operator = ?config.compression_operator,
        ef_client = config.ef_client,
        "initializing compression operator"
    );
    Compressor::new(config)
}
