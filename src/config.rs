//! Run configuration.
//!
//! Mirrors the nested `aggregation_config` mapping used by the training
//! driver. Every rule family is selected by a string discriminator
//! (`gar`, `compression_operator`, `rule`, `attack_model`) which
//! deserializes into a closed enum, so an unknown name fails at load time.
//!
//! ```rust
//! use gar_fl::config::{AggregationConfig, GarKind};
//!
//! let config = AggregationConfig::from_json(
//!     r#"{ "gar": "trimmed_mean", "trimmed_mean_config": { "proportion": 0.2 } }"#,
//! )
//! .unwrap();
//! assert_eq!(config.gar, GarKind::TrimmedMean);
//! assert!(AggregationConfig::from_json(r#"{ "gar": "bulyan" }"#).is_err());
//! ```

use serde::{Deserialize, Serialize};

use crate::error::GarError;

/// Aggregation rule discriminator (`gar` key).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GarKind {
    /// Column mean
    #[default]
    Mean,
    /// Geometric median
    GeoMed,
    /// Coordinate-wise median
    CoMed,
    /// Norm clipping followed by the mean
    NormClip,
    /// Krum / multi-Krum
    Krum,
    /// Coordinate-wise trimmed mean
    TrimmedMean,
}

/// Top-level aggregation configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// Which aggregation rule to run
    pub gar: GarKind,
    /// Trimmed mean settings
    pub trimmed_mean_config: TrimmedMeanConfig,
    /// Krum settings
    pub krum_config: KrumConfig,
    /// Norm clipping settings
    pub norm_clip_config: NormClipConfig,
    /// Geometric median settings
    pub geo_med_config: GeoMedConfig,
    /// Server-side sparse approximation
    pub sparse_approximation_config: SparseApproxConfig,
    /// Client-side compression
    pub compression_config: CompressionConfig,
    /// Byzantine attack emulation
    pub attack_config: AttackConfig,
}

impl AggregationConfig {
    /// Parse a configuration from its JSON representation.
    pub fn from_json(json: &str) -> Result<Self, GarError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Trimmed mean settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TrimmedMeanConfig {
    /// Fraction trimmed from each end of every coordinate, in `[0, 0.5)`
    pub proportion: f32,
}

impl Default for TrimmedMeanConfig {
    fn default() -> Self {
        Self { proportion: 0.1 }
    }
}

/// How Krum turns scores into an aggregate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KrumMode {
    /// Return the single best-scoring row
    #[default]
    Select,
    /// Average the `n - f` best-scoring rows (multi-Krum)
    Average,
}

/// Krum settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct KrumConfig {
    /// Assumed fraction of Byzantine rows; `f = floor(krum_frac * n)`
    pub krum_frac: f32,
    /// Selection or averaging
    pub krum_mode: KrumMode,
}

impl Default for KrumConfig {
    fn default() -> Self {
        Self {
            krum_frac: 0.3,
            krum_mode: KrumMode::Select,
        }
    }
}

/// Norm clipping settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NormClipConfig {
    /// Maximum row norm
    pub alpha: f32,
}

impl Default for NormClipConfig {
    fn default() -> Self {
        Self { alpha: 1.0 }
    }
}

/// Geometric median solver.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeoMedAlg {
    /// Vardi-Zhang modified Weiszfeld iteration
    #[default]
    Vardi,
}

/// Geometric median settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoMedConfig {
    /// Solver
    pub geo_med_alg: GeoMedAlg,
    /// Convergence tolerance on the displacement between iterates
    pub eps: f64,
    /// Iteration cap
    pub max_iter: usize,
}

impl Default for GeoMedConfig {
    fn default() -> Self {
        Self {
            geo_med_alg: GeoMedAlg::Vardi,
            eps: 1e-5,
            max_iter: 1000,
        }
    }
}

/// Sparse approximation selection rule (`rule` key).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SparseRule {
    /// Keep the lanes with the largest L2 norm
    ActiveNorm,
    /// Keep a uniformly random subset
    Random,
}

/// Which dimension of the gradient matrix the sparse operator reduces.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionAxis {
    /// Select coordinates
    #[default]
    Column,
    /// Select workers
    Row,
}

/// Sparse approximation settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SparseApproxConfig {
    /// Selection rule; `None` disables sparse approximation
    pub rule: Option<SparseRule>,
    /// Dimension to reduce
    pub axis: SelectionAxis,
    /// Fraction of lanes kept, in `(0, 1]`
    pub frac_coordinates: f32,
    /// Server-side error feedback
    pub ef_server: bool,
    /// Seed for the `random` rule
    pub seed: Option<u64>,
}

impl Default for SparseApproxConfig {
    fn default() -> Self {
        Self {
            rule: None,
            axis: SelectionAxis::Column,
            frac_coordinates: 0.1,
            ef_server: false,
            seed: None,
        }
    }
}

/// Compression operator discriminator (`compression_operator` key).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionKind {
    /// Identity
    #[default]
    Full,
    /// Largest-magnitude sparsification
    TopK,
    /// Random sparsification
    RandK,
    /// Stochastic quantization
    Qsgd,
}

/// Compression settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// Operator
    pub compression_operator: CompressionKind,
    /// Fraction of coordinates kept by `top_k` / `rand_k`
    pub frac_coordinates_to_keep: f32,
    /// Quantization bit width for `qsgd`
    pub bits: u32,
    /// Client-side error feedback
    pub ef_client: bool,
    /// Seed for the randomized operators
    pub seed: Option<u64>,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            compression_operator: CompressionKind::Full,
            frac_coordinates_to_keep: 0.1,
            bits: 2,
            ef_client: false,
            seed: None,
        }
    }
}

/// Attack discriminator (`attack_model` key).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttackKind {
    /// Negate (and scale) the corrupted rows
    SignFlip,
    /// Overwrite the corrupted rows with a constant
    Constant,
    /// Replace the corrupted rows with Gaussian noise
    Gaussian,
    /// Coordinated shift of all corrupted rows to `mu - z * sigma` of the honest rows
    Collusion,
}

/// Attack settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AttackConfig {
    /// Attack; `None` disables attack injection
    pub attack_model: Option<AttackKind>,
    /// Fraction of rows corrupted each round, in `[0, 1]`
    pub frac_adv: f32,
    /// Seed for row selection and noise
    pub seed: u64,
    /// Multiplier applied by `sign_flip`
    pub attack_scale: f32,
    /// Value written by `constant`
    pub attack_value: f32,
    /// Mean of the `gaussian` noise
    pub noise_mean: f32,
    /// Standard deviation of the `gaussian` noise
    pub noise_std: f32,
    /// Shift, in honest standard deviations, used by `collusion`
    pub collusion_z: f32,
}

impl Default for AttackConfig {
    fn default() -> Self {
        Self {
            attack_model: None,
            frac_adv: 0.0,
            seed: 0,
            attack_scale: 1.0,
            attack_value: 100.0,
            noise_mean: 0.0,
            noise_std: 1.0,
            collusion_z: 1.0,
        }
    }
}
