//! # gar-fl: Robust Gradient Aggregation for Distributed Training
//!
//! gar-fl combines worker gradients into a single update while tolerating
//! corrupted or adversarial workers, and reduces the cost of doing so with
//! server-side sparse approximation and client-side gradient compression.
//!
//! ## Aggregation Rules
//!
//! - [`aggregators::mean()`] - Coordinate-wise mean (no Byzantine tolerance)
//! - [`aggregators::coordinate_median()`] - Coordinate-wise median
//! - [`aggregators::geometric_median()`] - Vardi-Zhang Weiszfeld iteration
//! - [`aggregators::trimmed_mean()`] - Coordinate-wise trimmed mean
//! - [`aggregators::krum()`] - Krum / multi-Krum selection
//! - [`aggregators::norm_clip()`] - Per-row norm clipping then mean
//!
//! ## High-Level API
//!
//! Build operators from an [`AggregationConfig`] with [`get_gar`],
//! [`get_sparse_approx_operator`], [`get_compression_operator`] and
//! [`get_attack`], or let a [`RoundPipeline`] own all of them for a run.

#![deny(missing_docs)]

pub mod aggregators;
pub mod attack;
pub mod compression;
pub mod config;
pub mod error;
pub mod math;
pub mod metrics;
pub mod pipeline;
pub mod sparse;

// Re-exports
pub use aggregators::{get_gar, AggCost, GarRule, GradientAggregator};
pub use attack::{get_attack, AttackInjector, AttackModel};
pub use compression::{get_compression_operator, Compressor};
pub use config::AggregationConfig;
pub use error::GarError;
pub use metrics::RunMetrics;
pub use pipeline::RoundPipeline;
pub use sparse::{get_sparse_approx_operator, SparseApproxMatrix, SparseSelection};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
