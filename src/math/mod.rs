//! Mathematical primitives for gar-fl.
//!
//! - [`norms`] - L2 norms, distances and per-lane norms

pub mod norms;

pub use norms::{dist_sq, l2_norm, l2_norm_sq, lane_norms};
