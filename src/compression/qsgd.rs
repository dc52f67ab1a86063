//! Stochastic quantization (QSGD).
//!
//! Every coordinate is encoded as `||g|| * sign(g_i) * l / s` with
//! `s = 2^bits` and `l` one of the `s + 1` levels `0..=s`. The level is
//! rounded up or down at random so that the encoding is unbiased. Output
//! values are rounded through IEEE half precision.

use half::f16;
use ndarray::{Array1, ArrayView1};
use rand::Rng;

use crate::math::l2_norm;

/// Round every value through `f16`.
pub fn to_half_precision(v: Array1<f32>) -> Array1<f32> {
    v.mapv(|x| f16::from_f32(x).to_f32())
}

/// Quantize `g` to `2^bits + 1` magnitude levels.
///
/// The zero vector maps to the zero vector.
pub fn qsgd<R: Rng + ?Sized>(rng: &mut R, g: ArrayView1<'_, f32>, bits: u32) -> Array1<f32> {
    let norm = l2_norm(g);
    if norm == 0.0 {
        return Array1::zeros(g.len());
    }

    let s = 2f32.powi(bits as i32);
    let quantized = g.mapv(|x| {
        let scaled = x.abs() / norm * s;
        let lower = scaled.floor();
        let level = if rng.gen::<f32>() < scaled - lower {
            lower + 1.0
        } else {
            lower
        };
        let level = f16::from_f32(level / s).to_f32();
        if x == 0.0 {
            0.0
        } else {
            norm * x.signum() * level
        }
    });
    to_half_precision(quantized)
}
