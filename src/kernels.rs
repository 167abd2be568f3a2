/// Radial basis kernels for scattered-data interpolation
///
/// A kernel maps two equal-length poses and a bandwidth to a similarity in
/// `(0, 1]`. Callers guarantee matching lengths.
use crate::types::squared_distance;

pub type KernelFn = fn(&[f64], &[f64], f64) -> f64;

/// Isotropic Gaussian: `exp(-|b - a|^2 / (2 sigma^2))`
pub fn gaussian(a: &[f64], b: &[f64], sigma: f64) -> f64 {
    let numer = -squared_distance(a, b);
    let denom = 2.0 * sigma * sigma;
    (numer / denom).exp()
}
