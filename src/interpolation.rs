/// Scattered-data RBF interpolation
///
/// Fits weights `W` so that `A * W ~= B` in the least-squares sense, where
/// `A[i][j] = K(source_i, source_j, sigma)` is the kernel (Gram) matrix of the
/// training inputs and row `i` of `B` is training target `i`. A query is
/// mapped by evaluating its kernel row `v[i] = K(query, source_i, sigma)` and
/// returning `v * W`.
///
/// The fitted model is immutable; refitting builds a new interpolator.
use log::debug;
use std::fmt;

use crate::config::{validate_sigma, SolveMethod, SolverConfig};
use crate::error::{MResult, MappingError};
use crate::kernels::{self, KernelFn};
use crate::types::{stack_rows, KernelMatrix, KernelRow, Pose, TargetMatrix, WeightMatrix};

#[derive(Clone)]
pub struct ScatteredDataInterpolator {
    /// Training inputs, one row of the kernel matrix each
    source: Vec<Pose>,

    kernel: KernelFn,

    /// Kernel bandwidth used at fit time
    sigma: f64,

    /// N x D_out fitted weights
    weights: WeightMatrix,

    input_dim: usize,
    output_dim: usize,
}

impl ScatteredDataInterpolator {
    /// Fit a Gaussian-kernel interpolator.
    pub fn new(
        source: &[Pose],
        target: &[Pose],
        sigma: f64,
        config: &SolverConfig,
    ) -> MResult<Self> {
        Self::with_kernel(source, target, kernels::gaussian, sigma, config)
    }

    /// Fit an interpolator with an arbitrary radial kernel.
    ///
    /// # Errors
    /// * `InvalidInput` - no samples, ragged vectors, mismatched counts,
    ///   non-finite values or a non-positive `sigma`
    /// * `SingularMatrix` - the kernel matrix is numerically rank deficient,
    ///   usually because two samples share the same input
    pub fn with_kernel(
        source: &[Pose],
        target: &[Pose],
        kernel: KernelFn,
        sigma: f64,
        config: &SolverConfig,
    ) -> MResult<Self> {
        validate_sigma(sigma)?;
        let (input_dim, output_dim) = check_samples(source, target)?;

        let a = kernel_matrix(source, kernel, sigma);
        let b = stack_rows(target, output_dim);
        let weights = solve_least_squares(&a, &b, config)?;

        debug!(
            "Solved {} samples ({} -> {} dims, sigma={}, method={:?})",
            source.len(),
            input_dim,
            output_dim,
            sigma,
            config.method
        );

        Ok(Self {
            source: source.to_vec(),
            kernel,
            sigma,
            weights,
            input_dim,
            output_dim,
        })
    }

    /// Kernel values of `query` against every training input.
    pub fn kernel_row(&self, query: &[f64]) -> MResult<KernelRow> {
        self.check_query(query)?;
        Ok(KernelRow::from_iterator(
            self.source.len(),
            self.source
                .iter()
                .map(|s| (self.kernel)(query, s, self.sigma)),
        ))
    }

    /// Map a source pose to a target pose.
    pub fn interpolate(&self, query: &[f64]) -> MResult<Pose> {
        let row = self.kernel_row(query)?;
        let result = row * &self.weights;
        Ok(result.iter().copied().collect())
    }

    /// Map a sequence of source poses, failing on the first bad query.
    pub fn interpolate_many(&self, queries: &[Pose]) -> MResult<Vec<Pose>> {
        queries.iter().map(|q| self.interpolate(q)).collect()
    }

    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    pub fn output_dim(&self) -> usize {
        self.output_dim
    }

    pub fn sample_count(&self) -> usize {
        self.source.len()
    }

    pub fn weights(&self) -> &WeightMatrix {
        &self.weights
    }

    fn check_query(&self, query: &[f64]) -> MResult<()> {
        if query.len() != self.input_dim {
            return Err(MappingError::InvalidInput(format!(
                "query has {} values, interpolator expects {}",
                query.len(),
                self.input_dim
            )));
        }
        if query.iter().any(|v| !v.is_finite()) {
            return Err(MappingError::InvalidInput(
                "query contains non-finite values".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for ScatteredDataInterpolator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScatteredDataInterpolator")
            .field("samples", &self.source.len())
            .field("input_dim", &self.input_dim)
            .field("output_dim", &self.output_dim)
            .field("sigma", &self.sigma)
            .finish_non_exhaustive()
    }
}

/// Validate training data and return `(D_in, D_out)`.
fn check_samples(source: &[Pose], target: &[Pose]) -> MResult<(usize, usize)> {
    if source.is_empty() {
        return Err(MappingError::InvalidInput(
            "at least one training sample is required".to_string(),
        ));
    }
    if source.len() != target.len() {
        return Err(MappingError::InvalidInput(format!(
            "{} source vectors but {} target vectors",
            source.len(),
            target.len()
        )));
    }

    let input_dim = uniform_len(source, "source")?;
    let output_dim = uniform_len(target, "target")?;
    Ok((input_dim, output_dim))
}

fn uniform_len(rows: &[Pose], label: &str) -> MResult<usize> {
    let dim = rows[0].len();
    for (i, row) in rows.iter().enumerate() {
        if row.len() != dim {
            return Err(MappingError::InvalidInput(format!(
                "{} vector {} has {} values, expected {}",
                label,
                i,
                row.len(),
                dim
            )));
        }
        if row.iter().any(|v| !v.is_finite()) {
            return Err(MappingError::InvalidInput(format!(
                "{} vector {} contains non-finite values",
                label, i
            )));
        }
    }
    Ok(dim)
}

/// Build the N x N Gram matrix of the training inputs.
pub fn kernel_matrix(source: &[Pose], kernel: KernelFn, sigma: f64) -> KernelMatrix {
    let n = source.len();
    KernelMatrix::from_fn(n, n, |i, j| kernel(&source[i], &source[j], sigma))
}

/// Least-squares solve of `A * W = B`.
///
/// Conditioning is judged on the singular values of `A` for both methods so
/// that the two report `SingularMatrix` for the same inputs.
fn solve_least_squares(
    a: &KernelMatrix,
    b: &TargetMatrix,
    config: &SolverConfig,
) -> MResult<WeightMatrix> {
    let svd = a.clone().svd(true, true);
    let sv_max = svd.singular_values.max();
    let sv_min = svd.singular_values.min();
    let rcond = if sv_max > 0.0 { sv_min / sv_max } else { 0.0 };

    // A^T A squares the condition number of A.
    let (checked, what) = match config.method {
        SolveMethod::Svd => (rcond, "kernel matrix"),
        SolveMethod::NormalEquations => (rcond * rcond, "normal matrix A^T A"),
    };
    if !checked.is_finite() || checked < config.rcond_tolerance {
        return Err(MappingError::duplicate_inputs(format!(
            "{} is rank deficient (rcond={:e})",
            what, checked
        )));
    }

    let weights = match config.method {
        SolveMethod::Svd => svd
            .solve(b, config.rcond_tolerance * sv_max)
            .map_err(|e| MappingError::duplicate_inputs(e.to_string()))?,
        SolveMethod::NormalEquations => {
            let a_t = a.transpose();
            let normal = &a_t * a;
            let normal_inv = normal.try_inverse().ok_or_else(|| {
                MappingError::duplicate_inputs("normal matrix A^T A is not invertible")
            })?;
            normal_inv * a_t * b
        }
    };

    if weights.iter().any(|w| !w.is_finite()) {
        return Err(MappingError::duplicate_inputs(
            "solve produced non-finite weights",
        ));
    }
    Ok(weights)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn normal_config() -> SolverConfig {
        SolverConfig {
            method: SolveMethod::NormalEquations,
            ..SolverConfig::default()
        }
    }

    fn assert_pose_eq(actual: &[f64], expected: &[f64], eps: f64) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected.iter()) {
            assert_relative_eq!(*a, *e, epsilon = eps);
        }
    }

    #[test]
    fn test_exact_at_training_points() {
        let source = vec![vec![0.0], vec![1.0]];
        let target = vec![vec![0.0, 0.0], vec![1.0, -0.5]];
        let interp =
            ScatteredDataInterpolator::new(&source, &target, 1.0, &SolverConfig::default())
                .unwrap();

        assert_pose_eq(&interp.interpolate(&[0.0]).unwrap(), &[0.0, 0.0], 1e-10);
        assert_pose_eq(&interp.interpolate(&[1.0]).unwrap(), &[1.0, -0.5], 1e-10);
    }

    #[test]
    fn test_normal_equations_match_svd() {
        let source = vec![vec![0.0, 0.0], vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 1.0]];
        let target = vec![
            vec![0.0, 1.0, 2.0],
            vec![1.0, 0.0, -1.0],
            vec![0.5, 0.5, 0.5],
            vec![2.0, -2.0, 0.0],
        ];
        let svd =
            ScatteredDataInterpolator::new(&source, &target, 0.8, &SolverConfig::default())
                .unwrap();
        let normal =
            ScatteredDataInterpolator::new(&source, &target, 0.8, &normal_config()).unwrap();

        for (s, t) in source.iter().zip(target.iter()) {
            assert_pose_eq(&svd.interpolate(s).unwrap(), t, 1e-8);
            assert_pose_eq(&normal.interpolate(s).unwrap(), t, 1e-8);
        }

        let query = [0.3, 0.7];
        assert_pose_eq(
            &svd.interpolate(&query).unwrap(),
            &normal.interpolate(&query).unwrap(),
            1e-8,
        );
    }

    #[test]
    fn test_non_linear_one_to_two() {
        // x -> (x, x^2)
        let xs = [0.0, 0.25, 0.5, 0.75, 1.0];
        let source: Vec<Pose> = xs.iter().map(|x| vec![*x]).collect();
        let target: Vec<Pose> = xs.iter().map(|x| vec![*x, x * x]).collect();
        let interp =
            ScatteredDataInterpolator::new(&source, &target, 0.5, &SolverConfig::default())
                .unwrap();

        assert_eq!(interp.input_dim(), 1);
        assert_eq!(interp.output_dim(), 2);
        assert_eq!(interp.sample_count(), 5);
        assert_eq!(interp.weights().shape(), (5, 2));

        for (s, t) in source.iter().zip(target.iter()) {
            assert_pose_eq(&interp.interpolate(s).unwrap(), t, 1e-8);
        }
    }

    #[test]
    fn test_duplicate_sources_are_singular() {
        let source = vec![vec![0.5, 0.5], vec![1.0, 0.0], vec![0.5, 0.5]];
        let target = vec![vec![1.0], vec![2.0], vec![3.0]];

        let err = ScatteredDataInterpolator::new(&source, &target, 1.0, &SolverConfig::default())
            .unwrap_err();
        assert!(matches!(err, MappingError::SingularMatrix(_)));

        let err =
            ScatteredDataInterpolator::new(&source, &target, 1.0, &normal_config()).unwrap_err();
        assert!(matches!(err, MappingError::SingularMatrix(_)));
    }

    #[test]
    fn test_normal_equations_reject_ill_conditioned_fit() {
        // Wide kernels over closely spaced samples: A is usable, A^T A is not.
        let source: Vec<Pose> = (0..5).map(|x| vec![x as f64]).collect();
        let target: Vec<Pose> = source.iter().map(|x| vec![(1.3 * x[0]).sin()]).collect();

        for sigma in [6.0, 8.0, 10.0] {
            match ScatteredDataInterpolator::new(&source, &target, sigma, &normal_config()) {
                Ok(interp) => {
                    for (s, t) in source.iter().zip(target.iter()) {
                        assert_pose_eq(&interp.interpolate(s).unwrap(), t, 1e-6);
                    }
                }
                Err(err) => assert!(matches!(err, MappingError::SingularMatrix(_))),
            }
        }

        let err = ScatteredDataInterpolator::new(&source, &target, 10.0, &normal_config())
            .unwrap_err();
        assert!(matches!(err, MappingError::SingularMatrix(_)));

        let svd = ScatteredDataInterpolator::new(&source, &target, 10.0, &SolverConfig::default())
            .unwrap();
        for (s, t) in source.iter().zip(target.iter()) {
            assert_pose_eq(&svd.interpolate(s).unwrap(), t, 1e-6);
        }
    }

    #[test]
    fn test_invalid_training_data() {
        let config = SolverConfig::default();
        let empty: Vec<Pose> = Vec::new();
        assert!(matches!(
            ScatteredDataInterpolator::new(&empty, &empty, 1.0, &config),
            Err(MappingError::InvalidInput(_))
        ));

        let ragged = vec![vec![0.0], vec![1.0, 2.0]];
        let target = vec![vec![0.0], vec![1.0]];
        assert!(matches!(
            ScatteredDataInterpolator::new(&ragged, &target, 1.0, &config),
            Err(MappingError::InvalidInput(_))
        ));

        let source = vec![vec![0.0], vec![1.0]];
        let short = vec![vec![0.0]];
        assert!(matches!(
            ScatteredDataInterpolator::new(&source, &short, 1.0, &config),
            Err(MappingError::InvalidInput(_))
        ));

        assert!(matches!(
            ScatteredDataInterpolator::new(&source, &target, 0.0, &config),
            Err(MappingError::InvalidInput(_))
        ));

        let nan = vec![vec![0.0], vec![f64::NAN]];
        assert!(matches!(
            ScatteredDataInterpolator::new(&nan, &target, 1.0, &config),
            Err(MappingError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_query_dimension_mismatch() {
        let source = vec![vec![0.0, 0.0], vec![1.0, 1.0]];
        let target = vec![vec![0.0], vec![1.0]];
        let interp =
            ScatteredDataInterpolator::new(&source, &target, 1.0, &SolverConfig::default())
                .unwrap();

        assert!(matches!(
            interp.interpolate(&[0.0]),
            Err(MappingError::InvalidInput(_))
        ));
        assert!(matches!(
            interp.interpolate(&[0.0, 0.0, 0.0]),
            Err(MappingError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_interpolate_is_pure() {
        let source = vec![vec![0.0], vec![1.0], vec![3.0]];
        let target = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![-1.0, 2.0]];
        let interp =
            ScatteredDataInterpolator::new(&source, &target, 1.5, &SolverConfig::default())
                .unwrap();

        let first = interp.interpolate(&[1.7]).unwrap();
        let second = interp.interpolate(&[1.7]).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_small_sigma_follows_nearest_sample() {
        let source = vec![vec![0.0], vec![1.0]];
        let target = vec![vec![1.0, 2.0], vec![-3.0, 0.5]];
        let interp =
            ScatteredDataInterpolator::new(&source, &target, 0.05, &SolverConfig::default())
                .unwrap();

        // Nearest sample is 0.0; output should point along its target.
        let out = interp.interpolate(&[0.2]).unwrap();
        let norm = (out[0] * out[0] + out[1] * out[1]).sqrt();
        let t_norm = 5.0f64.sqrt();
        assert!(norm > 0.0);
        assert_relative_eq!(out[0] / norm, 1.0 / t_norm, epsilon = 1e-9);
        assert_relative_eq!(out[1] / norm, 2.0 / t_norm, epsilon = 1e-9);
    }

    #[test]
    fn test_larger_sigma_raises_distant_influence() {
        let source = vec![vec![0.0], vec![2.0]];
        let target = vec![vec![0.0], vec![1.0]];
        let query = [0.5];

        let mut last_ratio = 0.0;
        for sigma in [0.5, 1.0, 2.0, 4.0] {
            let interp = ScatteredDataInterpolator::new(
                &source,
                &target,
                sigma,
                &SolverConfig::default(),
            )
            .unwrap();
            let row = interp.kernel_row(&query).unwrap();
            let ratio = row[1] / row[0];
            assert!(ratio > last_ratio);
            last_ratio = ratio;
        }
    }

    #[test]
    fn test_far_query_decays_to_zero() {
        let source = vec![vec![0.0], vec![1.0]];
        let target = vec![vec![5.0], vec![-5.0]];
        let interp =
            ScatteredDataInterpolator::new(&source, &target, 1.0, &SolverConfig::default())
                .unwrap();

        let out = interp.interpolate(&[100.0]).unwrap();
        assert!(out[0].abs() < 1e-12);
    }

    #[test]
    fn test_interpolate_many() {
        let source = vec![vec![0.0], vec![1.0]];
        let target = vec![vec![0.0], vec![1.0]];
        let interp =
            ScatteredDataInterpolator::new(&source, &target, 1.0, &SolverConfig::default())
                .unwrap();

        let out = interp.interpolate_many(&source).unwrap();
        assert_eq!(out.len(), 2);
        assert_relative_eq!(out[1][0], 1.0, epsilon = 1e-10);

        assert!(interp.interpolate_many(&[vec![0.0], vec![]]).is_err());
    }

    #[test]
    fn test_kernel_matrix_properties() {
        let source = vec![vec![0.0, 1.0], vec![2.0, -1.0], vec![0.5, 0.5]];
        let a = kernel_matrix(&source, kernels::gaussian, 1.0);
        for i in 0..3 {
            assert_eq!(a[(i, i)], 1.0);
            for j in 0..3 {
                assert_eq!(a[(i, j)], a[(j, i)]);
            }
        }
    }
}
