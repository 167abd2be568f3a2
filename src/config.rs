use crate::error::{MResult, MappingError};
use crate::types::{DEFAULT_RCOND_TOLERANCE, DEFAULT_SIGMA};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Least-squares strategy for the kernel system `A * W = B`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SolveMethod {
    /// Pseudo-inverse through the SVD of A
    #[default]
    Svd,
    /// Literal `(A^T A)^-1 A^T B`
    NormalEquations,
}

/// Solver configuration
///
/// Every field has a default, so a config file only needs the keys it
/// overrides:
///
/// ```json
/// { "sigma": 0.5, "method": "normal_equations" }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Kernel bandwidth for new sessions
    pub sigma: f64,
    pub method: SolveMethod,
    /// Minimum `sigma_min / sigma_max` of the kernel matrix before it is
    /// treated as singular (of `A^T A` under `NormalEquations`)
    pub rcond_tolerance: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            sigma: DEFAULT_SIGMA,
            method: SolveMethod::default(),
            rcond_tolerance: DEFAULT_RCOND_TOLERANCE,
        }
    }
}

impl SolverConfig {
    pub fn from_json(json: &str) -> MResult<Self> {
        let config: SolverConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> MResult<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> MResult<()> {
        validate_sigma(self.sigma)?;
        if !self.rcond_tolerance.is_finite() || self.rcond_tolerance < 0.0 {
            return Err(MappingError::InvalidInput(format!(
                "rcond_tolerance must be a non-negative finite number, got {}",
                self.rcond_tolerance
            )));
        }
        Ok(())
    }
}

/// Kernel bandwidth must be a positive finite number
pub fn validate_sigma(sigma: f64) -> MResult<()> {
    if sigma.is_finite() && sigma > 0.0 {
        Ok(())
    } else {
        Err(MappingError::InvalidInput(format!(
            "sigma must be positive and finite, got {}",
            sigma
        )))
    }
}
