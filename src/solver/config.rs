//! Solver Configuration
//!
//! Configuration structures for the two search strategies, their named presets, and the
//! JSON persistence trait shared by every serialisable configuration in the crate.
use crate::constants::{
    ADAM_LEARNING_RATE, COEFFICIENT_SCALE, DUAL_BOUND_SCALE, GAME_ITERATION_LIMIT, GAP_TOLERANCE_SCALE,
    GRADIENT_ITERATION_LIMIT, LOG_ITERATIONS, SEPARABLE_NU, SIZE_PENALTY, SIZE_SCALED_NU,
};
use crate::errors::AuditError;
use crate::learner::AssignmentPolicy;
use crate::regression::Oracle;
use crate::utils::validate_positive_float_parameter;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fs;
use std::path::Path;

fn default_nu() -> f64 {
    SEPARABLE_NU
}
fn default_bound_scale() -> f64 {
    DUAL_BOUND_SCALE
}
fn default_tolerance_scale() -> f64 {
    GAP_TOLERANCE_SCALE
}
fn default_game_iteration_limit() -> usize {
    GAME_ITERATION_LIMIT
}
fn default_gradient_iteration_limit() -> usize {
    GRADIENT_ITERATION_LIMIT
}
fn default_log_iterations() -> usize {
    LOG_ITERATIONS
}
fn default_ridge() -> f64 {
    1.0
}
fn default_learning_rate() -> f64 {
    ADAM_LEARNING_RATE
}
fn default_size_penalty() -> f64 {
    SIZE_PENALTY
}
fn default_coefficient_scale() -> f64 {
    COEFFICIENT_SCALE
}

/// Configuration for the [`GameSolver`](crate::solver::GameSolver).
#[derive(Clone, Serialize, Deserialize)]
pub struct GameConfig {
    /// Step size of the dual player's exponentiated-gradient update.
    #[serde(default = "default_nu")]
    pub nu: f64,
    /// Multiplier cap `B`, as a multiple of the feature's mean absolute expressivity.
    #[serde(default = "default_bound_scale")]
    pub bound_scale: f64,
    /// Duality-gap tolerance `v`, as a multiple of the feature's mean absolute expressivity.
    #[serde(default = "default_tolerance_scale")]
    pub tolerance_scale: f64,
    /// Additionally multiply the tolerance by the number of rows.
    #[serde(default)]
    pub scale_tolerance_by_rows: bool,
    /// Hard cap on game iterations.
    #[serde(default = "default_game_iteration_limit")]
    pub iteration_limit: usize,
    /// Logging frequency (every N iterations, 0 disables).
    #[serde(default = "default_log_iterations")]
    pub log_iterations: usize,
    /// Regression oracle behind the best-response learner.
    #[serde(default)]
    pub oracle: Oracle,
    /// Turning predicted costs into memberships.
    #[serde(default)]
    pub policy: AssignmentPolicy,
}

impl Default for GameConfig {
    fn default() -> Self {
        GameConfig::locally_separable()
    }
}

impl GameConfig {
    /// `nu = 1e-5`, tolerance `0.01 * exp_order`.
    pub fn locally_separable() -> Self {
        GameConfig {
            nu: SEPARABLE_NU,
            bound_scale: DUAL_BOUND_SCALE,
            tolerance_scale: GAP_TOLERANCE_SCALE,
            scale_tolerance_by_rows: false,
            iteration_limit: GAME_ITERATION_LIMIT,
            log_iterations: LOG_ITERATIONS,
            oracle: Oracle::default(),
            policy: AssignmentPolicy::Hard,
        }
    }

    /// `nu = 2e-6`, tolerance `0.01 * exp_order * rows`.
    pub fn size_scaled() -> Self {
        GameConfig {
            nu: SIZE_SCALED_NU,
            scale_tolerance_by_rows: true,
            ..GameConfig::locally_separable()
        }
    }

    /// Multiplier cap for a feature with the given mean absolute expressivity.
    pub fn bound(&self, exp_order: f64) -> f64 {
        self.bound_scale * exp_order
    }

    /// Duality-gap tolerance for a feature over `rows` rows.
    pub fn tolerance(&self, exp_order: f64, rows: usize) -> f64 {
        let v = self.tolerance_scale * exp_order;
        if self.scale_tolerance_by_rows {
            v * rows as f64
        } else {
            v
        }
    }

    pub fn validate(&self) -> Result<(), AuditError> {
        validate_positive_float_parameter(self.nu, "nu")?;
        validate_positive_float_parameter(self.bound_scale, "bound_scale")?;
        validate_positive_float_parameter(self.tolerance_scale, "tolerance_scale")?;
        if self.iteration_limit == 0 {
            return Err(AuditError::InvalidParameter(
                "iteration_limit".to_string(),
                "at least 1".to_string(),
                "0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration for the [`GradientSolver`](crate::solver::GradientSolver).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientConfig {
    /// Ridge term added to the diagonal of every weighted least-squares system.
    #[serde(default = "default_ridge")]
    pub ridge: f64,
    /// Adam step size.
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    /// Fixed number of optimiser steps.
    #[serde(default = "default_gradient_iteration_limit")]
    pub iteration_limit: usize,
    /// Weight of the size-window violation in the loss.
    #[serde(default = "default_size_penalty")]
    pub size_penalty: f64,
    /// Weight of the signed feature coefficient in the loss.
    #[serde(default = "default_coefficient_scale")]
    pub coefficient_scale: f64,
    /// Seed for the initial parameters.
    #[serde(default)]
    pub seed: u64,
    /// Logging frequency (every N iterations, 0 disables).
    #[serde(default = "default_log_iterations")]
    pub log_iterations: usize,
}

impl Default for GradientConfig {
    fn default() -> Self {
        GradientConfig {
            ridge: default_ridge(),
            learning_rate: ADAM_LEARNING_RATE,
            iteration_limit: GRADIENT_ITERATION_LIMIT,
            size_penalty: SIZE_PENALTY,
            coefficient_scale: COEFFICIENT_SCALE,
            seed: 0,
            log_iterations: LOG_ITERATIONS,
        }
    }
}

impl GradientConfig {
    pub fn validate(&self) -> Result<(), AuditError> {
        validate_positive_float_parameter(self.ridge, "ridge")?;
        validate_positive_float_parameter(self.learning_rate, "learning_rate")?;
        validate_positive_float_parameter(self.size_penalty, "size_penalty")?;
        validate_positive_float_parameter(self.coefficient_scale, "coefficient_scale")
    }
}

/// JSON persistence for configurations and reports.
pub trait JsonIO: Serialize + DeserializeOwned + Sized {
    /// Save as a json object to a file.
    ///
    /// * `path` - Path to save to.
    fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), AuditError> {
        fs::write(path, self.json_dump()?).map_err(|e| AuditError::UnableToWrite(e.to_string()))
    }

    /// Dump as a json string.
    fn json_dump(&self) -> Result<String, AuditError> {
        serde_json::to_string(self).map_err(|e| AuditError::UnableToWrite(e.to_string()))
    }

    /// Load from a json string.
    fn from_json(json_str: &str) -> Result<Self, AuditError> {
        serde_json::from_str::<Self>(json_str).map_err(|e| AuditError::UnableToRead(e.to_string()))
    }

    /// Load from a path to a json object.
    ///
    /// * `path` - Path to load from.
    fn load<P: AsRef<Path>>(path: P) -> Result<Self, AuditError> {
        let json_str = fs::read_to_string(path).map_err(|e| AuditError::UnableToRead(e.to_string()))?;
        Self::from_json(&json_str)
    }
}

impl JsonIO for GameConfig {}
impl JsonIO for GradientConfig {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_presets_differ_in_tolerance() {
        let a = GameConfig::locally_separable();
        let b = GameConfig::size_scaled();
        assert_eq!(a.nu, 0.00001);
        assert_eq!(b.nu, 0.000002);
        assert!((a.tolerance(2.0, 50) - 0.02).abs() < 1e-12);
        assert!((b.tolerance(2.0, 50) - 1.0).abs() < 1e-12);
        assert_eq!(a.bound(2.0), 20_000.0);
        assert_eq!(a.iteration_limit, 800);
    }

    #[test]
    fn test_validate() {
        assert!(GameConfig::default().validate().is_ok());
        let bad = GameConfig {
            iteration_limit: 0,
            ..GameConfig::default()
        };
        assert!(bad.validate().is_err());
        let bad_nu = GameConfig {
            nu: -1.0,
            ..GameConfig::default()
        };
        assert!(bad_nu.validate().is_err());
        assert!(GradientConfig::default().validate().is_ok());
    }

    #[test]
    fn test_game_config_defaults_from_json() {
        let config = GameConfig::from_json("{}").unwrap();
        assert_eq!(config.nu, SEPARABLE_NU);
        assert_eq!(config.iteration_limit, GAME_ITERATION_LIMIT);
        assert!(matches!(config.oracle, Oracle::LinearRegression { ridge: None }));

        let config = GameConfig::from_json(r#"{"nu": 0.001, "oracle": {"LinearRegression": {"ridge": 0.5}}}"#).unwrap();
        assert_eq!(config.nu, 0.001);
        assert!(matches!(config.oracle, Oracle::LinearRegression { ridge: Some(r) } if r == 0.5));
    }

    #[test]
    fn test_gradient_config_file_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gradient.json");
        let config = GradientConfig {
            ridge: 0.25,
            seed: 9,
            ..GradientConfig::default()
        };
        config.save(&path).unwrap();
        let loaded = GradientConfig::load(&path).unwrap();
        assert_eq!(loaded.ridge, 0.25);
        assert_eq!(loaded.seed, 9);
        assert_eq!(loaded.iteration_limit, GRADIENT_ITERATION_LIMIT);
    }
}
