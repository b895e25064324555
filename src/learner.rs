//! Learner
//!
//! Best-response oracle for the primal player: reduces a cost-sensitive classification
//! problem to two regressions, one per label, over the sensitive-feature projection.
use crate::data::Matrix;
use crate::errors::AuditError;
use crate::regression::{RegressionOracle, Regressor};
use crate::utils::{sigmoid, validate_length, validate_positive_float_parameter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How predicted label costs become subgroup membership.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum AssignmentPolicy {
    /// Membership is 1 when label 1 is predicted to be strictly cheaper.
    #[default]
    Hard,
    /// Membership is `sigmoid((cost0 - cost1) / temperature)`.
    Soft { temperature: f64 },
}

/// Subgroup-indicator classifier produced by one best response.
#[derive(Debug, Clone)]
pub struct CscModel {
    reg0: Arc<dyn Regressor>,
    reg1: Arc<dyn Regressor>,
    policy: AssignmentPolicy,
}

impl CscModel {
    /// Assign rows of the sensitive projection `x`.
    ///
    /// Returns the membership vector and the predicted cost of that assignment.
    pub fn predict(&self, x: &Matrix<f64>) -> (Vec<f64>, f64) {
        let c0 = self.reg0.predict(x);
        let c1 = self.reg1.predict(x);
        let mut cost = 0.0;
        let assignments = c0
            .iter()
            .zip(&c1)
            .map(|(a, b)| {
                let p = match self.policy {
                    AssignmentPolicy::Hard => {
                        if a > b {
                            1.0
                        } else {
                            0.0
                        }
                    }
                    AssignmentPolicy::Soft { temperature } => sigmoid((a - b) / temperature),
                };
                cost += p * b + (1.0 - p) * a;
                p
            })
            .collect();
        (assignments, cost)
    }

    /// Coefficients of the label-1 cost regression, one per sensitive column.
    pub fn coefficients(&self) -> &[f64] {
        self.reg1.coefficients()
    }

    pub fn intercept(&self) -> f64 {
        self.reg1.intercept()
    }
}

/// Stateless apart from the data it refits on.
pub struct Learner<'a> {
    x: Matrix<'a, f64>,
    oracle: &'a dyn RegressionOracle,
    policy: AssignmentPolicy,
}

impl<'a> Learner<'a> {
    /// * `x` - Sensitive-feature projection of the training rows.
    /// * `oracle` - Regression oracle refit on every best response.
    pub fn new(x: Matrix<'a, f64>, oracle: &'a dyn RegressionOracle) -> Self {
        Learner {
            x,
            oracle,
            policy: AssignmentPolicy::Hard,
        }
    }

    pub fn set_policy(mut self, policy: AssignmentPolicy) -> Result<Self, AuditError> {
        if let AssignmentPolicy::Soft { temperature } = policy {
            validate_positive_float_parameter(temperature, "temperature")?;
            if temperature == 0.0 {
                return Err(AuditError::InvalidParameter(
                    "temperature".to_string(),
                    "a strictly positive value".to_string(),
                    temperature.to_string(),
                ));
            }
        }
        self.policy = policy;
        Ok(self)
    }

    /// Fit a classifier that approximately minimises `sum(costs0[i] * (1 - h_i) + costs1[i] * h_i)`.
    pub fn best_response(&self, costs0: &[f64], costs1: &[f64]) -> Result<CscModel, AuditError> {
        validate_length("costs0", self.x.rows, costs0.len())?;
        validate_length("costs1", self.x.rows, costs1.len())?;
        let reg0 = self.oracle.fit(&self.x, costs0)?;
        let reg1 = self.oracle.fit(&self.x, costs1)?;
        Ok(CscModel {
            reg0,
            reg1,
            policy: self.policy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regression::LinearRegression;
    use approx::assert_relative_eq;

    fn binary_column() -> Vec<f64> {
        (0..10).map(|i| (i % 2) as f64).collect()
    }

    #[test]
    fn test_best_response_picks_cheap_rows() {
        let s = binary_column();
        let x = Matrix::new(&s, 10, 1);
        let oracle = LinearRegression::default();
        let learner = Learner::new(x, &oracle);
        // Label 1 is cheap exactly where s == 1.
        let costs1: Vec<f64> = s.iter().map(|v| if *v == 1.0 { -1.0 } else { 1.0 }).collect();
        let model = learner.best_response(&[0.0; 10], &costs1).unwrap();
        let (assigns, cost) = model.predict(&x);
        assert_eq!(assigns, s);
        assert_relative_eq!(cost, -5.0, epsilon = 1e-9);
        assert_relative_eq!(model.coefficients()[0], -2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_soft_policy_is_fractional() {
        let s = binary_column();
        let x = Matrix::new(&s, 10, 1);
        let oracle = LinearRegression::default();
        let learner = Learner::new(x, &oracle)
            .set_policy(AssignmentPolicy::Soft { temperature: 1.0 })
            .unwrap();
        let costs1: Vec<f64> = s.iter().map(|v| if *v == 1.0 { -1.0 } else { 1.0 }).collect();
        let (assigns, _) = learner.best_response(&[0.0; 10], &costs1).unwrap().predict(&x);
        assert!(assigns.iter().all(|a| *a > 0.0 && *a < 1.0));
        assert!(assigns[1] > 0.5 && assigns[0] < 0.5);
    }

    #[test]
    fn test_cost_length_checked() {
        let s = binary_column();
        let x = Matrix::new(&s, 10, 1);
        let oracle = LinearRegression::default();
        let learner = Learner::new(x, &oracle);
        assert!(learner.best_response(&[0.0; 3], &[0.0; 10]).is_err());
        assert!(Learner::new(x, &oracle)
            .set_policy(AssignmentPolicy::Soft { temperature: 0.0 })
            .is_err());
    }
}
