//! Gradient Solver
//!
//! Subgroup search by direct descent on a smooth surrogate. A logistic membership over
//! the sensitive columns weights a ridge least-squares fit of the target on every
//! feature, and the audited feature's weighted coefficient is pushed up or down while a
//! large penalty keeps the mean membership inside the size window.
use crate::data::{DenseMatrix, Matrix};
use crate::errors::AuditError;
use crate::optim::Adam;
use crate::regression::factor_spd;
use crate::solver::config::GradientConfig;
use crate::solver::{AlphaWindow, Direction, SearchOutcome, SplitView, SubgroupIndicator, SubgroupSearch, Termination};
use crate::utils::{mean, sigmoid, validate_length};
use log::{debug, info};
use nalgebra::{Cholesky, DMatrix, DVector, Dyn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

/// Logistic membership `sigmoid(x_s . weights + intercept)` over the sensitive columns.
#[derive(Debug, Clone)]
pub struct LogisticIndicator {
    pub weights: Vec<f64>,
    pub intercept: f64,
}

impl SubgroupIndicator for LogisticIndicator {
    fn assign(&self, x_sensitive: &Matrix<f64>) -> Vec<f64> {
        (0..x_sensitive.rows)
            .map(|i| {
                let z = x_sensitive
                    .get_row_iter(i)
                    .zip(&self.weights)
                    .map(|(x, w)| x * w)
                    .sum::<f64>();
                sigmoid(z + self.intercept)
            })
            .collect()
    }

    fn coefficients(&self) -> Vec<f64> {
        self.weights.clone()
    }

    fn intercept(&self) -> f64 {
        self.intercept
    }
}

/// Ridge-regularised weighted least squares of `y` on `x`, without an intercept.
pub struct WeightedLeastSquares {
    x: DMatrix<f64>,
    y: DVector<f64>,
    ridge: f64,
}

/// Fitted coefficients together with the factorised system they solve.
pub struct WlsFit {
    pub beta: DVector<f64>,
    system: Cholesky<f64, Dyn>,
}

impl WlsFit {
    /// `A^-1 v` for the weighted Gram matrix `A` of this fit.
    pub fn solve(&self, v: &DVector<f64>) -> DVector<f64> {
        self.system.solve(v)
    }
}

impl WeightedLeastSquares {
    pub fn new(x: &Matrix<f64>, y: &[f64], ridge: f64) -> Result<Self, AuditError> {
        validate_length("regression target", x.rows, y.len())?;
        if x.rows == 0 {
            return Err(AuditError::EmptyDataset("regression design has no rows".to_string()));
        }
        Ok(WeightedLeastSquares {
            x: DMatrix::from_column_slice(x.rows, x.cols, &x.data[..x.rows * x.cols]),
            y: DVector::from_column_slice(y),
            ridge,
        })
    }

    pub fn rows(&self) -> usize {
        self.x.nrows()
    }

    pub fn cols(&self) -> usize {
        self.x.ncols()
    }

    /// Solve `(X' W X + ridge I) beta = X' W y`.
    pub fn fit(&self, weights: &[f64]) -> Result<WlsFit, AuditError> {
        validate_length("weights", self.rows(), weights.len())?;
        let mut weighted = self.x.clone();
        for (mut row, w) in weighted.row_iter_mut().zip(weights) {
            row *= *w;
        }
        let mut gram = weighted.transpose() * &self.x;
        for j in 0..self.cols() {
            gram[(j, j)] += self.ridge;
        }
        let rhs = weighted.transpose() * &self.y;
        let system = factor_spd(gram, "weighted least-squares system")?;
        let beta = system.solve(&rhs);
        Ok(WlsFit { beta, system })
    }

    /// Weighted coefficient of one column.
    pub fn coefficient(&self, weights: &[f64], feature: usize) -> Result<f64, AuditError> {
        if feature >= self.cols() {
            return Err(AuditError::DimensionMismatch(
                "feature index".to_string(),
                self.cols(),
                feature,
            ));
        }
        Ok(self.fit(weights)?.beta[feature])
    }

    /// `d beta_feature / d w_i = (u . x_i) r_i` with `u = A^-1 e_feature` and residual `r_i`.
    pub fn coefficient_gradient(&self, fit: &WlsFit, feature: usize) -> Vec<f64> {
        let mut e = DVector::zeros(self.cols());
        e[feature] = 1.0;
        let u = fit.solve(&e);
        let leverage = &self.x * u;
        let residuals = &self.y - &self.x * &fit.beta;
        leverage.iter().zip(residuals.iter()).map(|(l, r)| l * r).collect()
    }
}

/// Penalised surrogate objective for one (feature, direction) search.
struct SurrogateObjective<'a> {
    wls: WeightedLeastSquares,
    /// Feature matrix with a trailing column of ones.
    design: Matrix<'a, f64>,
    mask: Vec<f64>,
    feature: usize,
    window: AlphaWindow,
    sign: f64,
    size_penalty: f64,
    coefficient_scale: f64,
}

/// Loss, gradient, and the quantities traced per step.
struct Evaluation {
    loss: f64,
    gradient: Vec<f64>,
    size: f64,
    coefficient: f64,
}

impl<'a> SurrogateObjective<'a> {
    fn memberships(&self, theta: &[f64]) -> Vec<f64> {
        (0..self.design.rows)
            .map(|i| {
                let z = self
                    .design
                    .get_row_iter(i)
                    .zip(theta.iter().zip(&self.mask))
                    .map(|(x, (t, m))| x * t * m)
                    .sum::<f64>();
                sigmoid(z)
            })
            .collect()
    }

    fn evaluate(&self, theta: &[f64]) -> Result<Evaluation, AuditError> {
        let n = self.design.rows as f64;
        let w = self.memberships(theta);
        let size = mean(&w);
        let fit = self.wls.fit(&w)?;
        let coefficient = fit.beta[self.feature];

        let below = (self.window.low - size).max(0.0);
        let above = (size - self.window.high).max(0.0);
        let loss = self.size_penalty * (below + above) + self.coefficient_scale * self.sign * coefficient;

        let penalty_slope = if below > 0.0 {
            -self.size_penalty
        } else if above > 0.0 {
            self.size_penalty
        } else {
            0.0
        };
        let d_beta = self.wls.coefficient_gradient(&fit, self.feature);
        let d_z: Vec<f64> = w
            .iter()
            .zip(&d_beta)
            .map(|(wi, db)| (penalty_slope / n + self.coefficient_scale * self.sign * db) * wi * (1.0 - wi))
            .collect();

        let gradient = (0..self.design.cols)
            .map(|j| {
                if self.mask[j] == 0.0 {
                    0.0
                } else {
                    self.mask[j] * self.design.get_col(j).iter().zip(&d_z).map(|(x, d)| x * d).sum::<f64>()
                }
            })
            .collect();

        Ok(Evaluation {
            loss,
            gradient,
            size,
            coefficient,
        })
    }
}

/// Adam on the penalised weighted-least-squares surrogate.
#[derive(Debug, Clone, Default)]
pub struct GradientSolver {
    pub cfg: GradientConfig,
}

impl GradientSolver {
    pub fn new(cfg: GradientConfig) -> Self {
        GradientSolver { cfg }
    }

    /// Set the seed for the initial parameters.
    pub fn set_seed(mut self, seed: u64) -> Self {
        self.cfg.seed = seed;
        self
    }

    /// Set the number of optimiser steps.
    pub fn set_iteration_limit(mut self, iteration_limit: usize) -> Self {
        self.cfg.iteration_limit = iteration_limit;
        self
    }

    /// Set the ridge term of the weighted regressions.
    pub fn set_ridge(mut self, ridge: f64) -> Self {
        self.cfg.ridge = ridge;
        self
    }

    /// Set the logging frequency.
    pub fn set_log_iterations(mut self, log_iterations: usize) -> Self {
        self.cfg.log_iterations = log_iterations;
        self
    }
}

impl SubgroupSearch for GradientSolver {
    fn name(&self) -> &'static str {
        "gradient"
    }

    fn full_value(&self, split: &SplitView, feature: usize) -> Result<f64, AuditError> {
        let wls = WeightedLeastSquares::new(&split.x, split.y, self.cfg.ridge)?;
        wls.coefficient(&vec![1.0; wls.rows()], feature)
    }

    fn subgroup_value(&self, split: &SplitView, feature: usize, assignments: &[f64]) -> Result<f64, AuditError> {
        let wls = WeightedLeastSquares::new(&split.x, split.y, self.cfg.ridge)?;
        wls.coefficient(assignments, feature)
    }

    fn reports_trace(&self) -> bool {
        true
    }

    fn search_subgroup(
        &self,
        split: &SplitView,
        feature: usize,
        sensitive: &[usize],
        window: AlphaWindow,
        direction: Direction,
    ) -> Result<SearchOutcome, AuditError> {
        self.cfg.validate()?;
        window.validate()?;
        let d = split.x.cols;
        if feature >= d {
            return Err(AuditError::DimensionMismatch("feature index".to_string(), d, feature));
        }
        if let Some(bad) = sensitive.iter().find(|&&c| c >= d) {
            return Err(AuditError::DimensionMismatch("sensitive column".to_string(), d, *bad));
        }

        let design_owned = DenseMatrix::from_view(&split.x).with_intercept();
        let mut mask = vec![0.0; d + 1];
        sensitive.iter().for_each(|&c| mask[c] = 1.0);
        mask[d] = 1.0;

        let objective = SurrogateObjective {
            wls: WeightedLeastSquares::new(&split.x, split.y, self.cfg.ridge)?,
            design: design_owned.view(),
            mask,
            feature,
            window,
            sign: direction.sign(),
            size_penalty: self.cfg.size_penalty,
            coefficient_scale: self.cfg.coefficient_scale,
        };

        let mut rng = StdRng::seed_from_u64(self.cfg.seed);
        let mut theta: Vec<f64> = (0..=d).map(|_| rng.sample::<f64, _>(StandardNormal)).collect();
        let mut optimizer = Adam::default_params(d + 1, self.cfg.learning_rate);

        let mut size_record = Vec::with_capacity(self.cfg.iteration_limit);
        let mut value_record = Vec::with_capacity(self.cfg.iteration_limit);
        for iteration in 1..=self.cfg.iteration_limit {
            let eval = objective.evaluate(&theta)?;
            size_record.push(eval.size);
            value_record.push(eval.coefficient);
            if self.cfg.log_iterations > 0 && iteration % self.cfg.log_iterations == 0 {
                info!(
                    "iteration {0}, size: {1:.4}, coefficient: {2:.6}, loss: {3:.6}",
                    iteration, eval.size, eval.coefficient, eval.loss
                );
            }
            optimizer.step(&mut theta, &eval.gradient);
        }

        let model = LogisticIndicator {
            weights: sensitive.iter().map(|&c| theta[c]).collect(),
            intercept: theta[d],
        };
        let assignments = objective.memberships(&theta);
        let size = mean(&assignments);
        let value = objective.wls.coefficient(&assignments, feature)?;
        let valid = window.strictly_contains(size);
        debug!(
            "{} search on feature {} finished with size {:.4} (valid: {}).",
            direction, feature, size, valid
        );

        Ok(SearchOutcome {
            model: Box::new(model),
            assignments,
            value,
            size,
            valid,
            termination: Termination::Finished,
            iterations: self.cfg.iteration_limit,
            size_record: Some(size_record),
            value_record: Some(value_record),
        })
    }
}
