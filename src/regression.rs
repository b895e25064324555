//! Regression
//!
//! The real-valued regression oracle the best-response learner refits on every call.
//! Any type implementing [`RegressionOracle`] can be plugged in; the default is
//! ordinary least squares with an optional ridge penalty.
use crate::data::Matrix;
use crate::errors::AuditError;
use crate::utils::validate_length;
use nalgebra::{Cholesky, DMatrix, DVector, Dyn};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;

/// Relative pivot size below which a Gram matrix is treated as singular.
const PIVOT_TOLERANCE: f64 = 1e-12;
/// Singular values below this fraction of the largest are dropped.
const RANK_TOLERANCE: f64 = 1e-10;

/// A fitted real-valued predictor.
pub trait Regressor: Send + Sync + Debug {
    fn predict(&self, x: &Matrix<f64>) -> Vec<f64>;
    /// Slope coefficients, one per input column.
    fn coefficients(&self) -> &[f64];
    fn intercept(&self) -> f64;
}

/// Fits a fresh [`Regressor`] for every call; holds no state between fits.
pub trait RegressionOracle: Send + Sync {
    fn fit(&self, x: &Matrix<f64>, y: &[f64]) -> Result<Arc<dyn Regressor>, AuditError>;
}

/// Least squares, optionally with an intercept and an L2 penalty on the slopes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LinearRegression {
    pub fit_intercept: bool,
    pub ridge: f64,
}

impl Default for LinearRegression {
    fn default() -> Self {
        LinearRegression {
            fit_intercept: true,
            ridge: 0.0,
        }
    }
}

/// Coefficients of a fitted [`LinearRegression`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearModel {
    pub coef: Vec<f64>,
    pub intercept: f64,
}

impl Regressor for LinearModel {
    fn predict(&self, x: &Matrix<f64>) -> Vec<f64> {
        let mut yhat = vec![self.intercept; x.rows];
        for (j, b) in self.coef.iter().enumerate().take(x.cols) {
            yhat.iter_mut().zip(x.get_col(j)).for_each(|(p, v)| *p += b * v);
        }
        yhat
    }

    fn coefficients(&self) -> &[f64] {
        &self.coef
    }

    fn intercept(&self) -> f64 {
        self.intercept
    }
}

impl LinearRegression {
    /// Least squares on the (optionally centred) design.
    ///
    /// Without a ridge penalty this is the minimum-norm solution, so collinear columns
    /// are accepted; with one, the penalised normal equations are solved by Cholesky.
    pub fn fit_linear(&self, x: &Matrix<f64>, y: &[f64]) -> Result<LinearModel, AuditError> {
        validate_length("regression target", x.rows, y.len())?;
        let n = x.rows;
        let p = x.cols;
        if n == 0 {
            return Err(AuditError::EmptyDataset("regression design has no rows".to_string()));
        }

        let (x_means, y_mean) = if self.fit_intercept {
            let means: Vec<f64> = (0..p).map(|j| x.get_col(j).iter().sum::<f64>() / n as f64).collect();
            (means, y.iter().sum::<f64>() / n as f64)
        } else {
            (vec![0.0; p], 0.0)
        };

        if p == 0 {
            return Ok(LinearModel {
                coef: Vec::new(),
                intercept: y_mean,
            });
        }

        let centred = DMatrix::from_fn(n, p, |i, j| x.get_col(j)[i] - x_means[j]);
        let target = DVector::from_iterator(n, y.iter().map(|v| v - y_mean));
        if !centred.iter().chain(target.iter()).all(|v| v.is_finite()) {
            return Err(AuditError::SingularMatrix("least squares with non-finite input".to_string()));
        }

        let coef = if self.ridge > 0.0 {
            let mut gram = centred.transpose() * &centred;
            for j in 0..p {
                gram[(j, j)] += self.ridge;
            }
            let rhs = centred.transpose() * target;
            solve_spd(gram, rhs, "ridge normal equations")?
        } else {
            solve_min_norm(centred, &target)?
        };

        let intercept = if self.fit_intercept {
            y_mean - coef.iter().zip(&x_means).map(|(b, m)| b * m).sum::<f64>()
        } else {
            0.0
        };
        Ok(LinearModel {
            coef: coef.iter().copied().collect(),
            intercept,
        })
    }
}

impl RegressionOracle for LinearRegression {
    fn fit(&self, x: &Matrix<f64>, y: &[f64]) -> Result<Arc<dyn Regressor>, AuditError> {
        Ok(Arc::new(self.fit_linear(x, y)?))
    }
}

/// Cholesky factorisation of a symmetric positive definite matrix.
///
/// Fails with [`AuditError::SingularMatrix`] when the factorisation breaks down or a
/// pivot vanishes relative to the largest diagonal entry.
pub fn factor_spd(a: DMatrix<f64>, context: &str) -> Result<Cholesky<f64, Dyn>, AuditError> {
    let max_diag = a.diagonal().iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    let chol = a
        .cholesky()
        .ok_or_else(|| AuditError::SingularMatrix(context.to_string()))?;
    let min_pivot = chol.l_dirty().diagonal().iter().fold(f64::INFINITY, |m, v| m.min(v * v));
    if !(min_pivot > max_diag * PIVOT_TOLERANCE) {
        return Err(AuditError::SingularMatrix(context.to_string()));
    }
    Ok(chol)
}

/// Minimum-norm least-squares solution of `a * z = b`.
///
/// Singular values below `RANK_TOLERANCE * sigma_max` are treated as zero, so collinear
/// designs (a full set of one-hot columns, say) still get a unique answer.
pub fn solve_min_norm(a: DMatrix<f64>, b: &DVector<f64>) -> Result<DVector<f64>, AuditError> {
    let svd = a.svd(true, true);
    let sigma_max = svd.singular_values.iter().fold(0.0_f64, |m, v| m.max(*v));
    svd.solve(b, sigma_max * RANK_TOLERANCE)
        .map_err(|e| AuditError::SingularMatrix(format!("least squares ({})", e)))
}

/// Solve `a * z = b` for a symmetric positive definite `a`.
pub fn solve_spd(a: DMatrix<f64>, b: DVector<f64>, context: &str) -> Result<DVector<f64>, AuditError> {
    Ok(factor_spd(a, context)?.solve(&b))
}

/// Choice of regression oracle.
#[derive(Serialize, Deserialize, Clone)]
pub enum Oracle {
    LinearRegression {
        ridge: Option<f64>,
    },
    #[serde(skip)]
    Custom(Arc<dyn RegressionOracle>),
}

impl Default for Oracle {
    fn default() -> Self {
        Oracle::LinearRegression { ridge: None }
    }
}

impl Oracle {
    pub fn new_custom<T>(oracle: T) -> Self
    where
        T: RegressionOracle + 'static,
    {
        Oracle::Custom(Arc::new(oracle))
    }
}

impl RegressionOracle for Oracle {
    fn fit(&self, x: &Matrix<f64>, y: &[f64]) -> Result<Arc<dyn Regressor>, AuditError> {
        match self {
            Oracle::LinearRegression { ridge } => LinearRegression {
                fit_intercept: true,
                ridge: ridge.unwrap_or(0.0),
            }
            .fit(x, y),
            Oracle::Custom(arc) => arc.fit(x, y),
        }
    }
}
