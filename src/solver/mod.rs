//! Solver
//!
//! Strategies that search, for one feature, for the subgroup-indicator classifier whose
//! members push that feature's expressivity furthest in one direction while holding an
//! alpha fraction of the rows. [`game::GameSolver`] plays no-regret dynamics between a
//! cost-sensitive learner and a Lagrange-multiplier player; [`gradient::GradientSolver`]
//! descends a penalised weighted-least-squares surrogate. Both implement
//! [`SubgroupSearch`] so the orchestrator can swap them freely.
use crate::constants::WINDOW_EPS;
use crate::data::{project_columns, Matrix};
use crate::errors::AuditError;
use crate::expressivity::{ExpressivityProvider, Split};
use crate::utils::{items_to_strings, validate_float_parameter};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};
use std::str::FromStr;

pub mod config;
pub mod game;
pub mod gradient;

mod tests;

pub use config::{GameConfig, GradientConfig, JsonIO};
pub use game::{ConstrainedSolver, GameSolver};
pub use gradient::GradientSolver;

/// Which extreme of the feature's expressivity to search for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Minimize,
    Maximize,
}

impl Direction {
    /// +1 when minimising, -1 when maximising: the factor applied to expressivity in the costs.
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Minimize => 1.0,
            Direction::Maximize => -1.0,
        }
    }

    /// Is `candidate` strictly more extreme than `incumbent` in this direction?
    pub fn improves(&self, candidate: f64, incumbent: f64) -> bool {
        match self {
            Direction::Minimize => candidate < incumbent,
            Direction::Maximize => candidate > incumbent,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Direction::Minimize => write!(f, "minimize"),
            Direction::Maximize => write!(f, "maximize"),
        }
    }
}

impl FromStr for Direction {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "minimize" => Ok(Direction::Minimize),
            "maximize" => Ok(Direction::Maximize),
            _ => Err(AuditError::ParseString(
                s.to_string(),
                "Direction".to_string(),
                items_to_strings(vec!["minimize", "maximize"]),
            )),
        }
    }
}

/// Admissible range `[low, high]` for the fraction of rows in the subgroup.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlphaWindow {
    pub low: f64,
    pub high: f64,
}

impl AlphaWindow {
    pub fn new(low: f64, high: f64) -> Result<Self, AuditError> {
        let window = AlphaWindow { low, high };
        window.validate()?;
        Ok(window)
    }

    /// The whole unit interval: no size constraint.
    pub fn unconstrained() -> Self {
        AlphaWindow { low: 0.0, high: 1.0 }
    }

    pub fn validate(&self) -> Result<(), AuditError> {
        validate_float_parameter(self.low, 0.0, 1.0, "alpha low")?;
        validate_float_parameter(self.high, self.low, 1.0, "alpha high")
    }

    /// Inclusive membership, up to floating point slack.
    pub fn contains(&self, size: f64) -> bool {
        size >= self.low - WINDOW_EPS && size <= self.high + WINDOW_EPS
    }

    /// Exclusive membership.
    pub fn strictly_contains(&self, size: f64) -> bool {
        size - self.low > 0.0 && self.high - size > 0.0
    }

    /// How far `size` lies outside the window; zero inside.
    pub fn distance(&self, size: f64) -> f64 {
        (self.low - size).max(0.0) + (size - self.high).max(0.0)
    }
}

impl fmt::Display for AlphaWindow {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}, {}]", self.low, self.high)
    }
}

/// Why a search stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    /// Duality gap fell below the tolerance.
    Converged,
    /// The latest play met the size window with no constraint pressure left.
    Feasible,
    /// The iteration cap was hit before either criterion held.
    IterationLimit,
    /// A fixed iteration budget ran to completion.
    Finished,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Termination::Converged => "converged",
            Termination::Feasible => "feasible",
            Termination::IterationLimit => "iteration_limit",
            Termination::Finished => "finished",
        };
        write!(f, "{}", s)
    }
}

/// Membership function over the sensitive-feature projection.
pub trait SubgroupIndicator: Send + Sync + Debug {
    /// Membership of every row of `x_sensitive`, in `[0, 1]`.
    fn assign(&self, x_sensitive: &Matrix<f64>) -> Vec<f64>;
    /// One coefficient per sensitive column.
    fn coefficients(&self) -> Vec<f64>;
    fn intercept(&self) -> f64;
}

/// One split of the audited data as seen by a strategy.
#[derive(Clone, Copy)]
pub struct SplitView<'a> {
    pub split: Split,
    /// Feature matrix, target excluded.
    pub x: Matrix<'a, f64>,
    pub y: &'a [f64],
    pub expressivity: Option<&'a dyn ExpressivityProvider>,
}

impl<'a> SplitView<'a> {
    pub fn new(split: Split, x: Matrix<'a, f64>, y: &'a [f64]) -> Self {
        SplitView {
            split,
            x,
            y,
            expressivity: None,
        }
    }

    pub fn with_expressivity(mut self, provider: &'a dyn ExpressivityProvider) -> Self {
        self.expressivity = Some(provider);
        self
    }

    /// The expressivity provider, or an error naming the split that lacks one.
    pub fn provider(&self) -> Result<&'a dyn ExpressivityProvider, AuditError> {
        self.expressivity
            .ok_or_else(|| AuditError::MissingExpressivity(self.split.to_string()))
    }
}

/// Result of one (feature, direction) search.
#[derive(Debug)]
pub struct SearchOutcome {
    pub model: Box<dyn SubgroupIndicator>,
    pub assignments: Vec<f64>,
    /// Realised objective value `F(S)` of the subgroup.
    pub value: f64,
    /// Mean membership.
    pub size: f64,
    /// Whether `size` satisfies the strategy's window test.
    pub valid: bool,
    pub termination: Termination,
    pub iterations: usize,
    /// Per-iteration subgroup sizes, for strategies that trace them.
    pub size_record: Option<Vec<f64>>,
    /// Per-iteration objective values, for strategies that trace them.
    pub value_record: Option<Vec<f64>>,
}

/// Interchangeable subgroup search strategy.
pub trait SubgroupSearch: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// `F(D)`: the feature's value over the whole split.
    fn full_value(&self, split: &SplitView, feature: usize) -> Result<f64, AuditError>;

    /// `F(S)` for a given membership vector.
    fn subgroup_value(&self, split: &SplitView, feature: usize, assignments: &[f64]) -> Result<f64, AuditError>;

    /// Search for the most extreme subgroup in `direction` whose size respects `window`.
    fn search_subgroup(
        &self,
        split: &SplitView,
        feature: usize,
        sensitive: &[usize],
        window: AlphaWindow,
        direction: Direction,
    ) -> Result<SearchOutcome, AuditError>;

    /// Whether report rows carry percent change and per-iteration records.
    fn reports_trace(&self) -> bool {
        false
    }

    /// Apply a fitted indicator to another split, returning memberships and `F(S)`.
    fn apply(
        &self,
        model: &dyn SubgroupIndicator,
        split: &SplitView,
        feature: usize,
        sensitive: &[usize],
    ) -> Result<(Vec<f64>, f64), AuditError> {
        let projected = project_columns(&split.x, sensitive)?;
        let assignments = model.assign(&projected.view());
        let value = self.subgroup_value(split, feature, &assignments)?;
        Ok((assignments, value))
    }
}
