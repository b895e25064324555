//! Game Solver
//!
//! Constrained subgroup search as a two-player zero-sum game. The primal player answers
//! every multiplier pair with a cost-sensitive best response from the [`Learner`]; the
//! dual player moves the two size-constraint multipliers by exponentiated gradient on
//! the accumulated constraint violations. Play stops once the estimated duality gap
//! drops below tolerance, the latest play is feasible, or the iteration cap is reached.
use crate::data::{project_columns, Matrix};
use crate::errors::AuditError;
use crate::learner::{CscModel, Learner};
use crate::solver::config::GameConfig;
use crate::solver::{AlphaWindow, Direction, SearchOutcome, SplitView, SubgroupIndicator, SubgroupSearch, Termination};
use crate::utils::{mean, validate_length, weighted_sum};
use log::{debug, info, warn};
use std::time::Instant;

impl SubgroupIndicator for CscModel {
    fn assign(&self, x_sensitive: &Matrix<f64>) -> Vec<f64> {
        self.predict(x_sensitive).0
    }

    fn coefficients(&self) -> Vec<f64> {
        CscModel::coefficients(self).to_vec()
    }

    fn intercept(&self) -> f64 {
        CscModel::intercept(self)
    }
}

/// One primal move, kept in the solver's history.
#[derive(Debug, Clone)]
pub struct Play {
    pub model: CscModel,
    pub assignments: Vec<f64>,
    /// Assignment-weighted expressivity, unsigned.
    pub expressivity: f64,
    /// Mean membership.
    pub size: f64,
}

/// Mutable state of one (feature, direction) game.
///
/// Histories are append-only and indexed by iteration.
#[derive(Debug)]
pub struct ConstrainedSolver {
    scores: Vec<f64>,
    direction: Direction,
    window: AlphaWindow,
    bound: f64,
    nu: f64,
    thetas: [f64; 2],
    /// Latest duality-gap estimate.
    pub v_t: f64,
    lambda_history: Vec<[f64; 2]>,
    plays: Vec<Play>,
    gap_history: Vec<f64>,
    assignment_sum: Vec<f64>,
    lambda_sum: [f64; 2],
}

impl ConstrainedSolver {
    /// * `scores` - The audited feature's expressivity for every row.
    /// * `direction` - Whether the primal player minimises or maximises expressivity.
    /// * `window` - Admissible subgroup size.
    /// * `bound` - Multiplier cap `B`.
    /// * `nu` - Dual step size.
    pub fn new(scores: Vec<f64>, direction: Direction, window: AlphaWindow, bound: f64, nu: f64) -> Self {
        let n = scores.len();
        ConstrainedSolver {
            scores,
            direction,
            window,
            bound,
            nu,
            thetas: [0.0; 2],
            v_t: f64::INFINITY,
            lambda_history: Vec::new(),
            plays: Vec::new(),
            gap_history: Vec::new(),
            assignment_sum: vec![0.0; n],
            lambda_sum: [0.0; 2],
        }
    }

    pub fn rows(&self) -> usize {
        self.scores.len()
    }

    /// Exponentiated-gradient multipliers `B * exp(theta_k) / (1 + sum_j exp(theta_j))`.
    ///
    /// Appends the new pair to the lambda history and returns it.
    pub fn update_lambdas(&mut self) -> [f64; 2] {
        let shift = self.thetas[0].max(self.thetas[1]).max(0.0);
        let e0 = (self.thetas[0] - shift).exp();
        let e1 = (self.thetas[1] - shift).exp();
        let denom = (-shift).exp() + e0 + e1;
        let lambda = [
            (self.bound * e0 / denom).clamp(0.0, self.bound),
            (self.bound * e1 / denom).clamp(0.0, self.bound),
        ];
        self.lambda_history.push(lambda);
        self.lambda_sum[0] += lambda[0];
        self.lambda_sum[1] += lambda[1];
        lambda
    }

    /// Label-1 costs under `lambda`: `sign * e_i - lambda_0 + lambda_1`.
    pub fn costs(&self, lambda: &[f64; 2]) -> Vec<f64> {
        let sign = self.direction.sign();
        self.scores.iter().map(|e| sign * e - lambda[0] + lambda[1]).collect()
    }

    /// Constraint values `[low * n - sum(a), sum(a) - high * n]`; positive means violated.
    pub fn constraint_values(&self, assignments: &[f64]) -> [f64; 2] {
        let n = self.rows() as f64;
        let total: f64 = assignments.iter().sum();
        [self.window.low * n - total, total - self.window.high * n]
    }

    /// `(phi_s, phi_L)`: the too-small and too-large violations of an assignment.
    pub fn penalties(&self, assignments: &[f64]) -> (f64, f64) {
        let [g0, g1] = self.constraint_values(assignments);
        (g0.max(0.0), g1.max(0.0))
    }

    /// Signed expressivity plus multiplier-weighted constraint values.
    pub fn lagrangian(&self, assignments: &[f64], lambda: &[f64; 2]) -> f64 {
        let objective = self.direction.sign() * weighted_sum(assignments, &self.scores);
        let [g0, g1] = self.constraint_values(assignments);
        objective + lambda[0] * g0 + lambda[1] * g1
    }

    /// Dual best response: all of `B` on the most violated constraint, or nothing.
    pub fn best_lambda(&self, assignments: &[f64]) -> [f64; 2] {
        let [g0, g1] = self.constraint_values(assignments);
        if g0 <= 0.0 && g1 <= 0.0 {
            [0.0, 0.0]
        } else if g0 >= g1 {
            [self.bound, 0.0]
        } else {
            [0.0, self.bound]
        }
    }

    /// Accumulate the constraint values the dual player reacts to.
    ///
    /// The values enter as fractions of the row count, so one step moves the multipliers
    /// by at most about `nu * B` whatever the size of the data.
    pub fn update_thetas(&mut self, assignments: &[f64]) {
        let n = self.rows().max(1) as f64;
        let gamma = self.constraint_values(assignments);
        self.thetas[0] += self.nu * gamma[0] / n;
        self.thetas[1] += self.nu * gamma[1] / n;
    }

    /// Append a primal move to the history.
    pub fn record_play(&mut self, model: CscModel, assignments: Vec<f64>) -> &Play {
        self.assignment_sum
            .iter_mut()
            .zip(&assignments)
            .for_each(|(s, a)| *s += a);
        let expressivity = weighted_sum(&assignments, &self.scores);
        let size = mean(&assignments);
        self.plays.push(Play {
            model,
            assignments,
            expressivity,
            size,
        });
        &self.plays[self.plays.len() - 1]
    }

    /// Mean of all assignments played so far (the primal mixture).
    pub fn average_assignments(&self) -> Vec<f64> {
        let t = self.plays.len().max(1) as f64;
        self.assignment_sum.iter().map(|s| s / t).collect()
    }

    /// Mean of all multipliers played so far.
    pub fn average_lambda(&self) -> [f64; 2] {
        let t = self.lambda_history.len().max(1) as f64;
        [self.lambda_sum[0] / t, self.lambda_sum[1] / t]
    }

    pub fn set_gap(&mut self, v_t: f64) {
        self.v_t = v_t;
        self.gap_history.push(v_t);
    }

    pub fn plays(&self) -> &[Play] {
        &self.plays
    }

    pub fn lambda_history(&self) -> &[[f64; 2]] {
        &self.lambda_history
    }

    pub fn gap_history(&self) -> &[f64] {
        &self.gap_history
    }

    /// The play with the most extreme expressivity in `direction` among those whose size
    /// lies in the window, flagged `true`.
    ///
    /// When no play is in the window, the play closest to it is returned instead, flagged
    /// `false`; ties on distance go to the more extreme expressivity. `None` only for an
    /// empty history.
    pub fn get_best_valid_model(&self, direction: Direction) -> Option<(&Play, bool)> {
        let mut best: Option<&Play> = None;
        for play in self.plays.iter().filter(|p| self.window.contains(p.size)) {
            match best {
                Some(b) if !direction.improves(play.expressivity, b.expressivity) => {}
                _ => best = Some(play),
            }
        }
        if let Some(play) = best {
            return Some((play, true));
        }

        let mut nearest: Option<&Play> = None;
        for play in &self.plays {
            match nearest {
                None => nearest = Some(play),
                Some(b) => {
                    let (d, db) = (self.window.distance(play.size), self.window.distance(b.size));
                    if d < db || (d == db && direction.improves(play.expressivity, b.expressivity)) {
                        nearest = Some(play);
                    }
                }
            }
        }
        nearest.map(|p| (p, false))
    }
}

/// Everything a finished game reports.
#[derive(Debug)]
pub struct GameRun {
    pub model: CscModel,
    pub assignments: Vec<f64>,
    pub expressivity: f64,
    pub size: f64,
    pub valid: bool,
    pub termination: Termination,
    pub iterations: usize,
    pub gap_history: Vec<f64>,
}

/// No-regret game dynamics over cost-sensitive subgroup classifiers.
#[derive(Clone, Default)]
pub struct GameSolver {
    pub cfg: GameConfig,
}

impl GameSolver {
    pub fn new(cfg: GameConfig) -> Self {
        GameSolver { cfg }
    }

    /// Set the dual step size.
    pub fn set_nu(mut self, nu: f64) -> Self {
        self.cfg.nu = nu;
        self
    }

    /// Set the hard iteration cap.
    pub fn set_iteration_limit(mut self, iteration_limit: usize) -> Self {
        self.cfg.iteration_limit = iteration_limit;
        self
    }

    /// Set the logging frequency.
    pub fn set_log_iterations(mut self, log_iterations: usize) -> Self {
        self.cfg.log_iterations = log_iterations;
        self
    }

    /// Play the game for one feature and direction.
    ///
    /// * `x_sensitive` - Sensitive-feature projection of the training rows.
    /// * `scores` - The feature's expressivity for every row.
    /// * `window` - Admissible subgroup size.
    /// * `direction` - Which extreme to search for.
    pub fn solve(
        &self,
        x_sensitive: &Matrix<f64>,
        scores: &[f64],
        window: AlphaWindow,
        direction: Direction,
    ) -> Result<GameRun, AuditError> {
        self.cfg.validate()?;
        window.validate()?;
        validate_length("expressivity scores", x_sensitive.rows, scores.len())?;
        if scores.is_empty() {
            return Err(AuditError::EmptyDataset("no rows to search".to_string()));
        }

        let start = Instant::now();
        let n = scores.len();
        let exp_order = scores.iter().map(|e| e.abs()).sum::<f64>() / n as f64;
        let tolerance = self.cfg.tolerance(exp_order, n);
        let learner = Learner::new(*x_sensitive, &self.cfg.oracle).set_policy(self.cfg.policy)?;
        let mut solver = ConstrainedSolver::new(
            scores.to_vec(),
            direction,
            window,
            self.cfg.bound(exp_order),
            self.cfg.nu,
        );
        let costs0 = vec![0.0; n];

        let mut termination = Termination::IterationLimit;
        let mut iteration = 0;
        while iteration < self.cfg.iteration_limit {
            iteration += 1;

            // lambda_t from the accumulated thetas, then h_t = best_h(lambda_t).
            let lambda = solver.update_lambdas();
            let model = learner.best_response(&costs0, &solver.costs(&lambda))?;
            let (assignments, _) = model.predict(x_sensitive);
            let (phi_s, phi_l) = solver.penalties(&assignments);
            solver.record_play(model, assignments.clone());

            // Q = avg(h), ceiling = L(Q, best_lambda(Q)).
            let avg_pred = solver.average_assignments();
            let best_lam = solver.best_lambda(&avg_pred);
            let l_ceiling = solver.lagrangian(&avg_pred, &best_lam);

            // lambda_avg = avg(lambda), floor = L(best_h(lambda_avg), lambda_avg).
            let avg_lam = solver.average_lambda();
            let floor_model = learner.best_response(&costs0, &solver.costs(&avg_lam))?;
            let (floor_assignments, _) = floor_model.predict(x_sensitive);
            let l_floor = solver.lagrangian(&floor_assignments, &avg_lam);

            let l = solver.lagrangian(&avg_pred, &avg_lam);
            solver.set_gap((l - l_floor).max(l_ceiling - l));

            if self.cfg.log_iterations > 0 && iteration % self.cfg.log_iterations == 0 {
                info!(
                    "iteration {0}, size: {1:.4}, v_t: {2:.6} | {3:.6}",
                    iteration,
                    mean(&assignments),
                    solver.v_t,
                    tolerance,
                );
            }

            if solver.v_t <= tolerance {
                termination = Termination::Converged;
                break;
            }
            if phi_s == 0.0 && phi_l == 0.0 {
                termination = Termination::Feasible;
                break;
            }

            solver.update_thetas(&assignments);
        }

        if termination == Termination::IterationLimit {
            warn!(
                "Reached iteration limit of {} with duality gap {:.6} above tolerance {:.6}.",
                self.cfg.iteration_limit, solver.v_t, tolerance
            );
        }
        debug!(
            "{} search finished after {} iterations ({}) in {:.3} seconds.",
            direction,
            iteration,
            termination,
            start.elapsed().as_secs_f32()
        );

        let (play, valid) = solver
            .get_best_valid_model(direction)
            .ok_or_else(|| AuditError::EmptyDataset("the game produced no plays".to_string()))?;
        if !valid {
            warn!(
                "No play satisfied the size window {}; returning the nearest one (size {:.4}).",
                window, play.size
            );
        }

        Ok(GameRun {
            model: play.model.clone(),
            assignments: play.assignments.clone(),
            expressivity: play.expressivity,
            size: play.size,
            valid,
            termination,
            iterations: iteration,
            gap_history: solver.gap_history().to_vec(),
        })
    }
}

impl SubgroupSearch for GameSolver {
    fn name(&self) -> &'static str {
        "game"
    }

    fn full_value(&self, split: &SplitView, feature: usize) -> Result<f64, AuditError> {
        Ok(split.provider()?.total_expressivity(feature))
    }

    fn subgroup_value(&self, split: &SplitView, feature: usize, assignments: &[f64]) -> Result<f64, AuditError> {
        let provider = split.provider()?;
        validate_length("assignments", provider.n_rows(), assignments.len())?;
        Ok(provider.get_total_exp(assignments, feature))
    }

    fn search_subgroup(
        &self,
        split: &SplitView,
        feature: usize,
        sensitive: &[usize],
        window: AlphaWindow,
        direction: Direction,
    ) -> Result<SearchOutcome, AuditError> {
        let provider = split.provider()?;
        validate_length("expressivity rows", split.x.rows, provider.n_rows())?;
        let x_sensitive = project_columns(&split.x, sensitive)?;
        let run = self.solve(&x_sensitive.view(), &provider.feature_scores(feature), window, direction)?;
        Ok(SearchOutcome {
            model: Box::new(run.model),
            assignments: run.assignments,
            value: run.expressivity,
            size: run.size,
            valid: run.valid,
            termination: run.termination,
            iterations: run.iterations,
            size_record: None,
            value_record: None,
        })
    }
}

