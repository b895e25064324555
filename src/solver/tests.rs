#[cfg(test)]
mod solver_tests {
    use crate::data::Matrix;
    use crate::errors::AuditError;
    use crate::expressivity::{ExpressivityTable, Split};
    use crate::learner::{CscModel, Learner};
    use crate::regression::LinearRegression;
    use crate::solver::game::ConstrainedSolver;
    use crate::solver::{
        AlphaWindow, Direction, GameConfig, GameSolver, GradientConfig, GradientSolver, SplitView, SubgroupSearch,
        Termination,
    };
    use approx::assert_relative_eq;

    const ROWS: usize = 100;

    /// Binary sensitive column and a feature whose sign follows it.
    fn two_group_fixture() -> (Vec<f64>, Vec<f64>) {
        let s: Vec<f64> = (0..ROWS).map(|i| (i % 2) as f64).collect();
        let e: Vec<f64> = (0..ROWS)
            .map(|i| (2.0 * s[i] - 1.0) * (1.0 + 0.01 * (i % 5) as f64))
            .collect();
        (s, e)
    }

    /// Sensitive column `0..ROWS` and a positive score rising with it, so the first
    /// best response takes every row (maximising) or none (minimising).
    fn ramp_fixture() -> (Vec<f64>, Vec<f64>) {
        let x: Vec<f64> = (0..ROWS).map(|i| i as f64).collect();
        let e: Vec<f64> = x.iter().map(|v| v / 100.0 + 0.005).collect();
        (x, e)
    }

    fn model_for_tests() -> CscModel {
        let x = vec![0.0, 1.0];
        let oracle = LinearRegression::default();
        Learner::new(Matrix::new(&x, 2, 1), &oracle)
            .best_response(&[0.0, 0.0], &[1.0, -1.0])
            .unwrap()
    }

    // -----------------------------------------------------------------------
    // ConstrainedSolver
    // -----------------------------------------------------------------------

    #[test]
    fn test_lambdas_stay_bounded() {
        let window = AlphaWindow::new(0.0, 0.1).unwrap();
        let mut solver = ConstrainedSolver::new(vec![1.0; 10], Direction::Maximize, window, 50.0, 1.0);
        let lambda = solver.update_lambdas();
        assert_relative_eq!(lambda[0], 50.0 / 3.0);
        assert_relative_eq!(lambda[1], 50.0 / 3.0);

        for _ in 0..100 {
            solver.update_thetas(&[1.0; 10]);
        }
        let lambda = solver.update_lambdas();
        assert!(lambda.iter().all(|l| l.is_finite() && *l >= 0.0 && *l <= 50.0));
        assert!(lambda[0] + lambda[1] <= 50.0 + 1e-9);
        assert_relative_eq!(lambda[1], 50.0, epsilon = 1e-6);
        assert_eq!(solver.lambda_history().len(), 2);
        assert_relative_eq!(solver.average_lambda()[1], (50.0 / 3.0 + lambda[1]) / 2.0);
    }

    #[test]
    fn test_lagrangian_and_constraints() {
        let window = AlphaWindow::new(0.25, 0.5).unwrap();
        let solver = ConstrainedSolver::new(vec![1.0, 2.0, 3.0, 4.0], Direction::Maximize, window, 7.0, 0.1);

        let half = [1.0, 1.0, 0.0, 0.0];
        assert_eq!(solver.constraint_values(&half), [-1.0, 0.0]);
        assert_eq!(solver.penalties(&half), (0.0, 0.0));
        assert_relative_eq!(solver.lagrangian(&half, &[2.0, 3.0]), -5.0);
        assert_eq!(solver.best_lambda(&half), [0.0, 0.0]);

        let all = [1.0; 4];
        assert_eq!(solver.penalties(&all), (0.0, 2.0));
        assert_eq!(solver.best_lambda(&all), [0.0, 7.0]);
        assert_eq!(solver.best_lambda(&[0.0; 4]), [7.0, 0.0]);

        // Minimising flips the sign of the expressivity term only.
        let solver = ConstrainedSolver::new(vec![1.0, 2.0, 3.0, 4.0], Direction::Minimize, window, 7.0, 0.1);
        assert_relative_eq!(solver.lagrangian(&half, &[2.0, 3.0]), 1.0);
        assert_eq!(solver.costs(&[2.0, 3.0]), vec![2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_best_valid_model_selection() {
        let window = AlphaWindow::new(0.25, 0.5).unwrap();
        let mut solver = ConstrainedSolver::new(vec![1.0, 2.0, 3.0, 4.0], Direction::Maximize, window, 1.0, 0.1);
        assert!(solver.get_best_valid_model(Direction::Maximize).is_none());

        solver.record_play(model_for_tests(), vec![1.0, 1.0, 0.0, 0.0]);
        solver.record_play(model_for_tests(), vec![1.0, 0.0, 0.0, 0.0]);
        solver.record_play(model_for_tests(), vec![1.0, 1.0, 1.0, 1.0]);

        let (play, valid) = solver.get_best_valid_model(Direction::Maximize).unwrap();
        assert!(valid);
        assert_eq!(play.expressivity, 3.0);
        let (play, valid) = solver.get_best_valid_model(Direction::Minimize).unwrap();
        assert!(valid);
        assert_eq!(play.expressivity, 1.0);
        assert_relative_eq!(solver.average_assignments()[0], 1.0);
        assert_relative_eq!(solver.average_assignments()[3], 1.0 / 3.0);
    }

    #[test]
    fn test_least_invalid_fallback() {
        let window = AlphaWindow::new(0.6, 0.7).unwrap();
        let mut solver = ConstrainedSolver::new(vec![1.0, 2.0, 3.0, 4.0], Direction::Maximize, window, 1.0, 0.1);
        solver.record_play(model_for_tests(), vec![1.0, 1.0, 0.0, 0.0]);
        solver.record_play(model_for_tests(), vec![1.0, 0.0, 0.0, 0.0]);
        solver.record_play(model_for_tests(), vec![1.0, 1.0, 1.0, 1.0]);
        solver.record_play(model_for_tests(), vec![0.0, 0.0, 1.0, 1.0]);

        // Sizes 0.5 are nearest; the larger expressivity wins the tie.
        let (play, valid) = solver.get_best_valid_model(Direction::Maximize).unwrap();
        assert!(!valid);
        assert_eq!(play.size, 0.5);
        assert_eq!(play.expressivity, 7.0);
        let (play, _) = solver.get_best_valid_model(Direction::Minimize).unwrap();
        assert_eq!(play.expressivity, 3.0);
    }

    // -----------------------------------------------------------------------
    // GameSolver
    // -----------------------------------------------------------------------

    #[test]
    fn test_game_finds_extreme_half() {
        let (s, e) = two_group_fixture();
        let x = Matrix::new(&s, ROWS, 1);
        let window = AlphaWindow::new(0.4, 0.6).unwrap();
        let solver = GameSolver::default().set_log_iterations(0);
        let total: f64 = e.iter().sum();

        let run = solver.solve(&x, &e, window, Direction::Maximize).unwrap();
        assert!(run.valid);
        assert_eq!(run.termination, Termination::Feasible);
        assert_eq!(run.iterations, 1);
        assert_relative_eq!(run.size, 0.5);
        assert_relative_eq!(run.expressivity, 51.0, epsilon = 1e-9);
        assert!(run.expressivity > total);
        assert!(run.assignments.iter().zip(&s).all(|(a, si)| a == si));

        let run = solver.solve(&x, &e, window, Direction::Minimize).unwrap();
        assert!(run.valid);
        assert_relative_eq!(run.expressivity, -51.0, epsilon = 1e-9);
        assert!(run.expressivity < total);
    }

    #[test]
    fn test_game_unconstrained_window_stops_immediately() {
        let (s, e) = two_group_fixture();
        let x = Matrix::new(&s, ROWS, 1);
        let run = GameSolver::default()
            .set_log_iterations(0)
            .solve(&x, &e, AlphaWindow::unconstrained(), Direction::Maximize)
            .unwrap();
        assert_eq!(run.iterations, 1);
        assert!(run.valid);
        assert_eq!(run.gap_history.len(), 1);
    }

    #[test]
    fn test_game_unreachable_window_returns_nearest() {
        let (s, e) = two_group_fixture();
        let x = Matrix::new(&s, ROWS, 1);
        let window = AlphaWindow::new(0.1, 0.2).unwrap();
        let run = GameSolver::default()
            .set_iteration_limit(50)
            .set_log_iterations(0)
            .solve(&x, &e, window, Direction::Maximize)
            .unwrap();
        assert!(!run.valid);
        assert!(!window.contains(run.size));
        assert_eq!(run.termination, Termination::IterationLimit);
        assert_eq!(run.iterations, 50);
        assert_eq!(run.gap_history.len(), 50);
    }

    #[test]
    fn test_game_iterates_into_window() {
        let (x, e) = ramp_fixture();
        let sensitive = Matrix::new(&x, ROWS, 1);
        let window = AlphaWindow::new(0.4, 0.6).unwrap();
        let solver = GameSolver::default().set_log_iterations(0);

        let run = solver.solve(&sensitive, &e, window, Direction::Maximize).unwrap();
        assert!(run.valid);
        assert_eq!(run.termination, Termination::Feasible);
        assert!(run.iterations > 1 && run.iterations < 200, "{} iterations", run.iterations);
        assert!(window.contains(run.size), "size {}", run.size);
        // Only the top of the ramp is kept.
        let lowest_in = (0..ROWS).filter(|&i| run.assignments[i] == 1.0).map(|i| x[i]).fold(f64::INFINITY, f64::min);
        let highest_out = (0..ROWS).filter(|&i| run.assignments[i] == 0.0).map(|i| x[i]).fold(-1.0, f64::max);
        assert!(lowest_in > highest_out);
        assert!(run.expressivity > 40.0);

        let run = solver.solve(&sensitive, &e, window, Direction::Minimize).unwrap();
        assert!(run.valid);
        assert_eq!(run.termination, Termination::Feasible);
        assert!(run.iterations > 1 && run.iterations < 200, "{} iterations", run.iterations);
        assert!(window.contains(run.size), "size {}", run.size);
        assert!(run.expressivity < 10.0);
    }

    #[test]
    fn test_game_gap_shrinks() {
        let (x, e) = ramp_fixture();
        let window = AlphaWindow::new(0.4, 0.6).unwrap();
        let run = GameSolver::default()
            .set_log_iterations(0)
            .solve(&Matrix::new(&x, ROWS, 1), &e, window, Direction::Maximize)
            .unwrap();

        let gaps = &run.gap_history;
        assert_eq!(gaps.len(), run.iterations);
        assert!(gaps.len() > 2);
        assert!(gaps.iter().all(|g| g.is_finite() && *g >= 0.0));
        assert!(gaps.windows(2).all(|w| w[1] <= w[0]));
        assert!(gaps[gaps.len() - 1] < gaps[0]);
    }

    #[test]
    fn test_game_converged_termination() {
        let (x, e) = ramp_fixture();
        let sensitive = Matrix::new(&x, ROWS, 1);
        let window = AlphaWindow::new(0.4, 0.6).unwrap();

        // No signal: zero multipliers, zero gap, and nothing worth taking.
        let run = GameSolver::default()
            .set_log_iterations(0)
            .solve(&sensitive, &[0.0; ROWS], window, Direction::Maximize)
            .unwrap();
        assert_eq!(run.termination, Termination::Converged);
        assert_eq!(run.iterations, 1);
        assert_eq!(run.gap_history, vec![0.0]);
        assert!(!run.valid);

        // A loose tolerance stops on the gap before the first play is checked for size.
        let loose = GameSolver::new(GameConfig {
            tolerance_scale: 1e6,
            log_iterations: 0,
            ..GameConfig::default()
        });
        let run = loose.solve(&sensitive, &e, window, Direction::Maximize).unwrap();
        assert_eq!(run.termination, Termination::Converged);
        assert_eq!(run.iterations, 1);
        assert!(!run.valid);
    }

    #[test]
    fn test_game_with_one_hot_sensitive_columns() {
        // Three dummies summing to one: collinear with the learner's intercept.
        let rows = 90;
        let mut data = Vec::with_capacity(3 * rows);
        for g in 0..3 {
            data.extend((0..rows).map(|i| if i % 3 == g { 1.0 } else { 0.0 }));
        }
        let e: Vec<f64> = (0..rows).map(|i| [1.0, -1.0, 0.5][i % 3]).collect();
        let window = AlphaWindow::new(0.2, 0.4).unwrap();

        // Groups 0 and 2 are taken first; the dual player has to drop group 2.
        let run = GameSolver::default()
            .set_log_iterations(0)
            .solve(&Matrix::new(&data, rows, 3), &e, window, Direction::Maximize)
            .unwrap();
        assert!(run.valid);
        assert_eq!(run.termination, Termination::Feasible);
        assert!(run.iterations > 1);
        assert_relative_eq!(run.size, 1.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(run.expressivity, 30.0, epsilon = 1e-9);
    }

    #[test]
    fn test_game_is_deterministic() {
        let (s, e) = two_group_fixture();
        let x = Matrix::new(&s, ROWS, 1);
        let window = AlphaWindow::new(0.1, 0.2).unwrap();
        let solver = GameSolver::default().set_iteration_limit(30).set_log_iterations(0);
        let a = solver.solve(&x, &e, window, Direction::Minimize).unwrap();
        let b = solver.solve(&x, &e, window, Direction::Minimize).unwrap();
        assert_eq!(a.assignments, b.assignments);
        assert_eq!(a.iterations, b.iterations);
        assert_eq!(a.gap_history, b.gap_history);
    }

    #[test]
    fn test_game_rejects_mismatched_scores() {
        let (s, _) = two_group_fixture();
        let x = Matrix::new(&s, ROWS, 1);
        let res = GameSolver::default().solve(&x, &[1.0; 3], AlphaWindow::unconstrained(), Direction::Maximize);
        assert!(matches!(res, Err(AuditError::DimensionMismatch(..))));
    }

    #[test]
    fn test_game_strategy_over_split() {
        let (s, e) = two_group_fixture();
        // Column 0 is sensitive, column 1 is the audited feature.
        let mut data = s.clone();
        data.extend(&e);
        let y = vec![0.0; ROWS];
        let table = ExpressivityTable::from_fn(ROWS, 2, |i, j| if j == 1 { e[i] } else { 0.0 });
        let view = SplitView::new(Split::Train, Matrix::new(&data, ROWS, 2), &y);

        let solver = GameSolver::default().set_log_iterations(0);
        let window = AlphaWindow::new(0.4, 0.6).unwrap();
        assert!(matches!(
            solver.search_subgroup(&view, 1, &[0], window, Direction::Maximize),
            Err(AuditError::MissingExpressivity(_))
        ));

        let view = view.with_expressivity(&table);
        let outcome = solver
            .search_subgroup(&view, 1, &[0], window, Direction::Maximize)
            .unwrap();
        assert!(outcome.valid);
        assert!(outcome.size_record.is_none());
        assert_eq!(outcome.model.coefficients().len(), 1);
        assert_relative_eq!(solver.full_value(&view, 1).unwrap(), e.iter().sum::<f64>(), epsilon = 1e-9);

        let (assignments, value) = solver.apply(outcome.model.as_ref(), &view, 1, &[0]).unwrap();
        assert_eq!(assignments, outcome.assignments);
        assert_relative_eq!(value, outcome.value);
    }

    // -----------------------------------------------------------------------
    // GradientSolver
    // -----------------------------------------------------------------------

    #[test]
    fn test_gradient_raises_group_slope() {
        let (s, _) = two_group_fixture();
        let z: Vec<f64> = (0..ROWS).map(|i| ((i / 2) % 5) as f64 - 2.0).collect();
        let y: Vec<f64> = s.iter().zip(&z).map(|(si, zi)| zi * (1.0 + si)).collect();
        let mut data = s.clone();
        data.extend(&z);
        let view = SplitView::new(Split::Train, Matrix::new(&data, ROWS, 2), &y);

        let solver = GradientSolver::new(GradientConfig {
            iteration_limit: 500,
            log_iterations: 0,
            seed: 3,
            ..GradientConfig::default()
        });
        let window = AlphaWindow::new(0.3, 0.7).unwrap();
        let full = solver.full_value(&view, 1).unwrap();
        let outcome = solver
            .search_subgroup(&view, 1, &[0], window, Direction::Maximize)
            .unwrap();

        assert_eq!(outcome.termination, Termination::Finished);
        assert_eq!(outcome.iterations, 500);
        assert_eq!(outcome.size_record.as_ref().map(|r| r.len()), Some(500));
        assert_eq!(outcome.value_record.as_ref().map(|r| r.len()), Some(500));
        assert_eq!(outcome.model.coefficients().len(), 1);
        assert!(outcome.value > full + 0.15, "{} vs {}", outcome.value, full);
        assert!(outcome.valid);
        assert!(solver.reports_trace());

        let again = solver
            .search_subgroup(&view, 1, &[0], window, Direction::Maximize)
            .unwrap();
        assert_eq!(again.assignments, outcome.assignments);
    }

    #[test]
    fn test_gradient_rejects_bad_columns() {
        let data = vec![0.0; 20];
        let y = vec![0.0; 10];
        let view = SplitView::new(Split::Test, Matrix::new(&data, 10, 2), &y);
        let solver = GradientSolver::default();
        let window = AlphaWindow::unconstrained();
        assert!(solver.search_subgroup(&view, 2, &[0], window, Direction::Minimize).is_err());
        assert!(solver.search_subgroup(&view, 1, &[5], window, Direction::Minimize).is_err());
    }
}
