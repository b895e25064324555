pub const GAME_ITERATION_LIMIT: usize = 800;
pub const GRADIENT_ITERATION_LIMIT: usize = 1000;
pub const LOG_ITERATIONS: usize = 100;
pub const DUAL_BOUND_SCALE: f64 = 10_000.0;
pub const GAP_TOLERANCE_SCALE: f64 = 0.01;
pub const SEPARABLE_NU: f64 = 0.00001;
pub const SIZE_SCALED_NU: f64 = 0.000002;
pub const SIZE_PENALTY: f64 = 100_000.0;
pub const COEFFICIENT_SCALE: f64 = 0.1;
pub const ADAM_LEARNING_RATE: f64 = 0.05;
pub const ADAM_BETA1: f64 = 0.9;
pub const ADAM_BETA2: f64 = 0.999;
pub const ADAM_EPSILON: f64 = 1e-8;
pub const WINDOW_EPS: f64 = 1e-12;
