//! Optim
//!
//! Adam (adaptive moment estimation) over a flat parameter vector.
use crate::constants::{ADAM_BETA1, ADAM_BETA2, ADAM_EPSILON};

pub struct Adam {
    lr: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    t: i32,
    m: Vec<f64>, // First moment
    v: Vec<f64>, // Second moment
}

impl Adam {
    pub fn new(dim: usize, lr: f64, beta1: f64, beta2: f64, epsilon: f64) -> Self {
        Adam {
            lr,
            beta1,
            beta2,
            epsilon,
            t: 0,
            m: vec![0.0; dim],
            v: vec![0.0; dim],
        }
    }

    /// Adam with `beta1 = 0.9`, `beta2 = 0.999`, `epsilon = 1e-8`.
    pub fn default_params(dim: usize, lr: f64) -> Self {
        Self::new(dim, lr, ADAM_BETA1, ADAM_BETA2, ADAM_EPSILON)
    }

    /// Take one bias-corrected step against `grad`.
    pub fn step(&mut self, params: &mut [f64], grad: &[f64]) {
        self.t += 1;
        let bias1 = 1.0 - self.beta1.powi(self.t);
        let bias2 = 1.0 - self.beta2.powi(self.t);

        for (((p, g), m), v) in params
            .iter_mut()
            .zip(grad)
            .zip(self.m.iter_mut())
            .zip(self.v.iter_mut())
        {
            *m = self.beta1 * *m + (1.0 - self.beta1) * g;
            *v = self.beta2 * *v + (1.0 - self.beta2) * g * g;
            let m_hat = *m / bias1;
            let v_hat = *v / bias2;
            *p -= self.lr * m_hat / (v_hat.sqrt() + self.epsilon);
        }
    }
}
