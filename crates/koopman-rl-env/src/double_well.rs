//! Stochastic double-well system
//!
//! Two-dimensional SDE with a bistable drift in x and a state-dependent
//! diffusion, integrated by Euler-Maruyama. The control shifts both drift
//! components.

use ndarray::{array, Array1, ArrayView1};
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::StandardNormal;

use koopman_rl_core::{BoxBounds, CostFunction, Dynamics, QuadraticCost};

const DT: f64 = 0.01;

/// Double-well dynamics `dx = (b(x) + u) dt + sigma(x) sqrt(dt) xi`
pub struct DoubleWell {
    cost: QuadraticCost,
    state_bounds: BoxBounds,
    action_bounds: BoxBounds,
}

impl Default for DoubleWell {
    fn default() -> Self {
        Self::new()
    }
}

impl DoubleWell {
    /// Standard parameterization with identity costs about the origin
    #[must_use]
    pub fn new() -> Self {
        Self {
            cost: QuadraticCost::identity(2, 1),
            state_bounds: BoxBounds::symmetric(2, 2.0),
            action_bounds: BoxBounds::symmetric(1, 25.0),
        }
    }

    fn drift(state: &ArrayView1<f64>, u: f64) -> Array1<f64> {
        let (x, y) = (state[0], state[1]);
        array![4.0 * x - 4.0 * x.powi(3) + u, -2.0 * y + u]
    }
}

impl Dynamics for DoubleWell {
    fn state_dim(&self) -> usize {
        2
    }

    fn action_dim(&self) -> usize {
        1
    }

    fn dt(&self) -> f64 {
        DT
    }

    fn step(
        &self,
        state: &ArrayView1<f64>,
        action: &ArrayView1<f64>,
        rng: &mut StdRng,
    ) -> Array1<f64> {
        let drift = Self::drift(state, action[0]) * DT;
        // State-dependent diffusion: sigma(x) = [[0.7, x], [0, 0.5]]
        let xi0: f64 = rng.sample(StandardNormal);
        let xi1: f64 = rng.sample(StandardNormal);
        let sqrt_dt = DT.sqrt();
        let diffusion = array![
            (0.7 * xi0 + state[0] * xi1) * sqrt_dt,
            0.5 * xi1 * sqrt_dt
        ];
        state + &drift + diffusion
    }

    fn cost(&self) -> &dyn CostFunction {
        &self.cost
    }

    fn state_bounds(&self) -> &BoxBounds {
        &self.state_bounds
    }

    fn action_bounds(&self) -> &BoxBounds {
        &self.action_bounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn wells_attract_the_deterministic_part_of_the_flow() {
        // The drift pushes x toward the wells at +-1; average many noisy
        // steps from x = 0.5 and the mean should move outward.
        let well = DoubleWell::new();
        let start = array![0.5, 0.0];
        let mut rng = StdRng::seed_from_u64(0);
        let mut mean_x = 0.0;
        let n = 2000;
        for _ in 0..n {
            let next = well.step(&start.view(), &array![0.0].view(), &mut rng);
            mean_x += next[0];
        }
        mean_x /= n as f64;
        assert!(mean_x > 0.5);
    }

    #[test]
    fn noise_is_drawn_from_the_explicit_generator() {
        let well = DoubleWell::new();
        let start = array![0.2, -0.3];
        let mut rng_a = StdRng::seed_from_u64(7);
        let mut rng_b = StdRng::seed_from_u64(7);
        let a = well.step(&start.view(), &array![1.0].view(), &mut rng_a);
        let b = well.step(&start.view(), &array![1.0].view(), &mut rng_b);
        assert_eq!(a, b);
    }
}
