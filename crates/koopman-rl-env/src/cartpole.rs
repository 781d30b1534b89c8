//! Cart-pole balancing task
//!
//! Standard cart-pole physics under Euler integration, reframed as a
//! regulation problem: instead of the survival reward, a quadratic state
//! cost penalizes deviation from the upright origin. The two catalog
//! actions 0 and 1 map to a fixed push left or right.

use ndarray::{array, Array1, Array2, ArrayView1};
use rand::rngs::StdRng;

use koopman_rl_core::{ActionCatalog, BoxBounds, CostFunction, Dynamics, QuadraticCost};

const GRAVITY: f64 = 9.8;
const MASS_CART: f64 = 1.0;
const MASS_POLE: f64 = 0.1;
const POLE_HALF_LENGTH: f64 = 0.5;
const FORCE_MAG: f64 = 10.0;
const DT: f64 = 0.02;
const X_THRESHOLD: f64 = 2.4;
const THETA_THRESHOLD: f64 = 0.209;

/// Cart-pole dynamics with a quadratic regulation cost
pub struct CartPole {
    cost: QuadraticCost,
    state_bounds: BoxBounds,
    action_bounds: BoxBounds,
}

impl Default for CartPole {
    fn default() -> Self {
        Self::new()
    }
}

impl CartPole {
    /// Standard constants, cost `Q = diag(10, 1, 10, 1)`, `R = 0.1`
    #[must_use]
    pub fn new() -> Self {
        let q = Array2::from_diag(&array![10.0, 1.0, 10.0, 1.0]);
        let r = Array2::eye(1) * 0.1;
        let cost = QuadraticCost {
            q,
            r,
            reference: Array1::zeros(4),
        };
        // Initial conditions are drawn near upright, as in the original task
        let state_bounds = BoxBounds::symmetric(4, 0.05);
        let action_bounds = BoxBounds::new(array![0.0], array![1.0])
            .expect("static bounds are well formed");
        Self {
            cost,
            state_bounds,
            action_bounds,
        }
    }

    /// The two-entry action catalog: 0 pushes left, 1 pushes right
    #[must_use]
    pub fn catalog() -> ActionCatalog {
        ActionCatalog::new(array![[0.0, 1.0]]).expect("static catalog is non-empty")
    }
}

impl Dynamics for CartPole {
    fn state_dim(&self) -> usize {
        4
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
        _rng: &mut StdRng,
    ) -> Array1<f64> {
        let (x, x_dot, theta, theta_dot) = (state[0], state[1], state[2], state[3]);
        let force = if action[0] >= 0.5 { FORCE_MAG } else { -FORCE_MAG };

        let cos_theta = theta.cos();
        let sin_theta = theta.sin();
        let total_mass = MASS_CART + MASS_POLE;
        let pole_mass_length = MASS_POLE * POLE_HALF_LENGTH;

        let temp = (force + pole_mass_length * theta_dot.powi(2) * sin_theta) / total_mass;
        let theta_acc = (GRAVITY * sin_theta - cos_theta * temp)
            / (POLE_HALF_LENGTH * (4.0 / 3.0 - MASS_POLE * cos_theta.powi(2) / total_mass));
        let x_acc = temp - pole_mass_length * theta_acc * cos_theta / total_mass;

        array![
            x + DT * x_dot,
            x_dot + DT * x_acc,
            theta + DT * theta_dot,
            theta_dot + DT * theta_acc
        ]
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

    fn is_terminal(&self, state: &ArrayView1<f64>) -> bool {
        state[0].abs() > X_THRESHOLD || state[2].abs() > THETA_THRESHOLD
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn pushing_right_accelerates_the_cart_right() {
        let env = CartPole::new();
        let mut rng = StdRng::seed_from_u64(0);
        let upright = Array1::zeros(4);
        let right = env.step(&upright.view(), &array![1.0].view(), &mut rng);
        let left = env.step(&upright.view(), &array![0.0].view(), &mut rng);
        assert!(right[1] > 0.0);
        assert!(left[1] < 0.0);
    }

    #[test]
    fn termination_thresholds_match_the_task() {
        let env = CartPole::new();
        assert!(!env.is_terminal(&array![0.0, 0.0, 0.0, 0.0].view()));
        assert!(env.is_terminal(&array![2.5, 0.0, 0.0, 0.0].view()));
        assert!(env.is_terminal(&array![0.0, 0.0, 0.3, 0.0].view()));
    }

    #[test]
    fn upright_origin_is_the_cheapest_state() {
        let env = CartPole::new();
        let origin = Array1::zeros(4);
        let tilted = array![0.0, 0.0, 0.1, 0.0];
        let c0 = env.cost().single(&origin.view(), &array![0.0].view());
        let c1 = env.cost().single(&tilted.view(), &array![0.0].view());
        assert!(c1 > c0);
    }
}
