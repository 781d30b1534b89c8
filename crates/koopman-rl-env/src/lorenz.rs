//! Controlled Lorenz system
//!
//! The classic chaotic attractor with the control input added to the first
//! velocity component. The regulation target is the non-origin equilibrium
//! `(x_e, y_e, z_e) = (sqrt(beta(rho-1)), sqrt(beta(rho-1)), rho-1)`.

use ndarray::{array, Array1, ArrayView1};
use rand::rngs::StdRng;

use koopman_rl_core::{BoxBounds, CostFunction, Dynamics, QuadraticCost};

const SIGMA: f64 = 10.0;
const RHO: f64 = 28.0;
const BETA: f64 = 8.0 / 3.0;
const DT: f64 = 0.01;

/// Lorenz dynamics with additive control on the x equation
pub struct Lorenz {
    cost: QuadraticCost,
    state_bounds: BoxBounds,
    action_bounds: BoxBounds,
}

impl Default for Lorenz {
    fn default() -> Self {
        Self::new()
    }
}

impl Lorenz {
    /// Standard parameterization (`sigma = 10`, `rho = 28`, `beta = 8/3`)
    #[must_use]
    pub fn new() -> Self {
        let equilibrium = Self::equilibrium();
        let q = ndarray::Array2::eye(3);
        let r = ndarray::Array2::eye(1) * 0.001;
        let cost = QuadraticCost { q, r, reference: equilibrium };
        let state_bounds = BoxBounds {
            minimums: array![-20.0, -50.0, 0.0],
            maximums: array![20.0, 50.0, 50.0],
        };
        let action_bounds = BoxBounds::symmetric(1, 75.0);
        Self {
            cost,
            state_bounds,
            action_bounds,
        }
    }

    /// The attractor equilibrium the cost regulates towards
    #[must_use]
    pub fn equilibrium() -> Array1<f64> {
        let xy = (BETA * (RHO - 1.0)).sqrt();
        array![xy, xy, RHO - 1.0]
    }

    fn derivative(state: &Array1<f64>, control: f64) -> Array1<f64> {
        let (x, y, z) = (state[0], state[1], state[2]);
        array![
            SIGMA * (y - x) + control,
            (RHO - z) * x - y,
            x * y - BETA * z
        ]
    }
}

impl Dynamics for Lorenz {
    fn state_dim(&self) -> usize {
        3
    }

    fn action_dim(&self) -> usize {
        1
    }

    fn dt(&self) -> f64 {
        DT
    }

    /// One RK4 step of the controlled ODE with the action held constant
    fn step(
        &self,
        state: &ArrayView1<f64>,
        action: &ArrayView1<f64>,
        _rng: &mut StdRng,
    ) -> Array1<f64> {
        let u = action[0];
        let x = state.to_owned();
        let k1 = Self::derivative(&x, u);
        let k2 = Self::derivative(&(&x + &(&k1 * (DT / 2.0))), u);
        let k3 = Self::derivative(&(&x + &(&k2 * (DT / 2.0))), u);
        let k4 = Self::derivative(&(&x + &(&k3 * DT)), u);
        x + (k1 + k2 * 2.0 + k3 * 2.0 + k4) * (DT / 6.0)
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
    use approx::assert_relative_eq;
    use rand::SeedableRng;

    #[test]
    fn equilibrium_is_a_fixed_point_of_the_uncontrolled_flow() {
        let lorenz = Lorenz::new();
        let mut rng = StdRng::seed_from_u64(0);
        let eq = Lorenz::equilibrium();
        let next = lorenz.step(&eq.view(), &array![0.0].view(), &mut rng);
        for (a, b) in next.iter().zip(eq.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-9);
        }
    }

    #[test]
    fn cost_vanishes_at_the_reference_with_zero_action() {
        let lorenz = Lorenz::new();
        let eq = Lorenz::equilibrium();
        let c = lorenz.cost().single(&eq.view(), &array![0.0].view());
        assert_relative_eq!(c, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn control_enters_only_the_first_component() {
        let lorenz = Lorenz::new();
        let mut rng = StdRng::seed_from_u64(1);
        let x0 = array![1.0, 1.0, 1.0];
        let free = lorenz.step(&x0.view(), &array![0.0].view(), &mut rng);
        let forced = lorenz.step(&x0.view(), &array![50.0].view(), &mut rng);
        assert!((forced[0] - free[0]).abs() > 0.1);
        // y and z feel the control only through x within the step, a much
        // smaller second-order effect
        assert!((forced[1] - free[1]).abs() < (forced[0] - free[0]).abs());
    }
}
