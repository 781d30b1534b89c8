//! Discrete-time linear system `x' = A x + B u`
//!
//! The exact fixture for the operator round-trip property: with degree-1
//! dictionaries the Koopman fit must recover the system matrices.

use ndarray::{Array1, Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::Rng;

use koopman_rl_core::{BoxBounds, CostFunction, Dynamics, KoopmanError, QuadraticCost, Result};

/// Linear dynamics with identity quadratic cost
pub struct LinearSystem {
    a: Array2<f64>,
    b: Array2<f64>,
    cost: QuadraticCost,
    state_bounds: BoxBounds,
    action_bounds: BoxBounds,
}

impl LinearSystem {
    /// Build from explicit system matrices
    pub fn new(a: Array2<f64>, b: Array2<f64>) -> Result<Self> {
        if a.nrows() != a.ncols() {
            return Err(KoopmanError::DimensionMismatch {
                expected: a.nrows(),
                actual: a.ncols(),
            });
        }
        if b.nrows() != a.nrows() {
            return Err(KoopmanError::DimensionMismatch {
                expected: a.nrows(),
                actual: b.nrows(),
            });
        }
        let state_dim = a.nrows();
        let action_dim = b.ncols();
        Ok(Self {
            cost: QuadraticCost::identity(state_dim, action_dim),
            state_bounds: BoxBounds::symmetric(state_dim, 5.0),
            action_bounds: BoxBounds::symmetric(action_dim, 5.0),
            a,
            b,
        })
    }

    /// Random stable system: entries drawn uniformly, then `A` rescaled so
    /// its spectral radius lands in `(0.7, 1.0)`. `B` is all ones.
    pub fn random_stable(state_dim: usize, action_dim: usize, rng: &mut StdRng) -> Result<Self> {
        let mut a = Array2::from_shape_fn((state_dim, state_dim), |_| rng.gen_range(-1.0..1.0));
        let radius = spectral_radius(&a, rng);
        if radius > f64::MIN_POSITIVE {
            let target = rng.gen_range(0.7..1.0);
            a *= target / radius;
        }
        let b = Array2::ones((state_dim, action_dim));
        Self::new(a, b)
    }

    /// The state transition matrix
    #[must_use]
    pub fn a(&self) -> &Array2<f64> {
        &self.a
    }

    /// The control matrix
    #[must_use]
    pub fn b(&self) -> &Array2<f64> {
        &self.b
    }
}

/// Spectral radius estimate by power iteration on a random start vector
fn spectral_radius(a: &Array2<f64>, rng: &mut StdRng) -> f64 {
    let n = a.nrows();
    let mut v = Array1::from_shape_fn(n, |_| rng.gen_range(0.1..1.0));
    let mut radius = 0.0;
    for _ in 0..200 {
        let av = a.dot(&v);
        let norm = av.iter().map(|x| x * x).sum::<f64>().sqrt();
        if norm < f64::MIN_POSITIVE {
            return 0.0;
        }
        radius = norm / v.iter().map(|x| x * x).sum::<f64>().sqrt();
        v = av / norm;
    }
    radius
}

impl Dynamics for LinearSystem {
    fn state_dim(&self) -> usize {
        self.a.nrows()
    }

    fn action_dim(&self) -> usize {
        self.b.ncols()
    }

    fn dt(&self) -> f64 {
        1.0
    }

    fn step(
        &self,
        state: &ArrayView1<f64>,
        action: &ArrayView1<f64>,
        _rng: &mut StdRng,
    ) -> Array1<f64> {
        self.a.dot(state) + self.b.dot(action)
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
