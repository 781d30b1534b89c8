//! Batched cost functions

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

/// A cost function evaluated over a batch of states and a batch of candidate
/// actions at once.
///
/// `evaluate` broadcasts every action against every state and returns a
/// `(num_actions, num_states)` matrix, so a single state can be scored
/// against a full action catalog in one call. Rewards are the negated costs.
pub trait CostFunction: Send + Sync {
    /// Cost of every `(action, state)` pair:
    /// result `[i, j]` is the cost of taking `actions[:, i]` in `states[:, j]`.
    fn evaluate(&self, states: &ArrayView2<f64>, actions: &ArrayView2<f64>) -> Array2<f64>;

    /// Cost of a single state/action pair
    fn single(&self, state: &ArrayView1<f64>, action: &ArrayView1<f64>) -> f64 {
        let s = state.insert_axis(ndarray::Axis(1));
        let a = action.insert_axis(ndarray::Axis(1));
        self.evaluate(&s, &a)[[0, 0]]
    }
}

/// Quadratic cost `(x - x_ref)' Q (x - x_ref) + u' R u` about a reference
/// point, the standard regulation objective of the simulated systems.
#[derive(Debug, Clone)]
pub struct QuadraticCost {
    /// State cost matrix
    pub q: Array2<f64>,
    /// Action cost matrix
    pub r: Array2<f64>,
    /// Reference point the controller should regulate towards
    pub reference: Array1<f64>,
}

impl QuadraticCost {
    /// Create a quadratic cost; `Q` must be square and match the reference.
    pub fn new(q: Array2<f64>, r: Array2<f64>, reference: Array1<f64>) -> crate::Result<Self> {
        if q.nrows() != q.ncols() || q.nrows() != reference.len() {
            return Err(crate::KoopmanError::DimensionMismatch {
                expected: reference.len(),
                actual: q.nrows(),
            });
        }
        if r.nrows() != r.ncols() {
            return Err(crate::KoopmanError::DimensionMismatch {
                expected: r.nrows(),
                actual: r.ncols(),
            });
        }
        Ok(Self { q, r, reference })
    }

    /// Identity-weighted cost about the origin
    #[must_use]
    pub fn identity(state_dim: usize, action_dim: usize) -> Self {
        Self {
            q: Array2::eye(state_dim),
            r: Array2::eye(action_dim),
            reference: Array1::zeros(state_dim),
        }
    }
}

impl CostFunction for QuadraticCost {
    fn evaluate(&self, states: &ArrayView2<f64>, actions: &ArrayView2<f64>) -> Array2<f64> {
        let num_states = states.ncols();
        let num_actions = actions.ncols();

        // x' Q x per state column, u' R u per action column, then outer sum
        let mut state_costs = Array1::zeros(num_states);
        for (j, x) in states.columns().into_iter().enumerate() {
            let dx = &x - &self.reference;
            state_costs[j] = dx.dot(&self.q.dot(&dx));
        }
        let mut action_costs = Array1::zeros(num_actions);
        for (i, u) in actions.columns().into_iter().enumerate() {
            action_costs[i] = u.dot(&self.r.dot(&u));
        }

        Array2::from_shape_fn((num_actions, num_states), |(i, j)| {
            action_costs[i] + state_costs[j]
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn quadratic_cost_broadcasts_catalog() {
        let cost = QuadraticCost::identity(2, 1);
        let states = array![[1.0, 0.0], [0.0, 2.0]];
        let actions = array![[0.0, 3.0]];
        let c = cost.evaluate(&states.view(), &actions.view());
        assert_eq!(c.dim(), (2, 2));
        assert_relative_eq!(c[[0, 0]], 1.0);
        assert_relative_eq!(c[[0, 1]], 4.0);
        assert_relative_eq!(c[[1, 0]], 10.0);
        assert_relative_eq!(c[[1, 1]], 13.0);
    }

    #[test]
    fn reference_point_shifts_cost() {
        let cost = QuadraticCost::new(
            Array2::eye(1),
            Array2::eye(1),
            array![2.0],
        )
        .unwrap();
        let value = cost.single(&array![2.0].view(), &array![0.0].view());
        assert_relative_eq!(value, 0.0);
    }

    #[test]
    fn non_square_q_rejected() {
        let bad = QuadraticCost::new(Array2::zeros((2, 3)), Array2::eye(1), array![0.0, 0.0]);
        assert!(bad.is_err());
    }
}
