//! The Koopman tensor: a bilinear, action-conditioned transition operator
//! on dictionary space, fit once from snapshot data.

use ndarray::{Array1, Array2, Array3, ArrayView1, ArrayView2, ArrayView3, Axis};
use tracing::{debug, warn};

use koopman_rl_core::{KoopmanError, Result};

use crate::observables::Dictionary;
use crate::regression::lstsq;

/// Snapshot triple `(X, Y, U)` of observed transitions.
///
/// Columns are samples: `Y[:, i]` is the state reached from `X[:, i]` under
/// constant action `U[:, i]`. Shapes are validated on construction so the
/// fitting code can index freely.
#[derive(Debug, Clone)]
pub struct SnapshotDataset {
    x: Array2<f64>,
    y: Array2<f64>,
    u: Array2<f64>,
}

impl SnapshotDataset {
    /// Bundle and validate a snapshot triple
    pub fn new(x: Array2<f64>, y: Array2<f64>, u: Array2<f64>) -> Result<Self> {
        if y.dim() != x.dim() {
            return Err(KoopmanError::DimensionMismatch {
                expected: x.ncols(),
                actual: y.ncols(),
            });
        }
        if u.ncols() != x.ncols() {
            return Err(KoopmanError::DimensionMismatch {
                expected: x.ncols(),
                actual: u.ncols(),
            });
        }
        Ok(Self { x, y, u })
    }

    /// Number of snapshot samples
    #[must_use]
    pub fn len(&self) -> usize {
        self.x.ncols()
    }

    /// Whether the dataset holds no samples
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.x.ncols() == 0
    }

    /// States before transition, `(state_dim, N)`
    #[must_use]
    pub fn states(&self) -> ArrayView2<f64> {
        self.x.view()
    }

    /// States after transition, `(state_dim, N)`
    #[must_use]
    pub fn next_states(&self) -> ArrayView2<f64> {
        self.y.view()
    }

    /// Applied actions, `(action_dim, N)`
    #[must_use]
    pub fn actions(&self) -> ArrayView2<f64> {
        self.u.view()
    }
}

/// Bilinear Koopman operator `K(u)` with `phi(y) ~= K(u) phi(x)`.
///
/// Fit once by least squares over a snapshot dataset, then immutable. The
/// third-order tensor is kept both in indexed form `K[p', p, s]` and as a
/// flattened `(phi_dim^2, psi_dim)` matrix so a whole action catalog can be
/// contracted in a single matrix product.
pub struct KoopmanTensor {
    state_dict: Box<dyn Dictionary>,
    action_dict: Box<dyn Dictionary>,
    dataset: SnapshotDataset,
    /// Lifted states of the training set, kept for critic mini-batching
    phi_x: Array2<f64>,
    /// `K[p', p, s]`, shape `(phi_dim, phi_dim, psi_dim)`
    k: Array3<f64>,
    /// `k_flat[p' * phi_dim + p, s] = K[p', p, s]`
    k_flat: Array2<f64>,
    /// Projection back to state space, `(phi_dim, state_dim)`
    b: Array2<f64>,
    rank: usize,
    condition: f64,
}

impl KoopmanTensor {
    /// Fit the operator from a snapshot dataset.
    ///
    /// Solves `min ||A M - Phi_Y^T||_F` where row `i` of `A` is the
    /// Kronecker product of `psi(u_i)` and `phi(x_i)`, then reshapes `M`
    /// into the third-order tensor. Also fits the projection `B` mapping
    /// lifted states back to raw states.
    pub fn fit(
        state_dict: Box<dyn Dictionary>,
        action_dict: Box<dyn Dictionary>,
        dataset: SnapshotDataset,
    ) -> Result<Self> {
        if dataset.is_empty() {
            return Err(KoopmanError::Model("empty snapshot dataset".into()));
        }
        if state_dict.input_dim() != dataset.states().nrows() {
            return Err(KoopmanError::DimensionMismatch {
                expected: state_dict.input_dim(),
                actual: dataset.states().nrows(),
            });
        }
        if action_dict.input_dim() != dataset.actions().nrows() {
            return Err(KoopmanError::DimensionMismatch {
                expected: action_dict.input_dim(),
                actual: dataset.actions().nrows(),
            });
        }
        let n = dataset.len();
        let phi_x = state_dict.transform(&dataset.states());
        let phi_y = state_dict.transform(&dataset.next_states());
        let psi_u = action_dict.transform(&dataset.actions());
        let phi_dim = state_dict.output_dim();
        let psi_dim = action_dict.output_dim();

        // Row i = kron(psi(u_i), phi(x_i)), entry index s * phi_dim + p.
        let mut predictors = Array2::zeros((n, psi_dim * phi_dim));
        for i in 0..n {
            for s in 0..psi_dim {
                for p in 0..phi_dim {
                    predictors[[i, s * phi_dim + p]] = psi_u[[s, i]] * phi_x[[p, i]];
                }
            }
        }

        let targets = phi_y.t().to_owned();
        let fit = lstsq(&predictors.view(), &targets.view())?;
        if n < phi_dim * psi_dim {
            warn!(
                samples = n,
                unknowns = phi_dim * psi_dim,
                rank = fit.rank,
                condition = fit.condition(),
                "snapshot dataset under-determines the operator; \
                 falling back to the minimum-norm fit"
            );
        } else {
            debug!(
                rank = fit.rank,
                condition = fit.condition(),
                "koopman operator regression solved"
            );
        }

        let mut k = Array3::zeros((phi_dim, phi_dim, psi_dim));
        for s in 0..psi_dim {
            for p in 0..phi_dim {
                for pp in 0..phi_dim {
                    k[[pp, p, s]] = fit.solution[[s * phi_dim + p, pp]];
                }
            }
        }
        let mut k_flat = Array2::zeros((phi_dim * phi_dim, psi_dim));
        for pp in 0..phi_dim {
            for p in 0..phi_dim {
                for s in 0..psi_dim {
                    k_flat[[pp * phi_dim + p, s]] = k[[pp, p, s]];
                }
            }
        }

        // Projection back to state space: Phi_X^T B ~= X^T.
        let b_fit = lstsq(&phi_x.t(), &dataset.states().t())?;

        Ok(Self {
            state_dict,
            action_dict,
            dataset,
            phi_x,
            k,
            k_flat,
            b: b_fit.solution,
            rank: fit.rank,
            condition: fit.condition(),
        })
    }

    /// The snapshot dataset the operator was fit on
    #[must_use]
    pub fn dataset(&self) -> &SnapshotDataset {
        &self.dataset
    }

    /// Lifted training states, `(phi_dim, N)`
    #[must_use]
    pub fn lifted_states(&self) -> ArrayView2<f64> {
        self.phi_x.view()
    }

    /// The raw third-order tensor, indexed `[p', p, s]`
    #[must_use]
    pub fn tensor(&self) -> ArrayView3<f64> {
        self.k.view()
    }

    /// Lifted state dimension
    #[must_use]
    pub fn phi_dim(&self) -> usize {
        self.state_dict.output_dim()
    }

    /// Lifted action dimension
    #[must_use]
    pub fn psi_dim(&self) -> usize {
        self.action_dict.output_dim()
    }

    /// Numerical rank of the operator regression
    #[must_use]
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Condition number of the operator regression
    #[must_use]
    pub fn condition(&self) -> f64 {
        self.condition
    }

    /// Lift a batch of states, `(state_dim, N) -> (phi_dim, N)`
    #[must_use]
    pub fn phi(&self, states: &ArrayView2<f64>) -> Array2<f64> {
        self.state_dict.transform(states)
    }

    /// Lift a single state
    #[must_use]
    pub fn phi_single(&self, state: &ArrayView1<f64>) -> Array1<f64> {
        self.state_dict.lift(state)
    }

    /// Lift a batch of actions, `(action_dim, N) -> (psi_dim, N)`
    #[must_use]
    pub fn psi(&self, actions: &ArrayView2<f64>) -> Array2<f64> {
        self.action_dict.transform(actions)
    }

    /// The operator slice for a single action, `(phi_dim, phi_dim)`
    #[must_use]
    pub fn k_u(&self, action: &ArrayView1<f64>) -> Array2<f64> {
        let psi = self.action_dict.lift(action);
        let phi_dim = self.phi_dim();
        let flat = self.k_flat.dot(&psi);
        let mut out = Array2::zeros((phi_dim, phi_dim));
        for pp in 0..phi_dim {
            for p in 0..phi_dim {
                out[[pp, p]] = flat[pp * phi_dim + p];
            }
        }
        out
    }

    /// Operator slices for a whole action batch in one contraction.
    ///
    /// Input `(action_dim, A)`, output `(A, phi_dim, phi_dim)` where slice
    /// `a` is `K(u_a)`. This is the hot path of the critic refit: one
    /// matrix product followed by a reshape, never a per-action loop.
    #[must_use]
    pub fn k_batch(&self, actions: &ArrayView2<f64>) -> Array3<f64> {
        let psi = self.action_dict.transform(actions);
        let flat = self.k_flat.dot(&psi);
        let phi_dim = self.phi_dim();
        let num_actions = actions.ncols();
        Array3::from_shape_fn((num_actions, phi_dim, phi_dim), |(a, pp, p)| {
            flat[[pp * phi_dim + p, a]]
        })
    }

    /// Predicted next lifted state `K(u) phi(x)`
    #[must_use]
    pub fn phi_f(&self, state: &ArrayView1<f64>, action: &ArrayView1<f64>) -> Array1<f64> {
        self.k_u(action).dot(&self.phi_single(state))
    }

    /// Predicted next raw state `B^T K(u) phi(x)`
    #[must_use]
    pub fn predict(&self, state: &ArrayView1<f64>, action: &ArrayView1<f64>) -> Array1<f64> {
        self.b.t().dot(&self.phi_f(state, action))
    }

    /// Mean squared feature-space residual over the training set.
    ///
    /// Averages `||phi(y_i) - K(u_i) phi(x_i)||^2` over the samples. Zero
    /// for data generated by an exactly representable system.
    #[must_use]
    pub fn training_error(&self) -> f64 {
        let phi_y = self.phi(&self.dataset.next_states());
        let n = self.dataset.len();
        let mut total = 0.0;
        for i in 0..n {
            let predicted = self
                .k_u(&self.dataset.actions().index_axis(Axis(1), i))
                .dot(&self.phi_x.index_axis(Axis(1), i));
            let residual = &phi_y.index_axis(Axis(1), i) - &predicted;
            total += residual.iter().map(|r| r * r).sum::<f64>();
        }
        total / n as f64
    }
}

impl std::fmt::Debug for KoopmanTensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KoopmanTensor")
            .field("phi_dim", &self.phi_dim())
            .field("psi_dim", &self.psi_dim())
            .field("rank", &self.rank)
            .field("condition", &self.condition)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observables::Monomials;
    use approx::assert_relative_eq;
    use ndarray::{array, Array2};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// x' = 0.5 x + u, exactly representable with degree-1 dictionaries
    fn linear_dataset(samples: usize, seed: u64) -> SnapshotDataset {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut x = Array2::zeros((1, samples));
        let mut y = Array2::zeros((1, samples));
        let mut u = Array2::zeros((1, samples));
        for i in 0..samples {
            let xi: f64 = rng.gen_range(-5.0..5.0);
            let ui: f64 = rng.gen_range(-2.0..2.0);
            x[[0, i]] = xi;
            u[[0, i]] = ui;
            y[[0, i]] = 0.5 * xi + ui;
        }
        SnapshotDataset::new(x, y, u).unwrap()
    }

    fn fitted_linear_model() -> KoopmanTensor {
        let dataset = linear_dataset(200, 7);
        KoopmanTensor::fit(
            Box::new(Monomials::new(1, 2)),
            Box::new(Monomials::new(1, 2)),
            dataset,
        )
        .unwrap()
    }

    #[test]
    fn predicts_linear_dynamics_from_snapshots() {
        let model = fitted_linear_model();
        let x = array![1.5];
        let u = array![-0.75];
        let predicted = model.predict(&x.view(), &u.view());
        assert_relative_eq!(predicted[0], 0.5 * 1.5 - 0.75, epsilon = 1e-6);
    }

    #[test]
    fn training_error_is_negligible_for_representable_system() {
        let model = fitted_linear_model();
        assert!(model.training_error() < 1e-10);
    }

    #[test]
    fn batched_contraction_matches_per_action_slices() {
        let model = fitted_linear_model();
        let actions = array![[-2.0, -0.5, 0.0, 1.0, 3.0]];
        let stacked = model.k_batch(&actions.view());
        for (a, action) in actions.columns().into_iter().enumerate() {
            let single = model.k_u(&action);
            for pp in 0..model.phi_dim() {
                for p in 0..model.phi_dim() {
                    assert_relative_eq!(
                        stacked[[a, pp, p]],
                        single[[pp, p]],
                        epsilon = 1e-12
                    );
                }
            }
        }
    }

    #[test]
    fn feature_propagation_matches_lifted_successor() {
        let model = fitted_linear_model();
        let x = array![0.8];
        let u = array![1.2];
        let next = array![0.5 * 0.8 + 1.2];
        let propagated = model.phi_f(&x.view(), &u.view());
        let lifted = model.phi_single(&next.view());
        for (a, b) in propagated.iter().zip(lifted.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-6);
        }
    }

    #[test]
    fn mismatched_snapshot_columns_are_rejected() {
        let x = Array2::zeros((2, 10));
        let y = Array2::zeros((2, 10));
        let u = Array2::zeros((1, 9));
        assert!(SnapshotDataset::new(x, y, u).is_err());
    }

    #[test]
    fn dictionary_dataset_dimension_mismatch_is_an_error() {
        use koopman_rl_core::KoopmanError;

        let dataset = linear_dataset(20, 3);
        let result = KoopmanTensor::fit(
            Box::new(Monomials::new(3, 1)),
            Box::new(Monomials::new(1, 1)),
            dataset.clone(),
        );
        assert!(matches!(
            result,
            Err(KoopmanError::DimensionMismatch {
                expected: 3,
                actual: 1
            })
        ));

        let result = KoopmanTensor::fit(
            Box::new(Monomials::new(1, 1)),
            Box::new(Monomials::new(2, 1)),
            dataset,
        );
        assert!(matches!(
            result,
            Err(KoopmanError::DimensionMismatch {
                expected: 2,
                actual: 1
            })
        ));
    }

    #[test]
    fn under_determined_fit_falls_back_to_minimum_norm() {
        // 4 samples against 9 unknowns: the regression is rank-deficient
        // but must still produce an operator.
        let dataset = linear_dataset(4, 11);
        let model = KoopmanTensor::fit(
            Box::new(Monomials::new(1, 2)),
            Box::new(Monomials::new(1, 2)),
            dataset,
        )
        .unwrap();
        assert!(model.rank() < model.phi_dim() * model.psi_dim());
        assert!(model.condition().is_finite() || model.rank() == 0);
    }

    /// x' = M x + N u with a 2-dimensional state, exact under degree-1 lifts
    fn planar_dataset(samples: usize, seed: u64) -> SnapshotDataset {
        let m = array![[0.5, 0.1], [-0.2, 0.3]];
        let nmat = array![[1.0], [0.5]];
        let mut rng = StdRng::seed_from_u64(seed);
        let x = Array2::from_shape_fn((2, samples), |_| rng.gen_range(-5.0..5.0));
        let u = Array2::from_shape_fn((1, samples), |_| rng.gen_range(-2.0..2.0));
        let y = m.dot(&x) + nmat.dot(&u);
        SnapshotDataset::new(x, y, u).unwrap()
    }

    #[test]
    fn recovers_planar_linear_dynamics() {
        let model = KoopmanTensor::fit(
            Box::new(Monomials::new(2, 1)),
            Box::new(Monomials::new(1, 1)),
            planar_dataset(300, 13),
        )
        .unwrap();
        assert!(model.training_error() < 1e-10);

        let x = array![1.4, -2.3];
        let u = array![0.8];
        let predicted = model.predict(&x.view(), &u.view());
        let expected = array![
            0.5 * 1.4 + 0.1 * (-2.3) + 1.0 * 0.8,
            -0.2 * 1.4 + 0.3 * (-2.3) + 0.5 * 0.8
        ];
        for (a, b) in predicted.iter().zip(expected.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-6);
        }
    }
}
