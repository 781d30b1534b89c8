//! Linear critic refit in closed form through the Koopman tensor
//!
//! The value function is linear in the state dictionary, `V(x) = w^T phi(x)`.
//! Instead of bootstrapping from sampled successor states, each refit
//! propagates feature-space expectations through the fitted operator and
//! resolves the projected Bellman equation by least squares in one shot.

use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use tracing::debug;

use koopman_rl_core::{ActionCatalog, CostFunction, KoopmanError, Result};
use koopman_rl_model::{lstsq, KoopmanTensor};

use crate::actor::DiscretePolicy;

/// Tolerance for the per-column probability normalization check
const PROB_SUM_TOLERANCE: f64 = 1e-6;

/// Critic hyperparameters
#[derive(Debug, Clone, Copy)]
pub struct CriticConfig {
    /// Discount base; the effective per-step discount is `gamma^dt`
    pub gamma: f64,
    /// Physical timestep of the underlying system
    pub dt: f64,
    /// Snapshot columns drawn per refit
    pub batch_size: usize,
    /// Whether the expected reward enters the regression target. Disabling
    /// it reproduces the reward-free bootstrap ablation.
    pub include_reward_in_target: bool,
}

impl CriticConfig {
    /// Defaults used by the discrete actor-critic
    #[must_use]
    pub fn new(gamma: f64, dt: f64) -> Self {
        Self {
            gamma,
            dt,
            batch_size: 4096,
            include_reward_in_target: true,
        }
    }
}

/// Linear value function over the state dictionary
#[derive(Debug, Clone)]
pub struct ValueFunction {
    w: Array1<f64>,
    config: CriticConfig,
}

impl ValueFunction {
    /// Zero-initialized critic; `V(x) = 0` everywhere until the first refit
    #[must_use]
    pub fn new(phi_dim: usize, config: CriticConfig) -> Self {
        Self {
            w: Array1::zeros(phi_dim),
            config,
        }
    }

    /// Effective per-step discount `gamma^dt`
    #[must_use]
    pub fn discount(&self) -> f64 {
        self.config.gamma.powf(self.config.dt)
    }

    /// Critic configuration
    #[must_use]
    pub fn config(&self) -> &CriticConfig {
        &self.config
    }

    /// Current weights
    #[must_use]
    pub fn weights(&self) -> ArrayView1<f64> {
        self.w.view()
    }

    /// Restore weights from a checkpoint
    pub fn set_weights(&mut self, w: Array1<f64>) -> Result<()> {
        if w.len() != self.w.len() {
            return Err(KoopmanError::Checkpoint(format!(
                "value weight length mismatch: expected {}, got {}",
                self.w.len(),
                w.len()
            )));
        }
        self.w = w;
        Ok(())
    }

    /// `V(x) = w^T phi(x)`; pure read, stable between refits
    #[must_use]
    pub fn value(&self, tensor: &KoopmanTensor, state: &ArrayView1<f64>) -> f64 {
        self.w.dot(&tensor.phi_single(state))
    }

    /// Resolve the projected Bellman equation over a fresh snapshot batch.
    ///
    /// Draws `batch_size` columns without replacement from the tensor's
    /// training set, propagates the expected lifted successor under the
    /// policy with one batched contraction, and replaces `w` with the
    /// least-squares solution of
    /// `(Phi_X - gamma^dt E[Phi_X'])^T w = E[r]^T`. A full resolve, no
    /// momentum; a degenerate policy distribution aborts before `w` is
    /// touched.
    pub fn refit(
        &mut self,
        policy: &dyn DiscretePolicy,
        tensor: &KoopmanTensor,
        catalog: &ActionCatalog,
        cost: &dyn CostFunction,
        rng: &mut StdRng,
    ) -> Result<()> {
        let n = tensor.dataset().len();
        let batch = self.config.batch_size.min(n);
        let indices: Vec<usize> = sample(rng, n, batch).into_vec();

        let x_batch = tensor.dataset().states().select(Axis(1), &indices);
        let phi_x_batch = tensor.lifted_states().select(Axis(1), &indices);

        let pi = policy.probabilities_batch(&x_batch.view());
        validate_distribution(&pi)?;

        // E[phi(x')] = sum_a pi[a, :] * (K(u_a) Phi_X)
        let k_us = tensor.k_batch(&catalog.view());
        let mut expected_phi_next: Array2<f64> = Array2::zeros(phi_x_batch.dim());
        for a in 0..catalog.len() {
            let mut propagated = k_us.index_axis(Axis(0), a).dot(&phi_x_batch);
            propagated *= &pi.row(a);
            expected_phi_next += &propagated;
        }

        let costs = cost.evaluate(&x_batch.view(), &catalog.view());
        let expected_reward = (-&costs * &pi).sum_axis(Axis(0));

        let discount = self.discount();
        let predictors = (&phi_x_batch - &(expected_phi_next * discount))
            .t()
            .to_owned();
        let target = if self.config.include_reward_in_target {
            expected_reward.insert_axis(Axis(1))
        } else {
            Array2::zeros((batch, 1))
        };

        let fit = lstsq(&predictors.view(), &target.view())?;
        debug!(
            rank = fit.rank,
            condition = fit.condition(),
            batch,
            "critic refit solved"
        );
        self.w = fit.solution.index_axis_move(Axis(1), 0);
        Ok(())
    }
}

/// Reject NaN, negative, or non-normalized policy output
fn validate_distribution(pi: &Array2<f64>) -> Result<()> {
    for (j, col) in pi.columns().into_iter().enumerate() {
        let mut sum = 0.0;
        for &p in &col {
            if !p.is_finite() || p < 0.0 {
                return Err(KoopmanError::DegenerateDistribution(format!(
                    "invalid probability {p} in column {j}"
                )));
            }
            sum += p;
        }
        if (sum - 1.0).abs() > PROB_SUM_TOLERANCE {
            return Err(KoopmanError::DegenerateDistribution(format!(
                "column {j} sums to {sum}"
            )));
        }
    }
    Ok(())
}
