//! Discrete-action policies
//!
//! The softmax actor maps raw states to a distribution over an action
//! catalog. Its output head starts at zero so the initial policy is exactly
//! uniform, which keeps the first critic refits well conditioned.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;

use koopman_rl_core::{KoopmanError, Result};

use crate::nn::{Adam, Dense, Mlp};

/// Anything that induces a probability distribution over a discrete action
/// catalog, given a batch of states. Columns are states; the result is
/// `(num_actions, B)` with each column summing to one.
pub trait DiscretePolicy {
    /// Action probabilities for a column batch of states
    fn probabilities_batch(&self, states: &ArrayView2<f64>) -> Array2<f64>;

    /// Number of catalog actions
    fn num_actions(&self) -> usize;
}

/// State-independent uniform distribution over the catalog.
///
/// Used for policy-free critic evaluation and as a baseline in tests.
#[derive(Debug, Clone)]
pub struct UniformPolicy {
    num_actions: usize,
}

impl UniformPolicy {
    /// Uniform policy over `num_actions` catalog entries
    #[must_use]
    pub fn new(num_actions: usize) -> Self {
        Self { num_actions }
    }
}

impl DiscretePolicy for UniformPolicy {
    fn probabilities_batch(&self, states: &ArrayView2<f64>) -> Array2<f64> {
        Array2::from_elem(
            (self.num_actions, states.ncols()),
            1.0 / self.num_actions as f64,
        )
    }

    fn num_actions(&self) -> usize {
        self.num_actions
    }
}

/// Softmax policy network over a discrete action catalog.
///
/// Architecture: `state_dim -> 256 -> 128 -> num_actions` with ReLU hidden
/// layers and a zero-initialized linear head, trained by advantage-weighted
/// policy gradient.
pub struct SoftmaxPolicy {
    network: Mlp,
    optimizer: Adam,
}

impl SoftmaxPolicy {
    /// Fresh policy with a uniform initial distribution
    #[must_use]
    pub fn new(state_dim: usize, num_actions: usize, learning_rate: f64, rng: &mut StdRng) -> Self {
        let network = Mlp::from_layers(vec![
            Dense::xavier(state_dim, 256, rng),
            Dense::xavier(256, 128, rng),
            Dense::zeros(128, num_actions),
        ]);
        let optimizer = Adam::new(&network, learning_rate);
        Self { network, optimizer }
    }

    /// The underlying network (checkpointing)
    #[must_use]
    pub fn network(&self) -> &Mlp {
        &self.network
    }

    /// Restore network parameters from a checkpoint
    pub fn set_network(&mut self, layers: Vec<Dense>) -> Result<()> {
        self.network.set_layers(layers)
    }

    /// Action probabilities for a single state
    #[must_use]
    pub fn probabilities(&self, state: &ArrayView1<f64>) -> Array1<f64> {
        let col = state.insert_axis(Axis(1));
        self.probabilities_batch(&col.view())
            .index_axis_move(Axis(1), 0)
    }

    /// Sample a catalog index and its log probability.
    ///
    /// Fails with [`KoopmanError::DegenerateDistribution`] when the network
    /// emits non-finite logits.
    pub fn sample(&self, state: &ArrayView1<f64>, rng: &mut StdRng) -> Result<(usize, f64)> {
        let probs = self.probabilities(state);
        let dist = WeightedIndex::new(probs.iter()).map_err(|e| {
            KoopmanError::DegenerateDistribution(format!(
                "policy network produced unusable probabilities: {e}"
            ))
        })?;
        let chosen = dist.sample(rng);
        Ok((chosen, probs[chosen].max(f64::MIN_POSITIVE).ln()))
    }

    /// One policy-gradient step over an episode.
    ///
    /// `states` is `(state_dim, T)`, `actions[t]` the chosen catalog index
    /// and `advantages[t]` the one-step advantage. Minimizes
    /// `-mean(log pi(a_t | x_t) * A_t)`; the advantage is treated as a
    /// constant, so the logit gradient of column `t` is
    /// `A_t * (probs - onehot(a_t)) / T`.
    pub fn policy_gradient_step(
        &mut self,
        states: &ArrayView2<f64>,
        actions: &[usize],
        advantages: &ArrayView1<f64>,
    ) -> Result<()> {
        let t_steps = states.ncols();
        if actions.len() != t_steps || advantages.len() != t_steps {
            return Err(KoopmanError::DimensionMismatch {
                expected: t_steps,
                actual: actions.len().min(advantages.len()),
            });
        }
        let (logits, cache) = self.network.forward_cached(states);
        let probs = softmax_columns(&logits);
        let mut grad = probs;
        for (t, (&a, &adv)) in actions.iter().zip(advantages).enumerate() {
            grad[[a, t]] -= 1.0;
            let scale = adv / t_steps as f64;
            grad.column_mut(t).mapv_inplace(|g| g * scale);
        }
        let (grads, _) = self.network.backward(&cache, &grad.view());
        self.optimizer.step(&mut self.network, &grads);
        Ok(())
    }
}

impl DiscretePolicy for SoftmaxPolicy {
    fn probabilities_batch(&self, states: &ArrayView2<f64>) -> Array2<f64> {
        let logits = self.network.forward(states);
        softmax_columns(&logits)
    }

    fn num_actions(&self) -> usize {
        self.network.out_dim()
    }
}

/// Column-wise softmax with max subtraction for stability
fn softmax_columns(logits: &Array2<f64>) -> Array2<f64> {
    let mut out = logits.clone();
    for mut col in out.axis_iter_mut(Axis(1)) {
        let max = col.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        col.mapv_inplace(|l| (l - max).exp());
        let sum: f64 = col.sum();
        col.mapv_inplace(|e| e / sum);
    }
    out
}
