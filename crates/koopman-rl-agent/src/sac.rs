//! Soft actor-critic for continuous action spaces
//!
//! Squashed-Gaussian policy, twin Q networks with a min target, and a value
//! network tracked by a Polyak-averaged target copy. Gradients are written
//! out explicitly: the reparameterized sample keeps the noise fixed, so the
//! Gaussian log-density contributes `-1` per log-sigma and the rest of the
//! chain runs through the tanh squash and the Q input gradient.

use std::f64::consts::PI;
use std::path::PathBuf;

use ndarray::{concatenate, s, Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use koopman_rl_core::{BoxBounds, Environment, KoopmanError, Result, Transition};

use crate::buffer::ReplayBuffer;
use crate::checkpoint::{load_checkpoint, save_checkpoint};
use crate::nn::{Adam, ForwardCache, Mlp};

/// Additive noise in the squash correction denominator
const SQUASH_EPSILON: f64 = 1e-6;

/// SAC hyperparameters
#[derive(Debug, Clone)]
pub struct SoftActorCriticConfig {
    /// Discount factor
    pub gamma: f64,
    /// Polyak averaging rate for the target value network
    pub tau: f64,
    /// Adam step size shared by all networks
    pub learning_rate: f64,
    /// Replay minibatch size
    pub batch_size: usize,
    /// Replay buffer capacity
    pub buffer_capacity: usize,
    /// Multiplier on the reward in the Q target
    pub reward_scale: f64,
    /// Whether the scaled reward enters the Q target at all. Disabling it
    /// reproduces the reward-free bootstrap ablation.
    pub include_reward_in_target: bool,
    /// Clamp range for the policy's log-sigma head
    pub min_log_sigma: f64,
    /// Upper clamp for the policy's log-sigma head
    pub max_log_sigma: f64,
    /// Checkpoint cadence in episodes
    pub checkpoint_every: usize,
    /// Checkpoint destination; `None` disables checkpointing
    pub checkpoint_path: Option<PathBuf>,
    /// RNG seed for initialization, action noise, and replay sampling
    pub seed: u64,
}

impl Default for SoftActorCriticConfig {
    fn default() -> Self {
        Self {
            gamma: 0.99,
            tau: 0.005,
            learning_rate: 3e-4,
            batch_size: 256,
            buffer_capacity: 1_000_000,
            reward_scale: 2.0,
            include_reward_in_target: true,
            min_log_sigma: -30.0,
            max_log_sigma: 30.0,
            checkpoint_every: 250,
            checkpoint_path: None,
            seed: 0,
        }
    }
}

/// A reparameterized sample batch with everything the backward pass needs
pub struct PolicySample {
    /// Rescaled actions, `(action_dim, B)`
    pub actions: Array2<f64>,
    /// Squash-corrected log probabilities, `(B,)`
    pub log_probs: Array1<f64>,
    tanh_u: Array2<f64>,
    sigma: Array2<f64>,
    eps: Array2<f64>,
    clamped: Array2<bool>,
    cache: ForwardCache,
}

/// Squashed-Gaussian policy over box-bounded continuous actions.
///
/// One trunk feeds a fused head: the first `action_dim` output rows are the
/// mean, the rest the (clamped) log-sigma. Samples are squashed by tanh and
/// rescaled into the action box.
pub struct GaussianPolicy {
    network: Mlp,
    bounds: BoxBounds,
    min_log_sigma: f64,
    max_log_sigma: f64,
}

impl GaussianPolicy {
    /// Fresh policy for the given state dimension and action box
    #[must_use]
    pub fn new(
        state_dim: usize,
        bounds: BoxBounds,
        min_log_sigma: f64,
        max_log_sigma: f64,
        rng: &mut StdRng,
    ) -> Self {
        let action_dim = bounds.dim();
        let network = Mlp::new(&[state_dim, 256, 256, 2 * action_dim], rng);
        Self {
            network,
            bounds,
            min_log_sigma,
            max_log_sigma,
        }
    }

    /// The underlying network (checkpointing)
    #[must_use]
    pub fn network(&self) -> &Mlp {
        &self.network
    }

    fn action_dim(&self) -> usize {
        self.bounds.dim()
    }

    /// Half-width of the action box per dimension
    fn scale(&self) -> Array1<f64> {
        (&self.bounds.maximums - &self.bounds.minimums) * 0.5
    }

    /// Draw one action for environment interaction (no gradient bookkeeping)
    #[must_use]
    pub fn act(&self, state: &ArrayView1<f64>, rng: &mut StdRng) -> Array1<f64> {
        let col = state.insert_axis(Axis(1));
        let sample = self.sample_batch(&col.view(), rng);
        sample.actions.index_axis_move(Axis(1), 0)
    }

    /// Reparameterized sample over a column batch of states.
    ///
    /// `log_prob` per column sums, over action dimensions, the Gaussian
    /// log-density of the pre-squash draw minus the squash correction
    /// `ln(scale * (1 - tanh(u)^2) + eps)`.
    #[must_use]
    pub fn sample_batch(&self, states: &ArrayView2<f64>, rng: &mut StdRng) -> PolicySample {
        let action_dim = self.action_dim();
        let b = states.ncols();
        let (out, cache) = self.network.forward_cached(states);
        let mu = out.slice(s![..action_dim, ..]).to_owned();
        let raw_log_sigma = out.slice(s![action_dim.., ..]).to_owned();

        let mut clamped = Array2::from_elem((action_dim, b), false);
        let mut log_sigma = raw_log_sigma;
        for ((d, j), value) in log_sigma.indexed_iter_mut() {
            if *value < self.min_log_sigma {
                *value = self.min_log_sigma;
                clamped[[d, j]] = true;
            } else if *value > self.max_log_sigma {
                *value = self.max_log_sigma;
                clamped[[d, j]] = true;
            }
        }
        let sigma = log_sigma.mapv(f64::exp);
        let eps = Array2::from_shape_fn((action_dim, b), |_| rng.sample::<f64, _>(StandardNormal));

        let u = &mu + &(&sigma * &eps);
        let tanh_u = u.mapv(f64::tanh);

        let scale = self.scale();
        let mut actions = Array2::zeros((action_dim, b));
        let mut log_probs = Array1::zeros(b);
        for j in 0..b {
            for d in 0..action_dim {
                let t = tanh_u[[d, j]];
                actions[[d, j]] =
                    0.5 * (t + 1.0) * (self.bounds.maximums[d] - self.bounds.minimums[d])
                        + self.bounds.minimums[d];
                let gaussian = -0.5 * eps[[d, j]] * eps[[d, j]]
                    - sigma[[d, j]].ln()
                    - 0.5 * (2.0 * PI).ln();
                let correction = (scale[d] * (1.0 - t * t) + SQUASH_EPSILON).ln();
                log_probs[j] += gaussian - correction;
            }
        }

        PolicySample {
            actions,
            log_probs,
            tanh_u,
            sigma,
            eps,
            clamped,
            cache,
        }
    }

    /// Gradient of `mean(log_prob) - <q term>` with respect to the policy
    /// parameters, where `dq_da` is the loss gradient on the scaled actions
    /// (already including the batch normalization).
    ///
    /// Returns the gradient on the fused network output: mean rows on top,
    /// log-sigma rows below, with clamped log-sigma entries zeroed.
    fn output_gradient(&self, sample: &PolicySample, dq_da: &ArrayView2<f64>) -> Array2<f64> {
        let action_dim = self.action_dim();
        let b = sample.actions.ncols();
        let scale = self.scale();
        let inv_b = 1.0 / b as f64;
        let mut grad = Array2::zeros((2 * action_dim, b));
        for j in 0..b {
            for d in 0..action_dim {
                let t = sample.tanh_u[[d, j]];
                let dt = 1.0 - t * t;
                let denom = scale[d] * dt + SQUASH_EPSILON;
                // log_prob through the squash correction, plus the Q term
                // through action = scale * tanh(u) + offset
                let du = inv_b * 2.0 * scale[d] * t * dt / denom
                    + dq_da[[d, j]] * scale[d] * dt;
                grad[[d, j]] = du;
                grad[[action_dim + d, j]] = if sample.clamped[[d, j]] {
                    0.0
                } else {
                    du * sample.sigma[[d, j]] * sample.eps[[d, j]] - inv_b
                };
            }
        }
        grad
    }
}

/// Serialized SAC parameter state
#[derive(Serialize, Deserialize)]
struct SacCheckpoint {
    policy: Mlp,
    q1: Mlp,
    q2: Mlp,
    value: Mlp,
    target_value: Mlp,
    episodes_completed: usize,
}

/// Per-run training report
#[derive(Debug, Clone)]
pub struct SacTrainingSummary {
    /// Undiscounted total reward of each episode
    pub episode_rewards: Vec<f64>,
    /// Episodes completed over the agent's lifetime
    pub episodes_completed: usize,
}

/// Soft actor-critic agent with replay training
pub struct SoftActorCritic {
    policy: GaussianPolicy,
    q1: Mlp,
    q2: Mlp,
    value: Mlp,
    target_value: Mlp,
    policy_opt: Adam,
    q1_opt: Adam,
    q2_opt: Adam,
    value_opt: Adam,
    buffer: ReplayBuffer,
    config: SoftActorCriticConfig,
    state_dim: usize,
    rng: StdRng,
    episodes_completed: usize,
}

impl SoftActorCritic {
    /// Fresh agent; the target value network starts as an exact copy of the
    /// value network (a full Polyak step).
    #[must_use]
    pub fn fresh(
        state_dim: usize,
        action_bounds: BoxBounds,
        config: SoftActorCriticConfig,
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let action_dim = action_bounds.dim();
        let policy = GaussianPolicy::new(
            state_dim,
            action_bounds,
            config.min_log_sigma,
            config.max_log_sigma,
            &mut rng,
        );
        let q1 = Mlp::new(&[state_dim + action_dim, 256, 256, 1], &mut rng);
        let q2 = Mlp::new(&[state_dim + action_dim, 256, 256, 1], &mut rng);
        let value = Mlp::new(&[state_dim, 256, 256, 1], &mut rng);
        let target_value = value.clone();

        let policy_opt = Adam::new(policy.network(), config.learning_rate);
        let q1_opt = Adam::new(&q1, config.learning_rate);
        let q2_opt = Adam::new(&q2, config.learning_rate);
        let value_opt = Adam::new(&value, config.learning_rate);
        let buffer = ReplayBuffer::new(config.buffer_capacity);

        Self {
            policy,
            q1,
            q2,
            value,
            target_value,
            policy_opt,
            q1_opt,
            q2_opt,
            value_opt,
            buffer,
            config,
            state_dim,
            rng,
            episodes_completed: 0,
        }
    }

    /// Resume from a checkpoint; a missing or corrupt file is fatal.
    pub fn from_checkpoint(
        path: &std::path::Path,
        state_dim: usize,
        action_bounds: BoxBounds,
        config: SoftActorCriticConfig,
    ) -> Result<Self> {
        let checkpoint = load_checkpoint::<SacCheckpoint>(path)?;
        let mut agent = Self::fresh(state_dim, action_bounds, config);
        if checkpoint.policy.in_dim() != agent.policy.network().in_dim()
            || checkpoint.policy.out_dim() != agent.policy.network().out_dim()
        {
            return Err(KoopmanError::Checkpoint(format!(
                "policy architecture mismatch: expected {}x{}, got {}x{}",
                agent.policy.network().in_dim(),
                agent.policy.network().out_dim(),
                checkpoint.policy.in_dim(),
                checkpoint.policy.out_dim()
            )));
        }
        agent.policy.network = checkpoint.policy;
        agent.q1 = checkpoint.q1;
        agent.q2 = checkpoint.q2;
        agent.value = checkpoint.value;
        agent.target_value = checkpoint.target_value;
        agent.episodes_completed = checkpoint.episodes_completed;
        info!(
            episodes = agent.episodes_completed,
            path = %path.display(),
            "resumed soft actor-critic from checkpoint"
        );
        Ok(agent)
    }

    /// The policy under training
    #[must_use]
    pub fn policy(&self) -> &GaussianPolicy {
        &self.policy
    }

    /// Episodes completed over the agent's lifetime
    #[must_use]
    pub fn episodes_completed(&self) -> usize {
        self.episodes_completed
    }

    /// Transitions currently held in the replay buffer
    #[must_use]
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    /// Store one environment transition
    pub fn remember(&mut self, transition: Transition) {
        self.buffer.push(transition);
    }

    /// One gradient update from a replay minibatch. A no-op until the
    /// buffer holds at least one batch.
    pub fn learn(&mut self) -> Result<()> {
        if self.buffer.len() < self.config.batch_size {
            return Ok(());
        }
        let b = self.config.batch_size;
        let inv_b = 1.0 / b as f64;
        let batch = self.buffer.sample(b, &mut self.rng);

        // Target value of successor states, zeroed at terminals.
        let mut v_next = self.target_value.forward(&batch.next_states.view());
        for j in 0..b {
            if batch.dones[j] > 0.0 {
                v_next[[0, j]] = 0.0;
            }
        }

        // Value update: regress V(s) onto min Q(s, a~pi) - log pi(a|s).
        let sample = self.policy.sample_batch(&batch.states.view(), &mut self.rng);
        let q_in = concatenate(
            Axis(0),
            &[batch.states.view(), sample.actions.view()],
        )
        .map_err(|e| KoopmanError::Computation(e.to_string()))?;
        let q1_pi = self.q1.forward(&q_in.view());
        let q2_pi = self.q2.forward(&q_in.view());

        let (v_pred, v_cache) = self.value.forward_cached(&batch.states.view());
        let mut v_grad = Array2::zeros((1, b));
        for j in 0..b {
            let q_min = q1_pi[[0, j]].min(q2_pi[[0, j]]);
            let target = q_min - sample.log_probs[j];
            v_grad[[0, j]] = (v_pred[[0, j]] - target) * inv_b;
        }
        let (value_grads, _) = self.value.backward(&v_cache, &v_grad.view());
        self.value_opt.step(&mut self.value, &value_grads);

        // Actor update: minimize mean(log pi - min Q) with a fresh
        // reparameterized sample. The Q networks only supply the input
        // gradient here; their parameters move in the critic update below.
        let sample = self.policy.sample_batch(&batch.states.view(), &mut self.rng);
        let q_in = concatenate(
            Axis(0),
            &[batch.states.view(), sample.actions.view()],
        )
        .map_err(|e| KoopmanError::Computation(e.to_string()))?;
        let (q1_pi, q1_cache) = self.q1.forward_cached(&q_in.view());
        let (q2_pi, q2_cache) = self.q2.forward_cached(&q_in.view());
        let mut q1_mask = Array2::zeros((1, b));
        let mut q2_mask = Array2::zeros((1, b));
        for j in 0..b {
            if q1_pi[[0, j]] <= q2_pi[[0, j]] {
                q1_mask[[0, j]] = -inv_b;
            } else {
                q2_mask[[0, j]] = -inv_b;
            }
        }
        let (_, din1) = self.q1.backward(&q1_cache, &q1_mask.view());
        let (_, din2) = self.q2.backward(&q2_cache, &q2_mask.view());
        let din = din1 + din2;
        let dq_da = din.slice(s![self.state_dim.., ..]);
        let policy_out_grad = self.policy.output_gradient(&sample, &dq_da);
        let (policy_grads, _) = self
            .policy
            .network
            .backward(&sample.cache, &policy_out_grad.view());
        self.policy_opt.step(&mut self.policy.network, &policy_grads);

        // Critic update against the bootstrapped target.
        let q_in_replay = concatenate(
            Axis(0),
            &[batch.states.view(), batch.actions.view()],
        )
        .map_err(|e| KoopmanError::Computation(e.to_string()))?;
        let (q1_old, q1_cache) = self.q1.forward_cached(&q_in_replay.view());
        let (q2_old, q2_cache) = self.q2.forward_cached(&q_in_replay.view());
        let mut q1_grad = Array2::zeros((1, b));
        let mut q2_grad = Array2::zeros((1, b));
        for j in 0..b {
            let mut q_hat = self.config.gamma * v_next[[0, j]];
            if self.config.include_reward_in_target {
                q_hat += self.config.reward_scale * batch.rewards[j];
            }
            q1_grad[[0, j]] = (q1_old[[0, j]] - q_hat) * inv_b;
            q2_grad[[0, j]] = (q2_old[[0, j]] - q_hat) * inv_b;
        }
        let (q1_grads, _) = self.q1.backward(&q1_cache, &q1_grad.view());
        let (q2_grads, _) = self.q2.backward(&q2_cache, &q2_grad.view());
        self.q1_opt.step(&mut self.q1, &q1_grads);
        self.q2_opt.step(&mut self.q2, &q2_grads);

        self.target_value
            .soft_update_from(&self.value, self.config.tau);
        Ok(())
    }

    /// Replay-buffer training loop: act, store, learn once per step.
    pub fn train(
        &mut self,
        env: &mut dyn Environment,
        episodes: usize,
        steps_per_episode: usize,
    ) -> Result<SacTrainingSummary> {
        let mut episode_rewards = Vec::with_capacity(episodes);
        for _ in 0..episodes {
            let mut state = env.reset(&mut self.rng);
            let mut total = 0.0;
            for _ in 0..steps_per_episode {
                let action = self.policy.act(&state.view(), &mut self.rng);
                let step = env.step(&action.view(), &mut self.rng)?;
                total += step.reward;
                let done = step.done;
                self.remember(Transition {
                    state: state.clone(),
                    action,
                    reward: step.reward,
                    next_state: step.state.clone(),
                    done,
                });
                self.learn()?;
                state = step.state;
                if done || step.truncated {
                    break;
                }
            }
            episode_rewards.push(total);
            self.episodes_completed += 1;
            if self.episodes_completed % self.config.checkpoint_every == 0 {
                self.write_checkpoint();
            }
        }
        info!(
            episodes,
            lifetime = self.episodes_completed,
            "soft actor-critic training run finished"
        );
        Ok(SacTrainingSummary {
            episode_rewards,
            episodes_completed: self.episodes_completed,
        })
    }

    /// Best-effort checkpoint write; failures are logged and training
    /// continues.
    fn write_checkpoint(&self) {
        let Some(path) = &self.config.checkpoint_path else {
            return;
        };
        let checkpoint = SacCheckpoint {
            policy: self.policy.network.clone(),
            q1: self.q1.clone(),
            q2: self.q2.clone(),
            value: self.value.clone(),
            target_value: self.target_value.clone(),
            episodes_completed: self.episodes_completed,
        };
        if let Err(e) = save_checkpoint(path, &checkpoint) {
            warn!(path = %path.display(), error = %e, "checkpoint write failed");
        }
    }
}
