//! Discrete actor-critic training loop
//!
//! Rolls episodes against the true dynamics while the critic bootstraps
//! through the fitted Koopman tensor. One actor gradient step and one full
//! critic refit per episode, with periodic JSON checkpoints.

use std::path::PathBuf;

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn};

use koopman_rl_core::{ActionCatalog, Dynamics, EpisodeLog, Result};
use koopman_rl_model::KoopmanTensor;

use crate::actor::SoftmaxPolicy;
use crate::checkpoint::{load_checkpoint, save_checkpoint, Checkpoint};
use crate::critic::{CriticConfig, ValueFunction};

/// Hyperparameters of the discrete actor-critic
#[derive(Debug, Clone)]
pub struct ActorCriticConfig {
    /// Discount base, coupled to the system timestep as `gamma^dt`
    pub gamma: f64,
    /// Adam step size of the actor
    pub actor_learning_rate: f64,
    /// Snapshot columns per critic refit
    pub critic_batch_size: usize,
    /// Whether the expected reward enters the critic regression target
    pub include_reward_in_target: bool,
    /// Checkpoint cadence in episodes
    pub checkpoint_every: usize,
    /// Checkpoint destination; `None` disables checkpointing
    pub checkpoint_path: Option<PathBuf>,
    /// RNG seed for action sampling and refit batches
    pub seed: u64,
}

impl Default for ActorCriticConfig {
    fn default() -> Self {
        Self {
            gamma: 0.99,
            actor_learning_rate: 3e-3,
            critic_batch_size: 4096,
            include_reward_in_target: true,
            checkpoint_every: 250,
            checkpoint_path: None,
            seed: 0,
        }
    }
}

/// Per-run training report
#[derive(Debug, Clone)]
pub struct TrainingSummary {
    /// Undiscounted total reward of each episode
    pub episode_rewards: Vec<f64>,
    /// Episodes completed over the agent's lifetime
    pub episodes_completed: usize,
}

/// Discrete-catalog actor-critic over a fitted Koopman tensor
pub struct ActorCritic {
    tensor: KoopmanTensor,
    catalog: ActionCatalog,
    actor: SoftmaxPolicy,
    critic: ValueFunction,
    config: ActorCriticConfig,
    rng: StdRng,
    episodes_completed: usize,
}

impl ActorCritic {
    /// Fresh agent with a uniform initial policy and a zero critic
    #[must_use]
    pub fn fresh(
        tensor: KoopmanTensor,
        catalog: ActionCatalog,
        dt: f64,
        config: ActorCriticConfig,
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let state_dim = tensor.dataset().states().nrows();
        let actor = SoftmaxPolicy::new(
            state_dim,
            catalog.len(),
            config.actor_learning_rate,
            &mut rng,
        );
        let critic_config = CriticConfig {
            gamma: config.gamma,
            dt,
            batch_size: config.critic_batch_size,
            include_reward_in_target: config.include_reward_in_target,
        };
        let critic = ValueFunction::new(tensor.phi_dim(), critic_config);
        Self {
            tensor,
            catalog,
            actor,
            critic,
            config,
            rng,
            episodes_completed: 0,
        }
    }

    /// Resume from a checkpoint. A missing or corrupt file is fatal; the
    /// caller decides whether to fall back to [`ActorCritic::fresh`].
    pub fn from_checkpoint(
        path: &std::path::Path,
        tensor: KoopmanTensor,
        catalog: ActionCatalog,
        dt: f64,
        config: ActorCriticConfig,
    ) -> Result<Self> {
        let checkpoint = load_checkpoint::<Checkpoint>(path)?;
        let mut agent = Self::fresh(tensor, catalog, dt, config);
        agent.actor.set_network(checkpoint.policy_layers)?;
        agent.critic.set_weights(checkpoint.value_weights)?;
        agent.episodes_completed = checkpoint.episodes_completed;
        info!(
            episodes = agent.episodes_completed,
            path = %path.display(),
            "resumed actor-critic from checkpoint"
        );
        Ok(agent)
    }

    /// The policy under training
    #[must_use]
    pub fn actor(&self) -> &SoftmaxPolicy {
        &self.actor
    }

    /// The critic under training
    #[must_use]
    pub fn critic(&self) -> &ValueFunction {
        &self.critic
    }

    /// Episodes completed over the agent's lifetime
    #[must_use]
    pub fn episodes_completed(&self) -> usize {
        self.episodes_completed
    }

    /// Run the training loop for `episodes` episodes of at most
    /// `steps_per_episode` true-dynamics steps each.
    pub fn train(
        &mut self,
        dynamics: &dyn Dynamics,
        episodes: usize,
        steps_per_episode: usize,
    ) -> Result<TrainingSummary> {
        let discount = self.critic.discount();
        let mut episode_rewards = Vec::with_capacity(episodes);

        for _ in 0..episodes {
            let mut state = dynamics.state_bounds().sample(&mut self.rng);
            let mut log = EpisodeLog::with_capacity(steps_per_episode);
            let mut visited = Array2::zeros((dynamics.state_dim(), steps_per_episode));
            let mut chosen = Vec::with_capacity(steps_per_episode);

            for step in 0..steps_per_episode {
                let value = self.critic.value(&self.tensor, &state.view());
                let (index, log_prob) = self.actor.sample(&state.view(), &mut self.rng)?;
                let action = self.catalog.action(index).to_owned();
                let next_state = dynamics.step(&state.view(), &action.view(), &mut self.rng);
                let reward = -dynamics.cost().single(&state.view(), &action.view());
                let next_value = self.critic.value(&self.tensor, &next_state.view());

                visited.column_mut(step).assign(&state);
                chosen.push(index);
                log.push(value, next_value, log_prob, reward);
                state = next_state;
                if dynamics.is_terminal(&state.view()) {
                    break;
                }
            }

            let steps = log.len();
            let advantages = log.advantages(discount);
            let states = visited.slice(ndarray::s![.., ..steps]).to_owned();
            self.actor
                .policy_gradient_step(&states.view(), &chosen, &advantages.view())?;
            self.critic.refit(
                &self.actor,
                &self.tensor,
                &self.catalog,
                dynamics.cost(),
                &mut self.rng,
            )?;

            episode_rewards.push(log.rewards.iter().sum());
            self.episodes_completed += 1;

            if self.episodes_completed % self.config.checkpoint_every == 0 {
                self.write_checkpoint();
            }
        }

        info!(
            episodes,
            lifetime = self.episodes_completed,
            "actor-critic training run finished"
        );
        Ok(TrainingSummary {
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
        let checkpoint = Checkpoint {
            policy_layers: self.actor.network().layers().to_vec(),
            value_weights: self.critic.weights().to_owned(),
            episodes_completed: self.episodes_completed,
        };
        if let Err(e) = save_checkpoint(path, &checkpoint) {
            warn!(path = %path.display(), error = %e, "checkpoint write failed");
        }
    }
}
