//! Per-episode bookkeeping

use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Single transition for replay storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transition {
    /// State before the action
    pub state: Array1<f64>,
    /// Action taken
    pub action: Array1<f64>,
    /// Reward received
    pub reward: f64,
    /// State after the action
    pub next_state: Array1<f64>,
    /// Whether the episode ended at this transition
    pub done: bool,
}

/// Ephemeral record of one episode, kept only long enough to compute the
/// advantage and gradient step, then discarded.
#[derive(Debug, Clone, Default)]
pub struct EpisodeLog {
    /// Critic value at each visited state
    pub values: Vec<f64>,
    /// Critic value at each successor state
    pub next_values: Vec<f64>,
    /// Log probability of each chosen action
    pub log_probs: Vec<f64>,
    /// Reward at each step
    pub rewards: Vec<f64>,
}

impl EpisodeLog {
    /// Empty log with reserved capacity for one episode
    #[must_use]
    pub fn with_capacity(steps: usize) -> Self {
        Self {
            values: Vec::with_capacity(steps),
            next_values: Vec::with_capacity(steps),
            log_probs: Vec::with_capacity(steps),
            rewards: Vec::with_capacity(steps),
        }
    }

    /// Number of recorded steps
    #[must_use]
    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    /// Whether the log is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    /// Record one step
    pub fn push(&mut self, value: f64, next_value: f64, log_prob: f64, reward: f64) {
        self.values.push(value);
        self.next_values.push(next_value);
        self.log_probs.push(log_prob);
        self.rewards.push(reward);
    }

    /// Discounted returns, walking the rewards backwards.
    ///
    /// `discount` is the per-step factor, i.e. `gamma^dt` for a system with
    /// physical timestep `dt`.
    #[must_use]
    pub fn returns(&self, discount: f64) -> Array1<f64> {
        let mut returns = Array1::zeros(self.len());
        let mut running = 0.0;
        for i in (0..self.len()).rev() {
            running = self.rewards[i] + discount * running;
            returns[i] = running;
        }
        returns
    }

    /// One-step advantage `r + discount * V(x') - V(x)` per step
    #[must_use]
    pub fn advantages(&self, discount: f64) -> Array1<f64> {
        Array1::from_iter(
            self.rewards
                .iter()
                .zip(&self.next_values)
                .zip(&self.values)
                .map(|((r, v_next), v)| r + discount * v_next - v),
        )
    }

    /// Total discounted reward of the episode
    #[must_use]
    pub fn discounted_total(&self, discount: f64) -> f64 {
        self.rewards
            .iter()
            .rev()
            .fold(0.0, |acc, r| r + discount * acc)
    }
}
