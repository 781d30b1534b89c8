//! Dynamics and environment contracts

use ndarray::{Array1, ArrayView1};
use rand::rngs::StdRng;

use crate::{BoxBounds, CostFunction};

/// The black-box transition contract of a simulated physical system.
///
/// `step` pushes a state forward by one physical timestep `dt` under a
/// constant action. Stochastic systems draw their noise from the explicit
/// generator; deterministic systems ignore it. The same `step` is used for
/// snapshot-dataset collection and for true-dynamics training rollouts.
pub trait Dynamics: Send + Sync {
    /// State dimensionality
    fn state_dim(&self) -> usize;

    /// Action dimensionality
    fn action_dim(&self) -> usize;

    /// Physical timestep of one `step` call
    fn dt(&self) -> f64;

    /// Push a state forward by one timestep
    fn step(&self, state: &ArrayView1<f64>, action: &ArrayView1<f64>, rng: &mut StdRng)
        -> Array1<f64>;

    /// The cost function of the system (batched; see [`CostFunction`])
    fn cost(&self) -> &dyn CostFunction;

    /// Bounds used for sampling initial conditions
    fn state_bounds(&self) -> &BoxBounds;

    /// Bounds of the admissible action range
    fn action_bounds(&self) -> &BoxBounds;

    /// Whether a state terminates an episode early (e.g. pole fell over).
    /// Most of the simulated systems run for a fixed horizon only.
    fn is_terminal(&self, _state: &ArrayView1<f64>) -> bool {
        false
    }
}

/// Result of a single environment step
#[derive(Debug, Clone)]
pub struct Step {
    /// State after the transition
    pub state: Array1<f64>,
    /// Reward signal (negated cost)
    pub reward: f64,
    /// Whether the episode terminated
    pub done: bool,
    /// Whether the episode hit its step limit without terminating
    pub truncated: bool,
}

/// Stateful episode interface over a dynamical system, used by the
/// replay-buffer agents that interleave acting and learning.
pub trait Environment: Send {
    /// State dimensionality
    fn state_dim(&self) -> usize;

    /// Action dimensionality
    fn action_dim(&self) -> usize;

    /// Reset to a fresh initial state and return it
    fn reset(&mut self, rng: &mut StdRng) -> Array1<f64>;

    /// Apply an action and advance one step
    fn step(&mut self, action: &ArrayView1<f64>, rng: &mut StdRng) -> crate::Result<Step>;
}
