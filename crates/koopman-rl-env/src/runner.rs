//! Stateful episode adapter over a `Dynamics`

use ndarray::{Array1, ArrayView1};
use rand::rngs::StdRng;

use koopman_rl_core::{Dynamics, Environment, KoopmanError, Result, Step};

/// Wraps a pure `Dynamics` into the stateful `Environment` interface used by
/// replay-buffer agents. Rewards are the negated cost, episodes end at
/// terminal states and truncate at a fixed step limit.
pub struct EpisodeRunner<D> {
    dynamics: D,
    state: Array1<f64>,
    steps: usize,
    max_steps: usize,
}

impl<D: Dynamics> EpisodeRunner<D> {
    /// Runner with a per-episode step limit
    #[must_use]
    pub fn new(dynamics: D, max_steps: usize) -> Self {
        let state_dim = dynamics.state_dim();
        Self {
            dynamics,
            state: Array1::zeros(state_dim),
            steps: 0,
            max_steps,
        }
    }

    /// The wrapped dynamics
    #[must_use]
    pub fn dynamics(&self) -> &D {
        &self.dynamics
    }

    /// The current state
    #[must_use]
    pub fn state(&self) -> ArrayView1<f64> {
        self.state.view()
    }
}

impl<D: Dynamics> Environment for EpisodeRunner<D> {
    fn state_dim(&self) -> usize {
        self.dynamics.state_dim()
    }

    fn action_dim(&self) -> usize {
        self.dynamics.action_dim()
    }

    fn reset(&mut self, rng: &mut StdRng) -> Array1<f64> {
        self.state = self.dynamics.state_bounds().sample(rng);
        self.steps = 0;
        self.state.clone()
    }

    fn step(&mut self, action: &ArrayView1<f64>, rng: &mut StdRng) -> Result<Step> {
        if action.len() != self.dynamics.action_dim() {
            return Err(KoopmanError::DimensionMismatch {
                expected: self.dynamics.action_dim(),
                actual: action.len(),
            });
        }
        let reward = -self
            .dynamics
            .cost()
            .single(&self.state.view(), action);
        let next = self.dynamics.step(&self.state.view(), action, rng);
        self.steps += 1;
        let done = self.dynamics.is_terminal(&next.view());
        let truncated = !done && self.steps >= self.max_steps;
        self.state = next.clone();
        Ok(Step {
            state: next,
            reward,
            done,
            truncated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartpole::CartPole;
    use crate::linear::LinearSystem;
    use ndarray::array;
    use rand::SeedableRng;

    #[test]
    fn truncates_at_the_step_limit() {
        let system = LinearSystem::new(array![[0.5]], array![[1.0]]).unwrap();
        let mut runner = EpisodeRunner::new(system, 3);
        let mut rng = StdRng::seed_from_u64(0);
        runner.reset(&mut rng);
        let action = array![0.0];
        for i in 1..=3 {
            let step = runner.step(&action.view(), &mut rng).unwrap();
            assert_eq!(step.truncated, i == 3);
            assert!(!step.done);
        }
    }

    #[test]
    fn terminal_state_ends_the_episode() {
        let mut runner = EpisodeRunner::new(CartPole::new(), 1000);
        let mut rng = StdRng::seed_from_u64(1);
        runner.reset(&mut rng);
        // Push right every step; the pole must fall over well before the
        // step limit.
        let push_right = array![1.0];
        let mut done = false;
        for _ in 0..1000 {
            let step = runner.step(&push_right.view(), &mut rng).unwrap();
            if step.done {
                done = true;
                break;
            }
        }
        assert!(done);
    }

    #[test]
    fn reward_is_negated_cost_of_the_visited_state() {
        let system = LinearSystem::new(array![[1.0]], array![[1.0]]).unwrap();
        let mut runner = EpisodeRunner::new(system, 10);
        let mut rng = StdRng::seed_from_u64(2);
        runner.reset(&mut rng);
        let x = runner.state()[0];
        let step = runner.step(&array![0.5].view(), &mut rng).unwrap();
        let expected = -(x * x + 0.5 * 0.5);
        approx::assert_relative_eq!(step.reward, expected, epsilon = 1e-12);
    }

    #[test]
    fn wrong_action_dimension_is_rejected() {
        let system = LinearSystem::new(array![[1.0]], array![[1.0]]).unwrap();
        let mut runner = EpisodeRunner::new(system, 10);
        let mut rng = StdRng::seed_from_u64(3);
        runner.reset(&mut rng);
        assert!(runner.step(&array![0.0, 1.0].view(), &mut rng).is_err());
    }
}
