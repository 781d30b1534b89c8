//! Snapshot dataset collection
//!
//! The operator fit consumes `(X, Y, U)` triples. Snapshots can be drawn
//! independently (uniform states and actions, one step each) or along
//! episodic rollouts under a uniform random action policy.

use ndarray::Array2;
use rand::rngs::StdRng;
use tracing::debug;

use koopman_rl_core::{Dynamics, Result};
use koopman_rl_model::SnapshotDataset;

/// Independent snapshots: states and actions drawn uniformly from their
/// bounds, each pushed forward one step.
pub fn collect_snapshots(
    dynamics: &dyn Dynamics,
    samples: usize,
    rng: &mut StdRng,
) -> Result<SnapshotDataset> {
    let x = dynamics.state_bounds().sample_columns(samples, rng);
    let u = dynamics.action_bounds().sample_columns(samples, rng);
    let mut y = Array2::zeros((dynamics.state_dim(), samples));
    for i in 0..samples {
        let next = dynamics.step(&x.column(i), &u.column(i), rng);
        y.column_mut(i).assign(&next);
    }
    debug!(samples, "collected independent snapshots");
    SnapshotDataset::new(x, y, u)
}

/// Episodic snapshots: roll `episodes` trajectories of `steps` transitions
/// under uniform random actions, restarting early at terminal states.
pub fn collect_trajectories(
    dynamics: &dyn Dynamics,
    episodes: usize,
    steps: usize,
    rng: &mut StdRng,
) -> Result<SnapshotDataset> {
    let total = episodes * steps;
    let mut x = Array2::zeros((dynamics.state_dim(), total));
    let mut y = Array2::zeros((dynamics.state_dim(), total));
    let mut u = Array2::zeros((dynamics.action_dim(), total));
    let mut i = 0;
    for _ in 0..episodes {
        let mut state = dynamics.state_bounds().sample(rng);
        for _ in 0..steps {
            let action = dynamics.action_bounds().sample(rng);
            let next = dynamics.step(&state.view(), &action.view(), rng);
            x.column_mut(i).assign(&state);
            u.column_mut(i).assign(&action);
            y.column_mut(i).assign(&next);
            i += 1;
            if dynamics.is_terminal(&next.view()) {
                state = dynamics.state_bounds().sample(rng);
            } else {
                state = next;
            }
        }
    }
    debug!(episodes, steps, "collected trajectory snapshots");
    SnapshotDataset::new(x, y, u)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linear::LinearSystem;
    use approx::assert_relative_eq;
    use ndarray::array;
    use rand::SeedableRng;

    #[test]
    fn snapshots_are_consistent_transitions() {
        let system = LinearSystem::new(array![[0.5]], array![[1.0]]).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let dataset = collect_snapshots(&system, 50, &mut rng).unwrap();
        assert_eq!(dataset.len(), 50);
        for i in 0..dataset.len() {
            let expected = 0.5 * dataset.states()[[0, i]] + dataset.actions()[[0, i]];
            assert_relative_eq!(dataset.next_states()[[0, i]], expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn trajectories_chain_states() {
        let system = LinearSystem::new(array![[0.5]], array![[1.0]]).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let dataset = collect_trajectories(&system, 2, 10, &mut rng).unwrap();
        assert_eq!(dataset.len(), 20);
        // Within an episode, each next state is the following sample's state.
        for i in 0..9 {
            assert_relative_eq!(
                dataset.next_states()[[0, i]],
                dataset.states()[[0, i + 1]],
                epsilon = 1e-12
            );
        }
    }
}
