//! Fixed-capacity replay buffer with uniform sampling

use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::Rng;

use koopman_rl_core::Transition;

/// Ring-buffer replay storage; once full, new transitions overwrite the
/// oldest ones.
#[derive(Debug, Clone)]
pub struct ReplayBuffer {
    storage: Vec<Transition>,
    capacity: usize,
    cursor: usize,
}

/// Column-major minibatch drawn from the buffer
#[derive(Debug, Clone)]
pub struct Minibatch {
    /// States, `(state_dim, B)`
    pub states: Array2<f64>,
    /// Actions, `(action_dim, B)`
    pub actions: Array2<f64>,
    /// Rewards, `(B,)`
    pub rewards: Array1<f64>,
    /// Successor states, `(state_dim, B)`
    pub next_states: Array2<f64>,
    /// Terminal flags, `(B,)` with 1.0 for done
    pub dones: Array1<f64>,
}

impl ReplayBuffer {
    /// Empty buffer holding at most `capacity` transitions. Capacity is
    /// clamped to at least one slot.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            storage: Vec::with_capacity(capacity.min(1 << 20)),
            capacity,
            cursor: 0,
        }
    }

    /// Number of stored transitions
    #[must_use]
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// Whether the buffer holds no transitions
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Store a transition, evicting the oldest when at capacity
    pub fn push(&mut self, transition: Transition) {
        if self.storage.len() < self.capacity {
            self.storage.push(transition);
        } else {
            self.storage[self.cursor] = transition;
        }
        self.cursor = (self.cursor + 1) % self.capacity;
    }

    /// Draw a uniform minibatch with replacement
    #[must_use]
    pub fn sample(&self, batch_size: usize, rng: &mut StdRng) -> Minibatch {
        let state_dim = self.storage[0].state.len();
        let action_dim = self.storage[0].action.len();
        let mut states = Array2::zeros((state_dim, batch_size));
        let mut actions = Array2::zeros((action_dim, batch_size));
        let mut rewards = Array1::zeros(batch_size);
        let mut next_states = Array2::zeros((state_dim, batch_size));
        let mut dones = Array1::zeros(batch_size);
        for j in 0..batch_size {
            let t = &self.storage[rng.gen_range(0..self.storage.len())];
            states.column_mut(j).assign(&t.state);
            actions.column_mut(j).assign(&t.action);
            rewards[j] = t.reward;
            next_states.column_mut(j).assign(&t.next_state);
            dones[j] = if t.done { 1.0 } else { 0.0 };
        }
        Minibatch {
            states,
            actions,
            rewards,
            next_states,
            dones,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::SeedableRng;

    fn transition(value: f64) -> Transition {
        Transition {
            state: array![value],
            action: array![0.0],
            reward: value,
            next_state: array![value + 1.0],
            done: false,
        }
    }

    #[test]
    fn evicts_oldest_when_full() {
        let mut buffer = ReplayBuffer::new(3);
        for i in 0..5 {
            buffer.push(transition(i as f64));
        }
        assert_eq!(buffer.len(), 3);
        let stored: Vec<f64> = buffer.storage.iter().map(|t| t.reward).collect();
        // 0 and 1 were overwritten by 3 and 4
        assert!(stored.contains(&2.0));
        assert!(stored.contains(&3.0));
        assert!(stored.contains(&4.0));
    }

    #[test]
    fn zero_capacity_is_clamped_to_one_slot() {
        let mut buffer = ReplayBuffer::new(0);
        buffer.push(transition(1.0));
        buffer.push(transition(2.0));
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.storage[0].reward, 2.0);
    }

    #[test]
    fn minibatch_shapes_and_contents() {
        let mut buffer = ReplayBuffer::new(10);
        for i in 0..10 {
            buffer.push(transition(i as f64));
        }
        let mut rng = StdRng::seed_from_u64(0);
        let batch = buffer.sample(4, &mut rng);
        assert_eq!(batch.states.dim(), (1, 4));
        assert_eq!(batch.actions.dim(), (1, 4));
        assert_eq!(batch.rewards.len(), 4);
        for j in 0..4 {
            assert_eq!(batch.next_states[[0, j]], batch.states[[0, j]] + 1.0);
        }
    }
}
