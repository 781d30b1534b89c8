//! Policy-learning agents over the Koopman tensor model
//!
//! Two agent families share the fitted operator:
//!
//! - A discrete actor-critic whose critic is linear in the state dictionary
//!   and refit in closed form through the model's expectation propagation,
//!   paired with a softmax network actor trained by policy gradient.
//! - A soft actor-critic for continuous actions, with a squashed Gaussian
//!   policy, twin Q networks, and Polyak-averaged value targets.
//!
//! Both expose `fresh` / `from_checkpoint` construction and periodic
//! checkpointing through serde.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod actor;
pub mod actor_critic;
pub mod buffer;
pub mod checkpoint;
pub mod critic;
pub mod nn;
pub mod sac;

pub use actor::{DiscretePolicy, SoftmaxPolicy, UniformPolicy};
pub use actor_critic::{ActorCritic, ActorCriticConfig, TrainingSummary};
pub use buffer::{Minibatch, ReplayBuffer};
pub use checkpoint::{load_checkpoint, save_checkpoint, Checkpoint};
pub use critic::{CriticConfig, ValueFunction};
pub use nn::{Adam, Dense, Mlp};
pub use sac::{
    GaussianPolicy, PolicySample, SacTrainingSummary, SoftActorCritic, SoftActorCriticConfig,
};
