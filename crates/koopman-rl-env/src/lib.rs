//! Simulated dynamical systems for Koopman-operator reinforcement learning
//!
//! Each system implements the core `Dynamics` contract: a pure push-forward
//! over one physical timestep with a batched quadratic cost and explicit
//! state/action bounds. `EpisodeRunner` adapts any of them to the stateful
//! `Environment` interface for replay-buffer agents, and `dataset` collects
//! snapshot triples for operator fitting.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cartpole;
pub mod dataset;
pub mod double_well;
pub mod linear;
pub mod lorenz;
pub mod runner;

pub use cartpole::CartPole;
pub use dataset::{collect_snapshots, collect_trajectories};
pub use double_well::DoubleWell;
pub use linear::LinearSystem;
pub use lorenz::Lorenz;
pub use runner::EpisodeRunner;
