//! Core traits and types for Koopman-operator reinforcement learning
//!
//! This crate provides the foundational abstractions shared by the Koopman
//! tensor model, the policy-learning agents, and the simulated environments:
//! state bounds, action catalogs, batched cost functions, the dynamics and
//! environment contracts, and episode bookkeeping.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod action;
pub mod cost;
pub mod dynamics;
pub mod error;
pub mod state;
pub mod trajectory;

// Re-export core traits and types
pub use action::ActionCatalog;
pub use cost::{CostFunction, QuadraticCost};
pub use dynamics::{Dynamics, Environment, Step};
pub use error::{KoopmanError, Result};
pub use state::BoxBounds;
pub use trajectory::{EpisodeLog, Transition};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        ActionCatalog, BoxBounds, CostFunction, Dynamics, Environment, KoopmanError,
        QuadraticCost, Result, Step,
    };
}
