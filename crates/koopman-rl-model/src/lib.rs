//! Koopman tensor model
//!
//! Data-driven linear approximation of nonlinear dynamics: states are lifted
//! into a dictionary (feature) space where the transition map is modelled by
//! a bilinear operator `K(u)`, fit once from snapshot data by least squares.
//! The fitted operator propagates feature-space expectations under arbitrary
//! action distributions without stepping the real system.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod observables;
pub mod regression;
pub mod tensor;

pub use observables::{Dictionary, Monomials};
pub use regression::{lstsq, Lstsq};
pub use tensor::{KoopmanTensor, SnapshotDataset};
