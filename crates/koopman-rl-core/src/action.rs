//! Discretized action catalogs

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

/// An ordered, finite set of representative action column vectors.
///
/// Value-iteration-style methods discretize a continuous action space into a
/// catalog and sweep the whole catalog in batched tensor contractions. The
/// column order is part of the contract: policies emit probabilities indexed
/// by catalog position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionCatalog {
    actions: Array2<f64>,
}

impl ActionCatalog {
    /// Create a catalog from a `(action_dim, num_actions)` matrix of columns.
    pub fn new(actions: Array2<f64>) -> crate::Result<Self> {
        if actions.ncols() == 0 {
            return Err(crate::KoopmanError::Policy(
                "action catalog must contain at least one action".into(),
            ));
        }
        Ok(Self { actions })
    }

    /// Evenly spaced one-dimensional catalog over `[minimum, maximum]`.
    pub fn linspace(minimum: f64, maximum: f64, num_actions: usize) -> crate::Result<Self> {
        Self::new(
            Array1::linspace(minimum, maximum, num_actions)
                .into_shape((1, num_actions))
                .map_err(|e| crate::KoopmanError::Computation(e.to_string()))?,
        )
    }

    /// Number of actions in the catalog
    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.ncols()
    }

    /// Whether the catalog is empty (never true for a constructed catalog)
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.ncols() == 0
    }

    /// Dimension of a single action vector
    #[must_use]
    pub fn action_dim(&self) -> usize {
        self.actions.nrows()
    }

    /// The action column at catalog index `i`
    #[must_use]
    pub fn action(&self, i: usize) -> ArrayView1<f64> {
        self.actions.column(i)
    }

    /// View of the full `(action_dim, num_actions)` matrix
    #[must_use]
    pub fn view(&self) -> ArrayView2<f64> {
        self.actions.view()
    }
}
