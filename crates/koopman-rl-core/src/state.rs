//! State bounds and sampling

use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Axis-aligned box bounds over a continuous state or action space.
///
/// Used for sampling initial conditions and for scaling squashed policy
/// outputs back into the admissible range. Sampling takes an explicit
/// generator so that reproducibility stays local to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxBounds {
    /// Lower bound per dimension
    pub minimums: Array1<f64>,
    /// Upper bound per dimension
    pub maximums: Array1<f64>,
}

impl BoxBounds {
    /// Create new bounds; the two vectors must agree in length.
    pub fn new(minimums: Array1<f64>, maximums: Array1<f64>) -> crate::Result<Self> {
        if minimums.len() != maximums.len() {
            return Err(crate::KoopmanError::DimensionMismatch {
                expected: minimums.len(),
                actual: maximums.len(),
            });
        }
        Ok(Self { minimums, maximums })
    }

    /// Symmetric bounds `[-range, range]^dim`
    #[must_use]
    pub fn symmetric(dim: usize, range: f64) -> Self {
        Self {
            minimums: Array1::from_elem(dim, -range),
            maximums: Array1::from_elem(dim, range),
        }
    }

    /// Dimensionality of the box
    #[must_use]
    pub fn dim(&self) -> usize {
        self.minimums.len()
    }

    /// Check whether a point lies inside the box
    #[must_use]
    pub fn contains(&self, point: &ndarray::ArrayView1<f64>) -> bool {
        point.len() == self.dim()
            && point
                .iter()
                .zip(&self.minimums)
                .zip(&self.maximums)
                .all(|((x, lo), hi)| x >= lo && x <= hi)
    }

    /// Sample one point uniformly from the box
    pub fn sample(&self, rng: &mut StdRng) -> Array1<f64> {
        Array1::from_iter(
            self.minimums
                .iter()
                .zip(&self.maximums)
                .map(|(lo, hi)| rng.gen_range(*lo..*hi)),
        )
    }

    /// Sample `n` points uniformly, one per column of the result
    pub fn sample_columns(&self, n: usize, rng: &mut StdRng) -> Array2<f64> {
        let mut out = Array2::zeros((self.dim(), n));
        for mut col in out.columns_mut() {
            col.assign(&self.sample(rng));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::SeedableRng;

    #[test]
    fn sample_stays_in_bounds() {
        let bounds = BoxBounds::new(array![-2.0, 0.0], array![2.0, 1.0]).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let x = bounds.sample(&mut rng);
            assert!(bounds.contains(&x.view()));
        }
    }

    #[test]
    fn mismatched_bounds_rejected() {
        let err = BoxBounds::new(array![0.0], array![1.0, 2.0]);
        assert!(err.is_err());
    }

    #[test]
    fn batch_sampling_shape() {
        let bounds = BoxBounds::symmetric(3, 5.0);
        let mut rng = StdRng::seed_from_u64(7);
        let batch = bounds.sample_columns(16, &mut rng);
        assert_eq!(batch.dim(), (3, 16));
    }
}
