//! Dictionary feature maps lifting states into the observable space

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

/// A dictionary of observable functions.
///
/// Lifting is pure and deterministic: the same map must be used for fitting
/// and inference, and repeated calls with identical input produce identical
/// output. Batches are column-major, `(input_dim, N)` in and
/// `(output_dim, N)` out, with the constant (bias) observable as the first
/// row so affine value functions are representable.
pub trait Dictionary: Send + Sync {
    /// Dimension of the raw input vectors
    fn input_dim(&self) -> usize;

    /// Dimension of the lifted feature vectors
    fn output_dim(&self) -> usize;

    /// Lift a `(input_dim, N)` batch of columns into `(output_dim, N)`
    fn transform(&self, batch: &ArrayView2<f64>) -> Array2<f64>;

    /// Lift a single column vector
    fn lift(&self, x: &ArrayView1<f64>) -> Array1<f64> {
        let col = x.insert_axis(Axis(1));
        self.transform(&col).index_axis_move(Axis(1), 0)
    }
}

/// All monomials of the input coordinates up to a fixed total degree.
///
/// Degree 2 on a 3-dimensional state yields
/// `{1, x, y, z, x^2, xy, xz, y^2, yz, z^2}`; the exponent list is fixed at
/// construction (bias first, then ascending total degree).
#[derive(Debug, Clone)]
pub struct Monomials {
    input_dim: usize,
    degree: usize,
    exponents: Vec<Vec<u32>>,
}

impl Monomials {
    /// Enumerate all monomials of `input_dim` variables with total degree
    /// at most `degree`.
    #[must_use]
    pub fn new(input_dim: usize, degree: usize) -> Self {
        let mut exponents = Vec::new();
        for total in 0..=degree as u32 {
            compositions(input_dim, total, &mut Vec::new(), &mut exponents);
        }
        Self {
            input_dim,
            degree,
            exponents,
        }
    }

    /// Maximum total degree of the monomials
    #[must_use]
    pub fn degree(&self) -> usize {
        self.degree
    }
}

/// Emit every way of writing `total` as an ordered sum of `dim` exponents,
/// leading variable first.
fn compositions(dim: usize, total: u32, prefix: &mut Vec<u32>, out: &mut Vec<Vec<u32>>) {
    if dim == 1 {
        let mut e = prefix.clone();
        e.push(total);
        out.push(e);
        return;
    }
    for first in (0..=total).rev() {
        prefix.push(first);
        compositions(dim - 1, total - first, prefix, out);
        prefix.pop();
    }
}

impl Dictionary for Monomials {
    fn input_dim(&self) -> usize {
        self.input_dim
    }

    fn output_dim(&self) -> usize {
        self.exponents.len()
    }

    fn transform(&self, batch: &ArrayView2<f64>) -> Array2<f64> {
        debug_assert_eq!(
            batch.nrows(),
            self.input_dim,
            "dictionary input dimension mismatch"
        );
        let n = batch.ncols();
        let mut lifted = Array2::ones((self.exponents.len(), n));
        for (row, exps) in self.exponents.iter().enumerate() {
            for (col, x) in batch.columns().into_iter().enumerate() {
                let mut value = 1.0;
                for (xi, &e) in x.iter().zip(exps) {
                    if e > 0 {
                        value *= xi.powi(e as i32);
                    }
                }
                lifted[[row, col]] = value;
            }
        }
        lifted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;
    use proptest::prelude::*;

    fn binomial(n: usize, k: usize) -> usize {
        (1..=k).fold(1, |acc, i| acc * (n - k + i) / i)
    }

    #[test]
    fn degree_two_three_vars_matches_hand_enumeration() {
        let phi = Monomials::new(3, 2);
        assert_eq!(phi.output_dim(), 10);
        let lifted = phi.lift(&array![2.0, 3.0, 5.0].view());
        // {1, x, y, z, x^2, xy, xz, y^2, yz, z^2}
        let expected = array![1.0, 2.0, 3.0, 5.0, 4.0, 6.0, 10.0, 9.0, 15.0, 25.0];
        for (a, b) in lifted.iter().zip(expected.iter()) {
            assert_relative_eq!(a, b);
        }
    }

    #[test]
    fn degree_one_is_affine_lift() {
        let phi = Monomials::new(2, 1);
        assert_eq!(phi.output_dim(), 3);
        let lifted = phi.lift(&array![4.0, -1.0].view());
        assert_relative_eq!(lifted[0], 1.0);
        assert_relative_eq!(lifted[1], 4.0);
        assert_relative_eq!(lifted[2], -1.0);
    }

    #[test]
    fn output_dim_follows_stars_and_bars() {
        for dim in 1..=4 {
            for degree in 0..=3 {
                let phi = Monomials::new(dim, degree);
                assert_eq!(phi.output_dim(), binomial(dim + degree, degree));
            }
        }
    }

    proptest! {
        #[test]
        fn bias_row_is_one_and_map_is_deterministic(
            values in proptest::collection::vec(-10.0f64..10.0, 6)
        ) {
            let phi = Monomials::new(3, 2);
            let batch = Array2::from_shape_vec((3, 2), values).unwrap();
            let a = phi.transform(&batch.view());
            let b = phi.transform(&batch.view());
            prop_assert_eq!(&a, &b);
            for v in a.row(0) {
                prop_assert!((v - 1.0).abs() < 1e-15);
            }
        }
    }
}
