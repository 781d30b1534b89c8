//! Minimum-norm least squares
//!
//! All operator fitting reduces to `min ||A W - B||_F`. The solver works
//! through the normal equations with a Jacobi eigendecomposition of `A^T A`,
//! filtering small eigenvalues against a relative cutoff so rank-deficient
//! problems return the minimum-norm solution instead of failing.

use ndarray::{Array1, Array2, ArrayView2, Axis};

use koopman_rl_core::{KoopmanError, Result};

/// Maximum Jacobi sweeps before declaring non-convergence
const MAX_SWEEPS: usize = 64;

/// Solution of a least-squares problem with rank diagnostics
#[derive(Debug, Clone)]
pub struct Lstsq {
    /// Minimizer of `||A W - B||_F`, shape `(n, k)` for `A: (m, n)`, `B: (m, k)`
    pub solution: Array2<f64>,
    /// Numerical rank of `A` under the relative cutoff
    pub rank: usize,
    /// Singular values of `A`, descending
    pub singular_values: Array1<f64>,
}

impl Lstsq {
    /// Ratio of largest to smallest retained singular value.
    /// Infinite when the matrix is numerically rank zero.
    #[must_use]
    pub fn condition(&self) -> f64 {
        if self.rank == 0 {
            return f64::INFINITY;
        }
        self.singular_values[0] / self.singular_values[self.rank - 1]
    }
}

/// Solve `min ||A W - B||_F` for `W`, returning the minimum-norm solution.
///
/// `A` is `(m, n)` and `B` is `(m, k)`; the solution is `(n, k)`. Singular
/// values below `max(m, n) * eps * sigma_max` are treated as zero, matching
/// the usual relative-cutoff convention, so the call never fails on
/// rank-deficient input.
pub fn lstsq(a: &ArrayView2<f64>, b: &ArrayView2<f64>) -> Result<Lstsq> {
    let (m, n) = a.dim();
    if b.nrows() != m {
        return Err(KoopmanError::DimensionMismatch {
            expected: m,
            actual: b.nrows(),
        });
    }

    // Normal equations: eigendecompose the n x n Gram matrix rather than
    // bidiagonalizing the (possibly much taller) A directly.
    let gram = a.t().dot(a);
    let (eigenvalues, v) = jacobi_eigh(&gram)?;

    let mut singular_values: Vec<f64> =
        eigenvalues.iter().map(|&l| l.max(0.0).sqrt()).collect();
    singular_values.sort_by(|x, y| y.partial_cmp(x).unwrap_or(std::cmp::Ordering::Equal));
    let sigma_max = singular_values.first().copied().unwrap_or(0.0);
    let cutoff = m.max(n) as f64 * f64::EPSILON * sigma_max;
    let rank = singular_values.iter().filter(|&&s| s > cutoff).count();

    // W = V diag(1 / lambda_i) V^T (A^T B), dropping filtered directions.
    let atb = a.t().dot(b);
    let vt_atb = v.t().dot(&atb);
    let mut scaled = vt_atb;
    for (i, mut row) in scaled.axis_iter_mut(Axis(0)).enumerate() {
        let sigma = eigenvalues[i].max(0.0).sqrt();
        if sigma > cutoff {
            row.mapv_inplace(|x| x / eigenvalues[i]);
        } else {
            row.fill(0.0);
        }
    }
    let solution = v.dot(&scaled);

    Ok(Lstsq {
        solution,
        rank,
        singular_values: Array1::from(singular_values),
    })
}

/// Cyclic Jacobi eigendecomposition of a symmetric matrix.
///
/// Returns `(eigenvalues, V)` with `G = V diag(eigenvalues) V^T`. Eigenvalue
/// order follows the working matrix, not magnitude.
fn jacobi_eigh(g: &Array2<f64>) -> Result<(Array1<f64>, Array2<f64>)> {
    let n = g.nrows();
    let mut a = g.to_owned();
    let mut v = Array2::eye(n);

    if n <= 1 {
        return Ok((a.diag().to_owned(), v));
    }

    for _ in 0..MAX_SWEEPS {
        let mut off = 0.0;
        for p in 0..n {
            for q in (p + 1)..n {
                off += a[[p, q]] * a[[p, q]];
            }
        }
        if off.sqrt() < 1e-14 * (1.0 + frobenius(&a)) {
            return Ok((a.diag().to_owned(), v));
        }

        for p in 0..n {
            for q in (p + 1)..n {
                let apq = a[[p, q]];
                if apq.abs() < f64::MIN_POSITIVE {
                    continue;
                }
                let app = a[[p, p]];
                let aqq = a[[q, q]];
                let theta = (aqq - app) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for i in 0..n {
                    let aip = a[[i, p]];
                    let aiq = a[[i, q]];
                    a[[i, p]] = c * aip - s * aiq;
                    a[[i, q]] = s * aip + c * aiq;
                }
                for j in 0..n {
                    let apj = a[[p, j]];
                    let aqj = a[[q, j]];
                    a[[p, j]] = c * apj - s * aqj;
                    a[[q, j]] = s * apj + c * aqj;
                }
                for i in 0..n {
                    let vip = v[[i, p]];
                    let viq = v[[i, q]];
                    v[[i, p]] = c * vip - s * viq;
                    v[[i, q]] = s * vip + c * viq;
                }
            }
        }
    }

    Err(KoopmanError::Computation(
        "Jacobi eigendecomposition did not converge".into(),
    ))
}

fn frobenius(a: &Array2<f64>) -> f64 {
    a.iter().map(|x| x * x).sum::<f64>().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn recovers_exact_solution_of_well_posed_system() {
        // A (4 x 2) full rank, B = A * W_true
        let a = array![[1.0, 0.0], [0.0, 1.0], [1.0, 1.0], [2.0, -1.0]];
        let w_true = array![[3.0, -2.0], [0.5, 4.0]];
        let b = a.dot(&w_true);
        let fit = lstsq(&a.view(), &b.view()).unwrap();
        assert_eq!(fit.rank, 2);
        for (x, y) in fit.solution.iter().zip(w_true.iter()) {
            assert_relative_eq!(x, y, epsilon = 1e-8);
        }
    }

    #[test]
    fn rank_deficient_system_returns_minimum_norm_solution() {
        // Second column duplicates the first, rank 1. The minimum-norm
        // solution splits the weight evenly between the two columns.
        let a = array![[1.0, 1.0], [2.0, 2.0], [3.0, 3.0]];
        let b = array![[2.0], [4.0], [6.0]];
        let fit = lstsq(&a.view(), &b.view()).unwrap();
        assert_eq!(fit.rank, 1);
        assert_relative_eq!(fit.solution[[0, 0]], 1.0, epsilon = 1e-8);
        assert_relative_eq!(fit.solution[[1, 0]], 1.0, epsilon = 1e-8);
        assert!(fit.condition().is_finite());
    }

    #[test]
    fn row_count_mismatch_is_rejected() {
        let a = array![[1.0], [2.0]];
        let b = array![[1.0], [2.0], [3.0]];
        assert!(matches!(
            lstsq(&a.view(), &b.view()),
            Err(KoopmanError::DimensionMismatch { expected: 2, actual: 3 })
        ));
    }

    #[test]
    fn singular_values_match_known_diagonal_case() {
        let a = array![[3.0, 0.0], [0.0, 4.0]];
        let b = array![[3.0], [8.0]];
        let fit = lstsq(&a.view(), &b.view()).unwrap();
        assert_relative_eq!(fit.singular_values[0], 4.0, epsilon = 1e-10);
        assert_relative_eq!(fit.singular_values[1], 3.0, epsilon = 1e-10);
        assert_relative_eq!(fit.solution[[0, 0]], 1.0, epsilon = 1e-10);
        assert_relative_eq!(fit.solution[[1, 0]], 2.0, epsilon = 1e-10);
    }
}
