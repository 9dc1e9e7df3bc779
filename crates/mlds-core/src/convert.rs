// =============================================================================
// ndarray ↔ nalgebra Conversion Utilities
// =============================================================================
//
// Arrays live in ndarray (trial tables, design matrices, scale curves);
// factorizations live in nalgebra. Every crossing between the two goes
// through this module so the solvers never copy element by element inline.
//
// =============================================================================

use nalgebra::{Cholesky, DMatrix, DVector, Dyn};
use ndarray::{Array1, Array2};

const RIDGE_SCALE: f64 = 1e-8;

/// ndarray matrix → nalgebra matrix (handles non-standard layouts).
#[inline]
pub fn to_dmatrix(a: &Array2<f64>) -> DMatrix<f64> {
    let (nrows, ncols) = a.dim();
    DMatrix::from_fn(nrows, ncols, |i, j| a[[i, j]])
}

/// ndarray vector → nalgebra vector.
#[inline]
pub fn to_dvector(v: &Array1<f64>) -> DVector<f64> {
    DVector::from_iterator(v.len(), v.iter().copied())
}

/// nalgebra matrix → ndarray matrix.
#[inline]
pub fn to_array2(m: &DMatrix<f64>) -> Array2<f64> {
    let (nrows, ncols) = m.shape();
    Array2::from_shape_fn((nrows, ncols), |(i, j)| m[(i, j)])
}

/// nalgebra vector → ndarray vector.
#[inline]
pub fn to_array1(v: &DVector<f64>) -> Array1<f64> {
    Array1::from_vec(v.as_slice().to_vec())
}

/// Solve the symmetric system A x = b and also return A⁻¹.
///
/// Cholesky first; LU when A is not numerically positive definite.
/// Returns None if A is singular.
pub fn solve_and_invert(a: &DMatrix<f64>, b: &DVector<f64>) -> Option<(DVector<f64>, DMatrix<f64>)> {
    let p = a.nrows();
    if let Some(chol) = a.clone().cholesky() {
        let x = chol.solve(b);
        let inv = chol.solve(&DMatrix::identity(p, p));
        return Some((x, inv));
    }
    let lu = a.clone().lu();
    let x = lu.solve(b)?;
    let inv = lu.try_inverse()?;
    Some((x, inv))
}

/// A + εI with ε a small multiple of the largest diagonal entry.
///
/// Separated binomial data drive every working weight to its floor; X'WX
/// then vanishes on the penalty null space and A loses numerical rank.
pub fn with_ridge(a: &DMatrix<f64>) -> DMatrix<f64> {
    let scale = a.diagonal().iter().fold(1.0f64, |m, v| m.max(v.abs()));
    let mut ridged = a.clone();
    for i in 0..a.nrows() {
        ridged[(i, i)] += RIDGE_SCALE * scale;
    }
    ridged
}

/// Cholesky factor of A, retried once on `with_ridge(A)`.
pub fn cholesky_with_ridge(a: &DMatrix<f64>) -> Option<Cholesky<f64, Dyn>> {
    a.clone().cholesky().or_else(|| with_ridge(a).cholesky())
}

/// trace(A B) without forming the product.
pub fn trace_of_product(a: &DMatrix<f64>, b: &DMatrix<f64>) -> f64 {
    let n = a.nrows();
    let mut tr = 0.0;
    for i in 0..n {
        for j in 0..a.ncols() {
            tr += a[(i, j)] * b[(j, i)];
        }
    }
    tr
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_transposed_view_converts_correctly() {
        let a = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let t = a.t().to_owned();
        let m = to_dmatrix(&t);
        assert_eq!(m.shape(), (3, 2));
        assert_eq!(m[(2, 1)], 6.0);
        assert_eq!(to_array2(&m), t);
    }

    #[test]
    fn test_vector_conversion() {
        let v = array![1.5, -2.0, 0.25];
        assert_eq!(to_array1(&to_dvector(&v)), v);
    }

    #[test]
    fn test_solve_and_invert_spd() {
        let a = DMatrix::from_row_slice(2, 2, &[4.0, 1.0, 1.0, 3.0]);
        let b = DVector::from_row_slice(&[5.0, 4.0]);
        let (x, inv) = solve_and_invert(&a, &b).unwrap();
        let ax = &a * &x;
        assert_abs_diff_eq!(ax[0], 5.0, epsilon = 1e-10);
        assert_abs_diff_eq!(ax[1], 4.0, epsilon = 1e-10);
        let eye = &a * &inv;
        assert_abs_diff_eq!(eye[(0, 0)], 1.0, epsilon = 1e-10);
        assert_abs_diff_eq!(eye[(0, 1)], 0.0, epsilon = 1e-10);
    }

    #[test]
    fn test_solve_and_invert_singular() {
        let a = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 4.0]);
        let b = DVector::from_row_slice(&[1.0, 1.0]);
        assert!(solve_and_invert(&a, &b).is_none());
    }

    #[test]
    fn test_ridge_rescues_rank_deficient_cholesky() {
        let a = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 4.0]);
        let ridged = with_ridge(&a);
        assert_abs_diff_eq!(ridged[(0, 0)] - a[(0, 0)], 4e-8, epsilon = 1e-20);
        assert_eq!(ridged[(0, 1)], a[(0, 1)]);

        let chol = cholesky_with_ridge(&a).unwrap();
        let x = chol.solve(&DVector::from_row_slice(&[1.0, 2.0]));
        assert!(x.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_trace_of_product() {
        let a = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        let b = DMatrix::from_row_slice(2, 2, &[5.0, 6.0, 7.0, 8.0]);
        assert_abs_diff_eq!(trace_of_product(&a, &b), (&a * &b).trace(), epsilon = 1e-12);
    }
}
