// =============================================================================
// ndarray ↔ nalgebra Conversion Utilities
// =============================================================================
//
// Public APIs take and return ndarray types; the decompositions are done in
// nalgebra. All crossings between the two go through this module.
//
// =============================================================================

use nalgebra::DMatrix;
use ndarray::{Array2, ArrayView2};

use crate::error::{PolrError, Result};

/// Copy an ndarray matrix (any memory layout) into a nalgebra DMatrix.
#[inline]
pub fn to_dmatrix(a: ArrayView2<'_, f64>) -> DMatrix<f64> {
    DMatrix::from_fn(a.nrows(), a.ncols(), |i, j| a[[i, j]])
}

/// Copy a nalgebra DMatrix into an ndarray Array2.
#[inline]
pub fn to_array2(m: &DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn(m.shape(), |(i, j)| m[(i, j)])
}

/// Thin QR factorization of an n × k matrix with n ≥ k.
///
/// Returns (Q, R) with Q of shape n × k and R upper triangular k × k.
pub fn thin_qr(a: ArrayView2<'_, f64>) -> Result<(Array2<f64>, Array2<f64>)> {
    let (n, k) = a.dim();
    if n < k {
        return Err(PolrError::LinearAlgebraError(format!(
            "QR decomposition needs at least as many rows as columns ({} rows, {} columns)",
            n, k
        )));
    }
    let qr = to_dmatrix(a).qr();
    Ok((to_array2(&qr.q()), to_array2(&qr.r())))
}

/// Inverse of a square upper-triangular matrix by back substitution.
///
/// `rel_tol` guards against rank deficiency: any diagonal entry smaller than
/// `rel_tol × max|R_ii|` is treated as zero.
pub fn invert_upper_triangular(r: &Array2<f64>, rel_tol: f64) -> Result<Array2<f64>> {
    let (k, k2) = r.dim();
    if k != k2 {
        return Err(PolrError::DimensionMismatch(format!(
            "expected a square triangular matrix, got {} × {}",
            k, k2
        )));
    }
    if k == 0 {
        return Ok(Array2::zeros((0, 0)));
    }

    let diag_max = r.diag().iter().fold(0.0f64, |m, &d| m.max(d.abs()));
    if !diag_max.is_finite() || diag_max == 0.0 {
        return Err(PolrError::LinearAlgebraError(
            "triangular factor has a zero or non-finite diagonal".to_string(),
        ));
    }
    if let Some(j) = r.diag().iter().position(|&d| d.abs() <= rel_tol * diag_max) {
        return Err(PolrError::LinearAlgebraError(format!(
            "design matrix is rank deficient (column {} is collinear with earlier columns)",
            j
        )));
    }

    let r_nalg = to_dmatrix(r.view());
    r_nalg
        .solve_upper_triangular(&DMatrix::identity(k, k))
        .map(|inv| to_array2(&inv))
        .ok_or_else(|| {
            PolrError::LinearAlgebraError("failed to invert triangular factor".to_string())
        })
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
    fn test_non_contiguous_view_converts() {
        let a = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let t = a.t();
        let m = to_dmatrix(t);
        assert_eq!(m.shape(), (3, 2));
        assert_eq!(m[(2, 1)], 6.0);
        assert_eq!(to_array2(&m), t.to_owned());
    }

    #[test]
    fn test_thin_qr_reconstructs() {
        let a = array![[1.0, 2.0], [3.0, 4.0], [5.0, 7.0]];
        let (q, r) = thin_qr(a.view()).unwrap();
        assert_eq!(q.dim(), (3, 2));
        assert_eq!(r.dim(), (2, 2));
        let qr = q.dot(&r);
        for (x, y) in qr.iter().zip(a.iter()) {
            assert_abs_diff_eq!(x, y, epsilon = 1e-10);
        }
        // Q has orthonormal columns
        let qtq = q.t().dot(&q);
        assert_abs_diff_eq!(qtq[[0, 0]], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(qtq[[0, 1]], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(qtq[[1, 1]], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_thin_qr_wide_matrix_fails() {
        let a = array![[1.0, 2.0, 3.0]];
        assert!(thin_qr(a.view()).is_err());
    }

    #[test]
    fn test_invert_upper_triangular() {
        let r = array![[2.0, 1.0], [0.0, 4.0]];
        let inv = invert_upper_triangular(&r, 1e-10).unwrap();
        let eye = r.dot(&inv);
        assert_abs_diff_eq!(eye[[0, 0]], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(eye[[0, 1]], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(eye[[1, 1]], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(inv[[1, 0]], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_invert_singular_triangular() {
        let r = array![[2.0, 1.0], [0.0, 1e-14]];
        assert!(matches!(
            invert_upper_triangular(&r, 1e-7),
            Err(PolrError::LinearAlgebraError(_))
        ));
    }
}
