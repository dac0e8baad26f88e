//! Dense linear algebra helpers over `nalgebra`.

use nalgebra::{DMatrix, RowDVector};

/// Multiplies `vector` by `matrix^exponent` using binary exponentiation.
///
/// Performs `O(log exponent)` matrix squarings; the vector is multiplied by
/// each squared power whose bit is set, which is valid because powers of the
/// same matrix commute. An exponent of zero returns the vector unchanged.
#[must_use]
pub fn advance(vector: &RowDVector<f64>, matrix: &DMatrix<f64>, exponent: u64) -> RowDVector<f64> {
    let mut out = vector.clone();
    let mut base = matrix.clone();
    let mut remaining = exponent;

    while remaining > 0 {
        if remaining & 1 == 1 {
            out = &out * &base;
        }
        remaining >>= 1;
        if remaining > 0 {
            base = &base * &base;
        }
    }

    out
}

/// Computes `matrix^exponent` by binary exponentiation.
///
/// # Panics
///
/// Panics if `matrix` is not square.
#[must_use]
pub fn power(matrix: &DMatrix<f64>, exponent: u64) -> DMatrix<f64> {
    assert!(matrix.is_square(), "matrix must be square");

    let n = matrix.nrows();
    let mut result = DMatrix::identity(n, n);
    let mut base = matrix.clone();
    let mut remaining = exponent;

    while remaining > 0 {
        if remaining & 1 == 1 {
            result = &result * &base;
        }
        remaining >>= 1;
        if remaining > 0 {
            base = &base * &base;
        }
    }

    result
}
