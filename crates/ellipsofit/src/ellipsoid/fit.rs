//! Algebraic least-squares ellipsoid fit.

use nalgebra::{Cholesky, Matrix3, SMatrix, SVector, Vector3};

use super::types::Ellipsoid;
use crate::error::{Degeneracy, FitError};

/// Minimum number of points that determine an ellipsoid (9 free parameters).
pub const MIN_POINTS: usize = 9;

/// Relative threshold on the squared Cholesky pivots of the normal matrix.
const PIVOT_TOLERANCE: f64 = 1e-12;

/// Fit an ellipsoid to 3D points by algebraic least squares.
///
/// Solves for the quadric `xᵀ A x + 2 bᵀ x = 1` minimizing the sum of squared
/// algebraic residuals over the 9 unknowns of `(A, b)` via the normal
/// equations and a Cholesky factorization. The quadric is then converted to
/// center `c = −A⁻¹ b` and precision `P = A / (1 + cᵀ A c)`, so the quadric
/// value of the fitted points is 1 in the exact case.
///
/// Points are shifted to their centroid and scaled to a mean distance of √3
/// before the solve; the result is mapped back to input coordinates.
///
/// Fails with [`FitError::InsufficientSamplePoints`] below [`MIN_POINTS`] and
/// with [`FitError::DegenerateAlgebraicSystem`] if the normal matrix is not
/// positive definite (e.g. coplanar points) or the quadric is not a proper
/// ellipsoid.
pub fn fit_ellipsoid_direct(points: &[Vector3<f64>]) -> Result<Ellipsoid, FitError> {
    let n = points.len();
    if n < MIN_POINTS {
        return Err(FitError::InsufficientSamplePoints {
            needed: MIN_POINTS,
            got: n,
        });
    }

    let (mean, scale) = normalization_params(points);

    // normal equations DᵀD v = Dᵀ1, accumulated row by row with
    // D_i = [x², y², z², 2xy, 2xz, 2yz, 2x, 2y, 2z] in normalized coords
    let mut normal = SMatrix::<f64, 9, 9>::zeros();
    let mut rhs = SVector::<f64, 9>::zeros();
    for p in points {
        let q = (p - mean) * scale;
        let (x, y, z) = (q.x, q.y, q.z);
        let row = SVector::<f64, 9>::from([
            x * x,
            y * y,
            z * z,
            2.0 * x * y,
            2.0 * x * z,
            2.0 * y * z,
            2.0 * x,
            2.0 * y,
            2.0 * z,
        ]);
        normal.ger(1.0, &row, &row, 1.0);
        rhs += row;
    }

    let max_diag = normal.diagonal().max();
    let chol = Cholesky::new(normal).ok_or(Degeneracy::NotPositiveDefinite)?;
    let min_pivot_sq = chol.l_dirty().diagonal().map(|v| v * v).min();
    if min_pivot_sq.is_nan() || min_pivot_sq <= PIVOT_TOLERANCE * max_diag {
        return Err(Degeneracy::NotPositiveDefinite.into());
    }
    let v = chol.solve(&rhs);

    let a = Matrix3::new(v[0], v[3], v[4], v[3], v[1], v[5], v[4], v[5], v[2]);
    let b = Vector3::new(v[6], v[7], v[8]);

    let a_inv = a.try_inverse().ok_or(Degeneracy::SingularQuadric)?;
    let center_n = -(a_inv * b);
    let k = 1.0 + center_n.dot(&(a * center_n));
    if !k.is_finite() || k.abs() <= f64::EPSILON {
        return Err(Degeneracy::SingularQuadric.into());
    }

    let center = mean + center_n / scale;
    let precision = a * (scale * scale / k);
    Ok(Ellipsoid::from_precision(center, precision)?)
}

/// Centroid and the scale mapping the mean distance from it to √3.
fn normalization_params(points: &[Vector3<f64>]) -> (Vector3<f64>, f64) {
    let n = points.len() as f64;
    let mean = points.iter().sum::<Vector3<f64>>() / n;
    let mean_dist = points.iter().map(|p| (p - mean).norm()).sum::<f64>() / n;
    let scale = if mean_dist > 1e-15 {
        3f64.sqrt() / mean_dist
    } else {
        1.0
    };
    (mean, scale)
}
