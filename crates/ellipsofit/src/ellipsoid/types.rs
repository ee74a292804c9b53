//! Ellipsoid representation and conversions.

use std::fmt;

use nalgebra::{Matrix3, SymmetricEigen, Vector3};

use crate::error::Degeneracy;

/// Solid ellipsoid `{x : (x − c)ᵀ P (x − c) ≤ 1}`.
///
/// All representations (covariance `Σ`, precision `P = Σ⁻¹`, principal axes +
/// radii) are kept in sync. Radii are sorted in decreasing order and column `k`
/// of [`Ellipsoid::axes`] is the unit axis of radius `k`. Every constructed
/// instance has finite, positive radii.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ellipsoid {
    center: Vector3<f64>,
    covariance: Matrix3<f64>,
    precision: Matrix3<f64>,
    axes: Matrix3<f64>,
    radii: Vector3<f64>,
}

impl Ellipsoid {
    /// Build from center and covariance `Σ` (radii are `sqrt(eig(Σ))`).
    pub fn from_covariance(
        center: Vector3<f64>,
        covariance: Matrix3<f64>,
    ) -> Result<Self, Degeneracy> {
        let eig = SymmetricEigen::new(symmetrize(&covariance));
        let radii = eig.eigenvalues.map(f64::sqrt);
        Self::from_axes_radii(center, eig.eigenvectors, radii)
    }

    /// Build from center and precision `P` (radii are `1 / sqrt(eig(P))`).
    pub fn from_precision(
        center: Vector3<f64>,
        precision: Matrix3<f64>,
    ) -> Result<Self, Degeneracy> {
        let eig = SymmetricEigen::new(symmetrize(&precision));
        let radii = eig.eigenvalues.map(|l| 1.0 / l.sqrt());
        Self::from_axes_radii(center, eig.eigenvectors, radii)
    }

    /// Build from center, orthonormal axes (as columns) and matching radii.
    pub fn from_axes_radii(
        center: Vector3<f64>,
        axes: Matrix3<f64>,
        radii: Vector3<f64>,
    ) -> Result<Self, Degeneracy> {
        if radii.iter().any(|r| !r.is_finite() || *r <= 0.0) {
            return Err(Degeneracy::NonFiniteRadii);
        }
        if center.iter().any(|c| !c.is_finite()) {
            return Err(Degeneracy::SingularQuadric);
        }

        let mut order = [0usize, 1, 2];
        order.sort_by(|&i, &j| radii[j].total_cmp(&radii[i]));
        let axes = Matrix3::from_columns(&[
            axes.column(order[0]).normalize(),
            axes.column(order[1]).normalize(),
            axes.column(order[2]).normalize(),
        ]);
        let radii = Vector3::new(radii[order[0]], radii[order[1]], radii[order[2]]);

        let covariance = axes * Matrix3::from_diagonal(&radii.map(|r| r * r)) * axes.transpose();
        let precision =
            axes * Matrix3::from_diagonal(&radii.map(|r| 1.0 / (r * r))) * axes.transpose();

        Ok(Self {
            center,
            covariance,
            precision,
            axes,
            radii,
        })
    }

    /// Ellipsoid center.
    pub fn center(&self) -> Vector3<f64> {
        self.center
    }

    /// Covariance matrix `Σ`.
    pub fn covariance(&self) -> &Matrix3<f64> {
        &self.covariance
    }

    /// Precision matrix `P = Σ⁻¹`.
    pub fn precision(&self) -> &Matrix3<f64> {
        &self.precision
    }

    /// Unit principal axes as columns, ordered like [`Ellipsoid::radii`].
    pub fn axes(&self) -> &Matrix3<f64> {
        &self.axes
    }

    /// Semi-axis lengths in decreasing order.
    pub fn radii(&self) -> Vector3<f64> {
        self.radii
    }

    /// `(x − c)ᵀ P (x − c)`: `< 1` inside, `1` on the surface, `> 1` outside.
    pub fn quadric_value(&self, x: &Vector3<f64>) -> f64 {
        let d = x - self.center;
        d.dot(&(self.precision * d))
    }

    /// Whether `x` lies inside or on the surface.
    pub fn contains(&self, x: &Vector3<f64>) -> bool {
        self.quadric_value(x) <= 1.0
    }

    /// Unit outward normal of the level surface through `x`, i.e. the
    /// normalized gradient of the quadric form. Zero at the center.
    pub fn normal_at(&self, x: &Vector3<f64>) -> Vector3<f64> {
        let g = self.precision * (x - self.center);
        let n = g.norm();
        if n > 0.0 {
            g / n
        } else {
            Vector3::zeros()
        }
    }

    /// Center and covariance as a serializable record.
    pub fn to_params(&self) -> EllipsoidParams {
        EllipsoidParams::from(self)
    }
}

impl fmt::Display for Ellipsoid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = &self.center;
        let r = &self.radii;
        writeln!(f, "center = [{:.4}, {:.4}, {:.4}]", c[0], c[1], c[2])?;
        writeln!(f, "radii = [{:.4}, {:.4}, {:.4}]", r[0], r[1], r[2])?;
        write!(f, "axes = [")?;
        for k in 0..3 {
            let a = self.axes.column(k);
            let sep = if k < 2 { ", " } else { "" };
            write!(f, "[{:.4}, {:.4}, {:.4}]{}", a[0], a[1], a[2], sep)?;
        }
        writeln!(f, "]")?;
        write!(f, "precision = [")?;
        for row in 0..3 {
            let p = self.precision.row(row);
            let sep = if row < 2 { ", " } else { "" };
            write!(f, "[{:.6}, {:.6}, {:.6}]{}", p[0], p[1], p[2], sep)?;
        }
        write!(f, "]")
    }
}

/// Ellipsoid parameters for serialization (center + covariance).
///
/// This is the record handed to the host model: it carries exactly the two
/// fields a spot stores.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EllipsoidParams {
    /// Center in global coordinates.
    pub center: [f64; 3],
    /// Row-major covariance matrix.
    pub covariance: [[f64; 3]; 3],
}

impl From<&Ellipsoid> for EllipsoidParams {
    fn from(e: &Ellipsoid) -> Self {
        Self {
            center: e.center.into(),
            covariance: matrix3_to_array(&e.covariance),
        }
    }
}

impl From<Ellipsoid> for EllipsoidParams {
    fn from(e: Ellipsoid) -> Self {
        Self::from(&e)
    }
}

impl TryFrom<&EllipsoidParams> for Ellipsoid {
    type Error = Degeneracy;

    fn try_from(p: &EllipsoidParams) -> Result<Self, Self::Error> {
        Ellipsoid::from_covariance(
            Vector3::from(p.center),
            Matrix3::from_fn(|r, c| p.covariance[r][c]),
        )
    }
}

fn matrix3_to_array(m: &Matrix3<f64>) -> [[f64; 3]; 3] {
    [
        [m[(0, 0)], m[(0, 1)], m[(0, 2)]],
        [m[(1, 0)], m[(1, 1)], m[(1, 2)]],
        [m[(2, 0)], m[(2, 1)], m[(2, 2)]],
    ]
}

fn symmetrize(m: &Matrix3<f64>) -> Matrix3<f64> {
    (m + m.transpose()) * 0.5
}
