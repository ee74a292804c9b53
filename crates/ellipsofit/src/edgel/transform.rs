//! Affine mapping of edgels between coordinate frames.

use nalgebra::{Matrix3, Vector3};

use super::Edgel;

/// 3D affine transform `x ↦ L x + t`, stored row-major as `[L | t]`.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AffineTransform3 {
    /// Row-major 3×4 matrix; columns 0..3 are the linear part, column 3 the
    /// translation.
    pub rows: [[f64; 4]; 3],
}

impl Default for AffineTransform3 {
    fn default() -> Self {
        Self::identity()
    }
}

impl AffineTransform3 {
    pub fn identity() -> Self {
        Self::from_parts(&Matrix3::identity(), &Vector3::zeros())
    }

    /// Build from a linear part and a translation.
    pub fn from_parts(linear: &Matrix3<f64>, translation: &Vector3<f64>) -> Self {
        let mut rows = [[0.0; 4]; 3];
        for (r, row) in rows.iter_mut().enumerate() {
            for (c, v) in row.iter_mut().take(3).enumerate() {
                *v = linear[(r, c)];
            }
            row[3] = translation[r];
        }
        Self { rows }
    }

    /// Axis-aligned scaling (e.g. voxel size).
    pub fn scaling(sx: f64, sy: f64, sz: f64) -> Self {
        Self::from_parts(
            &Matrix3::from_diagonal(&Vector3::new(sx, sy, sz)),
            &Vector3::zeros(),
        )
    }

    /// Pure translation.
    pub fn translation(t: [f64; 3]) -> Self {
        Self::from_parts(&Matrix3::identity(), &Vector3::from(t))
    }

    /// Linear 3×3 part.
    pub fn linear(&self) -> Matrix3<f64> {
        Matrix3::from_fn(|r, c| self.rows[r][c])
    }

    /// Translation part.
    pub fn offset(&self) -> Vector3<f64> {
        Vector3::new(self.rows[0][3], self.rows[1][3], self.rows[2][3])
    }

    /// Map a point.
    pub fn apply(&self, p: &Vector3<f64>) -> Vector3<f64> {
        self.linear() * p + self.offset()
    }

    /// Map a point back; `None` if the linear part is singular.
    pub fn apply_inverse(&self, p: &Vector3<f64>) -> Option<Vector3<f64>> {
        let inv = self.linear().try_inverse()?;
        Some(inv * (p - self.offset()))
    }

    /// Composition `self ∘ other`: apply `other` first, then `self`.
    pub fn concatenate(&self, other: &Self) -> Self {
        let l = self.linear() * other.linear();
        let t = self.linear() * other.offset() + self.offset();
        Self::from_parts(&l, &t)
    }
}

/// Map edgels through `transform`.
///
/// Positions are mapped by the full transform. Gradients are covariant: the
/// magnitude-scaled gradient is mapped by the inverse-transpose of the linear
/// part, its length becomes the new magnitude and the direction is
/// renormalized. Returns `None` if the linear part is singular.
pub fn transform_edgels(edgels: &[Edgel], transform: &AffineTransform3) -> Option<Vec<Edgel>> {
    let normal_transform = transform.linear().try_inverse()?.transpose();

    let mapped = edgels
        .iter()
        .map(|e| {
            let n = normal_transform * (e.grad() * e.magnitude);
            let magnitude = n.norm();
            let gradient = if magnitude > 0.0 {
                (n / magnitude).into()
            } else {
                [0.0; 3]
            };
            Edgel {
                position: transform.apply(&e.pos()).into(),
                gradient,
                magnitude,
            }
        })
        .collect();
    Some(mapped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Ellipsoid;
    use approx::assert_relative_eq;

    #[test]
    fn scaling_divides_gradient_magnitude() {
        let e = Edgel::new([1.0, 1.0, 1.0], [1.0, 0.0, 0.0], 4.0);
        let t = AffineTransform3::scaling(2.0, 1.0, 1.0);
        let out = transform_edgels(&[e], &t).expect("invertible");
        assert_eq!(out[0].position, [2.0, 1.0, 1.0]);
        assert_relative_eq!(out[0].gradient[0], 1.0);
        assert_relative_eq!(out[0].magnitude, 2.0);
    }

    #[test]
    fn singular_transform_is_rejected() {
        let e = Edgel::new([1.0, 1.0, 1.0], [1.0, 0.0, 0.0], 1.0);
        let t = AffineTransform3::scaling(1.0, 0.0, 1.0);
        assert!(transform_edgels(&[e], &t).is_none());
    }

    #[test]
    fn concatenate_applies_right_operand_first() {
        let s = AffineTransform3::scaling(2.0, 3.0, 4.0);
        let t = AffineTransform3::translation([1.0, 1.0, 1.0]);
        let st = s.concatenate(&t);
        let p = st.apply(&Vector3::new(1.0, 2.0, 3.0));
        assert_relative_eq!(p, Vector3::new(4.0, 9.0, 16.0));
        let back = st.apply_inverse(&p).expect("invertible");
        assert_relative_eq!(back, Vector3::new(1.0, 2.0, 3.0), epsilon = 1e-12);
    }

    #[test]
    fn surface_normals_stay_normal_under_anisotropic_map() {
        // gradients of a sphere, mapped by a sheared anisotropic transform, must
        // still be (inward) normals of the image ellipsoid
        let linear = Matrix3::new(1.5, 0.3, 0.0, 0.0, 0.8, 0.2, 0.1, 0.0, 2.0);
        let t = AffineTransform3::from_parts(&linear, &Vector3::new(5.0, -3.0, 7.0));

        let mut edgels = Vec::new();
        for k in 0..20 {
            let theta = 0.3 + k as f64 * 0.29;
            let phi = 0.2 + k as f64 * 0.61;
            let d = Vector3::new(theta.sin() * phi.cos(), theta.sin() * phi.sin(), theta.cos());
            edgels.push(Edgel::new((d * 3.0).into(), (-d).into(), 2.0));
        }
        let mapped = transform_edgels(&edgels, &t).expect("invertible");

        // image of the radius-3 sphere: covariance 9 L Lᵀ
        let image = Ellipsoid::from_covariance(t.offset(), linear * linear.transpose() * 9.0)
            .expect("valid ellipsoid");
        for e in &mapped {
            let p = Vector3::from(e.position);
            assert_relative_eq!(-image.normal_at(&p), Vector3::from(e.gradient), epsilon = 1e-9);
            assert_relative_eq!(image.quadric_value(&p), 1.0, epsilon = 1e-9);
        }
    }
}
