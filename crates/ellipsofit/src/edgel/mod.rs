//! Oriented surface samples ("edgels") and the geometric filters applied to
//! them before fitting.
//!
//! Implements:
//! - Polarity filter: keep edgels whose gradient points towards the expected
//!   object center.
//! - Occlusion filter: along a viewing ray from the expected center, keep the
//!   nearest surface sample and drop the ones hidden behind it.
//! - Affine mapping of edgels between source and global coordinates, with
//!   covariant transformation of the gradient.

mod filter;
mod transform;

pub use filter::{filter_by_direction, filter_by_occlusion, GradPolarity};
pub use transform::{transform_edgels, AffineTransform3};

use nalgebra::Vector3;

/// Subpixel-localized image edge sample.
///
/// `gradient` is the unit direction of the intensity gradient (pointing
/// towards brighter voxels), `magnitude` its length before normalization.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Edgel {
    /// Position in world (global) coordinates.
    pub position: [f64; 3],
    /// Unit gradient direction.
    pub gradient: [f64; 3],
    /// Gradient magnitude.
    pub magnitude: f64,
}

impl Edgel {
    /// Build an edgel, normalizing `gradient` to unit length.
    ///
    /// A zero gradient is kept as the zero vector.
    pub fn new(position: [f64; 3], gradient: [f64; 3], magnitude: f64) -> Self {
        let g = Vector3::from(gradient);
        let n = g.norm();
        let gradient = if n > 0.0 && n.is_finite() {
            (g / n).into()
        } else {
            [0.0; 3]
        };
        Self {
            position,
            gradient,
            magnitude,
        }
    }

    pub(crate) fn pos(&self) -> Vector3<f64> {
        Vector3::from(self.position)
    }

    pub(crate) fn grad(&self) -> Vector3<f64> {
        Vector3::from(self.gradient)
    }
}

/// Positions of a slice of edgels, in input order.
pub(crate) fn positions(edgels: &[Edgel]) -> Vec<Vector3<f64>> {
    edgels.iter().map(Edgel::pos).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn new_normalizes_gradient() {
        let e = Edgel::new([1.0, 2.0, 3.0], [0.0, 3.0, 4.0], 5.0);
        assert_relative_eq!(e.gradient[1], 0.6, epsilon = 1e-15);
        assert_relative_eq!(e.gradient[2], 0.8, epsilon = 1e-15);
        assert_relative_eq!(e.magnitude, 5.0);
    }

    #[test]
    fn zero_gradient_stays_zero() {
        let e = Edgel::new([0.0; 3], [0.0; 3], 0.0);
        assert_eq!(e.gradient, [0.0; 3]);
    }

    #[test]
    fn serde_roundtrip_keeps_fields() {
        let e = Edgel::new([1.5, -2.0, 0.25], [1.0, 0.0, 0.0], 12.0);
        let json = serde_json::to_string(&e).expect("serialize");
        let back: Edgel = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(e, back);
    }
}
