//! Geometric edgel filters relative to an expected object center.

use nalgebra::Vector3;

use super::Edgel;

/// Expected intensity transition when walking outwards from the object center.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradPolarity {
    /// Bright object on a dark background: intensity decreases outwards, so
    /// boundary gradients point towards the center.
    #[default]
    LightToDark,
    /// Dark object on a bright background (inverted contrast).
    DarkToLight,
}

impl GradPolarity {
    /// Whether a gradient `g` at position `p` is consistent with this polarity
    /// for an object centered at `center`.
    fn accepts(self, center: &Vector3<f64>, p: &Vector3<f64>, g: &Vector3<f64>) -> bool {
        let towards_center = (center - p).dot(g);
        match self {
            Self::LightToDark => towards_center > 0.0,
            Self::DarkToLight => towards_center < 0.0,
        }
    }
}

/// Keep the edgels whose gradient polarity matches `polarity` with respect to
/// `expected_center`.
///
/// With [`GradPolarity::LightToDark`] this keeps edgels for which
/// `(expected_center - position) · gradient > 0`.
pub fn filter_by_direction(
    edgels: &[Edgel],
    expected_center: [f64; 3],
    polarity: GradPolarity,
) -> Vec<Edgel> {
    let center = Vector3::from(expected_center);
    let kept: Vec<Edgel> = edgels
        .iter()
        .filter(|e| polarity.accepts(&center, &e.pos(), &e.grad()))
        .copied()
        .collect();
    if kept.is_empty() && !edgels.is_empty() {
        tracing::debug!(
            "direction filter ({:?}) rejected all {} edgels; check the configured polarity",
            polarity,
            edgels.len()
        );
    }
    kept
}

/// Drop edgels hidden behind a nearer edgel on (almost) the same ray from
/// `expected_center`.
///
/// Two edgels share a ray when the angle between their offsets from the center
/// is below `max_angle` (radians). Of such a pair, the one farther than
/// `max_factor` times the distance of the other is discarded. A discarded edgel
/// never discards another one, and equal distances are never discarded. The
/// result is a fixed point of this filter.
pub fn filter_by_occlusion(
    edgels: &[Edgel],
    expected_center: [f64; 3],
    max_angle: f64,
    max_factor: f64,
) -> Vec<Edgel> {
    let center = Vector3::from(expected_center);
    let cos_max = max_angle.cos();

    let offsets: Vec<Vector3<f64>> = edgels.iter().map(|e| e.pos() - center).collect();
    let lengths: Vec<f64> = offsets.iter().map(|v| v.norm()).collect();
    let mut valid = vec![true; edgels.len()];

    for i in 0..edgels.len() {
        if !valid[i] {
            continue;
        }
        let (p1, l1) = (&offsets[i], lengths[i]);
        for j in 0..edgels.len() {
            if j == i || !valid[j] {
                continue;
            }
            let (p2, l2) = (&offsets[j], lengths[j]);
            // NaN for an edgel sitting on the center: never on a shared ray.
            if p1.dot(p2) / (l1 * l2) > cos_max {
                if l2 > max_factor * l1 {
                    valid[j] = false;
                } else if l1 > max_factor * l2 {
                    valid[i] = false;
                    break;
                }
            }
        }
    }

    let kept: Vec<Edgel> = edgels
        .iter()
        .zip(&valid)
        .filter(|(_, &v)| v)
        .map(|(e, _)| *e)
        .collect();
    tracing::trace!("occlusion filter kept {}/{} edgels", kept.len(), edgels.len());
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::{clutter_edgels, sample_surface_edgels, SurfaceNoise};
    use crate::Ellipsoid;
    use nalgebra::Matrix3;
    use rand::prelude::*;

    fn radial(center: [f64; 3], dir: [f64; 3], dist: f64) -> Edgel {
        let d = Vector3::from(dir).normalize();
        let p = Vector3::from(center) + d * dist;
        // bright object: gradient points back to the center
        Edgel::new(p.into(), (-d).into(), 1.0)
    }

    #[test]
    fn direction_filter_keeps_inward_gradients() {
        let c = [10.0, 10.0, 10.0];
        let inward = radial(c, [1.0, 0.0, 0.0], 5.0);
        let mut outward = inward;
        outward.gradient = [1.0, 0.0, 0.0];

        let kept = filter_by_direction(&[inward, outward], c, GradPolarity::LightToDark);
        assert_eq!(kept, vec![inward]);

        let kept = filter_by_direction(&[inward, outward], c, GradPolarity::DarkToLight);
        assert_eq!(kept, vec![outward]);
    }

    #[test]
    fn direction_filter_drops_tangential_gradients() {
        let c = [0.0; 3];
        let mut e = radial(c, [0.0, 1.0, 0.0], 4.0);
        e.gradient = [1.0, 0.0, 0.0];
        assert!(filter_by_direction(&[e], c, GradPolarity::LightToDark).is_empty());
        assert!(filter_by_direction(&[e], c, GradPolarity::DarkToLight).is_empty());
    }

    #[test]
    fn occlusion_drops_farther_point_on_same_ray() {
        let c = [0.0; 3];
        let near = radial(c, [1.0, 0.0, 0.0], 10.0);
        let far = radial(c, [1.0, 0.01, 0.0], 15.0);
        let side = radial(c, [0.0, 1.0, 0.0], 15.0);

        let kept = filter_by_occlusion(&[far, near, side], c, 5f64.to_radians(), 1.1);
        assert_eq!(kept, vec![near, side]);
    }

    #[test]
    fn occlusion_keeps_points_within_factor() {
        let c = [0.0; 3];
        let a = radial(c, [0.0, 0.0, 1.0], 10.0);
        let b = radial(c, [0.0, 0.01, 1.0], 10.5);
        let equal = radial(c, [0.01, 0.0, 1.0], 10.0);
        let kept = filter_by_occlusion(&[a, b, equal], c, 5f64.to_radians(), 1.1);
        assert_eq!(kept.len(), 3);
    }

    #[test]
    fn occlusion_ignores_point_on_center() {
        let c = [1.0, 2.0, 3.0];
        let on_center = Edgel::new(c, [1.0, 0.0, 0.0], 1.0);
        let other = radial(c, [1.0, 0.0, 0.0], 8.0);
        let kept = filter_by_occlusion(&[on_center, other], c, 5f64.to_radians(), 1.1);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn occlusion_filter_is_idempotent() {
        let mut rng = StdRng::seed_from_u64(17);
        let center = Vector3::new(40.0, 40.0, 40.0);
        let truth =
            Ellipsoid::from_axes_radii(center, Matrix3::identity(), Vector3::new(12.0, 9.0, 7.0))
                .expect("valid ellipsoid");
        let mut edgels = sample_surface_edgels(&truth, 400, &SurfaceNoise::default(), &mut rng);
        // a second, larger shell hidden behind the first
        let shell =
            Ellipsoid::from_axes_radii(center, Matrix3::identity(), Vector3::new(18.0, 14.0, 11.0))
                .expect("valid ellipsoid");
        edgels.extend(sample_surface_edgels(&shell, 200, &SurfaceNoise::default(), &mut rng));
        edgels.extend(clutter_edgels([40.0, 40.0, 40.0], 25.0, 100, &mut rng));
        edgels.shuffle(&mut rng);

        let once = filter_by_occlusion(&edgels, [40.0, 40.0, 40.0], 5f64.to_radians(), 1.1);
        assert!(once.len() < edgels.len());
        let twice = filter_by_occlusion(&once, [40.0, 40.0, 40.0], 5f64.to_radians(), 1.1);
        assert_eq!(once, twice);
    }
}
