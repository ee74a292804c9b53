//! Edgel-to-ellipsoid agreement: surface distance plus gradient alignment.

use crate::config::FitParams;
use crate::edgel::Edgel;
use crate::ellipsoid::Ellipsoid;

/// Geometric agreement of one edgel with a candidate ellipsoid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgelResidual {
    /// Euclidean distance from the edgel position to the surface.
    pub distance: f64,
    /// Angle (radians) between the edgel gradient and the inward surface
    /// normal at the closest surface point.
    pub angle: f64,
    /// Whether the edgel lies inside (or on) the ellipsoid.
    pub inside: bool,
}

/// Truncated distance + angle cost with separate inside/outside distance
/// cutoffs.
///
/// Per edgel the cost is `min(angle, a)/a + min(dist, d)/d` with `d` the
/// inside or outside cutoff depending on which side of the surface the edgel
/// lies, so every edgel contributes at most 2. An edgel is an inlier if both
/// terms are strictly below their cutoffs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgelCost {
    pub outside_cutoff: f64,
    pub inside_cutoff: f64,
    /// Radians.
    pub angle_cutoff: f64,
}

impl EdgelCost {
    pub fn new(outside_cutoff: f64, inside_cutoff: f64, angle_cutoff: f64) -> Self {
        Self {
            outside_cutoff,
            inside_cutoff,
            angle_cutoff,
        }
    }

    pub fn from_params(params: &FitParams) -> Self {
        Self::new(
            params.outside_cutoff_distance,
            params.inside_cutoff_distance,
            params.angle_cutoff_rad,
        )
    }

    /// Distance, angle and side of `edgel` with respect to `ellipsoid`.
    pub fn evaluate(&self, ellipsoid: &Ellipsoid, edgel: &Edgel) -> EdgelResidual {
        let p = edgel.pos();
        let proj = ellipsoid.closest_surface_point(&p);
        let normal = ellipsoid.normal_at(&proj.point);
        let cos = (-normal.dot(&edgel.grad())).clamp(-1.0, 1.0);
        EdgelResidual {
            distance: proj.distance,
            angle: cos.acos(),
            inside: ellipsoid.contains(&p),
        }
    }

    fn distance_cutoff(&self, inside: bool) -> f64 {
        if inside {
            self.inside_cutoff
        } else {
            self.outside_cutoff
        }
    }

    /// Cost of a single edgel, in `[0, 2]`.
    pub fn cost(&self, ellipsoid: &Ellipsoid, edgel: &Edgel) -> f64 {
        let r = self.evaluate(ellipsoid, edgel);
        let d = self.distance_cutoff(r.inside);
        r.angle.min(self.angle_cutoff) / self.angle_cutoff + r.distance.min(d) / d
    }

    pub fn is_inlier(&self, ellipsoid: &Ellipsoid, edgel: &Edgel) -> bool {
        let r = self.evaluate(ellipsoid, edgel);
        r.angle < self.angle_cutoff && r.distance < self.distance_cutoff(r.inside)
    }

    /// Sum of per-edgel costs; lower is better.
    pub fn total_cost(&self, ellipsoid: &Ellipsoid, edgels: &[Edgel]) -> f64 {
        edgels.iter().map(|e| self.cost(ellipsoid, e)).sum()
    }

    /// Inlier flag per edgel, in input order.
    pub fn inlier_mask(&self, ellipsoid: &Ellipsoid, edgels: &[Edgel]) -> Vec<bool> {
        edgels.iter().map(|e| self.is_inlier(ellipsoid, e)).collect()
    }
}

impl Default for EdgelCost {
    fn default() -> Self {
        Self::from_params(&FitParams::default())
    }
}
