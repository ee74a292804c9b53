//! Euclidean point-to-surface distance.
//!
//! Closest point on an ellipsoid (and, for the degenerate sub-cases, on an
//! ellipse) by bisection on the Lagrange multiplier, following D. Eberly,
//! "Distance from a Point to an Ellipse, an Ellipsoid, or a Hyperellipsoid".
//! The query is rotated into the principal frame and reflected into the
//! first octant; the bisection is robust for points on the axes, at the
//! center and on the surface itself.

use nalgebra::Vector3;

use super::types::Ellipsoid;

/// Enough halvings to exhaust the `f64` mantissa and exponent range.
const MAX_BISECTIONS: usize = 1100;

/// Closest point on the ellipsoid surface to a query point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceProjection {
    /// Closest surface point, in the ellipsoid's coordinates.
    pub point: Vector3<f64>,
    /// Euclidean distance from the query to `point`.
    pub distance: f64,
}

impl Ellipsoid {
    /// Closest point on the surface to `p` and its Euclidean distance.
    pub fn closest_surface_point(&self, p: &Vector3<f64>) -> SurfaceProjection {
        let axes = self.axes();
        let local = axes.transpose() * (p - self.center());
        let e = self.radii();

        let y = [local.x.abs(), local.y.abs(), local.z.abs()];
        let (x, distance) = closest_on_ellipsoid([e.x, e.y, e.z], y);

        let restored = Vector3::new(
            x[0].copysign(local.x),
            x[1].copysign(local.y),
            x[2].copysign(local.z),
        );
        SurfaceProjection {
            point: self.center() + axes * restored,
            distance,
        }
    }

    /// Euclidean distance from `p` to the surface.
    pub fn surface_distance(&self, p: &Vector3<f64>) -> f64 {
        self.closest_surface_point(p).distance
    }
}

/// `e` sorted decreasing, `y` in the first octant.
fn closest_on_ellipsoid(e: [f64; 3], y: [f64; 3]) -> ([f64; 3], f64) {
    if y[2] > 0.0 {
        if y[1] > 0.0 {
            if y[0] > 0.0 {
                let z = [y[0] / e[0], y[1] / e[1], y[2] / e[2]];
                let g = z[0] * z[0] + z[1] * z[1] + z[2] * z[2] - 1.0;
                if g == 0.0 {
                    return (y, 0.0);
                }
                let r0 = (e[0] / e[2]).powi(2);
                let r1 = (e[1] / e[2]).powi(2);
                let s = root_3d(r0, r1, z, g);
                let x = [r0 * y[0] / (s + r0), r1 * y[1] / (s + r1), y[2] / (s + 1.0)];
                (x, dist3(&x, &y))
            } else {
                let ([x1, x2], d) = closest_on_ellipse([e[1], e[2]], [y[1], y[2]]);
                ([0.0, x1, x2], d)
            }
        } else if y[0] > 0.0 {
            let ([x0, x2], d) = closest_on_ellipse([e[0], e[2]], [y[0], y[2]]);
            ([x0, 0.0, x2], d)
        } else {
            ([0.0, 0.0, e[2]], (y[2] - e[2]).abs())
        }
    } else {
        let denom0 = e[0] * e[0] - e[2] * e[2];
        let denom1 = e[1] * e[1] - e[2] * e[2];
        let numer0 = e[0] * y[0];
        let numer1 = e[1] * y[1];
        if numer0 < denom0 && numer1 < denom1 {
            let xde0 = numer0 / denom0;
            let xde1 = numer1 / denom1;
            let discr = 1.0 - xde0 * xde0 - xde1 * xde1;
            if discr > 0.0 {
                let x = [e[0] * xde0, e[1] * xde1, e[2] * discr.sqrt()];
                return (x, dist3(&x, &y));
            }
        }
        let ([x0, x1], d) = closest_on_ellipse([e[0], e[1]], [y[0], y[1]]);
        ([x0, x1, 0.0], d)
    }
}

/// Planar case: `e` sorted decreasing, `y` in the first quadrant.
fn closest_on_ellipse(e: [f64; 2], y: [f64; 2]) -> ([f64; 2], f64) {
    if y[1] > 0.0 {
        if y[0] > 0.0 {
            let z = [y[0] / e[0], y[1] / e[1]];
            let g = z[0] * z[0] + z[1] * z[1] - 1.0;
            if g == 0.0 {
                return (y, 0.0);
            }
            let r0 = (e[0] / e[1]).powi(2);
            let s = root_2d(r0, z, g);
            let x = [r0 * y[0] / (s + r0), y[1] / (s + 1.0)];
            let d = ((x[0] - y[0]).powi(2) + (x[1] - y[1]).powi(2)).sqrt();
            (x, d)
        } else {
            ([0.0, e[1]], (y[1] - e[1]).abs())
        }
    } else {
        let numer0 = e[0] * y[0];
        let denom0 = e[0] * e[0] - e[1] * e[1];
        if numer0 < denom0 {
            let xde0 = numer0 / denom0;
            let x = [e[0] * xde0, e[1] * (1.0 - xde0 * xde0).sqrt()];
            let d = ((x[0] - y[0]).powi(2) + x[1] * x[1]).sqrt();
            (x, d)
        } else {
            ([e[0], 0.0], (y[0] - e[0]).abs())
        }
    }
}

fn root_2d(r0: f64, z: [f64; 2], g: f64) -> f64 {
    let n0 = r0 * z[0];
    let mut s0 = z[1] - 1.0;
    let mut s1 = if g < 0.0 {
        0.0
    } else {
        n0.hypot(z[1]) - 1.0
    };
    let mut s = 0.0;
    for _ in 0..MAX_BISECTIONS {
        s = 0.5 * (s0 + s1);
        if s == s0 || s == s1 {
            break;
        }
        let ratio0 = n0 / (s + r0);
        let ratio1 = z[1] / (s + 1.0);
        let g = ratio0 * ratio0 + ratio1 * ratio1 - 1.0;
        if g > 0.0 {
            s0 = s;
        } else if g < 0.0 {
            s1 = s;
        } else {
            break;
        }
    }
    s
}

fn root_3d(r0: f64, r1: f64, z: [f64; 3], g: f64) -> f64 {
    let n0 = r0 * z[0];
    let n1 = r1 * z[1];
    let mut s0 = z[2] - 1.0;
    let mut s1 = if g < 0.0 {
        0.0
    } else {
        Vector3::new(n0, n1, z[2]).norm() - 1.0
    };
    let mut s = 0.0;
    for _ in 0..MAX_BISECTIONS {
        s = 0.5 * (s0 + s1);
        if s == s0 || s == s1 {
            break;
        }
        let ratio0 = n0 / (s + r0);
        let ratio1 = n1 / (s + r1);
        let ratio2 = z[2] / (s + 1.0);
        let g = ratio0 * ratio0 + ratio1 * ratio1 + ratio2 * ratio2 - 1.0;
        if g > 0.0 {
            s0 = s;
        } else if g < 0.0 {
            s1 = s;
        } else {
            break;
        }
    }
    s
}

fn dist3(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    Vector3::from(*a).metric_distance(&Vector3::from(*b))
}
