//! Synthetic ellipsoids and edgels for tests, benchmarks and demos.
//!
//! Surface edgels model bright objects on a dark background: gradients point
//! inwards, matching [`GradPolarity::LightToDark`](crate::GradPolarity).

use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use rand::Rng;
use rand_distr::StandardNormal;

use crate::driver::FitTarget;
use crate::edgel::Edgel;
use crate::ellipsoid::Ellipsoid;
use crate::error::Degeneracy;

/// Gaussian perturbation of surface edgels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceNoise {
    /// Standard deviation of each position coordinate.
    pub position_sigma: f64,
    /// Standard deviation added to each gradient component before
    /// renormalization.
    pub direction_sigma: f64,
}

impl SurfaceNoise {
    pub fn none() -> Self {
        Self {
            position_sigma: 0.0,
            direction_sigma: 0.0,
        }
    }
}

impl Default for SurfaceNoise {
    fn default() -> Self {
        Self {
            position_sigma: 0.25,
            direction_sigma: 0.05,
        }
    }
}

/// Ellipsoid at `center` with radii uniform in `[min_radius, max_radius]` and
/// a uniformly random orientation.
pub fn random_ellipsoid<R: Rng>(
    center: [f64; 3],
    min_radius: f64,
    max_radius: f64,
    rng: &mut R,
) -> Result<Ellipsoid, Degeneracy> {
    let radii = Vector3::from_fn(|_, _| rng.gen_range(min_radius..=max_radius));
    // normalized 4D Gaussian: uniform on the rotation group
    let q = UnitQuaternion::from_quaternion(Quaternion::new(
        gaussian(rng),
        gaussian(rng),
        gaussian(rng),
        gaussian(rng),
    ));
    Ellipsoid::from_axes_radii(
        Vector3::from(center),
        q.to_rotation_matrix().into_inner(),
        radii,
    )
}

/// `n` edgels on the surface of `ellipsoid` with inward gradients.
pub fn sample_surface_edgels<R: Rng>(
    ellipsoid: &Ellipsoid,
    n: usize,
    noise: &SurfaceNoise,
    rng: &mut R,
) -> Vec<Edgel> {
    let mut edgels = Vec::with_capacity(n);
    while edgels.len() < n {
        let u = random_vector(rng, 1.0);
        let len = u.norm();
        if len < 1e-9 {
            continue;
        }
        let on_surface =
            ellipsoid.center() + ellipsoid.axes() * ellipsoid.radii().component_mul(&(u / len));
        let inward = -ellipsoid.normal_at(&on_surface);

        let position = on_surface + random_vector(rng, noise.position_sigma);
        let gradient = inward + random_vector(rng, noise.direction_sigma);
        edgels.push(Edgel::new(position.into(), gradient.into(), 1.0));
    }
    edgels
}

/// `n` edgels uniformly placed in the cube `center ± half_size` with random
/// gradient directions.
pub fn clutter_edgels<R: Rng>(
    center: [f64; 3],
    half_size: f64,
    n: usize,
    rng: &mut R,
) -> Vec<Edgel> {
    (0..n)
        .map(|_| {
            let p = Vector3::from_fn(|r, _| center[r] + rng.gen_range(-half_size..=half_size));
            let g = random_vector(rng, 1.0);
            Edgel::new(p.into(), g.into(), rng.gen_range(0.2..1.0))
        })
        .collect()
}

/// Layout of a synthetic `columns³` grid of ellipsoids.
#[derive(Debug, Clone, PartialEq)]
pub struct GridConfig {
    /// Cells per axis.
    pub columns: usize,
    /// Cell edge length; expected centers sit at the cell centers.
    pub spacing: f64,
    pub min_radius: f64,
    pub max_radius: f64,
    /// True centers are offset from the cell center by up to this much per
    /// axis.
    pub center_jitter: f64,
    pub edgels_per_target: usize,
    /// Background edgels per cell, spread over the whole cell.
    pub clutter_per_target: usize,
    pub noise: SurfaceNoise,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            columns: 4,
            spacing: 80.0,
            min_radius: 8.0,
            max_radius: 16.0,
            center_jitter: 2.0,
            edgels_per_target: 240,
            clutter_per_target: 30,
            noise: SurfaceNoise::default(),
        }
    }
}

/// Ground truth and fit targets of a synthetic grid.
#[derive(Debug, Clone)]
pub struct SyntheticScene {
    /// True ellipsoid per target, indexed like `targets`.
    pub truths: Vec<Ellipsoid>,
    pub targets: Vec<FitTarget<Vec<Edgel>>>,
}

/// Build a grid of random ellipsoids with edgels. Target ids are `0..columns³`
/// in x-major order.
pub fn grid_scene<R: Rng>(config: &GridConfig, rng: &mut R) -> Result<SyntheticScene, Degeneracy> {
    let c = config.columns;
    let mut truths = Vec::with_capacity(c * c * c);
    let mut targets = Vec::with_capacity(c * c * c);
    for i in 0..c {
        for j in 0..c {
            for k in 0..c {
                let cell = [i, j, k].map(|v| (v as f64 + 0.5) * config.spacing);
                let jitter = config.center_jitter;
                let true_center = cell.map(|v| v + rng.gen_range(-jitter..=jitter));
                let truth =
                    random_ellipsoid(true_center, config.min_radius, config.max_radius, rng)?;

                let mut edgels =
                    sample_surface_edgels(&truth, config.edgels_per_target, &config.noise, rng);
                edgels.extend(clutter_edgels(
                    cell,
                    0.5 * config.spacing,
                    config.clutter_per_target,
                    rng,
                ));

                targets.push(FitTarget::new(targets.len() as u64, cell, edgels));
                truths.push(truth);
            }
        }
    }
    Ok(SyntheticScene { truths, targets })
}

fn gaussian<R: Rng>(rng: &mut R) -> f64 {
    rng.sample(StandardNormal)
}

fn random_vector<R: Rng>(rng: &mut R, sigma: f64) -> Vector3<f64> {
    if sigma == 0.0 {
        return Vector3::zeros();
    }
    Vector3::new(gaussian(rng), gaussian(rng), gaussian(rng)) * sigma
}
