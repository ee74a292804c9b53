//! Sample-consensus ellipsoid fitting to edgels.

use rand::prelude::*;

use crate::config::FitParams;
use crate::cost::EdgelCost;
use crate::edgel::{positions, Edgel};
use crate::ellipsoid::{fit_ellipsoid_direct, Ellipsoid, MIN_POINTS};
use crate::error::FitError;

/// Stride between per-target seeds derived from one base seed.
const SEED_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

/// Result of a robust fit with diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct EllipsoidFit {
    pub ellipsoid: Ellipsoid,
    /// Total cost of `ellipsoid` over the input edgels.
    pub cost: f64,
    /// Inliers of `ellipsoid` among the input edgels.
    pub num_inliers: usize,
    /// Sampling iterations run.
    pub iterations: usize,
    /// Valid candidates scored.
    pub candidates: usize,
    /// Whether the inlier re-fit succeeded. If `false`, `ellipsoid` is the
    /// best sampled candidate.
    pub refined: bool,
}

/// Fit an ellipsoid to `edgels` by random sampling around `expected_center`.
///
/// Each iteration draws 9 distinct edgels uniformly, fits an ellipsoid to
/// their positions and, if it is a proper ellipsoid whose center lies within
/// `max_center_distance` of `expected_center`, scores it with [`EdgelCost`]
/// over all edgels. Degenerate or distant hypotheses are skipped and do not
/// count as candidates. Sampling stops after `num_samples` iterations or
/// `num_candidates` valid candidates. The lowest-cost candidate is then re-fit
/// to its inliers; if that fails the candidate itself is returned.
///
/// Fewer than 9 edgels fail with [`FitError::InsufficientSamplePoints`]
/// before any random number is drawn.
pub fn sample_ellipsoid<R: Rng>(
    edgels: &[Edgel],
    expected_center: [f64; 3],
    params: &FitParams,
    rng: &mut R,
) -> Result<EllipsoidFit, FitError> {
    let n = edgels.len();
    if n < MIN_POINTS {
        return Err(FitError::InsufficientSamplePoints {
            needed: MIN_POINTS,
            got: n,
        });
    }

    let cost_fn = EdgelCost::from_params(params);
    let expected = nalgebra::Vector3::from(expected_center);
    let points = positions(edgels);

    let mut indices = [0usize; MIN_POINTS];
    let mut sample = Vec::with_capacity(MIN_POINTS);
    let mut best: Option<(Ellipsoid, f64)> = None;
    let mut candidates = 0usize;
    let mut iterations = 0usize;

    while iterations < params.num_samples {
        iterations += 1;

        sample_distinct(rng, n, &mut indices);
        sample.clear();
        sample.extend(indices.iter().map(|&i| points[i]));

        let ellipsoid = match fit_ellipsoid_direct(&sample) {
            Ok(e) => e,
            Err(e) => {
                tracing::trace!("sample {} skipped: {}", iterations, e);
                continue;
            }
        };
        if (ellipsoid.center() - expected).norm() > params.max_center_distance {
            continue;
        }

        let cost = cost_fn.total_cost(&ellipsoid, edgels);
        if best.as_ref().map_or(true, |(_, c)| cost < *c) {
            best = Some((ellipsoid, cost));
        }
        candidates += 1;
        if candidates >= params.num_candidates {
            break;
        }
    }

    let Some((best_ellipsoid, best_cost)) = best else {
        return Err(FitError::NoCandidateWithinTolerance { iterations });
    };

    let (ellipsoid, cost, refined) = match fit_to_inliers(edgels, &best_ellipsoid, &cost_fn) {
        Ok(e) => {
            let c = cost_fn.total_cost(&e, edgels);
            (e, c, true)
        }
        Err(e) => {
            tracing::debug!("inlier re-fit failed ({}), keeping best candidate", e);
            (best_ellipsoid, best_cost, false)
        }
    };
    let num_inliers = cost_fn
        .inlier_mask(&ellipsoid, edgels)
        .into_iter()
        .filter(|&m| m)
        .count();

    tracing::trace!(
        "robust fit: {} iterations, {} candidates, cost {:.3}, {}/{} inliers",
        iterations,
        candidates,
        cost,
        num_inliers,
        n
    );

    Ok(EllipsoidFit {
        ellipsoid,
        cost,
        num_inliers,
        iterations,
        candidates,
        refined,
    })
}

/// [`sample_ellipsoid`] with a PRNG seeded from `params.seed`, or from OS
/// entropy if no seed is configured.
pub fn fit_ellipsoid_robust(
    edgels: &[Edgel],
    expected_center: [f64; 3],
    params: &FitParams,
) -> Result<EllipsoidFit, FitError> {
    let mut rng = seeded_rng(params.seed, 0);
    sample_ellipsoid(edgels, expected_center, params, &mut rng)
}

/// Re-fit an ellipsoid to the edgels that `cost` classifies as inliers of
/// `guess`.
pub fn fit_to_inliers(
    edgels: &[Edgel],
    guess: &Ellipsoid,
    cost: &EdgelCost,
) -> Result<Ellipsoid, FitError> {
    let inliers: Vec<_> = edgels
        .iter()
        .filter(|e| cost.is_inlier(guess, e))
        .map(Edgel::pos)
        .collect();
    fit_ellipsoid_direct(&inliers)
}

/// PRNG for stream `stream` of a batch: deterministic from `seed` if given,
/// otherwise from entropy.
pub(crate) fn seeded_rng(seed: Option<u64>, stream: u64) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s.wrapping_add(stream.wrapping_mul(SEED_STRIDE))),
        None => StdRng::from_entropy(),
    }
}

/// Fill `out` with distinct indices from `0..n` by rejection sampling.
fn sample_distinct<R: Rng>(rng: &mut R, n: usize, out: &mut [usize]) {
    debug_assert!(out.len() <= n);
    for k in 0..out.len() {
        let mut i = rng.gen_range(0..n);
        while out[..k].contains(&i) {
            i = rng.gen_range(0..n);
        }
        out[k] = i;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::{clutter_edgels, random_ellipsoid, sample_surface_edgels, SurfaceNoise};
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    /// Counts the random words drawn from the inner generator.
    struct CountingRng {
        inner: StdRng,
        draws: usize,
    }

    impl RngCore for CountingRng {
        fn next_u32(&mut self) -> u32 {
            self.draws += 1;
            self.inner.next_u32()
        }

        fn next_u64(&mut self) -> u64 {
            self.draws += 1;
            self.inner.next_u64()
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            self.draws += 1;
            self.inner.fill_bytes(dest)
        }

        fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
            self.draws += 1;
            self.inner.try_fill_bytes(dest)
        }
    }

    fn scene(seed: u64, noise: SurfaceNoise, clutter: usize) -> (Ellipsoid, Vec<Edgel>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let truth =
            random_ellipsoid([50.0, 40.0, 30.0], 8.0, 16.0, &mut rng).expect("valid ellipsoid");
        let mut edgels = sample_surface_edgels(&truth, 200, &noise, &mut rng);
        edgels.extend(clutter_edgels([50.0, 40.0, 30.0], 20.0, clutter, &mut rng));
        edgels.shuffle(&mut rng);
        (truth, edgels)
    }

    fn params(seed: u64) -> FitParams {
        FitParams {
            seed: Some(seed),
            ..FitParams::default()
        }
    }

    #[test]
    fn exact_surface_is_recovered() {
        let (truth, edgels) = scene(1, SurfaceNoise::none(), 0);
        let fit = fit_ellipsoid_robust(&edgels, [50.0, 40.0, 30.0], &params(2))
            .expect("fit should succeed");
        assert!(fit.refined);
        assert_eq!(fit.num_inliers, edgels.len());
        assert_relative_eq!(fit.ellipsoid.center(), truth.center(), epsilon = 1e-6);
        assert_relative_eq!(fit.ellipsoid.radii(), truth.radii(), epsilon = 1e-6);
        assert!(fit.cost < 1e-3, "cost {}", fit.cost);
    }

    #[test]
    fn noisy_surface_with_clutter_is_recovered() {
        let (truth, edgels) = scene(3, SurfaceNoise::default(), 40);
        let fit = fit_ellipsoid_robust(&edgels, [51.0, 39.0, 31.0], &params(4))
            .expect("fit should succeed");
        assert!((fit.ellipsoid.center() - truth.center()).norm() < 1.0);
        for k in 0..3 {
            let rel = (fit.ellipsoid.radii()[k] - truth.radii()[k]).abs() / truth.radii()[k];
            assert!(rel < 0.1, "radius {} off by {:.1}%", k, rel * 100.0);
        }
        assert!(fit.num_inliers >= 180);
    }

    #[test]
    fn too_few_edgels_draw_nothing() {
        let (_, edgels) = scene(5, SurfaceNoise::none(), 0);
        let mut rng = CountingRng {
            inner: StdRng::seed_from_u64(0),
            draws: 0,
        };
        let err = sample_ellipsoid(&edgels[..8], [50.0, 40.0, 30.0], &params(0), &mut rng)
            .expect_err("8 edgels");
        assert_eq!(err, FitError::InsufficientSamplePoints { needed: 9, got: 8 });
        assert_eq!(rng.draws, 0);
    }

    #[test]
    fn distant_expected_center_finds_no_candidate() {
        let (_, edgels) = scene(6, SurfaceNoise::none(), 0);
        let p = FitParams {
            num_samples: 200,
            ..params(7)
        };
        let err = fit_ellipsoid_robust(&edgels, [150.0, 40.0, 30.0], &p).expect_err("too far");
        assert_eq!(err, FitError::NoCandidateWithinTolerance { iterations: 200 });
    }

    #[test]
    fn stops_after_enough_candidates() {
        let (_, edgels) = scene(8, SurfaceNoise::none(), 0);
        let p = FitParams {
            num_candidates: 5,
            ..params(9)
        };
        let fit = fit_ellipsoid_robust(&edgels, [50.0, 40.0, 30.0], &p).expect("fit");
        assert_eq!(fit.candidates, 5);
        assert!(fit.iterations >= 5 && fit.iterations < p.num_samples);
    }

    #[test]
    fn same_seed_same_result() {
        let (_, edgels) = scene(10, SurfaceNoise::default(), 20);
        let a = fit_ellipsoid_robust(&edgels, [50.0, 40.0, 30.0], &params(11)).expect("fit");
        let b = fit_ellipsoid_robust(&edgels, [50.0, 40.0, 30.0], &params(11)).expect("fit");
        assert_eq!(a, b);
    }

    #[test]
    fn failed_refit_keeps_best_candidate() {
        let (_, edgels) = scene(14, SurfaceNoise::default(), 0);
        // gradient noise alone exceeds this cutoff, so no candidate has inliers
        let p = FitParams {
            angle_cutoff_rad: 1e-4,
            ..params(15)
        };
        let fit = fit_ellipsoid_robust(&edgels, [50.0, 40.0, 30.0], &p).expect("candidate");
        assert!(!fit.refined);
        assert!(fit.candidates > 0);
        assert!(fit.num_inliers < MIN_POINTS);

        let cost_fn = EdgelCost::from_params(&p);
        assert!(fit_to_inliers(&edgels, &fit.ellipsoid, &cost_fn).is_err());
        assert_relative_eq!(fit.cost, cost_fn.total_cost(&fit.ellipsoid, &edgels));
        // a sampled candidate always passed the center gate
        let offset = fit.ellipsoid.center() - Vector3::new(50.0, 40.0, 30.0);
        assert!(offset.norm() <= p.max_center_distance);
    }

    #[test]
    fn coplanar_edgels_give_no_candidate() {
        let edgels: Vec<Edgel> = (0..40)
            .map(|i| {
                let t = i as f64 * 0.37;
                let d = Vector3::new(t.cos(), t.sin(), 0.0);
                let radius = 10.0 + (i % 5) as f64;
                let p = Vector3::new(50.0, 40.0, 30.0) + d * radius;
                Edgel::new(p.into(), (-d).into(), 1.0)
            })
            .collect();
        let p = FitParams {
            num_samples: 50,
            ..params(16)
        };
        let err = fit_ellipsoid_robust(&edgels, [50.0, 40.0, 30.0], &p).expect_err("coplanar");
        assert_eq!(err, FitError::NoCandidateWithinTolerance { iterations: 50 });
    }

    #[test]
    fn refit_without_inliers_fails() {
        let (_, edgels) = scene(12, SurfaceNoise::none(), 0);
        let far = Ellipsoid::from_axes_radii(
            Vector3::new(-500.0, 0.0, 0.0),
            nalgebra::Matrix3::identity(),
            Vector3::new(3.0, 2.0, 1.0),
        )
        .expect("valid ellipsoid");
        let err = fit_to_inliers(&edgels, &far, &EdgelCost::default()).expect_err("no inliers");
        assert_eq!(err, FitError::InsufficientSamplePoints { needed: 9, got: 0 });
    }

    #[test]
    fn distinct_indices() {
        let mut rng = StdRng::seed_from_u64(13);
        let mut out = [0usize; 9];
        for _ in 0..100 {
            sample_distinct(&mut rng, 10, &mut out);
            let mut sorted = out;
            sorted.sort_unstable();
            assert!(sorted.windows(2).all(|w| w[0] != w[1]));
            assert!(sorted.iter().all(|&i| i < 10));
        }
    }

    #[test]
    fn derived_seeds_differ_per_stream() {
        let a = seeded_rng(Some(42), 0).gen::<u64>();
        let b = seeded_rng(Some(42), 1).gen::<u64>();
        let a2 = seeded_rng(Some(42), 0).gen::<u64>();
        assert_ne!(a, b);
        assert_eq!(a, a2);
    }
}
