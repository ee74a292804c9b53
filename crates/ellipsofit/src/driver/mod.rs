//! Batch fitting of many independent targets.
//!
//! Every target (expected center + edgel source) is fitted independently on a
//! worker pool or on the calling thread. Successful fits are written to the
//! host store under a single write lock per target. Failures, including
//! panics inside a target's work, are counted and never abort the batch.

mod report;

pub use report::{BatchReport, TargetFailure};

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use rand::Rng;

use crate::config::{ConfigError, EdgelFilterConfig, FitConfig, FitParams};
use crate::edgel::{
    filter_by_direction, filter_by_occlusion, transform_edgels, AffineTransform3, Edgel,
};
use crate::ellipsoid::EllipsoidParams;
use crate::error::FitError;
use crate::ransac::{sample_ellipsoid, seeded_rng, EllipsoidFit};

/// Provider of a target's edgels.
///
/// Called once per fit; the returned vector is the fit's private copy.
pub trait EdgelSource: Sync {
    fn edgels(&self) -> Vec<Edgel>;
}

impl EdgelSource for Vec<Edgel> {
    fn edgels(&self) -> Vec<Edgel> {
        self.clone()
    }
}

/// One object to fit.
#[derive(Debug, Clone)]
pub struct FitTarget<S> {
    /// Key under which the result is stored.
    pub id: u64,
    /// Expected object center in global coordinates.
    pub expected_center: [f64; 3],
    pub source: S,
    /// Maps source edgel coordinates to global coordinates (e.g. voxel to
    /// world). `None` if the source is already global.
    pub source_to_global: Option<AffineTransform3>,
}

impl<S> FitTarget<S> {
    pub fn new(id: u64, expected_center: [f64; 3], source: S) -> Self {
        Self {
            id,
            expected_center,
            source,
            source_to_global: None,
        }
    }

    pub fn with_transform(mut self, source_to_global: AffineTransform3) -> Self {
        self.source_to_global = Some(source_to_global);
        self
    }
}

impl<S: EdgelSource> FitTarget<S> {
    /// Edgels of this target in global coordinates.
    pub fn global_edgels(&self) -> Result<Vec<Edgel>, TargetFailure> {
        let edgels = self.source.edgels();
        match &self.source_to_global {
            Some(t) => transform_edgels(&edgels, t).ok_or(TargetFailure::SingularTransform),
            None => Ok(edgels),
        }
    }
}

/// Host model receiving fitted shapes.
pub trait EllipsoidStore {
    /// Set center and covariance of target `id` in one step.
    fn set_ellipsoid(&mut self, id: u64, params: &EllipsoidParams);
}

/// In-memory [`EllipsoidStore`] keyed by target id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpotTable {
    spots: BTreeMap<u64, EllipsoidParams>,
}

impl SpotTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: u64) -> Option<&EllipsoidParams> {
        self.spots.get(&id)
    }

    pub fn len(&self) -> usize {
        self.spots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, &EllipsoidParams)> {
        self.spots.iter().map(|(&id, p)| (id, p))
    }
}

impl EllipsoidStore for SpotTable {
    fn set_ellipsoid(&mut self, id: u64, params: &EllipsoidParams) {
        self.spots.insert(id, *params);
    }
}

/// Run the per-target pipeline on edgels already in global coordinates:
/// polarity filter, optional occlusion filter, robust fit.
pub fn fit_target_edgels<R: Rng>(
    edgels: &[Edgel],
    expected_center: [f64; 3],
    filter: &EdgelFilterConfig,
    params: &FitParams,
    rng: &mut R,
) -> Result<EllipsoidFit, FitError> {
    let kept = filter_by_direction(edgels, expected_center, filter.polarity);
    let kept = if filter.occlusion.enable {
        filter_by_occlusion(
            &kept,
            expected_center,
            filter.occlusion.max_angle_rad,
            filter.occlusion.max_factor,
        )
    } else {
        kept
    };
    tracing::trace!("{} of {} edgels kept for fitting", kept.len(), edgels.len());
    sample_ellipsoid(&kept, expected_center, params, rng)
}

#[derive(Default)]
struct Counters {
    found: AtomicUsize,
    not_found: AtomicUsize,
    skipped: AtomicUsize,
    finished: AtomicUsize,
}

/// Fits a batch of targets and writes the results to a host store.
#[derive(Debug)]
pub struct FitDriver {
    config: FitConfig,
    cancel: Arc<AtomicBool>,
}

impl FitDriver {
    pub fn new(config: FitConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn config(&self) -> &FitConfig {
        &self.config
    }

    /// Stop starting new targets. Targets already being fitted finish and
    /// store their result.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// Shared cancel flag, e.g. for a signal handler or UI thread.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Fit all `targets` and store successes in `store`.
    ///
    /// Fails only if the worker pool cannot be built; per-target failures are
    /// reported in the returned [`BatchReport`].
    pub fn run<S, M>(
        &self,
        targets: &[FitTarget<S>],
        store: &RwLock<M>,
    ) -> Result<BatchReport, ConfigError>
    where
        S: EdgelSource,
        M: EllipsoidStore + Send + Sync,
    {
        let start = Instant::now();
        let counters = Counters::default();
        let failures = Mutex::new(Vec::new());
        let total = targets.len();

        tracing::info!(
            "fitting ellipsoids to {} targets ({})",
            total,
            if self.config.driver.parallel {
                "parallel"
            } else {
                "sequential"
            }
        );

        let work = |t: &FitTarget<S>| self.process(t, store, &counters, &failures, total);
        if self.config.driver.parallel {
            use rayon::prelude::*;

            let mut builder = rayon::ThreadPoolBuilder::new();
            if let Some(n) = self.config.driver.num_threads {
                builder = builder.num_threads(n);
            }
            let pool = builder
                .build()
                .map_err(|e| ConfigError::ThreadPool(e.to_string()))?;
            pool.install(|| targets.par_iter().for_each(work));
        } else {
            targets.iter().for_each(work);
        }

        let mut failures = failures
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        failures.sort_by_key(|(id, _)| *id);

        let report = BatchReport {
            total,
            found: counters.found.into_inner(),
            not_found: counters.not_found.into_inner(),
            skipped: counters.skipped.into_inner(),
            elapsed: start.elapsed(),
            failures,
        };
        tracing::info!("{}", report);
        Ok(report)
    }

    fn process<S, M>(
        &self,
        target: &FitTarget<S>,
        store: &RwLock<M>,
        counters: &Counters,
        failures: &Mutex<Vec<(u64, TargetFailure)>>,
        total: usize,
    ) where
        S: EdgelSource,
        M: EllipsoidStore,
    {
        if self.is_cancelled() {
            counters.skipped.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let outcome = catch_unwind(AssertUnwindSafe(|| self.fit_one(target)))
            .unwrap_or_else(|payload| Err(TargetFailure::from_panic(&*payload)))
            .and_then(|fit| {
                store_result(store, target.id, &EllipsoidParams::from(&fit.ellipsoid))?;
                Ok(fit)
            });

        match outcome {
            Ok(fit) => {
                counters.found.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    "target {}: fitted, {} inliers, cost {:.2}{}",
                    target.id,
                    fit.num_inliers,
                    fit.cost,
                    if fit.refined { "" } else { " (unrefined)" }
                );
            }
            Err(failure) => {
                counters.not_found.fetch_add(1, Ordering::Relaxed);
                match &failure {
                    TargetFailure::Panicked(_) | TargetFailure::StorePoisoned => {
                        tracing::warn!("target {}: {}", target.id, failure)
                    }
                    _ => tracing::debug!("target {}: {}", target.id, failure),
                }
                if let Ok(mut f) = failures.lock() {
                    f.push((target.id, failure));
                }
            }
        }

        let done = counters.finished.fetch_add(1, Ordering::Relaxed) + 1;
        let every = self.config.driver.progress_every;
        if every > 0 && done % every == 0 {
            tracing::info!("{} / {} targets processed", done, total);
        }
    }

    fn fit_one<S: EdgelSource>(&self, target: &FitTarget<S>) -> Result<EllipsoidFit, TargetFailure> {
        let edgels = target.global_edgels()?;
        let mut rng = seeded_rng(self.config.fit.seed, target.id);
        Ok(fit_target_edgels(
            &edgels,
            target.expected_center,
            &self.config.filter,
            &self.config.fit,
            &mut rng,
        )?)
    }
}

/// Write one result under the store's write lock.
///
/// A panicking setter is caught while the guard is still held, so the lock is
/// not poisoned and later targets can still be stored.
fn store_result<M: EllipsoidStore>(
    store: &RwLock<M>,
    id: u64,
    params: &EllipsoidParams,
) -> Result<(), TargetFailure> {
    let mut guard = store.write().map_err(|_| TargetFailure::StorePoisoned)?;
    catch_unwind(AssertUnwindSafe(|| guard.set_ellipsoid(id, params)))
        .map_err(|payload| TargetFailure::from_panic(&*payload))
}
