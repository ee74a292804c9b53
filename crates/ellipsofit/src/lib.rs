//! ellipsofit: robust 3D ellipsoid fitting to oriented edge samples.
//!
//! Fits ellipsoidal object boundaries (cells, nuclei, blobs) in volumetric
//! images given subpixel edge samples ("edgels") and an expected center per
//! object. The stages are:
//!
//! 1. **Edgel** – polarity and occlusion filtering relative to the expected
//!    center, optional source-to-global affine mapping.
//! 2. **Ellipsoid** – algebraic least-squares quadric fit and Euclidean
//!    point-to-surface distance.
//! 3. **Cost** – truncated distance + gradient-angle agreement of an edgel
//!    with a candidate surface.
//! 4. **RANSAC** – 9-point minimal samples scored by cost, followed by a
//!    least-squares re-fit on the inliers of the best candidate.
//! 5. **Driver** – batch fitting on a worker pool with per-target failure
//!    isolation and atomic result writes to a host store.
//!
//! # Public API
//! - [`fit_ellipsoid_robust`] / [`sample_ellipsoid`] for a single object
//! - [`FitDriver`] with [`FitTarget`] and [`EllipsoidStore`] for batches
//! - [`FitConfig`] and its parts for tuning, loadable from JSON
//! - [`synthetic`] generators for tests and demos

mod config;
mod cost;
mod driver;
mod edgel;
mod ellipsoid;
mod error;
mod ransac;
pub mod synthetic;

pub use config::{
    ConfigError, DriverConfig, EdgelFilterConfig, FitConfig, FitParams, OcclusionFilterConfig,
};
pub use cost::{EdgelCost, EdgelResidual};
pub use driver::{
    fit_target_edgels, BatchReport, EdgelSource, EllipsoidStore, FitDriver, FitTarget, SpotTable,
    TargetFailure,
};
pub use edgel::{
    filter_by_direction, filter_by_occlusion, transform_edgels, AffineTransform3, Edgel,
    GradPolarity,
};
pub use ellipsoid::{
    fit_ellipsoid_direct, Ellipsoid, EllipsoidParams, SurfaceProjection, MIN_POINTS,
};
pub use error::{Degeneracy, FitError};
pub use ransac::{fit_ellipsoid_robust, fit_to_inliers, sample_ellipsoid, EllipsoidFit};
