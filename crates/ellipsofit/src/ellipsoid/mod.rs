//! Ellipsoid model and fitting primitives.
//!
//! Implements:
//! - Ellipsoid representation with synchronized center/covariance/precision/
//!   principal-axes forms.
//! - Algebraic least-squares fit of a quadric `xᵀ A x + 2 bᵀ x = 1`.
//! - Euclidean point-to-surface distance and closest-point projection.

mod distance;
mod fit;
mod types;

pub use distance::SurfaceProjection;
pub use fit::{fit_ellipsoid_direct, MIN_POINTS};
pub use types::{Ellipsoid, EllipsoidParams};
