//! Error types for ellipsoid fitting.

use std::fmt;

/// Why a quadric could not be turned into a proper ellipsoid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Degeneracy {
    /// The 9×9 normal matrix is not (numerically) symmetric positive definite:
    /// coplanar or otherwise rank-deficient point sets.
    NotPositiveDefinite,
    /// The quadratic part of the quadric is singular, or the quadric has no
    /// finite center / scale.
    SingularQuadric,
    /// The quadric is not an ellipsoid: some radius is NaN, infinite or not
    /// positive.
    NonFiniteRadii,
}

impl Degeneracy {
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotPositiveDefinite => "not_positive_definite",
            Self::SingularQuadric => "singular_quadric",
            Self::NonFiniteRadii => "non_finite_radii",
        }
    }
}

impl fmt::Display for Degeneracy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl std::error::Error for Degeneracy {}

/// Errors returned by the solver and the robust estimator.
#[derive(Debug, Clone, PartialEq)]
pub enum FitError {
    /// Too few edgels / points for a minimal sample.
    InsufficientSamplePoints {
        /// Required minimum number of points.
        needed: usize,
        /// Provided number of points.
        got: usize,
    },
    /// The point set does not determine a proper ellipsoid.
    DegenerateAlgebraicSystem {
        /// Which stage of the solve failed.
        reason: Degeneracy,
    },
    /// No sampled hypothesis was a valid ellipsoid near the expected center.
    NoCandidateWithinTolerance {
        /// Number of sampling iterations that were run.
        iterations: usize,
    },
}

impl FitError {
    /// Stable snake_case identifier for logs and reports.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InsufficientSamplePoints { .. } => "insufficient_sample_points",
            Self::DegenerateAlgebraicSystem { .. } => "degenerate_algebraic_system",
            Self::NoCandidateWithinTolerance { .. } => "no_candidate_within_tolerance",
        }
    }
}

impl From<Degeneracy> for FitError {
    fn from(reason: Degeneracy) -> Self {
        Self::DegenerateAlgebraicSystem { reason }
    }
}

impl fmt::Display for FitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientSamplePoints { needed, got } => {
                write!(f, "too few sample points: need {}, got {}", needed, got)
            }
            Self::DegenerateAlgebraicSystem { reason } => {
                write!(f, "degenerate algebraic system: {}", reason)
            }
            Self::NoCandidateWithinTolerance { iterations } => write!(
                f,
                "no ellipsoid candidate near the expected center after {} samples",
                iterations
            ),
        }
    }
}

impl std::error::Error for FitError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_context() {
        let e = FitError::InsufficientSamplePoints { needed: 9, got: 4 };
        assert_eq!(e.to_string(), "too few sample points: need 9, got 4");
        let e: FitError = Degeneracy::NotPositiveDefinite.into();
        assert_eq!(e.code(), "degenerate_algebraic_system");
        assert!(e.to_string().ends_with("not_positive_definite"));
    }
}
