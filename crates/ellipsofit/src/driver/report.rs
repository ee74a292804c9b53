use std::any::Any;
use std::fmt;
use std::time::Duration;

use crate::error::FitError;

/// Why a target produced no ellipsoid.
#[derive(Debug, Clone, PartialEq)]
pub enum TargetFailure {
    /// The robust fit failed.
    Fit(FitError),
    /// The target's source-to-global transform is not invertible.
    SingularTransform,
    /// The target's work panicked; carries the panic message.
    Panicked(String),
    /// The host store lock was poisoned by an earlier writer.
    StorePoisoned,
}

impl TargetFailure {
    /// Stable snake_case identifier for logs and reports.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Fit(e) => e.code(),
            Self::SingularTransform => "singular_transform",
            Self::Panicked(_) => "panicked",
            Self::StorePoisoned => "store_poisoned",
        }
    }

    pub(crate) fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let msg = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        Self::Panicked(msg)
    }
}

impl From<FitError> for TargetFailure {
    fn from(e: FitError) -> Self {
        Self::Fit(e)
    }
}

impl fmt::Display for TargetFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fit(e) => write!(f, "{}", e),
            Self::SingularTransform => f.write_str("source-to-global transform is singular"),
            Self::Panicked(msg) => write!(f, "panicked: {}", msg),
            Self::StorePoisoned => f.write_str("ellipsoid store lock is poisoned"),
        }
    }
}

impl std::error::Error for TargetFailure {}

/// Outcome counts and timing of one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub total: usize,
    /// Targets with a stored ellipsoid.
    pub found: usize,
    pub not_found: usize,
    /// Targets not started because the batch was cancelled.
    pub skipped: usize,
    pub elapsed: Duration,
    /// Failed targets with their reason, sorted by id.
    pub failures: Vec<(u64, TargetFailure)>,
}

impl BatchReport {
    /// Fraction of attempted targets that were fitted.
    pub fn success_rate(&self) -> f64 {
        let attempted = self.found + self.not_found;
        if attempted == 0 {
            0.0
        } else {
            self.found as f64 / attempted as f64
        }
    }

    /// Mean wall time per attempted target.
    pub fn time_per_target(&self) -> Duration {
        let attempted = self.found + self.not_found;
        if attempted == 0 {
            Duration::ZERO
        } else {
            self.elapsed.div_f64(attempted as f64)
        }
    }

    /// Number of failures per reason code.
    pub fn failure_counts(&self) -> Vec<(&'static str, usize)> {
        let mut counts: Vec<(&'static str, usize)> = Vec::new();
        for (_, f) in &self.failures {
            match counts.iter_mut().find(|(c, _)| *c == f.code()) {
                Some((_, n)) => *n += 1,
                None => counts.push((f.code(), 1)),
            }
        }
        counts
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pct = |n: usize| {
            if self.total == 0 {
                0.0
            } else {
                100.0 * n as f64 / self.total as f64
            }
        };
        write!(
            f,
            "found {} ({:.1}%), not found {} ({:.1}%)",
            self.found,
            pct(self.found),
            self.not_found,
            pct(self.not_found)
        )?;
        if self.skipped > 0 {
            write!(f, ", skipped {}", self.skipped)?;
        }
        write!(
            f,
            " of {} targets in {:.2?} ({:.2?} per target)",
            self.total,
            self.elapsed,
            self.time_per_target()
        )
    }
}
