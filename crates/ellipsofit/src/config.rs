//! Fitting, filtering and batch configuration.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::edgel::GradPolarity;

/// Parameters of one robust ellipsoid fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitParams {
    /// Hard cap on sampling iterations.
    pub num_samples: usize,
    /// Stop early once this many valid candidates have been scored.
    pub num_candidates: usize,
    /// Distance cutoff for edgels outside the candidate surface.
    pub outside_cutoff_distance: f64,
    /// Distance cutoff for edgels inside the candidate surface.
    pub inside_cutoff_distance: f64,
    /// Angle cutoff between gradient and surface normal, in radians.
    pub angle_cutoff_rad: f64,
    /// Candidates whose center is farther than this from the expected center
    /// are discarded.
    pub max_center_distance: f64,
    /// Fixed PRNG seed. `None` seeds every fit from OS entropy.
    pub seed: Option<u64>,
}

impl Default for FitParams {
    fn default() -> Self {
        Self {
            num_samples: 1000,
            num_candidates: 100,
            outside_cutoff_distance: 3.0,
            inside_cutoff_distance: 5.0,
            angle_cutoff_rad: 30f64.to_radians(),
            max_center_distance: 10.0,
            seed: None,
        }
    }
}

impl FitParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_samples == 0 {
            return Err(ConfigError::invalid("fit.num_samples", "must be > 0"));
        }
        if self.num_candidates == 0 {
            return Err(ConfigError::invalid("fit.num_candidates", "must be > 0"));
        }
        positive("fit.outside_cutoff_distance", self.outside_cutoff_distance)?;
        positive("fit.inside_cutoff_distance", self.inside_cutoff_distance)?;
        positive("fit.angle_cutoff_rad", self.angle_cutoff_rad)?;
        positive("fit.max_center_distance", self.max_center_distance)?;
        Ok(())
    }
}

/// Occlusion filter settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcclusionFilterConfig {
    pub enable: bool,
    /// Maximum angle (radians) between two center rays considered the same ray.
    pub max_angle_rad: f64,
    /// A point farther than `max_factor` times a same-ray neighbor is occluded.
    pub max_factor: f64,
}

impl Default for OcclusionFilterConfig {
    fn default() -> Self {
        Self {
            enable: true,
            max_angle_rad: 5f64.to_radians(),
            max_factor: 1.1,
        }
    }
}

/// Edgel preselection applied before fitting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgelFilterConfig {
    /// Contrast of the objects against the background.
    pub polarity: GradPolarity,
    pub occlusion: OcclusionFilterConfig,
}

impl EdgelFilterConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.occlusion.enable {
            let a = self.occlusion.max_angle_rad;
            if !(a > 0.0 && a < std::f64::consts::PI) {
                return Err(ConfigError::invalid(
                    "filter.occlusion.max_angle_rad",
                    "must be in (0, pi)",
                ));
            }
            let f = self.occlusion.max_factor;
            if f.is_nan() || f < 1.0 {
                return Err(ConfigError::invalid(
                    "filter.occlusion.max_factor",
                    "must be >= 1",
                ));
            }
        }
        Ok(())
    }
}

/// Batch execution settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Fit targets on a worker pool instead of the calling thread.
    pub parallel: bool,
    /// Worker count; `None` uses the available hardware parallelism.
    pub num_threads: Option<usize>,
    /// Log progress every this many finished targets (0 disables).
    pub progress_every: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            num_threads: None,
            progress_every: 1000,
        }
    }
}

impl DriverConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_threads == Some(0) {
            return Err(ConfigError::invalid("driver.num_threads", "must be > 0"));
        }
        Ok(())
    }
}

/// Top-level configuration: fit parameters, edgel filters and batch settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    pub fit: FitParams,
    pub filter: EdgelFilterConfig,
    pub driver: DriverConfig,
}

impl FitConfig {
    /// Load and validate a JSON config. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_json_str(&data)
    }

    pub fn from_json_str(data: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(data).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.fit.validate()?;
        self.filter.validate()?;
        self.driver.validate()
    }
}

fn positive(field: &'static str, v: f64) -> Result<(), ConfigError> {
    if v > 0.0 && v.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, "must be finite and > 0"))
    }
}

/// Invalid or unreadable configuration.
#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: String,
        source: std::io::Error,
    },
    Parse(serde_json::Error),
    Invalid {
        field: &'static str,
        reason: String,
    },
    /// The worker pool could not be created.
    ThreadPool(String),
}

impl ConfigError {
    fn invalid(field: &'static str, reason: &str) -> Self {
        Self::Invalid {
            field,
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "cannot read config '{}': {}", path, source),
            Self::Parse(e) => write!(f, "invalid config JSON: {}", e),
            Self::Invalid { field, reason } => write!(f, "invalid {}: {}", field, reason),
            Self::ThreadPool(msg) => write!(f, "cannot build worker pool: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn defaults_match_documented_values() {
        let c = FitConfig::default();
        assert_eq!(c.fit.num_samples, 1000);
        assert_eq!(c.fit.num_candidates, 100);
        assert_relative_eq!(c.fit.angle_cutoff_rad, std::f64::consts::PI / 6.0);
        assert_eq!(c.filter.polarity, GradPolarity::LightToDark);
        assert!(c.filter.occlusion.enable);
        assert!(c.driver.parallel);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let c = FitConfig::from_json_str(
            r#"{ "fit": { "num_samples": 250, "seed": 7 },
                 "filter": { "polarity": "dark_to_light" } }"#,
        )
        .expect("valid config");
        assert_eq!(c.fit.num_samples, 250);
        assert_eq!(c.fit.seed, Some(7));
        assert_eq!(c.fit.num_candidates, 100);
        assert_eq!(c.filter.polarity, GradPolarity::DarkToLight);
        assert_relative_eq!(c.filter.occlusion.max_factor, 1.1);
    }

    #[test]
    fn invalid_values_are_reported_by_field() {
        let err = FitConfig::from_json_str(r#"{ "fit": { "inside_cutoff_distance": -1.0 } }"#)
            .expect_err("negative cutoff");
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "fit.inside_cutoff_distance",
                ..
            }
        ));

        let err = FitConfig::from_json_str(r#"{ "driver": { "num_threads": 0 } }"#)
            .expect_err("zero threads");
        assert!(err.to_string().contains("driver.num_threads"));

        let err = FitConfig::from_json_str("{ not json").expect_err("bad json");
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = FitConfig::from_json_file(Path::new("/nonexistent/ellipsofit.json"))
            .expect_err("missing file");
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
