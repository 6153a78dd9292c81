//! Probability calibration.
//!
//! Raw model outputs drift from observed win rates; a Platt scaling layer
//! fitted offline maps them back. Both variants are monotone so the favored
//! side never flips.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Calibrator {
    Identity,
    /// `1 / (1 + exp(-(slope * raw + intercept)))`
    Platt { slope: f64, intercept: f64 },
}

impl Default for Calibrator {
    fn default() -> Self {
        Calibrator::Identity
    }
}

impl Calibrator {
    pub fn platt(slope: f64, intercept: f64) -> Result<Self> {
        let calibrator = Calibrator::Platt { slope, intercept };
        calibrator.validate()?;
        Ok(calibrator)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let calibrator: Self = serde_json::from_str(json)
            .map_err(|e| PipelineError::Calibrator(format!("unreadable calibrator JSON: {}", e)))?;
        calibrator.validate()?;
        Ok(calibrator)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| {
            PipelineError::Calibrator(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }

    pub fn is_identity(&self) -> bool {
        matches!(self, Calibrator::Identity)
    }

    /// Map a raw probability to a calibrated one in [0, 1]
    pub fn calibrate(&self, raw: f64) -> f64 {
        let p = match *self {
            Calibrator::Identity => raw,
            Calibrator::Platt { slope, intercept } => 1.0 / (1.0 + (-(slope * raw + intercept)).exp()),
        };
        p.clamp(0.0, 1.0)
    }

    // A non-positive slope would reverse or flatten the ordering
    fn validate(&self) -> Result<()> {
        if let Calibrator::Platt { slope, intercept } = *self {
            if !slope.is_finite() || !intercept.is_finite() {
                return Err(PipelineError::Calibrator("non-finite Platt parameters".to_string()));
            }
            if slope <= 0.0 {
                return Err(PipelineError::Calibrator(format!(
                    "Platt slope must be positive, got {}",
                    slope
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_passes_through() {
        let c = Calibrator::default();
        assert!(c.is_identity());
        assert_eq!(c.calibrate(0.37), 0.37);
        assert_eq!(c.calibrate(1.2), 1.0);
    }

    #[test]
    fn test_platt_is_monotone() {
        let c = Calibrator::platt(4.0, -2.0).unwrap();
        assert!((c.calibrate(0.5) - 0.5).abs() < 1e-12);
        let mut last = 0.0;
        for i in 0..=100 {
            let p = c.calibrate(i as f64 / 100.0);
            assert!(p >= last);
            assert!((0.0..=1.0).contains(&p));
            last = p;
        }
    }

    #[test]
    fn test_rejects_non_positive_slope() {
        assert!(matches!(Calibrator::platt(0.0, 0.1), Err(PipelineError::Calibrator(_))));
        assert!(matches!(Calibrator::platt(-1.0, 0.1), Err(PipelineError::Calibrator(_))));
        let err = Calibrator::from_json(r#"{"method": "platt", "slope": -2.0, "intercept": 0.0}"#);
        assert!(err.is_err());
    }

    #[test]
    fn test_from_json() {
        let c = Calibrator::from_json(r#"{"method": "platt", "slope": 3.5, "intercept": -1.75}"#)
            .unwrap();
        assert_eq!(c, Calibrator::Platt { slope: 3.5, intercept: -1.75 });
        assert!(Calibrator::from_json(r#"{"method": "identity"}"#).unwrap().is_identity());
    }
}
