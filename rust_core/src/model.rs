//! Win probability models
//!
//! Defines the `WinProbabilityModel` trait the predictor calls, plus two
//! implementations:
//! - `LogisticModel`: trained weights loaded from a JSON artifact
//! - `EloBaselineModel`: the injury-adjusted Elo expectation, no training needed

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::features::{feature_names, FeatureVector, ELO_PROB_INDEX};

/// Pre-trained home win probability model.
///
/// Implementations must be pure: same vector in, same probability out.
pub trait WinProbabilityModel: Send + Sync {
    /// Columns the model was trained on, in order
    fn feature_names(&self) -> &[String];

    /// Uncalibrated home win probability in [0, 1]
    fn predict_raw(&self, features: &FeatureVector) -> f64;

    /// Model name for logging and prediction output
    fn model_name(&self) -> &str;
}

/// Fail unless `model` consumes exactly the columns the pipeline produces.
pub fn verify_schema(model: &dyn WinProbabilityModel) -> Result<()> {
    let expected = feature_names();
    if model.feature_names() != expected.as_slice() {
        return Err(PipelineError::SchemaMismatch {
            expected,
            found: model.feature_names().to_vec(),
        });
    }
    Ok(())
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Logistic regression over the feature vector.
///
/// Artifact format: `{"feature_names": [...], "weights": [...], "intercept": f}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    feature_names: Vec<String>,
    weights: Vec<f64>,
    intercept: f64,
    #[serde(default = "default_logistic_name")]
    name: String,
}

fn default_logistic_name() -> String {
    "logistic".to_string()
}

impl LogisticModel {
    pub fn new(feature_names: Vec<String>, weights: Vec<f64>, intercept: f64) -> Result<Self> {
        let model = Self {
            feature_names,
            weights,
            intercept,
            name: default_logistic_name(),
        };
        model.validate()?;
        Ok(model)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let model: Self = serde_json::from_str(json)
            .map_err(|e| PipelineError::ModelArtifact(format!("unreadable model JSON: {}", e)))?;
        model.validate()?;
        Ok(model)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| {
            PipelineError::ModelArtifact(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    fn validate(&self) -> Result<()> {
        if self.weights.len() != self.feature_names.len() {
            return Err(PipelineError::ModelArtifact(format!(
                "{} weights for {} features",
                self.weights.len(),
                self.feature_names.len()
            )));
        }
        if !self.intercept.is_finite() || self.weights.iter().any(|w| !w.is_finite()) {
            return Err(PipelineError::ModelArtifact("non-finite coefficient".to_string()));
        }
        Ok(())
    }
}

impl WinProbabilityModel for LogisticModel {
    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn predict_raw(&self, features: &FeatureVector) -> f64 {
        let z = self.intercept
            + self
                .weights
                .iter()
                .zip(features.values())
                .map(|(w, x)| w * x)
                .sum::<f64>();
        sigmoid(z)
    }

    fn model_name(&self) -> &str {
        &self.name
    }
}

/// Uses `elo_prob` directly. Useful before a trained artifact exists and as
/// a sanity baseline for one.
#[derive(Debug, Clone)]
pub struct EloBaselineModel {
    feature_names: Vec<String>,
}

impl Default for EloBaselineModel {
    fn default() -> Self {
        Self::new()
    }
}

impl EloBaselineModel {
    pub fn new() -> Self {
        Self {
            feature_names: feature_names(),
        }
    }
}

impl WinProbabilityModel for EloBaselineModel {
    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn predict_raw(&self, features: &FeatureVector) -> f64 {
        features.values()[ELO_PROB_INDEX]
    }

    fn model_name(&self) -> &str {
        "elo_baseline"
    }
}
