use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use super::predictor::{ModelOutput, Predictor};
use crate::features::RoundFeatures;

/// Confidence scale applied when the feature window was not full.
const PARTIAL_WINDOW_SCALE: f64 = 0.75;

/// Trained-model bundle artifact, produced by the offline training job and
/// loaded once at startup. Absence of a bundle is valid; the ensemble then
/// predicts nothing and the engine force-skips.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelBundle {
    pub models: Vec<ModelSpec>,
}

impl ModelBundle {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read model bundle {}", path.display()))?;
        let bundle: ModelBundle = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse model bundle {}", path.display()))?;
        info!(
            "Loaded model bundle from {} ({} models)",
            path.display(),
            bundle.models.len()
        );
        Ok(bundle)
    }

    pub fn into_predictors(self) -> Vec<Box<dyn Predictor>> {
        self.models
            .into_iter()
            .map(|spec| {
                debug!("Bundle model '{}' ready", spec.model_id());
                spec.into_predictor()
            })
            .collect()
    }
}

/// Serialized form of one trained model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelSpec {
    Linear(LinearModel),
    StumpEnsemble(StumpModel),
}

impl ModelSpec {
    pub fn model_id(&self) -> &str {
        match self {
            ModelSpec::Linear(m) => &m.model_id,
            ModelSpec::StumpEnsemble(m) => &m.model_id,
        }
    }

    fn into_predictor(self) -> Box<dyn Predictor> {
        match self {
            ModelSpec::Linear(m) => Box::new(m),
            ModelSpec::StumpEnsemble(m) => Box::new(m),
        }
    }
}

/// Linear regressor over the z-score-normalized feature array.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearModel {
    pub model_id: String,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    pub feature_means: Vec<f64>,
    pub feature_stds: Vec<f64>,
    /// Validation-derived confidence, 0-100.
    pub base_confidence: f64,
}

impl Predictor for LinearModel {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn predict(&self, features: &RoundFeatures) -> ModelOutput {
        let arr = features.to_array();
        let mut value = self.intercept;
        for (j, &x) in arr.iter().enumerate() {
            let mean = self.feature_means.get(j).copied().unwrap_or(0.0);
            let std = self.feature_stds.get(j).copied().unwrap_or(1.0);
            let z = if std > 1e-10 { (x - mean) / std } else { 0.0 };
            value += self.coefficients.get(j).copied().unwrap_or(0.0) * z;
        }

        let mut confidence = self.base_confidence;
        if !features.full_window {
            confidence *= PARTIAL_WINDOW_SCALE;
        }

        ModelOutput { value, confidence }
    }
}

/// Sum of threshold stumps over the raw feature array. The serialized
/// export of a shallow gradient-boosted model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StumpModel {
    pub model_id: String,
    pub bias: f64,
    pub stumps: Vec<Stump>,
    pub base_confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stump {
    /// Index into the feature array.
    pub feature: usize,
    pub threshold: f64,
    pub below: f64,
    pub above: f64,
}

impl Predictor for StumpModel {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn predict(&self, features: &RoundFeatures) -> ModelOutput {
        let arr = features.to_array();
        let mut value = self.bias;
        for stump in &self.stumps {
            let x = arr.get(stump.feature).copied().unwrap_or(0.0);
            value += if x < stump.threshold { stump.below } else { stump.above };
        }

        let mut confidence = self.base_confidence;
        if !features.full_window {
            confidence *= PARTIAL_WINDOW_SCALE;
        }

        ModelOutput { value, confidence }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_bundle_json() -> String {
        serde_json::json!({
            "models": [
                {
                    "kind": "linear",
                    "model_id": "ridge_v1",
                    "coefficients": [0.5, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
                    "intercept": 2.0,
                    "feature_means": [2.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
                    "feature_stds": [1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0],
                    "base_confidence": 60.0
                },
                {
                    "kind": "stump_ensemble",
                    "model_id": "gbt_v1",
                    "bias": 1.8,
                    "stumps": [
                        { "feature": 0, "threshold": 2.5, "below": -0.2, "above": 0.4 }
                    ],
                    "base_confidence": 55.0
                }
            ]
        })
        .to_string()
    }

    fn features_with_mean(mean: f64, full_window: bool) -> RoundFeatures {
        let mut f = RoundFeatures::invalid();
        f.mean = mean;
        f.is_valid = true;
        f.full_window = full_window;
        f
    }

    #[test]
    fn test_bundle_parses_both_kinds() {
        let bundle: ModelBundle = serde_json::from_str(&linear_bundle_json()).unwrap();
        assert_eq!(bundle.models.len(), 2);
        assert_eq!(bundle.models[0].model_id(), "ridge_v1");
        assert_eq!(bundle.models[1].model_id(), "gbt_v1");
    }

    #[test]
    fn test_linear_model_prediction() {
        let bundle: ModelBundle = serde_json::from_str(&linear_bundle_json()).unwrap();
        let predictors = bundle.into_predictors();

        // mean=4.0 z-scores to 2.0 under (mean 2.0, std 1.0), so the
        // linear model yields 2.0 + 0.5 * 2.0 = 3.0.
        let out = predictors[0].predict(&features_with_mean(4.0, true));
        assert!((out.value - 3.0).abs() < 1e-12);
        assert_eq!(out.confidence, 60.0);
    }

    #[test]
    fn test_stump_model_prediction() {
        let bundle: ModelBundle = serde_json::from_str(&linear_bundle_json()).unwrap();
        let predictors = bundle.into_predictors();

        let out = predictors[1].predict(&features_with_mean(1.0, true));
        assert!((out.value - 1.6).abs() < 1e-12);
        let out = predictors[1].predict(&features_with_mean(3.0, true));
        assert!((out.value - 2.2).abs() < 1e-12);
    }

    #[test]
    fn test_partial_window_scales_confidence_down() {
        let bundle: ModelBundle = serde_json::from_str(&linear_bundle_json()).unwrap();
        let predictors = bundle.into_predictors();

        let full = predictors[0].predict(&features_with_mean(2.0, true));
        let partial = predictors[0].predict(&features_with_mean(2.0, false));
        assert!(partial.confidence < full.confidence);
    }

    #[test]
    fn test_load_missing_bundle_fails() {
        assert!(ModelBundle::load("/nonexistent/bundle.json").is_err());
    }
}
