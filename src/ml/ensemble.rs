use anyhow::Result;
use std::path::Path;
use tracing::{debug, info, warn};

use super::bundle::ModelBundle;
use super::predictor::Predictor;
use crate::error::EngineError;
use crate::features::RoundFeatures;
use crate::types::{Agreement, ModelPrediction, RoundSignal};

/// Combines independently-trained models into one per-round signal.
/// Models are queried through the uniform Predictor capability and
/// combined by unweighted mean; disagreement between them is surfaced in
/// the signal rather than hidden behind the averaged confidence.
pub struct EnsemblePredictor {
    models: Vec<Box<dyn Predictor>>,
}

impl EnsemblePredictor {
    pub fn new() -> Self {
        Self { models: Vec::new() }
    }

    pub fn add_model(&mut self, model: Box<dyn Predictor>) {
        info!("Ensemble: added model '{}'", model.model_id());
        self.models.push(model);
    }

    /// Load every model from a bundle file. A missing bundle path is the
    /// caller's concern; an empty bundle is valid and leaves the ensemble
    /// unloaded.
    pub fn load_from_bundle(path: impl AsRef<Path>) -> Result<Self> {
        let bundle = ModelBundle::load(path)?;
        let mut ensemble = Self::new();
        for predictor in bundle.into_predictors() {
            ensemble.add_model(predictor);
        }
        if ensemble.models.is_empty() {
            warn!("Model bundle contained no models; every round will be skipped");
        }
        Ok(ensemble)
    }

    /// Produce the round signal. Fails with ModelsNotLoaded when empty;
    /// the decision engine maps that to a zero-confidence signal and a
    /// forced SKIP, never a crash.
    pub fn predict(&self, features: &RoundFeatures) -> Result<RoundSignal, EngineError> {
        if self.models.is_empty() {
            return Err(EngineError::ModelsNotLoaded);
        }

        let per_model: Vec<ModelPrediction> = self
            .models
            .iter()
            .map(|model| {
                let out = model.predict(features);
                debug!(
                    "Model '{}': prediction={:.3} confidence={:.1}",
                    model.model_id(),
                    out.value,
                    out.confidence
                );
                ModelPrediction {
                    model_id: model.model_id().to_string(),
                    prediction: out.value,
                    confidence: out.confidence,
                }
            })
            .collect();

        let n = per_model.len() as f64;
        let ensemble_prediction = per_model.iter().map(|p| p.prediction).sum::<f64>() / n;
        let ensemble_confidence = per_model.iter().map(|p| p.confidence).sum::<f64>() / n;

        let variance = per_model
            .iter()
            .map(|p| (p.prediction - ensemble_prediction).powi(2))
            .sum::<f64>()
            / n;
        let prediction_stdev = variance.sqrt();
        let agreement = Agreement::from_stdev(prediction_stdev);

        if agreement == Agreement::Low {
            warn!(
                "Models disagree (stdev {:.2}) despite confidence {:.1}",
                prediction_stdev, ensemble_confidence
            );
        }

        Ok(RoundSignal {
            per_model,
            ensemble_prediction,
            ensemble_confidence,
            expected_value: ensemble_prediction * ensemble_confidence / 100.0,
            agreement,
            prediction_stdev,
        })
    }

    pub fn is_loaded(&self) -> bool {
        !self.models.is_empty()
    }

    pub fn model_count(&self) -> usize {
        self.models.len()
    }
}

impl Default for EnsemblePredictor {
    fn default() -> Self {
        Self::new()
    }
}
