use crate::features::RoundFeatures;

/// One model's raw output: a predicted settlement multiplier and a 0-100
/// confidence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelOutput {
    pub value: f64,
    pub confidence: f64,
}

/// Uniform capability every loaded model satisfies. Concrete model kinds
/// are interchangeable; the ensemble iterates them without type
/// inspection.
pub trait Predictor: Send + Sync {
    fn model_id(&self) -> &str;
    fn predict(&self, features: &RoundFeatures) -> ModelOutput;
}
