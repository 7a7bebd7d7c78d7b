pub mod bundle;
pub mod ensemble;
pub mod predictor;
pub mod weighting;

pub use bundle::ModelBundle;
pub use ensemble::EnsemblePredictor;
pub use predictor::{ModelOutput, Predictor};
pub use weighting::{weight_of, weighted_training_set};
