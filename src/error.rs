use thiserror::Error;

/// Engine error taxonomy. All variants are recoverable within the engine;
/// none should terminate the process.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Multiplier was non-positive or non-finite. The record is rejected
    /// before it reaches the mirror or the durable log.
    #[error("invalid observation for round {round_id}: multiplier {multiplier} is not a positive finite number")]
    InvalidObservation { round_id: String, multiplier: f64 },

    /// Same round_id appended twice. First write wins; the second is a no-op
    /// at the store, but callers may want to log it.
    #[error("duplicate round {round_id}")]
    DuplicateRound { round_id: String },

    /// Durable write failed after exhausting retries. The mirror is
    /// unaffected; this escalates as a fatal alert, never a silent drop.
    #[error("durable write failed for round {round_id} after {attempts} attempts: {source}")]
    StoreWriteFailure {
        round_id: String,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    /// No predictor models are loaded. The decision engine treats this as
    /// confidence 0 and forces SKIP.
    #[error("no predictor models loaded")]
    ModelsNotLoaded,
}
