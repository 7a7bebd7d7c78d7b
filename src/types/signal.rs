use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::EngineMode;

/// One model's contribution to a signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPrediction {
    pub model_id: String,
    pub prediction: f64,
    /// 0-100.
    pub confidence: f64,
}

/// Dispersion bucket over per-model predictions. Low agreement is a
/// reliability signal in its own right and feeds the betting policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Agreement {
    High,
    Medium,
    Low,
}

impl Agreement {
    /// Bucket a population standard deviation of per-model predictions.
    pub fn from_stdev(stdev: f64) -> Self {
        if stdev < 0.5 {
            Agreement::High
        } else if stdev < 1.0 {
            Agreement::Medium
        } else {
            Agreement::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Agreement::High => "high",
            Agreement::Medium => "medium",
            Agreement::Low => "low",
        }
    }
}

impl fmt::Display for Agreement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-round ensemble output. Ephemeral, never persisted as-is; the
/// prediction and confidence are copied onto the Observation at settlement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundSignal {
    pub per_model: Vec<ModelPrediction>,
    pub ensemble_prediction: f64,
    /// 0-100, unweighted mean of per-model confidences.
    pub ensemble_confidence: f64,
    /// prediction * confidence / 100.
    pub expected_value: f64,
    pub agreement: Agreement,
    /// Population stdev behind the agreement bucket, kept for telemetry.
    pub prediction_stdev: f64,
}

impl RoundSignal {
    /// Substitute signal when no models are loaded: zero confidence,
    /// which the policy turns into a forced SKIP.
    pub fn no_models() -> Self {
        Self {
            per_model: Vec::new(),
            ensemble_prediction: 0.0,
            ensemble_confidence: 0.0,
            expected_value: 0.0,
            agreement: Agreement::Low,
            prediction_stdev: 0.0,
        }
    }
}

/// Terminal output of one round's decision cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Action {
    Bet { stake: Decimal, target: Decimal },
    Skip,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Bet { stake, target } => write!(f, "BET {} @ {}x", stake, target),
            Action::Skip => write!(f, "SKIP"),
        }
    }
}

/// Decision event emitted once per round, consumed by the bet-execution
/// collaborator and telemetry sinks. SKIP always carries a reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub id: Uuid,
    pub round_id: String,
    pub action: Action,
    pub reason: String,
    /// Full signal snapshot; None only when no signal could be computed
    /// (detection failure before the round started).
    pub signal: Option<RoundSignal>,
    pub mode: EngineMode,
    pub timestamp: DateTime<Utc>,
}

impl Decision {
    pub fn new(
        round_id: impl Into<String>,
        action: Action,
        reason: impl Into<String>,
        signal: Option<RoundSignal>,
        mode: EngineMode,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            round_id: round_id.into(),
            action,
            reason: reason.into(),
            signal,
            mode,
            timestamp: Utc::now(),
        }
    }
}
