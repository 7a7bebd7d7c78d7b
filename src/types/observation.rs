use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Engine operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineMode {
    /// Bets are placed when the policy allows it.
    Betting,
    /// Signals are computed and logged but no bet is ever placed.
    /// Exists to accumulate history and validate prediction quality
    /// with zero capital risk.
    Observation,
}

impl EngineMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineMode::Betting => "betting",
            EngineMode::Observation => "observation",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "betting" => Some(EngineMode::Betting),
            "observation" => Some(EngineMode::Observation),
            _ => None,
        }
    }
}

impl fmt::Display for EngineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a record entered the history: live betting, manual backfill,
/// or observation-only mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordMode {
    Live,
    Manual,
    Observation,
}

impl RecordMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordMode::Live => "live",
            RecordMode::Manual => "manual",
            RecordMode::Observation => "observation",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "live" => Some(RecordMode::Live),
            "manual" => Some(RecordMode::Manual),
            "observation" => Some(RecordMode::Observation),
            _ => None,
        }
    }
}

impl fmt::Display for RecordMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One settled round. Created once by the decision engine at settlement
/// time, immutable after it reaches the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    pub round_id: String,
    /// Settlement multiplier. Always finite and > 0 once stored.
    pub multiplier: f64,
    pub bet_placed: bool,
    /// Zero when no bet was placed.
    pub stake: Decimal,
    /// Present only when a bet was cashed out.
    pub cashout_multiplier: Option<Decimal>,
    pub profit_loss: Decimal,
    /// Ensemble prediction made before this round settled, kept for
    /// accuracy auditing.
    pub predicted_value: f64,
    /// 0-100. Zero means no prediction was available.
    pub predicted_confidence: f64,
    pub mode_tag: RecordMode,
}

impl Observation {
    /// An observation with no bet and no prediction attached.
    pub fn unbetted(round_id: impl Into<String>, multiplier: f64, mode_tag: RecordMode) -> Self {
        Self {
            timestamp: Utc::now(),
            round_id: round_id.into(),
            multiplier,
            bet_placed: false,
            stake: Decimal::ZERO,
            cashout_multiplier: None,
            profit_loss: Decimal::ZERO,
            predicted_value: 0.0,
            predicted_confidence: 0.0,
            mode_tag,
        }
    }

    /// Store-boundary validity: finite and strictly positive multiplier.
    pub fn has_valid_multiplier(&self) -> bool {
        self.multiplier.is_finite() && self.multiplier > 0.0
    }

    pub fn is_win(&self) -> bool {
        self.bet_placed && self.profit_loss > Decimal::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiplier_validity() {
        let ok = Observation::unbetted("r1", 1.37, RecordMode::Live);
        assert!(ok.has_valid_multiplier());

        for bad in [0.0, -2.5, f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let obs = Observation::unbetted("r2", bad, RecordMode::Live);
            assert!(!obs.has_valid_multiplier(), "multiplier {} accepted", bad);
        }
    }

    #[test]
    fn test_mode_round_trip() {
        for mode in [RecordMode::Live, RecordMode::Manual, RecordMode::Observation] {
            assert_eq!(RecordMode::from_str(mode.as_str()), Some(mode));
        }
        assert_eq!(EngineMode::from_str("BETTING"), Some(EngineMode::Betting));
        assert_eq!(EngineMode::from_str("paper"), None);
    }
}
