use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::Observation;

/// Prediction-accuracy audit over the durable round log. Only rounds
/// that carried a prediction (confidence > 0) count toward the error
/// metrics; betting totals cover every round with a bet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionAudit {
    pub total_rounds: usize,
    pub predicted_rounds: usize,
    pub mean_absolute_error: f64,
    /// Positive means the ensemble over-predicts.
    pub mean_signed_error: f64,
    /// Fraction of predicted rounds where prediction and settlement fell
    /// on the same side of the target multiplier.
    pub target_hit_rate: f64,
    pub bets: usize,
    pub wins: usize,
    pub total_pnl: Decimal,
}

impl PredictionAudit {
    pub fn from_records(records: &[Observation], target: f64) -> Self {
        let mut abs_err = 0.0;
        let mut signed_err = 0.0;
        let mut hits = 0usize;
        let mut predicted = 0usize;
        let mut bets = 0usize;
        let mut wins = 0usize;
        let mut total_pnl = Decimal::ZERO;

        for obs in records {
            if obs.predicted_confidence > 0.0 {
                predicted += 1;
                let err = obs.predicted_value - obs.multiplier;
                abs_err += err.abs();
                signed_err += err;
                if (obs.predicted_value >= target) == (obs.multiplier >= target) {
                    hits += 1;
                }
            }
            if obs.bet_placed {
                bets += 1;
                if obs.is_win() {
                    wins += 1;
                }
                total_pnl += obs.profit_loss;
            }
        }

        let n = predicted.max(1) as f64;
        Self {
            total_rounds: records.len(),
            predicted_rounds: predicted,
            mean_absolute_error: abs_err / n,
            mean_signed_error: signed_err / n,
            target_hit_rate: hits as f64 / n,
            bets,
            wins,
            total_pnl,
        }
    }
}

impl fmt::Display for PredictionAudit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Prediction Audit ===")?;
        writeln!(f, "Rounds:           {}", self.total_rounds)?;
        writeln!(f, "With prediction:  {}", self.predicted_rounds)?;
        writeln!(f, "MAE:              {:.3}", self.mean_absolute_error)?;
        writeln!(f, "Bias:             {:+.3}", self.mean_signed_error)?;
        writeln!(f, "Target hit rate:  {:.1}%", self.target_hit_rate * 100.0)?;
        writeln!(f, "Bets placed:      {}", self.bets)?;
        writeln!(f, "Bets won:         {}", self.wins)?;
        writeln!(f, "Total P&L:        {}", self.total_pnl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RecordMode;
    use rust_decimal_macros::dec;

    fn predicted(round_id: &str, multiplier: f64, prediction: f64) -> Observation {
        let mut obs = Observation::unbetted(round_id, multiplier, RecordMode::Live);
        obs.predicted_value = prediction;
        obs.predicted_confidence = 60.0;
        obs
    }

    #[test]
    fn test_audit_metrics() {
        let mut bet = predicted("r3", 3.0, 2.5);
        bet.bet_placed = true;
        bet.stake = dec!(10);
        bet.cashout_multiplier = Some(dec!(2.0));
        bet.profit_loss = dec!(10);

        let records = vec![
            predicted("r1", 2.0, 2.5),  // err +0.5, both >= 2.0: hit
            predicted("r2", 1.0, 1.4),  // err +0.4, both < 2.0: hit
            bet,                        // err -0.5, both >= 2.0: hit
            // No prediction attached; excluded from error metrics.
            Observation::unbetted("r4", 5.0, RecordMode::Manual),
        ];

        let audit = PredictionAudit::from_records(&records, 2.0);
        assert_eq!(audit.total_rounds, 4);
        assert_eq!(audit.predicted_rounds, 3);
        assert!((audit.mean_absolute_error - (0.5 + 0.4 + 0.5) / 3.0).abs() < 1e-9);
        assert!((audit.mean_signed_error - (0.5 + 0.4 - 0.5) / 3.0).abs() < 1e-9);
        assert_eq!(audit.target_hit_rate, 1.0);
        assert_eq!(audit.bets, 1);
        assert_eq!(audit.wins, 1);
        assert_eq!(audit.total_pnl, dec!(10));
    }

    #[test]
    fn test_empty_audit_is_all_zero() {
        let audit = PredictionAudit::from_records(&[], 2.0);
        assert_eq!(audit.total_rounds, 0);
        assert_eq!(audit.mean_absolute_error, 0.0);
    }
}
