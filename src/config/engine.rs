use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::types::EngineMode;

/// Runtime configuration for the whole engine. Constructed once at startup
/// and passed into each component; nothing reads ambient globals. Changing
/// any value requires a restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub mode: EngineMode,
    /// Path to the trained model bundle. Absent is valid: the ensemble
    /// stays empty and every round is skipped.
    pub model_bundle: Option<PathBuf>,
    pub betting: BettingSettings,
    pub features: FeatureSettings,
    pub training: TrainingSettings,
    pub store: StoreSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: EngineMode::Observation,
            model_bundle: None,
            betting: BettingSettings::default(),
            features: FeatureSettings::default(),
            training: TrainingSettings::default(),
            store: StoreSettings::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.betting.initial_stake <= Decimal::ZERO {
            errors.push("initial_stake must be > 0".to_string());
        }
        if self.betting.max_stake < self.betting.initial_stake {
            errors.push("max_stake must be >= initial_stake".to_string());
        }
        if self.betting.stake_increase_percent < Decimal::ZERO {
            errors.push("stake_increase_percent must be >= 0".to_string());
        }
        if !(0.0..=100.0).contains(&self.betting.confidence_threshold) {
            errors.push("confidence_threshold must be between 0 and 100".to_string());
        }
        if self.betting.default_target <= Decimal::ONE {
            errors.push("default_target must be > 1".to_string());
        }

        if self.features.window == 0 {
            errors.push("features.window must be > 0".to_string());
        }
        if self.features.low_multiplier <= 0.0 {
            errors.push("features.low_multiplier must be > 0".to_string());
        }
        if self.features.high_multiplier <= self.features.low_multiplier {
            errors.push("features.high_multiplier must be > low_multiplier".to_string());
        }

        if self.training.decay_hours <= 0.0 {
            errors.push("training.decay_hours must be > 0".to_string());
        }

        if self.store.queue_capacity == 0 {
            errors.push("store.queue_capacity must be > 0".to_string());
        }
        if self.store.max_write_retries == 0 {
            errors.push("store.max_write_retries must be > 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Stake ladder and betting policy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BettingSettings {
    pub initial_stake: Decimal,
    pub max_stake: Decimal,
    /// Stake escalation on consecutive wins, as a percent of the current
    /// stake. Resets to initial_stake on loss or skip.
    pub stake_increase_percent: Decimal,
    /// 0-100. BET requires ensemble confidence at or above this.
    pub confidence_threshold: f64,
    /// Cashout target multiplier used for every bet.
    pub default_target: Decimal,
}

impl Default for BettingSettings {
    fn default() -> Self {
        Self {
            initial_stake: dec!(10),
            max_stake: dec!(100),
            stake_increase_percent: dec!(50),
            confidence_threshold: 65.0,
            default_target: dec!(2.0),
        }
    }
}

/// Rolling-window feature computation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureSettings {
    /// Number of most-recent observations fed to the feature vector.
    pub window: usize,
    /// Multipliers below this count toward the consecutive-low streak.
    pub low_multiplier: f64,
    /// Multipliers at or above this count as "high" for streaks and
    /// time-since-high.
    pub high_multiplier: f64,
}

impl Default for FeatureSettings {
    fn default() -> Self {
        Self {
            window: 20,
            low_multiplier: 2.0,
            high_multiplier: 10.0,
        }
    }
}

/// Offline-training contract settings consumed by the retraining job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSettings {
    /// Time-decay constant for sample weights: exp(-age_hours / decay_hours).
    pub decay_hours: f64,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self { decay_hours: 24.0 }
    }
}

/// History store and durable writer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    pub log_path: PathBuf,
    /// Bounded writer queue; a full queue blocks append (backpressure),
    /// it never drops records.
    pub queue_capacity: usize,
    pub max_write_retries: u32,
    /// Base backoff between write retries, doubled per attempt.
    pub retry_backoff_ms: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            log_path: PathBuf::from("rounds.csv"),
            queue_capacity: 256,
            max_write_retries: 5,
            retry_backoff_ms: 200,
        }
    }
}
