use rust_decimal::Decimal;
use tracing::debug;

use crate::config::BettingSettings;

/// Stake escalation ladder: consecutive wins raise the next stake by the
/// configured percentage up to the max-stake cap; a loss or a skipped
/// round resets to the base stake.
#[derive(Debug, Clone)]
pub struct StakeLadder {
    initial: Decimal,
    max: Decimal,
    increase_percent: Decimal,
    current: Decimal,
    consecutive_wins: u32,
}

impl StakeLadder {
    pub fn new(settings: &BettingSettings) -> Self {
        Self {
            initial: settings.initial_stake,
            max: settings.max_stake,
            increase_percent: settings.stake_increase_percent,
            current: settings.initial_stake,
            consecutive_wins: 0,
        }
    }

    /// Stake for the next bet.
    pub fn current_stake(&self) -> Decimal {
        self.current
    }

    pub fn consecutive_wins(&self) -> u32 {
        self.consecutive_wins
    }

    pub fn record_win(&mut self) {
        self.consecutive_wins += 1;
        let escalated = self.current * (Decimal::ONE + self.increase_percent / Decimal::from(100));
        self.current = escalated.min(self.max);
        debug!(
            "Stake ladder: {} consecutive wins, next stake {}",
            self.consecutive_wins, self.current
        );
    }

    /// Loss or skip: back to the base stake.
    pub fn record_reset(&mut self) {
        if self.consecutive_wins > 0 {
            debug!("Stake ladder reset after {} wins", self.consecutive_wins);
        }
        self.consecutive_wins = 0;
        self.current = self.initial;
    }
}
