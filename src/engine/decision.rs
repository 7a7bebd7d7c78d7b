use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::feed::{ObservationFeed, RoundEvent};
use super::stake::StakeLadder;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::features::FeatureEngine;
use crate::history::{AppendOutcome, HistoryStore};
use crate::ml::EnsemblePredictor;
use crate::types::{Action, Decision, EngineMode, Observation, RecordMode, RoundSignal};

/// Round lifecycle. Settled is transient: settlement processing runs to
/// completion inside one event, then the engine is awaiting again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundPhase {
    AwaitingRound,
    Running,
    Settled,
}

/// Decision made at round start, held until the settlement arrives.
struct PendingRound {
    round_id: String,
    signal: Option<RoundSignal>,
    action: Action,
}

/// The round-lifecycle state machine. Consumes detection events, writes
/// settled rounds to the history store, and emits one Decision per round.
/// Driven entirely by the feed; holds no timers. Every failure class here
/// is recoverable: a bad read becomes a SKIP, never a crash.
pub struct DecisionEngine {
    config: EngineConfig,
    store: HistoryStore,
    features: FeatureEngine,
    ensemble: EnsemblePredictor,
    phase: RoundPhase,
    ladder: StakeLadder,
    pending: Option<PendingRound>,
    decision_tx: broadcast::Sender<Decision>,
}

impl DecisionEngine {
    pub fn new(config: EngineConfig, store: HistoryStore, ensemble: EnsemblePredictor) -> Self {
        let (decision_tx, _) = broadcast::channel(64);
        let features = FeatureEngine::new(config.features.clone());
        let ladder = StakeLadder::new(&config.betting);
        info!(
            "Decision engine up: mode={}, {} models, {} rounds of history",
            config.mode,
            ensemble.model_count(),
            store.len()
        );
        Self {
            config,
            store,
            features,
            ensemble,
            phase: RoundPhase::AwaitingRound,
            ladder,
            pending: None,
            decision_tx,
        }
    }

    /// Decision events for the bet-execution collaborator and telemetry.
    pub fn subscribe(&self) -> broadcast::Receiver<Decision> {
        self.decision_tx.subscribe()
    }

    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    pub fn store(&self) -> &HistoryStore {
        &self.store
    }

    /// Tears down the engine, draining the store's durable writer.
    pub async fn shutdown(self) {
        self.store.close().await;
    }

    /// Drives the engine until the feed is exhausted.
    pub async fn run(&mut self, feed: &mut dyn ObservationFeed) {
        while let Some(event) = feed.next_event().await {
            self.handle_event(event).await;
        }
        info!("Feed exhausted; engine idle");
    }

    /// Processes one lifecycle event. Returns the Decision emitted for it,
    /// if the event produced one.
    pub async fn handle_event(&mut self, event: RoundEvent) -> Option<Decision> {
        match event {
            RoundEvent::Started { round_id } => Some(self.on_round_started(round_id)),
            RoundEvent::Settled {
                round_id,
                multiplier,
                detection_confidence,
            } => self.on_round_settled(round_id, multiplier, detection_confidence).await,
            RoundEvent::DetectionFailed { reason } => Some(self.on_detection_failed(reason)),
        }
    }

    fn on_round_started(&mut self, round_id: String) -> Decision {
        if self.phase == RoundPhase::Running {
            warn!(
                "Round {} started while {} was still running; abandoning the stale round",
                round_id,
                self.pending.as_ref().map(|p| p.round_id.as_str()).unwrap_or("?")
            );
            self.pending = None;
        }
        self.phase = RoundPhase::Running;

        let window = self.store.recent(self.config.features.window);
        let features = self.features.compute(window);
        if !features.is_valid {
            debug!("No history yet; features are the neutral zero vector");
        }

        let signal = match self.ensemble.predict(&features) {
            Ok(signal) => signal,
            Err(EngineError::ModelsNotLoaded) => {
                debug!("No models loaded; substituting zero-confidence signal");
                RoundSignal::no_models()
            }
            Err(e) => {
                warn!("Prediction failed for round {}: {}", round_id, e);
                RoundSignal::no_models()
            }
        };

        // The signal is evaluated and logged on every round, in every
        // mode, so downstream consumers can see what the engine would
        // have done.
        info!(
            "Round {} signal: prediction={:.3} confidence={:.1} agreement={} ev={:.3} ({} models)",
            round_id,
            signal.ensemble_prediction,
            signal.ensemble_confidence,
            signal.agreement,
            signal.expected_value,
            signal.per_model.len()
        );

        let (action, reason) = self.apply_policy(&signal);
        let decision = Decision::new(
            round_id.clone(),
            action.clone(),
            reason,
            Some(signal.clone()),
            self.config.mode,
        );
        info!("Round {}: {} ({})", round_id, decision.action, decision.reason);

        self.pending = Some(PendingRound {
            round_id,
            signal: Some(signal),
            action,
        });
        let _ = self.decision_tx.send(decision.clone());
        decision
    }

    fn apply_policy(&self, signal: &RoundSignal) -> (Action, String) {
        let threshold = self.config.betting.confidence_threshold;

        if signal.per_model.is_empty() {
            return (Action::Skip, "no models loaded".to_string());
        }
        if self.config.mode == EngineMode::Observation {
            return (Action::Skip, "observation mode".to_string());
        }
        if signal.ensemble_confidence >= threshold {
            (
                Action::Bet {
                    stake: self.ladder.current_stake(),
                    target: self.config.betting.default_target,
                },
                format!(
                    "confidence {:.1} at or above threshold {:.1}",
                    signal.ensemble_confidence, threshold
                ),
            )
        } else {
            (Action::Skip, "confidence below threshold".to_string())
        }
    }

    async fn on_round_settled(
        &mut self,
        round_id: String,
        multiplier: f64,
        detection_confidence: f64,
    ) -> Option<Decision> {
        // A flaky read loop can report the same settlement repeatedly;
        // exactly one record per round, first write wins.
        if self.store.contains_round(&round_id) {
            warn!(
                "Ignoring repeated settlement report: {}",
                EngineError::DuplicateRound {
                    round_id: round_id.clone()
                }
            );
            self.phase = RoundPhase::AwaitingRound;
            return None;
        }

        if !(multiplier.is_finite() && multiplier > 0.0) {
            warn!(
                "Unusable settlement multiplier {} for round {}; treating as detection failure",
                multiplier, round_id
            );
            return Some(self.on_detection_failed(format!(
                "unusable settlement multiplier for round {}",
                round_id
            )));
        }

        self.phase = RoundPhase::Settled;
        debug!(
            "Round {} settled at {:.2}x (detection confidence {:.1})",
            round_id, multiplier, detection_confidence
        );

        let pending = match self.pending.take() {
            Some(p) if p.round_id == round_id => Some(p),
            Some(p) => {
                warn!(
                    "Settlement for round {} but round {} was pending; recording without a bet",
                    round_id, p.round_id
                );
                None
            }
            None => None,
        };

        let obs = self.build_observation(&round_id, multiplier, pending.as_ref());

        let won = obs.is_win();
        let bet_placed = obs.bet_placed;
        match self.store.append(obs).await {
            Ok(AppendOutcome::Appended) => {}
            Ok(AppendOutcome::Duplicate) => {
                warn!("Round {} raced into the store twice; kept the first record", round_id);
            }
            Err(e) => {
                // Recoverable: the decision cycle continues either way.
                warn!("Failed to record round {}: {}", round_id, e);
            }
        }

        if bet_placed && won {
            self.ladder.record_win();
        } else {
            self.ladder.record_reset();
        }

        self.phase = RoundPhase::AwaitingRound;
        None
    }

    fn build_observation(
        &self,
        round_id: &str,
        multiplier: f64,
        pending: Option<&PendingRound>,
    ) -> Observation {
        let mode_tag = match self.config.mode {
            EngineMode::Betting => RecordMode::Live,
            EngineMode::Observation => RecordMode::Observation,
        };

        let mut obs = Observation::unbetted(round_id, multiplier, mode_tag);

        if let Some(pending) = pending {
            // Predictions are attached before the record reaches the
            // store, so accuracy can be audited without a second pass.
            if let Some(signal) = &pending.signal {
                obs.predicted_value = signal.ensemble_prediction;
                obs.predicted_confidence = signal.ensemble_confidence;
            }

            if let Action::Bet { stake, target } = &pending.action {
                let target_hit = target
                    .to_f64()
                    .map(|t| multiplier >= t)
                    .unwrap_or(false);
                obs.bet_placed = true;
                obs.stake = *stake;
                if target_hit {
                    obs.cashout_multiplier = Some(*target);
                    obs.profit_loss = *stake * (*target - Decimal::ONE);
                    info!(
                        "Round {}: WIN, cashed out at {}x for +{}",
                        round_id, target, obs.profit_loss
                    );
                } else {
                    obs.profit_loss = -*stake;
                    info!("Round {}: LOSS, crashed at {:.2}x, -{}", round_id, multiplier, stake);
                }
            }
        }

        obs
    }

    fn on_detection_failed(&mut self, reason: String) -> Decision {
        let round_id = self
            .pending
            .take()
            .map(|p| p.round_id)
            .unwrap_or_else(|| "unknown".to_string());

        let decision = Decision::new(
            round_id.clone(),
            Action::Skip,
            format!("detection failure: {}", reason),
            None,
            self.config.mode,
        );
        warn!("Round {}: {} ({})", round_id, decision.action, decision.reason);

        // No observation is constructed from a failed read; the ladder
        // treats the round as a skip.
        self.ladder.record_reset();
        self.phase = RoundPhase::AwaitingRound;
        let _ = self.decision_tx.send(decision.clone());
        decision
    }
}
