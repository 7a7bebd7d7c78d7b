use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::Path;
use tracing::info;

/// Round-lifecycle events pushed by the detection collaborator. The
/// engine holds no timers; these transitions are its only clock.
#[derive(Debug, Clone, PartialEq)]
pub enum RoundEvent {
    /// A new round has started; the engine must decide before it ends.
    Started { round_id: String },
    /// The round settled at the given multiplier.
    Settled {
        round_id: String,
        multiplier: f64,
        /// Detection collaborator's own read confidence, 0-100. Logged
        /// for telemetry; a failed read arrives as DetectionFailed
        /// instead.
        detection_confidence: f64,
    },
    /// The detector could not produce a usable observation.
    DetectionFailed { reason: String },
}

/// The inbound seam to whatever watches the game. The live detector
/// (OCR, clipboard polling) lives outside this crate; in here a replay
/// feed drives the same interface from a recorded file.
#[async_trait]
pub trait ObservationFeed: Send {
    /// Next event, or None when the feed is exhausted.
    async fn next_event(&mut self) -> Option<RoundEvent>;
}

/// File-driven feed for simulation and validation runs. Input is a CSV of
/// `round_id,multiplier[,detection_confidence]` lines; each line expands
/// to a Started/Settled pair. A non-numeric multiplier becomes a
/// DetectionFailed event, mirroring what a flaky live read produces.
pub struct ReplayFeed {
    events: VecDeque<RoundEvent>,
}

impl ReplayFeed {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read rounds file {}", path.display()))?;

        let mut events = VecDeque::new();
        let mut rounds = 0usize;
        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split(',').collect();
            let round_id = fields[0].trim().to_string();
            if round_id.is_empty() {
                continue;
            }

            events.push_back(RoundEvent::Started {
                round_id: round_id.clone(),
            });
            match fields.get(1).and_then(|f| f.trim().parse::<f64>().ok()) {
                Some(multiplier) => {
                    let detection_confidence = fields
                        .get(2)
                        .and_then(|f| f.trim().parse::<f64>().ok())
                        .unwrap_or(100.0);
                    events.push_back(RoundEvent::Settled {
                        round_id,
                        multiplier,
                        detection_confidence,
                    });
                }
                None => {
                    events.push_back(RoundEvent::DetectionFailed {
                        reason: format!("unreadable multiplier for round {}", round_id),
                    });
                }
            }
            rounds += 1;
        }

        info!("Replay feed loaded {} rounds from {}", rounds, path.display());
        Ok(Self { events })
    }

    pub fn from_events(events: Vec<RoundEvent>) -> Self {
        Self {
            events: events.into(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.events.len()
    }
}

#[async_trait]
impl ObservationFeed for ReplayFeed {
    async fn next_event(&mut self) -> Option<RoundEvent> {
        self.events.pop_front()
    }
}
