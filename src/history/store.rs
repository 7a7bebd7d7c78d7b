use anyhow::Result;
use std::collections::HashSet;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::log::read_log;
use super::writer::{run_writer, CsvSink, DurableSink, StoreAlert};
use crate::config::StoreSettings;
use crate::error::EngineError;
use crate::types::Observation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    /// Same round_id seen before; first write wins and this call was a
    /// no-op.
    Duplicate,
}

/// Append-only round history. The in-memory mirror is updated
/// synchronously on append and is the single source of truth for reads;
/// the durable write happens on a background task fed through a bounded
/// queue, so append never blocks on I/O until the queue itself is full
/// (backpressure, never loss).
///
/// The mirror is exclusively owned by the round-lifecycle task; the
/// writer owns only the queue and the file. No locks on the read path.
pub struct HistoryStore {
    mirror: Vec<Observation>,
    seen: HashSet<String>,
    tx: Option<mpsc::Sender<Observation>>,
    writer: Option<JoinHandle<()>>,
    alert_tx: broadcast::Sender<StoreAlert>,
}

impl HistoryStore {
    /// Opens the store: hydrates the mirror once from the durable log (in
    /// stored, already-chronological order) and spawns the writer task.
    pub fn open(settings: StoreSettings) -> Result<Self> {
        let records = read_log(&settings.log_path)?;
        info!(
            "Hydrated {} rounds from {}",
            records.len(),
            settings.log_path.display()
        );
        let sink = CsvSink::new(&settings.log_path);
        Ok(Self::with_sink(settings, Box::new(sink), records))
    }

    /// Store over an arbitrary sink, pre-seeded with hydrated records.
    /// Hydrated records are already durable and are not re-queued.
    pub fn with_sink(
        settings: StoreSettings,
        sink: Box<dyn DurableSink>,
        hydrated: Vec<Observation>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(settings.queue_capacity);
        let (alert_tx, _) = broadcast::channel(16);
        let writer = tokio::spawn(run_writer(rx, sink, settings, alert_tx.clone()));

        let seen = hydrated.iter().map(|o| o.round_id.clone()).collect();
        Self {
            mirror: hydrated,
            seen,
            tx: Some(tx),
            writer: Some(writer),
            alert_tx,
        }
    }

    /// Appends one observation: validates the multiplier, deduplicates by
    /// round_id, updates the mirror before returning, then enqueues the
    /// durable write. A full queue makes this call wait; records are
    /// never dropped. Any recent()/all() call made after this returns
    /// observes the record, whether or not it has reached disk.
    pub async fn append(&mut self, obs: Observation) -> Result<AppendOutcome, EngineError> {
        if !obs.has_valid_multiplier() {
            return Err(EngineError::InvalidObservation {
                round_id: obs.round_id.clone(),
                multiplier: obs.multiplier,
            });
        }

        if self.seen.contains(&obs.round_id) {
            debug!("Round {} already recorded; ignoring duplicate", obs.round_id);
            return Ok(AppendOutcome::Duplicate);
        }

        self.seen.insert(obs.round_id.clone());
        self.mirror.push(obs.clone());

        if let Some(tx) = &self.tx {
            tx.send(obs.clone()).await.map_err(|_| {
                EngineError::StoreWriteFailure {
                    round_id: obs.round_id.clone(),
                    attempts: 0,
                    source: std::io::Error::new(
                        std::io::ErrorKind::BrokenPipe,
                        "durable writer is gone",
                    ),
                }
            })?;
        }

        Ok(AppendOutcome::Appended)
    }

    /// Last n records, oldest to newest. Never filtered by age: a
    /// backfilled record from years ago is as eligible as one from this
    /// second.
    pub fn recent(&self, n: usize) -> &[Observation] {
        let len = self.mirror.len();
        if n >= len {
            &self.mirror[..]
        } else {
            &self.mirror[len - n..]
        }
    }

    /// Full history, for offline retraining and auditing.
    pub fn all(&self) -> &[Observation] {
        &self.mirror
    }

    pub fn len(&self) -> usize {
        self.mirror.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mirror.is_empty()
    }

    pub fn contains_round(&self, round_id: &str) -> bool {
        self.seen.contains(round_id)
    }

    /// Subscribe to writer escalations (fatal durability failures).
    pub fn alerts(&self) -> broadcast::Receiver<StoreAlert> {
        self.alert_tx.subscribe()
    }

    /// Closes the queue and waits for the writer to drain. Call before
    /// process exit so the tail of the log is not lost.
    pub async fn close(mut self) {
        self.tx.take();
        if let Some(writer) = self.writer.take() {
            let _ = writer.await;
        }
    }
}
