use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, warn};

use super::log::{encode_line, CSV_HEADER};
use crate::config::StoreSettings;
use crate::types::Observation;

/// Escalation events from the durable writer. Fatal means a record could
/// not be persisted after exhausting retries; the mirror still holds it,
/// but durability was lost and an operator needs to know.
#[derive(Debug, Clone)]
pub enum StoreAlert {
    Fatal { round_id: String, message: String },
}

/// The persistence seam. Production appends CSV lines to a file; tests
/// substitute slow or failing sinks to exercise backpressure and retry.
#[async_trait]
pub trait DurableSink: Send {
    async fn append_line(&mut self, line: &str) -> std::io::Result<()>;
}

/// Append-only CSV file sink. Writes the header when it creates the file.
pub struct CsvSink {
    path: PathBuf,
    file: Option<tokio::fs::File>,
}

impl CsvSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            file: None,
        }
    }

    async fn open(&mut self) -> std::io::Result<&mut tokio::fs::File> {
        match self.file {
            Some(ref mut file) => Ok(file),
            None => {
                let fresh = !self.path.exists();
                let mut file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.path)
                    .await?;
                if fresh {
                    file.write_all(CSV_HEADER.as_bytes()).await?;
                    file.write_all(b"\n").await?;
                }
                Ok(self.file.insert(file))
            }
        }
    }
}

#[async_trait]
impl DurableSink for CsvSink {
    async fn append_line(&mut self, line: &str) -> std::io::Result<()> {
        let result = async {
            let file = self.open().await?;
            file.write_all(line.as_bytes()).await?;
            file.write_all(b"\n").await?;
            file.flush().await
        }
        .await;

        // Drop the handle on failure so the next attempt reopens; the file
        // may have been rotated or the disk remounted.
        if result.is_err() {
            self.file = None;
        }
        result
    }
}

/// Single dedicated writer draining the bounded queue. Each record is
/// retried with exponential backoff; exhausted retries escalate on the
/// alert channel instead of dropping silently. The in-memory mirror is
/// never touched from here.
pub async fn run_writer(
    mut rx: mpsc::Receiver<Observation>,
    mut sink: Box<dyn DurableSink>,
    settings: StoreSettings,
    alert_tx: broadcast::Sender<StoreAlert>,
) {
    while let Some(obs) = rx.recv().await {
        let line = encode_line(&obs);
        let mut attempt: u32 = 0;
        loop {
            match sink.append_line(&line).await {
                Ok(()) => {
                    debug!("Persisted round {}", obs.round_id);
                    break;
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= settings.max_write_retries {
                        error!(
                            "Durable write for round {} failed after {} attempts: {}",
                            obs.round_id, attempt, e
                        );
                        let _ = alert_tx.send(StoreAlert::Fatal {
                            round_id: obs.round_id.clone(),
                            message: e.to_string(),
                        });
                        break;
                    }
                    let backoff = settings.retry_backoff_ms * 2u64.pow(attempt - 1);
                    warn!(
                        "Durable write for round {} failed (attempt {}): {}; retrying in {}ms",
                        obs.round_id, attempt, e, backoff
                    );
                    tokio::time::sleep(std::time::Duration::from_millis(backoff)).await;
                }
            }
        }
    }
    debug!("Durable writer drained and shut down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RecordMode;
    use std::sync::{Arc, Mutex};

    /// Sink that fails a set number of times before accepting writes.
    pub struct FlakySink {
        pub failures_left: u32,
        pub lines: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl DurableSink for FlakySink {
        async fn append_line(&mut self, line: &str) -> std::io::Result<()> {
            if self.failures_left > 0 {
                self.failures_left -= 1;
                return Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full"));
            }
            self.lines.lock().unwrap().push(line.to_string());
            Ok(())
        }
    }

    fn settings() -> StoreSettings {
        StoreSettings {
            queue_capacity: 8,
            max_write_retries: 3,
            retry_backoff_ms: 10,
            ..StoreSettings::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_writer_retries_then_succeeds() {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = FlakySink {
            failures_left: 2,
            lines: lines.clone(),
        };
        let (tx, rx) = mpsc::channel(8);
        let (alert_tx, mut alert_rx) = broadcast::channel(8);
        let handle = tokio::spawn(run_writer(rx, Box::new(sink), settings(), alert_tx));

        tx.send(Observation::unbetted("r1", 2.0, RecordMode::Live))
            .await
            .unwrap();
        drop(tx);
        handle.await.unwrap();

        assert_eq!(lines.lock().unwrap().len(), 1);
        assert!(alert_rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_escalate_fatal_alert() {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = FlakySink {
            failures_left: u32::MAX,
            lines: lines.clone(),
        };
        let (tx, rx) = mpsc::channel(8);
        let (alert_tx, mut alert_rx) = broadcast::channel(8);
        let handle = tokio::spawn(run_writer(rx, Box::new(sink), settings(), alert_tx));

        tx.send(Observation::unbetted("r9", 1.4, RecordMode::Live))
            .await
            .unwrap();
        drop(tx);
        handle.await.unwrap();

        let StoreAlert::Fatal { round_id, .. } = alert_rx.recv().await.unwrap();
        assert_eq!(round_id, "r9");
        assert!(lines.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_csv_sink_writes_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rounds.csv");

        let mut sink = CsvSink::new(&path);
        sink.append_line("line-1").await.unwrap();
        sink.append_line("line-2").await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines, vec![CSV_HEADER, "line-1", "line-2"]);

        // Reopening an existing file must not repeat the header.
        let mut sink = CsvSink::new(&path);
        sink.append_line("line-3").await.unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.matches(CSV_HEADER).count(), 1);
    }
}
