use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::Path;
use tracing::{info, warn};

use crate::error::EngineError;
use crate::history::{AppendOutcome, HistoryStore};
use crate::types::{Observation, RecordMode};

/// Outcome of one backfill run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillReport {
    pub appended: usize,
    pub duplicates: usize,
    pub rejected: usize,
}

impl fmt::Display for BackfillReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} appended, {} duplicates ignored, {} rejected",
            self.appended, self.duplicates, self.rejected
        )
    }
}

/// Appends manually-collected historical rounds through the store's
/// normal append path, so validation, deduplication and the durable
/// writer apply exactly as they do for live rounds. There is no separate
/// direct-write path. Input lines: `round_id,multiplier[,rfc3339_timestamp]`;
/// records with arbitrarily old timestamps are fully eligible for feature
/// windows and retraining, only their decay weight differs.
pub async fn backfill_from_csv(store: &mut HistoryStore, path: &Path) -> Result<BackfillReport> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read backfill file {}", path.display()))?;

    let mut report = BackfillReport::default();
    for (i, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() < 2 {
            warn!("Backfill line {}: expected round_id,multiplier", i + 1);
            report.rejected += 1;
            continue;
        }

        let multiplier: f64 = match fields[1].trim().parse() {
            Ok(m) => m,
            Err(_) => {
                warn!("Backfill line {}: unparseable multiplier '{}'", i + 1, fields[1]);
                report.rejected += 1;
                continue;
            }
        };

        let mut obs = Observation::unbetted(fields[0].trim(), multiplier, RecordMode::Manual);
        if let Some(raw_ts) = fields.get(2) {
            match DateTime::parse_from_rfc3339(raw_ts.trim()) {
                Ok(ts) => obs.timestamp = ts.with_timezone(&Utc),
                Err(e) => {
                    warn!("Backfill line {}: bad timestamp '{}': {}", i + 1, raw_ts, e);
                    report.rejected += 1;
                    continue;
                }
            }
        }

        match store.append(obs).await {
            Ok(AppendOutcome::Appended) => report.appended += 1,
            Ok(AppendOutcome::Duplicate) => report.duplicates += 1,
            Err(EngineError::InvalidObservation { round_id, multiplier }) => {
                warn!(
                    "Backfill line {}: round {} rejected, multiplier {}",
                    i + 1,
                    round_id,
                    multiplier
                );
                report.rejected += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    info!("Backfill complete: {}", report);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreSettings;
    use crate::history::DurableSink;
    use async_trait::async_trait;

    struct NullSink;

    #[async_trait]
    impl DurableSink for NullSink {
        async fn append_line(&mut self, _line: &str) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn store() -> HistoryStore {
        HistoryStore::with_sink(StoreSettings::default(), Box::new(NullSink), Vec::new())
    }

    #[tokio::test]
    async fn test_backfill_uses_normal_append_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.csv");
        std::fs::write(
            &path,
            "# exported by hand\n\
             h1,1.87,2019-06-01T12:00:00+00:00\n\
             h2,12.4\n\
             h1,9.9\n\
             h3,-4.0\n\
             h4,abc\n",
        )
        .unwrap();

        let mut store = store();
        let report = backfill_from_csv(&mut store, &path).await.unwrap();

        assert_eq!(
            report,
            BackfillReport {
                appended: 2,
                duplicates: 1,
                rejected: 2,
            }
        );

        // Appended in file order, mode tagged Manual, ancient timestamp
        // fully eligible.
        let all = store.all();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].round_id, "h1");
        assert_eq!(all[0].mode_tag, RecordMode::Manual);
        assert_eq!(all[0].timestamp.timestamp(), 1559390400);
        assert_eq!(store.recent(2).len(), 2);
    }
}
