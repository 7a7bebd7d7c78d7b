use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use tracing::warn;

use crate::types::{Observation, RecordMode};

/// Durable log schema: one CSV line per settled round, append-only,
/// human-auditable, consumed by the audit subcommand and the offline
/// training job.
pub const CSV_HEADER: &str = "timestamp,round_id,multiplier,bet_placed,stake,cashout_multiplier,profit_loss,predicted_value,predicted_confidence,mode";

pub fn encode_line(obs: &Observation) -> String {
    format!(
        "{},{},{},{},{},{},{},{},{},{}",
        obs.timestamp.to_rfc3339(),
        obs.round_id,
        obs.multiplier,
        obs.bet_placed,
        obs.stake,
        obs.cashout_multiplier
            .map(|c| c.to_string())
            .unwrap_or_default(),
        obs.profit_loss,
        obs.predicted_value,
        obs.predicted_confidence,
        obs.mode_tag.as_str(),
    )
}

pub fn parse_line(line: &str) -> Result<Observation> {
    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() != 10 {
        anyhow::bail!("expected 10 fields, got {}", fields.len());
    }

    let timestamp = DateTime::parse_from_rfc3339(fields[0])
        .context("bad timestamp")?
        .with_timezone(&Utc);
    let cashout_multiplier = if fields[5].is_empty() {
        None
    } else {
        Some(Decimal::from_str(fields[5]).context("bad cashout_multiplier")?)
    };

    Ok(Observation {
        timestamp,
        round_id: fields[1].to_string(),
        multiplier: fields[2].parse().context("bad multiplier")?,
        bet_placed: fields[3].parse().context("bad bet_placed")?,
        stake: Decimal::from_str(fields[4]).context("bad stake")?,
        cashout_multiplier,
        profit_loss: Decimal::from_str(fields[6]).context("bad profit_loss")?,
        predicted_value: fields[7].parse().context("bad predicted_value")?,
        predicted_confidence: fields[8].parse().context("bad predicted_confidence")?,
        mode_tag: RecordMode::from_str(fields[9])
            .ok_or_else(|| anyhow::anyhow!("bad mode tag '{}'", fields[9]))?,
    })
}

/// Reads the full durable log in stored order. The log is append-only and
/// already chronological, so no re-sorting happens here. Malformed lines
/// and records with invalid multipliers are logged and skipped, never
/// fatal: a truncated tail write must not block startup.
pub fn read_log(path: &Path) -> Result<Vec<Observation>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read round log {}", path.display()))?;

    let mut records = Vec::new();
    for (i, line) in raw.lines().enumerate() {
        if i == 0 && line == CSV_HEADER {
            continue;
        }
        if line.trim().is_empty() {
            continue;
        }
        match parse_line(line) {
            Ok(obs) if obs.has_valid_multiplier() => records.push(obs),
            Ok(obs) => {
                warn!(
                    "Skipping stored round {} with invalid multiplier {}",
                    obs.round_id, obs.multiplier
                );
            }
            Err(e) => {
                warn!("Skipping malformed log line {}: {}", i + 1, e);
            }
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample() -> Observation {
        let mut obs = Observation::unbetted("round-17", 2.41, RecordMode::Live);
        obs.bet_placed = true;
        obs.stake = dec!(15);
        obs.cashout_multiplier = Some(dec!(2.0));
        obs.profit_loss = dec!(15);
        obs.predicted_value = 2.45;
        obs.predicted_confidence = 71.2;
        obs
    }

    #[test]
    fn test_line_round_trip() {
        let obs = sample();
        let parsed = parse_line(&encode_line(&obs)).unwrap();
        assert_eq!(parsed.round_id, obs.round_id);
        assert_eq!(parsed.multiplier, obs.multiplier);
        assert_eq!(parsed.stake, obs.stake);
        assert_eq!(parsed.cashout_multiplier, obs.cashout_multiplier);
        assert_eq!(parsed.predicted_confidence, obs.predicted_confidence);
        assert_eq!(parsed.mode_tag, obs.mode_tag);
    }

    #[test]
    fn test_empty_cashout_field() {
        let obs = Observation::unbetted("r1", 1.07, RecordMode::Observation);
        let parsed = parse_line(&encode_line(&obs)).unwrap();
        assert_eq!(parsed.cashout_multiplier, None);
        assert!(!parsed.bet_placed);
    }

    #[test]
    fn test_read_log_skips_garbage_keeps_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rounds.csv");

        let a = Observation::unbetted("a", 1.5, RecordMode::Live);
        let b = Observation::unbetted("b", 3.2, RecordMode::Live);
        let contents = format!(
            "{}\n{}\nnot,a,valid,line\n{}\n",
            CSV_HEADER,
            encode_line(&a),
            encode_line(&b)
        );
        std::fs::write(&path, contents).unwrap();

        let records = read_log(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].round_id, "a");
        assert_eq!(records[1].round_id, "b");
    }

    #[test]
    fn test_read_log_missing_file_is_empty() {
        let records = read_log(Path::new("/nonexistent/rounds.csv")).unwrap();
        assert!(records.is_empty());
    }
}
