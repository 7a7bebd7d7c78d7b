use chrono::{DateTime, Utc};

use crate::types::Observation;

/// Exponential time-decay sample weight for offline training:
/// exp(-age_hours / decay_hours). Strictly decreasing in age, approaches
/// zero but never reaches it, and depends on nothing but the timestamp.
/// Age scales the weight only; it never excludes a record from training.
pub fn weight_of(record: &Observation, now: DateTime<Utc>, decay_hours: f64) -> f64 {
    // Future-dated records (clock skew, backfill) clamp to age zero.
    let age_hours = (now - record.timestamp).num_milliseconds().max(0) as f64 / 3_600_000.0;
    (-age_hours / decay_hours).exp()
}

/// Pairs every record with its decay weight for the retraining job.
/// Membership is unconditional: backfilled records with arbitrarily old
/// timestamps stay in the set.
pub fn weighted_training_set<'a>(
    records: &'a [Observation],
    now: DateTime<Utc>,
    decay_hours: f64,
) -> Vec<(&'a Observation, f64)> {
    records
        .iter()
        .map(|r| (r, weight_of(r, now, decay_hours)))
        .collect()
}
