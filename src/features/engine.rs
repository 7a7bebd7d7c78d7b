use serde::{Deserialize, Serialize};

use crate::config::FeatureSettings;
use crate::types::Observation;

/// Fixed-size feature vector computed fresh each round from the most
/// recent observations. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundFeatures {
    pub mean: f64,
    pub std_dev: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    /// Average of the recent half-window minus the older half-window.
    pub recent_older_delta: f64,
    /// Rounds below the low threshold, counted back from the newest.
    pub consecutive_low: f64,
    /// Rounds at or above the low threshold, counted back from the newest.
    pub consecutive_high: f64,
    /// Seconds since the most recent round at or above the high threshold;
    /// the window's full span when none exists.
    pub seconds_since_high: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    /// Shannon entropy over log2-scale multiplier buckets.
    pub entropy: f64,
    pub sample_count: usize,
    /// False when fewer than the configured window of records were
    /// available; callers should reduce confidence accordingly.
    pub full_window: bool,
    /// False only for the zero vector computed from no records at all.
    pub is_valid: bool,
}

impl RoundFeatures {
    pub const NUM_FEATURES: usize = 14;

    /// The vector fed to predictor models, in a fixed order.
    pub fn to_array(&self) -> [f64; Self::NUM_FEATURES] {
        [
            self.mean,
            self.std_dev,
            self.median,
            self.min,
            self.max,
            self.recent_older_delta,
            self.consecutive_low,
            self.consecutive_high,
            self.seconds_since_high,
            self.p25,
            self.p50,
            self.p75,
            self.entropy,
            self.sample_count as f64,
        ]
    }

    /// Neutral vector signalling "insufficient data".
    pub fn invalid() -> Self {
        Self {
            mean: 0.0,
            std_dev: 0.0,
            median: 0.0,
            min: 0.0,
            max: 0.0,
            recent_older_delta: 0.0,
            consecutive_low: 0.0,
            consecutive_high: 0.0,
            seconds_since_high: 0.0,
            p25: 0.0,
            p50: 0.0,
            p75: 0.0,
            entropy: 0.0,
            sample_count: 0,
            full_window: false,
            is_valid: false,
        }
    }
}

/// Pure rolling-window feature computation. Holds only its settings;
/// calling compute twice on the same records yields identical output.
#[derive(Debug, Clone)]
pub struct FeatureEngine {
    settings: FeatureSettings,
}

impl FeatureEngine {
    pub fn new(settings: FeatureSettings) -> Self {
        Self { settings }
    }

    /// Computes the feature vector over the given records, oldest to
    /// newest. Fewer records than the window is fine: statistics cover
    /// what exists and `full_window` is cleared. No record is ever
    /// excluded by age; only the offline training weights decay.
    pub fn compute(&self, records: &[Observation]) -> RoundFeatures {
        if records.is_empty() {
            return RoundFeatures::invalid();
        }

        let multipliers: Vec<f64> = records.iter().map(|r| r.multiplier).collect();
        let n = multipliers.len();

        // Welford accumulation; multipliers span 0.2x-6000x, so naive
        // sum-of-squares loses precision.
        let mut mean = 0.0f64;
        let mut m2 = 0.0f64;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for (i, &m) in multipliers.iter().enumerate() {
            let delta = m - mean;
            mean += delta / (i + 1) as f64;
            m2 += delta * (m - mean);
            min = min.min(m);
            max = max.max(m);
        }
        let std_dev = (m2 / n as f64).sqrt();

        let mut sorted = multipliers.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let p25 = percentile(&sorted, 25.0);
        let p50 = percentile(&sorted, 50.0);
        let p75 = percentile(&sorted, 75.0);

        let half = n / 2;
        let recent_older_delta = if half > 0 {
            let older: f64 = multipliers[..half].iter().sum::<f64>() / half as f64;
            let recent_len = n - half;
            let recent: f64 = multipliers[half..].iter().sum::<f64>() / recent_len as f64;
            recent - older
        } else {
            0.0
        };

        let low = self.settings.low_multiplier;
        let mut consecutive_low = 0usize;
        let mut consecutive_high = 0usize;
        for &m in multipliers.iter().rev() {
            if m < low {
                if consecutive_high > 0 {
                    break;
                }
                consecutive_low += 1;
            } else {
                if consecutive_low > 0 {
                    break;
                }
                consecutive_high += 1;
            }
        }

        let seconds_since_high = self.seconds_since_high(records);
        let entropy = log_bucket_entropy(&multipliers);

        RoundFeatures {
            mean,
            std_dev,
            median: p50,
            min,
            max,
            recent_older_delta,
            consecutive_low: consecutive_low as f64,
            consecutive_high: consecutive_high as f64,
            seconds_since_high,
            p25,
            p50,
            p75,
            entropy,
            sample_count: n,
            full_window: n >= self.settings.window,
            is_valid: true,
        }
    }

    fn seconds_since_high(&self, records: &[Observation]) -> f64 {
        let newest = match records.last() {
            Some(r) => r.timestamp,
            None => return 0.0,
        };
        let last_high = records
            .iter()
            .rev()
            .find(|r| r.multiplier >= self.settings.high_multiplier);
        let reference = match last_high {
            Some(r) => r.timestamp,
            // No high in the window: report the full observed span.
            None => records[0].timestamp,
        };
        (newest - reference).num_milliseconds().max(0) as f64 / 1000.0
    }
}

/// Linear-interpolation percentile over a pre-sorted slice.
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = pct / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let frac = rank - lower as f64;
        sorted[lower] + (sorted[upper] - sorted[lower]) * frac
    }
}

/// Shannon entropy of the multiplier distribution over log2-scale buckets
/// ([1,2), [2,4), [4,8), ...). Log buckets keep the estimate meaningful
/// across the 4+ orders of magnitude multipliers span.
fn log_bucket_entropy(multipliers: &[f64]) -> f64 {
    use std::collections::HashMap;

    let mut counts: HashMap<i32, usize> = HashMap::new();
    for &m in multipliers {
        let bucket = m.log2().floor() as i32;
        *counts.entry(bucket).or_insert(0) += 1;
    }

    let n = multipliers.len() as f64;
    let mut entropy = 0.0;
    for &count in counts.values() {
        let p = count as f64 / n;
        entropy -= p * p.ln();
    }
    entropy
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RecordMode;
    use chrono::{Duration, Utc};

    fn records(multipliers: &[f64]) -> Vec<Observation> {
        let start = Utc::now();
        multipliers
            .iter()
            .enumerate()
            .map(|(i, &m)| {
                let mut obs = Observation::unbetted(format!("r{}", i), m, RecordMode::Live);
                obs.timestamp = start + Duration::seconds(i as i64 * 30);
                obs
            })
            .collect()
    }

    fn engine() -> FeatureEngine {
        FeatureEngine::new(FeatureSettings::default())
    }

    #[test]
    fn test_empty_input_yields_invalid_zero_vector() {
        let features = engine().compute(&[]);
        assert!(!features.is_valid);
        assert!(!features.full_window);
        assert_eq!(features.to_array(), [0.0; RoundFeatures::NUM_FEATURES]);
    }

    #[test]
    fn test_basic_statistics() {
        let features = engine().compute(&records(&[1.0, 2.0, 3.0, 4.0, 5.0]));
        assert!(features.is_valid);
        assert!(!features.full_window); // 5 < default window of 20
        assert_eq!(features.sample_count, 5);
        assert!((features.mean - 3.0).abs() < 1e-12);
        assert!((features.std_dev - 2.0f64.sqrt()).abs() < 1e-12);
        assert_eq!(features.min, 1.0);
        assert_eq!(features.max, 5.0);
        assert_eq!(features.median, 3.0);
        assert_eq!(features.p25, 2.0);
        assert_eq!(features.p75, 4.0);
    }

    #[test]
    fn test_compute_is_pure_and_idempotent() {
        let recs = records(&[1.13, 42.7, 2.0, 0.9, 6000.0, 0.2, 1.01]);
        let eng = engine();
        let a = eng.compute(&recs);
        let b = eng.compute(&recs);
        assert_eq!(a, b);
        assert_eq!(a.to_array(), b.to_array());
    }

    #[test]
    fn test_welford_stable_across_magnitudes() {
        // 0.2x to 6000x in one window must not produce NaN or negative
        // variance.
        let recs = records(&[0.2, 0.5, 6000.0, 1.1, 3500.0, 0.9, 2.4]);
        let features = engine().compute(&recs);
        assert!(features.std_dev.is_finite());
        assert!(features.std_dev > 0.0);
        assert!(features.entropy.is_finite());
    }

    #[test]
    fn test_consecutive_streaks() {
        // Newest three are below 2.0, so the low streak is 3.
        let features = engine().compute(&records(&[5.0, 3.0, 1.5, 1.2, 1.8]));
        assert_eq!(features.consecutive_low, 3.0);
        assert_eq!(features.consecutive_high, 0.0);

        let features = engine().compute(&records(&[1.1, 2.5, 3.0, 4.2]));
        assert_eq!(features.consecutive_low, 0.0);
        assert_eq!(features.consecutive_high, 3.0);
    }

    #[test]
    fn test_recent_vs_older_delta() {
        // Older half [1, 1], recent half [3, 3]: delta is +2.
        let features = engine().compute(&records(&[1.0, 1.0, 3.0, 3.0]));
        assert!((features.recent_older_delta - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_seconds_since_high() {
        // Records are 30s apart; the high (12x) is 3 records before the
        // newest, so 90 seconds.
        let features = engine().compute(&records(&[1.5, 12.0, 2.0, 1.1, 1.9]));
        assert!((features.seconds_since_high - 90.0).abs() < 1e-9);

        // No high at all: the full span of the window (4 gaps of 30s).
        let features = engine().compute(&records(&[1.5, 2.0, 2.5, 1.1, 1.9]));
        assert!((features.seconds_since_high - 120.0).abs() < 1e-9);
    }

    #[test]
    fn test_entropy_single_bucket_is_zero() {
        // All values in [2,4) fall into one log2 bucket.
        let features = engine().compute(&records(&[2.0, 2.5, 3.0, 3.9]));
        assert_eq!(features.entropy, 0.0);

        // Two evenly-filled buckets give ln(2).
        let features = engine().compute(&records(&[1.5, 1.6, 2.5, 2.6]));
        assert!((features.entropy - 2.0f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_single_record() {
        let features = engine().compute(&records(&[2.37]));
        assert!(features.is_valid);
        assert_eq!(features.mean, 2.37);
        assert_eq!(features.std_dev, 0.0);
        assert_eq!(features.median, 2.37);
        assert_eq!(features.seconds_since_high, 0.0);
    }

    #[test]
    fn test_full_window_flag() {
        let multipliers: Vec<f64> = (0..20).map(|i| 1.0 + i as f64 * 0.1).collect();
        let features = engine().compute(&records(&multipliers));
        assert!(features.full_window);
    }
}
