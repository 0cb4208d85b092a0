//! Memory-distribution metrics: stability/difficulty averages and fixed
//! bucket distributions over reviewed cards.

use serde::{Deserialize, Serialize};

use crate::scheduler::algorithm::DEFAULT_DIFFICULTY;
use crate::storage::models::MemoryState;

/// Fixed stability ranges, in days. Upper bounds are exclusive; the last
/// bucket is open-ended.
const STABILITY_BUCKETS: [(&str, f64); 9] = [
    ("0-1 days", 1.0),
    ("1-3 days", 3.0),
    ("3-7 days", 7.0),
    ("1-2 weeks", 14.0),
    ("2-4 weeks", 28.0),
    ("1-3 months", 90.0),
    ("3-6 months", 180.0),
    ("6-12 months", 365.0),
    ("1+ years", f64::INFINITY),
];

/// Five width-2 tiers across the clamped [0,10] difficulty domain.
const DIFFICULTY_BUCKETS: [&str; 5] = ["very easy", "easy", "medium", "hard", "very hard"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionBucket {
    pub label: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryMetrics {
    pub average_stability: f64,
    pub average_difficulty: f64,
    pub total_cards: i64,
    pub reviewed_cards: i64,
    pub stability_distribution: Vec<DistributionBucket>,
    pub difficulty_distribution: Vec<DistributionBucket>,
}

pub fn calculate_metrics(reviewed: &[MemoryState], total_cards: i64) -> MemoryMetrics {
    let mut stability_counts = [0i64; STABILITY_BUCKETS.len()];
    let mut difficulty_counts = [0i64; DIFFICULTY_BUCKETS.len()];
    let mut stability_sum = 0.0;
    let mut difficulty_sum = 0.0;

    for state in reviewed {
        stability_sum += state.stability;
        difficulty_sum += state.difficulty;
        stability_counts[stability_bucket(state.stability)] += 1;
        difficulty_counts[difficulty_bucket(state.difficulty)] += 1;
    }

    let reviewed_cards = reviewed.len() as i64;
    let (average_stability, average_difficulty) = if reviewed_cards > 0 {
        (
            stability_sum / reviewed_cards as f64,
            difficulty_sum / reviewed_cards as f64,
        )
    } else {
        (0.0, DEFAULT_DIFFICULTY)
    };

    MemoryMetrics {
        average_stability,
        average_difficulty,
        total_cards,
        reviewed_cards,
        stability_distribution: STABILITY_BUCKETS
            .iter()
            .zip(stability_counts)
            .map(|((label, _), count)| DistributionBucket {
                label: label.to_string(),
                count,
            })
            .collect(),
        difficulty_distribution: DIFFICULTY_BUCKETS
            .iter()
            .zip(difficulty_counts)
            .map(|(label, count)| DistributionBucket {
                label: label.to_string(),
                count,
            })
            .collect(),
    }
}

fn stability_bucket(stability: f64) -> usize {
    let stability = stability.max(0.0);
    STABILITY_BUCKETS
        .iter()
        .position(|(_, upper)| stability < *upper)
        .unwrap_or(STABILITY_BUCKETS.len() - 1)
}

/// Out-of-domain difficulty clamps into the nearest bucket, never dropped.
fn difficulty_bucket(difficulty: f64) -> usize {
    let clamped = difficulty.clamp(0.0, 10.0);
    ((clamped / 2.0) as usize).min(DIFFICULTY_BUCKETS.len() - 1)
}
