//! Retention rate over a window of review logs. `again` counts as failed,
//! hard/good/easy as successful; the trend buckets reviews by local
//! calendar day.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::stats::local_day;
use crate::storage::models::ReviewLog;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyRetention {
    pub date: NaiveDate,
    pub rate: f64,
    pub total_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionStats {
    pub rate: f64,
    pub successful_count: i64,
    pub failed_count: i64,
    pub total_count: i64,
    pub daily_trend: Vec<DailyRetention>,
}

impl RetentionStats {
    pub fn empty() -> Self {
        Self {
            rate: 0.0,
            successful_count: 0,
            failed_count: 0,
            total_count: 0,
            daily_trend: Vec::new(),
        }
    }
}

pub fn calculate_retention(logs: &[ReviewLog]) -> RetentionStats {
    if logs.is_empty() {
        return RetentionStats::empty();
    }

    let mut successful = 0i64;
    let mut by_day: BTreeMap<NaiveDate, (i64, i64)> = BTreeMap::new();

    for log in logs {
        let success = log.rating != 0;
        if success {
            successful += 1;
        }
        let entry = by_day.entry(local_day(log.review_at)).or_insert((0, 0));
        entry.0 += i64::from(success);
        entry.1 += 1;
    }

    let total = logs.len() as i64;
    let daily_trend = by_day
        .into_iter()
        .map(|(date, (day_success, day_total))| DailyRetention {
            date,
            rate: day_success as f64 / day_total as f64,
            total_count: day_total,
        })
        .collect();

    RetentionStats {
        rate: successful as f64 / total as f64,
        successful_count: successful,
        failed_count: total - successful,
        total_count: total,
        daily_trend,
    }
}
