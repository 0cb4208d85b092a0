//! Statistics over the accumulated review history: retention rate, study
//! streaks, memory-distribution metrics, and the incremental daily
//! aggregation cache.
//!
//! All calculators are pure reads over a snapshot; only the aggregation pass
//! writes, and it is serialized behind its own mutex. Calendar bucketing is
//! done in the local timezone so day boundaries follow the user's clock
//! (including DST), and the same helpers back the trend, streak, and
//! aggregation code paths.

pub mod aggregate;
pub mod metrics;
pub mod retention;
pub mod streaks;

pub use metrics::{DistributionBucket, MemoryMetrics};
pub use retention::{DailyRetention, RetentionStats};
pub use streaks::StreakStats;

use std::sync::Arc;

use chrono::{DateTime, Duration, Local, NaiveDate, TimeZone, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::storage::models::DailyStat;
use crate::storage::{DatabaseManager, StorageResult};

/// Reporting window for the statistics calculators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TimeRange {
    Week,
    Month,
    AllTime,
}

impl TimeRange {
    /// Inclusive window start relative to `now`; `None` means unbounded.
    pub fn start_from(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Week => Some(now - Duration::days(7)),
            Self::Month => Some(now - Duration::days(30)),
            Self::AllTime => None,
        }
    }
}

/// Local calendar day a timestamp falls on.
pub(crate) fn local_day(ts: DateTime<Utc>) -> NaiveDate {
    ts.with_timezone(&Local).date_naive()
}

/// UTC instant of a local day's start. On a DST transition where midnight
/// does not exist or is ambiguous, the earliest valid instant is used.
pub(crate) fn day_start(day: NaiveDate) -> DateTime<Utc> {
    let midnight = day.and_time(chrono::NaiveTime::MIN);
    midnight
        .and_local_timezone(Local)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&midnight))
}

pub struct StatisticsEngine {
    db: Arc<DatabaseManager>,
    aggregation_lock: Mutex<()>,
}

impl StatisticsEngine {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self {
            db,
            aggregation_lock: Mutex::new(()),
        }
    }

    /// Retention over reviews in the window; `start` overrides the range's
    /// own window start when given.
    pub fn retention_rate(
        &self,
        range: TimeRange,
        start: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> StorageResult<RetentionStats> {
        let window_start = start.or_else(|| range.start_from(now));
        let logs = self.db.review_logs().list_between(window_start, Some(now))?;
        Ok(retention::calculate_retention(&logs))
    }

    pub fn study_streak(&self, range: TimeRange, now: DateTime<Utc>) -> StorageResult<StreakStats> {
        let sessions = self.db.sessions().list_since(range.start_from(now))?;
        Ok(streaks::calculate_streaks(&sessions, now))
    }

    /// Stability/difficulty averages and distributions over cards reviewed
    /// inside the window.
    pub fn memory_metrics(
        &self,
        range: TimeRange,
        now: DateTime<Utc>,
    ) -> StorageResult<MemoryMetrics> {
        let cards = self.db.cards();
        let reviewed = cards.reviewed_states(range.start_from(now))?;
        let total_cards = cards.card_count()?;
        Ok(metrics::calculate_metrics(&reviewed, total_cards))
    }

    /// Folds ended, not-yet-aggregated sessions into the daily cache.
    /// Returns the number of days touched; re-running with no new sessions
    /// returns 0 and leaves every row unchanged.
    pub fn aggregate_daily_stats(&self, now: DateTime<Utc>) -> StorageResult<usize> {
        let _guard = self.aggregation_lock.lock();
        aggregate::run(&self.db, now)
    }

    /// Cached per-day rows for the window (dashboard fast path).
    pub fn daily_history(
        &self,
        range: TimeRange,
        now: DateTime<Utc>,
    ) -> StorageResult<Vec<DailyStat>> {
        let since = range.start_from(now).map(local_day);
        self.db.daily_stats().list_since(since)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_range_starts() {
        let now = Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap();
        assert_eq!(
            TimeRange::Week.start_from(now),
            Some(now - Duration::days(7))
        );
        assert_eq!(
            TimeRange::Month.start_from(now),
            Some(now - Duration::days(30))
        );
        assert_eq!(TimeRange::AllTime.start_from(now), None);
    }

    #[test]
    fn test_same_instant_same_day() {
        let ts = Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap();
        assert_eq!(local_day(ts), local_day(ts + Duration::minutes(1)));
        // a full day later is always a different local day
        assert_ne!(local_day(ts), local_day(ts + Duration::days(1)));
    }

    #[test]
    fn test_day_start_precedes_day_timestamps() {
        let ts = Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap();
        let day = local_day(ts);
        assert!(day_start(day) <= ts);
        assert_eq!(local_day(day_start(day)), day);
    }
}
