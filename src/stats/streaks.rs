//! Study streaks over session history. A day is active when at least one
//! session was started on it; the current streak must reach today to be
//! current at all.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::stats::local_day;
use crate::storage::models::StudySession;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreakStats {
    pub current_streak: i64,
    pub longest_streak: i64,
    pub active_days: i64,
    pub has_studied_today: bool,
    /// Per active local day, total study-time seconds summed across that
    /// day's ended sessions.
    pub calendar_heatmap: BTreeMap<NaiveDate, i64>,
}

pub fn calculate_streaks(sessions: &[StudySession], now: DateTime<Utc>) -> StreakStats {
    let mut active: BTreeSet<NaiveDate> = BTreeSet::new();
    let mut heatmap: BTreeMap<NaiveDate, i64> = BTreeMap::new();

    for session in sessions {
        let day = local_day(session.started_at);
        active.insert(day);
        // active sessions count as activity but contribute no time yet
        *heatmap.entry(day).or_insert(0) += session.duration_seconds();
    }

    let today = local_day(now);
    let has_studied_today = active.contains(&today);

    let mut current_streak = 0i64;
    let mut cursor = today;
    while active.contains(&cursor) {
        current_streak += 1;
        match cursor.pred_opt() {
            Some(previous) => cursor = previous,
            None => break,
        }
    }

    let mut longest_streak = 0i64;
    let mut run = 0i64;
    let mut previous: Option<NaiveDate> = None;
    for &day in &active {
        run = match previous {
            Some(prev) if day - prev == Duration::days(1) => run + 1,
            _ => 1,
        };
        longest_streak = longest_streak.max(run);
        previous = Some(day);
    }

    StreakStats {
        current_streak,
        longest_streak,
        active_days: active.len() as i64,
        has_studied_today,
        calendar_heatmap: heatmap,
    }
}
