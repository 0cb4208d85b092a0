//! Daily aggregation cache repository. Rows are written by the aggregation
//! pass in `stats::aggregate` and read by the dashboard fast path.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};

use crate::storage::models::{format_day, DailyStat};
use crate::storage::{StorageError, StorageResult};

pub struct DailyStatsRepository {
    conn: Arc<Mutex<Connection>>,
}

impl DailyStatsRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    pub fn get_day(&self, day: NaiveDate) -> StorageResult<Option<DailyStat>> {
        let conn = self.get_connection()?;
        let stat = conn
            .query_row(
                "SELECT * FROM daily_stat WHERE day = ?1",
                params![format_day(day)],
                DailyStat::from_row,
            )
            .optional()?;
        Ok(stat)
    }

    pub fn upsert(&self, stat: &DailyStat) -> StorageResult<()> {
        let conn = self.get_connection()?;
        stat.upsert(&conn)?;
        Ok(())
    }

    /// Rows with `day >= since`, oldest first. `None` means all of history.
    pub fn list_since(&self, since: Option<NaiveDate>) -> StorageResult<Vec<DailyStat>> {
        let conn = self.get_connection()?;
        let mut stmt;
        let rows = match since {
            Some(since) => {
                stmt = conn
                    .prepare("SELECT * FROM daily_stat WHERE day >= ?1 ORDER BY day ASC")?;
                stmt.query_map(params![format_day(since)], DailyStat::from_row)?
            }
            None => {
                stmt = conn.prepare("SELECT * FROM daily_stat ORDER BY day ASC")?;
                stmt.query_map([], DailyStat::from_row)?
            }
        };
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    fn get_connection(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StorageError::LockError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::DatabaseManager;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_upsert_and_window() {
        let db = DatabaseManager::in_memory().expect("open db");
        let repo = db.daily_stats();
        let now = Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap();

        for (day, seconds) in [(10, 600), (12, 1200), (14, 300)] {
            let stat = DailyStat {
                day: NaiveDate::from_ymd_opt(2025, 6, day).unwrap(),
                cards_learned: 5,
                study_time_seconds: seconds,
                retention_rate: 0.8,
                updated_at: now,
            };
            repo.upsert(&stat).expect("upsert");
        }

        let day = NaiveDate::from_ymd_opt(2025, 6, 12).unwrap();
        let stored = repo.get_day(day).expect("query").expect("exists");
        assert_eq!(stored.study_time_seconds, 1200);

        // upsert replaces, keyed by day
        let replaced = DailyStat {
            study_time_seconds: 1800,
            ..stored
        };
        repo.upsert(&replaced).expect("upsert");
        let stored = repo.get_day(day).expect("query").expect("exists");
        assert_eq!(stored.study_time_seconds, 1800);

        let recent = repo
            .list_since(Some(NaiveDate::from_ymd_opt(2025, 6, 12).unwrap()))
            .expect("window");
        assert_eq!(recent.len(), 2);
        assert_eq!(repo.list_since(None).expect("all").len(), 3);
    }
}
