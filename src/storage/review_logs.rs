//! Append-only review log repository.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, ToSql};
use uuid::Uuid;

use crate::storage::models::{format_datetime, ReviewLog};
use crate::storage::{StorageError, StorageResult};

pub struct ReviewLogRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ReviewLogRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    pub fn append(
        &self,
        card_id: &str,
        session_id: Option<&str>,
        rating: i32,
        review_at: DateTime<Utc>,
        scheduled_days: f64,
        elapsed_days: f64,
    ) -> StorageResult<ReviewLog> {
        let log = ReviewLog {
            id: Uuid::new_v4().to_string(),
            card_id: card_id.to_string(),
            session_id: session_id.map(str::to_string),
            rating,
            review_at,
            scheduled_days,
            elapsed_days,
        };
        let conn = self.get_connection()?;
        log.insert(&conn)?;
        Ok(log)
    }

    /// Logs inside `[start, end]`, oldest first. `None` bounds are open.
    pub fn list_between(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> StorageResult<Vec<ReviewLog>> {
        let conn = self.get_connection()?;

        let mut sql = String::from("SELECT * FROM review_log WHERE 1 = 1");
        let start_str = start.map(format_datetime);
        let end_str = end.map(format_datetime);
        let mut params_vec: Vec<&dyn ToSql> = Vec::new();
        if let Some(ref start_str) = start_str {
            sql.push_str(" AND review_at >= ?");
            params_vec.push(start_str);
        }
        if let Some(ref end_str) = end_str {
            sql.push_str(" AND review_at <= ?");
            params_vec.push(end_str);
        }
        sql.push_str(" ORDER BY review_at ASC");

        let mut stmt = conn.prepare(&sql)?;
        let logs: Vec<ReviewLog> = stmt
            .query_map(params_vec.as_slice(), ReviewLog::from_row)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(logs)
    }

    pub fn count(&self) -> StorageResult<i64> {
        let conn = self.get_connection()?;
        let count = conn.query_row("SELECT COUNT(*) FROM review_log", [], |row| row.get(0))?;
        Ok(count)
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
    use crate::storage::models::Card;
    use crate::storage::DatabaseManager;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_append_and_range_query() {
        let db = DatabaseManager::in_memory().expect("open db");
        let now = Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap();

        let card = Card::new("deck-1", "haus", "house", now);
        db.cards().create_card(&card).expect("create card");

        let logs = db.review_logs();
        for offset in [0i64, 1, 2, 10] {
            logs.append(&card.id, None, 2, now - Duration::days(offset), 1.0, 0.0)
                .expect("append");
        }

        assert_eq!(logs.count().expect("count"), 4);

        let window = logs
            .list_between(Some(now - Duration::days(2)), Some(now))
            .expect("range query");
        assert_eq!(window.len(), 3);
        for pair in window.windows(2) {
            assert!(pair[0].review_at <= pair[1].review_at);
        }

        let all = logs.list_between(None, None).expect("open query");
        assert_eq!(all.len(), 4);
    }
}
