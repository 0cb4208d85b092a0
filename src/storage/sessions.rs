//! Study-session repository. Ending a session is its only mutation; the
//! `aggregated` marker is flipped by the daily-aggregation pass.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, ToSql};

use crate::storage::models::{format_datetime, StudyMode, StudySession};
use crate::storage::{StorageError, StorageResult};

pub struct SessionRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SessionRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    pub fn start_session(&self, mode: StudyMode, now: DateTime<Utc>) -> StorageResult<StudySession> {
        let session = StudySession::new(mode, now);
        let conn = self.get_connection()?;
        session.insert(&conn)?;
        Ok(session)
    }

    pub fn end_session(
        &self,
        session_id: &str,
        cards_reviewed: i32,
        now: DateTime<Utc>,
    ) -> StorageResult<()> {
        let conn = self.get_connection()?;
        let updated = conn.execute(
            "UPDATE study_session SET ended_at = ?1, cards_reviewed = ?2 \
             WHERE id = ?3 AND ended_at IS NULL",
            params![format_datetime(now), cards_reviewed, session_id],
        )?;
        if updated == 0 {
            return Err(StorageError::NotFound(format!(
                "active session {session_id}"
            )));
        }
        Ok(())
    }

    pub fn increment_cards_reviewed(&self, session_id: &str) -> StorageResult<()> {
        let conn = self.get_connection()?;
        conn.execute(
            "UPDATE study_session SET cards_reviewed = cards_reviewed + 1 WHERE id = ?1",
            params![session_id],
        )?;
        Ok(())
    }

    pub fn get_session(&self, session_id: &str) -> StorageResult<Option<StudySession>> {
        let conn = self.get_connection()?;
        let session = conn
            .query_row(
                "SELECT * FROM study_session WHERE id = ?1",
                params![session_id],
                StudySession::from_row,
            )
            .optional()?;
        Ok(session)
    }

    /// Sessions whose start falls inside `[start, now]`; `None` start means
    /// all of history.
    pub fn list_since(&self, start: Option<DateTime<Utc>>) -> StorageResult<Vec<StudySession>> {
        let conn = self.get_connection()?;
        let mut sql = String::from("SELECT * FROM study_session WHERE 1 = 1");
        let start_str = start.map(format_datetime);
        let mut params_vec: Vec<&dyn ToSql> = Vec::new();
        if let Some(ref start_str) = start_str {
            sql.push_str(" AND started_at >= ?");
            params_vec.push(start_str);
        }
        sql.push_str(" ORDER BY started_at ASC");

        let mut stmt = conn.prepare(&sql)?;
        let sessions: Vec<StudySession> = stmt
            .query_map(params_vec.as_slice(), StudySession::from_row)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(sessions)
    }

    /// Ended sessions not yet folded into the daily aggregates.
    pub fn unaggregated_ended(&self) -> StorageResult<Vec<StudySession>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM study_session \
             WHERE aggregated = 0 AND ended_at IS NOT NULL \
             ORDER BY started_at ASC",
        )?;
        let sessions: Vec<StudySession> = stmt
            .query_map([], StudySession::from_row)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(sessions)
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
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_session_lifecycle() {
        let db = DatabaseManager::in_memory().expect("open db");
        let repo = db.sessions();

        let session = repo
            .start_session(StudyMode::Scheduled, now())
            .expect("start");
        assert!(session.is_active());

        repo.end_session(&session.id, 12, now() + Duration::minutes(20))
            .expect("end");

        let stored = repo
            .get_session(&session.id)
            .expect("query")
            .expect("exists");
        assert!(!stored.is_active());
        assert_eq!(stored.cards_reviewed, 12);
        assert_eq!(stored.duration_seconds(), 1200);

        // ending twice fails: sessions are immutable once ended
        let err = repo.end_session(&session.id, 99, now() + Duration::hours(1));
        assert!(err.is_err());
    }

    #[test]
    fn test_unaggregated_scan_skips_active_sessions() {
        let db = DatabaseManager::in_memory().expect("open db");
        let repo = db.sessions();

        let ended = repo.start_session(StudyMode::Cram, now()).expect("start");
        repo.end_session(&ended.id, 5, now() + Duration::minutes(10))
            .expect("end");
        repo.start_session(StudyMode::Scheduled, now()).expect("start");

        let pending = repo.unaggregated_ended().expect("scan");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, ended.id);
    }

    #[test]
    fn test_list_since_window() {
        let db = DatabaseManager::in_memory().expect("open db");
        let repo = db.sessions();

        repo.start_session(StudyMode::Scheduled, now() - Duration::days(10))
            .expect("start");
        repo.start_session(StudyMode::Scheduled, now() - Duration::days(1))
            .expect("start");

        let recent = repo
            .list_since(Some(now() - Duration::days(7)))
            .expect("query");
        assert_eq!(recent.len(), 1);

        let all = repo.list_since(None).expect("query");
        assert_eq!(all.len(), 2);
    }
}
