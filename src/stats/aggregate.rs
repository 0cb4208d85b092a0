//! Incremental daily aggregation.
//!
//! Each run scans ended sessions that have not been folded yet, groups them
//! by local day, and updates one `daily_stat` row per day inside a single
//! transaction: study time is added, retention and cards-learned are
//! recomputed from the review log, and the sessions are marked aggregated.
//! A failed day rolls back as a unit, so the pass is safely retryable.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, OptionalExtension, ToSql, Transaction};

use crate::stats::{day_start, local_day};
use crate::storage::models::{format_datetime, format_day, DailyStat, StudySession};
use crate::storage::{DatabaseManager, StorageResult};

/// Runs one aggregation pass; returns the number of days touched.
/// The caller serializes invocations (see `StatisticsEngine`).
pub(crate) fn run(db: &DatabaseManager, now: DateTime<Utc>) -> StorageResult<usize> {
    let pending = db.sessions().unaggregated_ended()?;
    if pending.is_empty() {
        return Ok(0);
    }

    let mut by_day: BTreeMap<NaiveDate, Vec<&StudySession>> = BTreeMap::new();
    for session in &pending {
        by_day
            .entry(local_day(session.started_at))
            .or_default()
            .push(session);
    }

    let mut conn = db.connection()?;
    let mut touched = 0;
    for (day, sessions) in by_day {
        let tx = conn.transaction()?;
        fold_day(&tx, day, &sessions, now)?;
        tx.commit()?;
        touched += 1;
        tracing::debug!(%day, sessions = sessions.len(), "folded day into daily stats");
    }

    Ok(touched)
}

fn fold_day(
    tx: &Transaction,
    day: NaiveDate,
    sessions: &[&StudySession],
    now: DateTime<Utc>,
) -> StorageResult<()> {
    let start = format_datetime(day_start(day));
    let end = format_datetime(day_start(day.succ_opt().unwrap_or(day)));

    let existing = tx
        .query_row(
            "SELECT * FROM daily_stat WHERE day = ?1",
            params![format_day(day)],
            DailyStat::from_row,
        )
        .optional()?;

    let added_seconds: i64 = sessions.iter().map(|s| s.duration_seconds()).sum();

    let (successful, total): (i64, i64) = tx.query_row(
        "SELECT COALESCE(SUM(CASE WHEN rating != 0 THEN 1 ELSE 0 END), 0), COUNT(*) \
         FROM review_log WHERE review_at >= ?1 AND review_at < ?2",
        params![start, end],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    let retention_rate = if total > 0 {
        successful as f64 / total as f64
    } else {
        0.0
    };

    // cards whose very first review happened on this day
    let cards_learned: i64 = tx.query_row(
        "SELECT COUNT(*) FROM ( \
             SELECT card_id, MIN(review_at) AS first_review \
             FROM review_log GROUP BY card_id \
             HAVING first_review >= ?1 AND first_review < ?2 \
         )",
        params![start, end],
        |row| row.get(0),
    )?;

    DailyStat {
        day,
        cards_learned,
        study_time_seconds: existing.map(|e| e.study_time_seconds).unwrap_or(0) + added_seconds,
        retention_rate,
        updated_at: now,
    }
    .upsert(tx)?;

    let placeholders = vec!["?"; sessions.len()].join(", ");
    let sql = format!("UPDATE study_session SET aggregated = 1 WHERE id IN ({placeholders})");
    let ids: Vec<&dyn ToSql> = sessions.iter().map(|s| &s.id as &dyn ToSql).collect();
    tx.execute(&sql, ids.as_slice())?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::models::{Card, StudyMode};
    use chrono::{Duration, TimeZone};

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap()
    }

    fn setup() -> DatabaseManager {
        DatabaseManager::in_memory().expect("open db")
    }

    fn ended_session(db: &DatabaseManager, start: DateTime<Utc>, minutes: i64) -> StudySession {
        let session = db
            .sessions()
            .start_session(StudyMode::Scheduled, start)
            .expect("start session");
        db.sessions()
            .end_session(&session.id, 0, start + Duration::minutes(minutes))
            .expect("end session");
        session
    }

    fn add_reviews(db: &DatabaseManager, at: DateTime<Utc>, ratings: &[i32]) {
        for rating in ratings {
            let card = Card::new("deck-1", "wort", "word", at);
            db.cards().create_card(&card).expect("create card");
            db.review_logs()
                .append(&card.id, None, *rating, at, 1.0, 0.0)
                .expect("append log");
        }
    }

    #[test]
    fn test_empty_input_touches_nothing() {
        let db = setup();
        assert_eq!(run(&db, noon()).expect("run"), 0);
        assert!(db.daily_stats().list_since(None).expect("list").is_empty());
    }

    #[test]
    fn test_folds_sessions_and_recomputes_retention() {
        let db = setup();
        ended_session(&db, noon(), 10);
        add_reviews(&db, noon(), &[2, 2, 3, 0]);

        assert_eq!(run(&db, noon()).expect("run"), 1);

        let day = local_day(noon());
        let stat = db
            .daily_stats()
            .get_day(day)
            .expect("query")
            .expect("row exists");
        assert_eq!(stat.study_time_seconds, 600);
        assert!((stat.retention_rate - 0.75).abs() < 1e-12);
        assert_eq!(stat.cards_learned, 4);
    }

    #[test]
    fn test_rerun_without_new_sessions_is_idempotent() {
        let db = setup();
        ended_session(&db, noon(), 10);
        add_reviews(&db, noon(), &[2, 0]);

        assert_eq!(run(&db, noon()).expect("first run"), 1);
        let before = db
            .daily_stats()
            .get_day(local_day(noon()))
            .expect("query")
            .expect("row");

        assert_eq!(run(&db, noon() + Duration::hours(1)).expect("second run"), 0);
        let after = db
            .daily_stats()
            .get_day(local_day(noon()))
            .expect("query")
            .expect("row");

        assert_eq!(before.study_time_seconds, after.study_time_seconds);
        assert_eq!(before.retention_rate, after.retention_rate);
        assert_eq!(before.cards_learned, after.cards_learned);
        assert_eq!(before.updated_at, after.updated_at);
    }

    #[test]
    fn test_adds_time_to_existing_row() {
        let db = setup();

        // first pass folds a 10-minute session
        ended_session(&db, noon(), 10);
        assert_eq!(run(&db, noon()).expect("run"), 1);

        // a later session on the same day adds to the accumulator
        ended_session(&db, noon() + Duration::hours(2), 5);
        assert_eq!(run(&db, noon()).expect("run"), 1);

        let stat = db
            .daily_stats()
            .get_day(local_day(noon()))
            .expect("query")
            .expect("row");
        assert_eq!(stat.study_time_seconds, 900);
    }

    #[test]
    fn test_groups_by_day() {
        let db = setup();
        ended_session(&db, noon(), 10);
        ended_session(&db, noon() - Duration::days(1), 20);
        ended_session(&db, noon() - Duration::days(1) + Duration::hours(1), 10);

        assert_eq!(run(&db, noon()).expect("run"), 2);

        let yesterday = db
            .daily_stats()
            .get_day(local_day(noon() - Duration::days(1)))
            .expect("query")
            .expect("row");
        assert_eq!(yesterday.study_time_seconds, 30 * 60);
    }

    #[test]
    fn test_active_sessions_are_left_for_later() {
        let db = setup();
        db.sessions()
            .start_session(StudyMode::Cram, noon())
            .expect("start session");

        assert_eq!(run(&db, noon()).expect("run"), 0);

        // ending it makes the next pass pick it up
        let pending = db.sessions().list_since(None).expect("list");
        db.sessions()
            .end_session(&pending[0].id, 3, noon() + Duration::minutes(15))
            .expect("end session");
        assert_eq!(run(&db, noon()).expect("run"), 1);
    }
}
