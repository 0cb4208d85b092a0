//! Scheduling service: runs the pure algorithm against persisted cards and
//! owns the study-queue selection queries.
//!
//! Every write for a card (memory state, review log, session counter) runs
//! inside one transaction on the shared connection, so per-card mutations
//! are serialized while read-only queries stay free to interleave.

pub mod algorithm;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::storage::models::{Card, MemoryState, ReviewLog, StudyMode};
use crate::storage::{DatabaseManager, StorageError, StorageResult};
use algorithm::{AlgorithmParams, Rating, ReviewOutcome};

/// Study-queue selection mode; aliases the session mode since sessions are
/// started in the mode their queue was fetched with.
pub type StudyQueueMode = StudyMode;

pub struct Scheduler {
    db: Arc<DatabaseManager>,
    config: SchedulerConfig,
    params: AlgorithmParams,
}

impl Scheduler {
    pub fn new(db: Arc<DatabaseManager>, config: SchedulerConfig) -> Self {
        Self {
            db,
            config,
            params: AlgorithmParams::default(),
        }
    }

    pub fn with_params(mut self, params: AlgorithmParams) -> Self {
        self.params = params;
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    // ========== Review write path ==========

    /// Applies a rating to a card: computes the new memory state, persists
    /// it, appends the review-log entry, and bumps the session counter, all
    /// in one transaction.
    ///
    /// `rating_value` is normalized (out-of-range defaults to `good`); a
    /// card that has never been reviewed takes the first-review path.
    pub fn record_review(
        &self,
        card_id: &str,
        rating_value: i64,
        session_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> StorageResult<ReviewOutcome> {
        let mut conn = self.db.connection()?;
        let tx = conn.transaction()?;

        let card = tx
            .query_row(
                "SELECT * FROM card WHERE id = ?1",
                rusqlite::params![card_id],
                Card::from_row,
            )
            .optional()?
            .ok_or_else(|| StorageError::NotFound(format!("card {card_id}")))?;

        let state = tx
            .query_row(
                "SELECT * FROM memory_state WHERE card_id = ?1",
                rusqlite::params![card_id],
                MemoryState::from_row,
            )
            .optional()?;

        let rating = Rating::from_value(rating_value);
        let outcome = algorithm::process_review(
            state.as_ref(),
            card.created_at,
            rating,
            now,
            &self.config,
            &self.params,
        );

        outcome
            .clone()
            .into_memory_state(card_id, now)
            .upsert(&tx)?;

        ReviewLog {
            id: Uuid::new_v4().to_string(),
            card_id: card_id.to_string(),
            session_id: session_id.map(str::to_string),
            rating: rating as i32,
            review_at: now,
            scheduled_days: outcome.scheduled_days,
            elapsed_days: outcome.elapsed_days,
        }
        .insert(&tx)?;

        if let Some(session_id) = session_id {
            tx.execute(
                "UPDATE study_session SET cards_reviewed = cards_reviewed + 1 WHERE id = ?1",
                rusqlite::params![session_id],
            )?;
        }

        tx.commit()?;

        tracing::debug!(
            card_id,
            rating = rating as i32,
            stability = outcome.stability,
            scheduled_days = outcome.scheduled_days,
            "recorded review"
        );
        Ok(outcome)
    }

    /// Clears a card's memory back to `new` and makes it immediately due.
    pub fn reset_card(&self, card_id: &str, now: DateTime<Utc>) -> StorageResult<ReviewOutcome> {
        let cards = self.db.cards();
        if cards.get_card(card_id)?.is_none() {
            return Err(StorageError::NotFound(format!("card {card_id}")));
        }
        // reset defaults match the never-reviewed state, last review cleared
        cards.save_memory_state(&MemoryState::new_default(card_id, now))?;
        Ok(algorithm::reset_state(now))
    }

    // ========== Read-only queries ==========

    /// Per-rating outcomes for the UI preview; nothing is persisted.
    pub fn preview_ratings(
        &self,
        card_id: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<[ReviewOutcome; 4]> {
        let cards = self.db.cards();
        let card = cards
            .get_card(card_id)?
            .ok_or_else(|| StorageError::NotFound(format!("card {card_id}")))?;
        let state = cards.get_memory_state(card_id)?;
        Ok(algorithm::preview_ratings(
            state.as_ref(),
            card.created_at,
            now,
            &self.config,
            &self.params,
        ))
    }

    /// Ordered study queue for the requested mode, capped at `limit` and at
    /// the configured per-session card limit. `Some(&[])` deck filter selects
    /// nothing.
    pub fn fetch_cards(
        &self,
        mode: StudyQueueMode,
        limit: u32,
        decks: Option<&[String]>,
        now: DateTime<Utc>,
    ) -> StorageResult<Vec<String>> {
        let limit = limit.min(self.config.session_card_limit);
        let cards = self.db.cards();
        match mode {
            StudyMode::Scheduled => cards.due_cards(now, limit, decks),
            StudyMode::Cram => cards.cram_cards(limit, decks),
            StudyMode::Learning => cards.learning_cards(limit, decks),
        }
    }

    pub fn due_card_count(
        &self,
        decks: Option<&[String]>,
        now: DateTime<Utc>,
    ) -> StorageResult<i64> {
        self.db.cards().due_count(now, decks)
    }

    pub fn new_card_count(&self, decks: Option<&[String]>) -> StorageResult<i64> {
        self.db.cards().new_count(decks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::models::CardState;
    use chrono::{Duration, TimeZone};

    fn setup() -> (Arc<DatabaseManager>, Scheduler) {
        let db = Arc::new(DatabaseManager::in_memory().expect("open db"));
        let scheduler = Scheduler::new(Arc::clone(&db), SchedulerConfig::default());
        (db, scheduler)
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap()
    }

    fn add_card(db: &DatabaseManager, term: &str) -> Card {
        let card = Card::new("deck-1", term, format!("{term} definition"), now());
        db.cards().create_card(&card).expect("create card");
        card
    }

    #[test]
    fn test_record_review_persists_state_and_log() {
        let (db, scheduler) = setup();
        let card = add_card(&db, "hund");

        let session = db
            .sessions()
            .start_session(StudyMode::Scheduled, now())
            .expect("start session");

        let outcome = scheduler
            .record_review(&card.id, 2, Some(&session.id), now())
            .expect("record review");

        assert_eq!(outcome.state, CardState::Learning);
        assert!(outcome.due_date > now());

        let state = db
            .cards()
            .get_memory_state(&card.id)
            .expect("query")
            .expect("state");
        assert_eq!(state.reps, 1);
        assert_eq!(state.last_review_at, Some(now()));
        assert_eq!(state.due_date, outcome.due_date);

        let logs = db.review_logs().list_between(None, None).expect("logs");
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].rating, 2);
        assert_eq!(logs[0].session_id.as_deref(), Some(session.id.as_str()));

        let session = db
            .sessions()
            .get_session(&session.id)
            .expect("query")
            .expect("exists");
        assert_eq!(session.cards_reviewed, 1);
    }

    #[test]
    fn test_record_review_normalizes_out_of_range_rating() {
        let (db, scheduler) = setup();
        let card = add_card(&db, "katze");

        scheduler
            .record_review(&card.id, 42, None, now())
            .expect("record review");

        let logs = db.review_logs().list_between(None, None).expect("logs");
        assert_eq!(logs[0].rating, Rating::Good as i32);
    }

    #[test]
    fn test_record_review_missing_card() {
        let (_db, scheduler) = setup();
        let err = scheduler.record_review("no-such-card", 2, None, now());
        assert!(matches!(err, Err(StorageError::NotFound(_))));
    }

    #[test]
    fn test_preview_does_not_mutate() {
        let (db, scheduler) = setup();
        let card = add_card(&db, "maus");

        let previews = scheduler.preview_ratings(&card.id, now()).expect("preview");
        for pair in previews.windows(2) {
            assert!(pair[0].due_date < pair[1].due_date);
        }

        let state = db
            .cards()
            .get_memory_state(&card.id)
            .expect("query")
            .expect("state");
        assert_eq!(state.reps, 0);
        assert_eq!(db.review_logs().count().expect("count"), 0);
    }

    #[test]
    fn test_reset_card() {
        let (db, scheduler) = setup();
        let card = add_card(&db, "vogel");

        scheduler
            .record_review(&card.id, 3, None, now())
            .expect("record review");
        let reset = scheduler
            .reset_card(&card.id, now() + Duration::days(1))
            .expect("reset");

        assert_eq!(reset.state, CardState::New);
        let state = db
            .cards()
            .get_memory_state(&card.id)
            .expect("query")
            .expect("state");
        assert_eq!(state.state, CardState::New);
        assert_eq!(state.stability, 0.0);
        assert!(state.last_review_at.is_none());
        assert!(state.due_date <= now() + Duration::days(1));
    }

    #[test]
    fn test_fetch_scheduled_thousand_cards() {
        let (db, scheduler) = setup();
        let repo = db.cards();

        for i in 0..1000 {
            let card = add_card(&db, &format!("word-{i}"));
            let mut state = repo
                .get_memory_state(&card.id)
                .expect("query")
                .expect("state");
            // spread due dates around `now`; roughly half already due
            state.due_date = now() + Duration::hours(i - 500);
            repo.save_memory_state(&state).expect("save");
        }

        let queue = scheduler
            .fetch_cards(StudyMode::Scheduled, 20, None, now())
            .expect("fetch");
        assert_eq!(queue.len(), 20);

        let states: Vec<MemoryState> = queue
            .iter()
            .map(|id| repo.get_memory_state(id).unwrap().unwrap())
            .collect();
        for state in &states {
            assert!(state.due_date <= now());
        }
        for pair in states.windows(2) {
            assert!(pair[0].due_date <= pair[1].due_date);
        }
    }

    #[test]
    fn test_fetch_caps_at_session_card_limit() {
        let db = Arc::new(DatabaseManager::in_memory().expect("open db"));
        let mut config = SchedulerConfig::default();
        config.session_card_limit = 3;
        let scheduler = Scheduler::new(Arc::clone(&db), config);

        for i in 0..6 {
            add_card(&db, &format!("word-{i}"));
        }

        let queue = scheduler
            .fetch_cards(StudyMode::Scheduled, 100, None, now())
            .expect("fetch");
        assert_eq!(queue.len(), 3);

        // an explicit limit below the cap still applies
        let queue = scheduler
            .fetch_cards(StudyMode::Scheduled, 2, None, now())
            .expect("fetch");
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_counts_and_empty_database() {
        let (db, scheduler) = setup();
        assert_eq!(scheduler.due_card_count(None, now()).expect("count"), 0);
        assert_eq!(scheduler.new_card_count(None).expect("count"), 0);
        assert!(scheduler
            .fetch_cards(StudyMode::Cram, 10, None, now())
            .expect("fetch")
            .is_empty());

        let card = add_card(&db, "fisch");
        assert_eq!(scheduler.new_card_count(None).expect("count"), 1);
        scheduler
            .record_review(&card.id, 2, None, now())
            .expect("record review");
        assert_eq!(scheduler.new_card_count(None).expect("count"), 0);
    }
}
