//! Data model for the engine: cards, per-card memory state, the append-only
//! review log, study sessions, and the daily aggregation cache.
//!
//! Timestamps are stored as `%Y-%m-%d %H:%M:%S` UTC strings so that range
//! filters and ordering can stay inside SQL.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use rusqlite::{params, Connection, Result as SqliteResult, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::storage::StorageResult;

// ==================== Enums ====================

/// Learning phase of a card. Stored as the integer discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardState {
    New = 0,
    Learning = 1,
    Review = 2,
    Relearning = 3,
}

impl CardState {
    pub fn from_i32(value: i32) -> Self {
        match value {
            1 => Self::Learning,
            2 => Self::Review,
            3 => Self::Relearning,
            _ => Self::New,
        }
    }
}

/// Study-queue mode a session was started in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StudyMode {
    Scheduled,
    Learning,
    Cram,
}

impl StudyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Learning => "learning",
            Self::Cram => "cram",
        }
    }

    pub fn from_str_lossy(value: &str) -> Self {
        match value {
            "learning" => Self::Learning,
            "cram" => Self::Cram,
            _ => Self::Scheduled,
        }
    }
}

// ==================== Card ====================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: String,
    pub deck_id: String,
    pub term: String,
    pub definition: String,
    pub created_at: DateTime<Utc>,
}

impl Card {
    pub fn new(deck_id: impl Into<String>, term: impl Into<String>, definition: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            deck_id: deck_id.into(),
            term: term.into(),
            definition: definition.into(),
            created_at: now,
        }
    }

    pub fn from_row(row: &Row) -> SqliteResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            deck_id: row.get("deck_id")?,
            term: row.get("term")?,
            definition: row.get("definition")?,
            created_at: parse_datetime(row.get::<_, String>("created_at")?),
        })
    }

    pub fn insert(&self, conn: &Connection) -> StorageResult<()> {
        conn.execute(
            r#"
            INSERT INTO card (id, deck_id, term, definition, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                self.id,
                self.deck_id,
                self.term,
                self.definition,
                format_datetime(self.created_at),
            ],
        )?;
        Ok(())
    }
}

// ==================== MemoryState ====================

/// Per-card memory record, created lazily on first review.
///
/// `difficulty` lives in its unclamped numeric domain here; it is clamped to
/// [0,10] only when bucketed for distribution metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryState {
    pub card_id: String,
    pub stability: f64,
    pub difficulty: f64,
    pub retrievability: f64,
    pub due_date: DateTime<Utc>,
    pub last_review_at: Option<DateTime<Utc>>,
    pub state: CardState,
    pub reps: i32,
    pub lapses: i32,
    pub scheduled_days: f64,
    pub elapsed_days: f64,
    pub updated_at: DateTime<Utc>,
}

impl MemoryState {
    /// Defaults for a card that has never been reviewed: immediately due.
    pub fn new_default(card_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            card_id: card_id.into(),
            stability: 0.0,
            difficulty: 5.0,
            retrievability: 0.9,
            due_date: now,
            last_review_at: None,
            state: CardState::New,
            reps: 0,
            lapses: 0,
            scheduled_days: 0.0,
            elapsed_days: 0.0,
            updated_at: now,
        }
    }

    pub fn from_row(row: &Row) -> SqliteResult<Self> {
        Ok(Self {
            card_id: row.get("card_id")?,
            stability: row.get("stability")?,
            difficulty: row.get("difficulty")?,
            retrievability: row.get("retrievability")?,
            due_date: parse_datetime(row.get::<_, String>("due_date")?),
            last_review_at: row
                .get::<_, Option<String>>("last_review_at")?
                .map(parse_datetime),
            state: CardState::from_i32(row.get("state")?),
            reps: row.get("reps")?,
            lapses: row.get("lapses")?,
            scheduled_days: row.get("scheduled_days")?,
            elapsed_days: row.get("elapsed_days")?,
            updated_at: parse_datetime(row.get::<_, String>("updated_at")?),
        })
    }

    pub fn upsert(&self, conn: &Connection) -> StorageResult<()> {
        conn.execute(
            r#"
            INSERT INTO memory_state (
                card_id, stability, difficulty, retrievability, due_date,
                last_review_at, state, reps, lapses, scheduled_days,
                elapsed_days, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT(card_id) DO UPDATE SET
                stability = excluded.stability,
                difficulty = excluded.difficulty,
                retrievability = excluded.retrievability,
                due_date = excluded.due_date,
                last_review_at = excluded.last_review_at,
                state = excluded.state,
                reps = excluded.reps,
                lapses = excluded.lapses,
                scheduled_days = excluded.scheduled_days,
                elapsed_days = excluded.elapsed_days,
                updated_at = excluded.updated_at
            "#,
            params![
                self.card_id,
                self.stability,
                self.difficulty,
                self.retrievability,
                format_datetime(self.due_date),
                self.last_review_at.map(format_datetime),
                self.state as i32,
                self.reps,
                self.lapses,
                self.scheduled_days,
                self.elapsed_days,
                format_datetime(self.updated_at),
            ],
        )?;
        Ok(())
    }
}

// ==================== ReviewLog ====================

/// One row per submitted rating. Immutable once created; the source of truth
/// for all statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewLog {
    pub id: String,
    pub card_id: String,
    pub session_id: Option<String>,
    pub rating: i32,
    pub review_at: DateTime<Utc>,
    pub scheduled_days: f64,
    pub elapsed_days: f64,
}

impl ReviewLog {
    pub fn from_row(row: &Row) -> SqliteResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            card_id: row.get("card_id")?,
            session_id: row.get("session_id")?,
            rating: row.get("rating")?,
            review_at: parse_datetime(row.get::<_, String>("review_at")?),
            scheduled_days: row.get("scheduled_days")?,
            elapsed_days: row.get("elapsed_days")?,
        })
    }

    pub fn insert(&self, conn: &Connection) -> StorageResult<()> {
        conn.execute(
            r#"
            INSERT INTO review_log (
                id, card_id, session_id, rating, review_at,
                scheduled_days, elapsed_days
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                self.id,
                self.card_id,
                self.session_id,
                self.rating,
                format_datetime(self.review_at),
                self.scheduled_days,
                self.elapsed_days,
            ],
        )?;
        Ok(())
    }
}

// ==================== StudySession ====================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudySession {
    pub id: String,
    pub mode: StudyMode,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub cards_reviewed: i32,
    /// Set once the session has been folded into the daily aggregates.
    pub aggregated: bool,
}

impl StudySession {
    pub fn new(mode: StudyMode, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            mode,
            started_at: now,
            ended_at: None,
            cards_reviewed: 0,
            aggregated: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }

    pub fn duration_seconds(&self) -> i64 {
        match self.ended_at {
            Some(ended) => (ended - self.started_at).num_seconds().max(0),
            None => 0,
        }
    }

    pub fn from_row(row: &Row) -> SqliteResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            mode: StudyMode::from_str_lossy(&row.get::<_, String>("mode")?),
            started_at: parse_datetime(row.get::<_, String>("started_at")?),
            ended_at: row
                .get::<_, Option<String>>("ended_at")?
                .map(parse_datetime),
            cards_reviewed: row.get("cards_reviewed")?,
            aggregated: row.get::<_, i32>("aggregated")? != 0,
        })
    }

    pub fn insert(&self, conn: &Connection) -> StorageResult<()> {
        conn.execute(
            r#"
            INSERT INTO study_session (
                id, mode, started_at, ended_at, cards_reviewed, aggregated
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                self.id,
                self.mode.as_str(),
                format_datetime(self.started_at),
                self.ended_at.map(format_datetime),
                self.cards_reviewed,
                self.aggregated as i32,
            ],
        )?;
        Ok(())
    }
}

// ==================== DailyStat ====================

/// One derived row per local calendar day. `study_time_seconds` accumulates
/// across aggregation runs; `retention_rate` and `cards_learned` are
/// recomputed from the review log each time the day is touched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyStat {
    pub day: NaiveDate,
    pub cards_learned: i64,
    pub study_time_seconds: i64,
    pub retention_rate: f64,
    pub updated_at: DateTime<Utc>,
}

impl DailyStat {
    pub fn empty(day: NaiveDate, now: DateTime<Utc>) -> Self {
        Self {
            day,
            cards_learned: 0,
            study_time_seconds: 0,
            retention_rate: 0.0,
            updated_at: now,
        }
    }

    pub fn from_row(row: &Row) -> SqliteResult<Self> {
        Ok(Self {
            day: parse_day(row.get::<_, String>("day")?),
            cards_learned: row.get("cards_learned")?,
            study_time_seconds: row.get("study_time_seconds")?,
            retention_rate: row.get("retention_rate")?,
            updated_at: parse_datetime(row.get::<_, String>("updated_at")?),
        })
    }

    pub fn upsert(&self, conn: &Connection) -> StorageResult<()> {
        conn.execute(
            r#"
            INSERT INTO daily_stat (
                day, cards_learned, study_time_seconds, retention_rate, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(day) DO UPDATE SET
                cards_learned = excluded.cards_learned,
                study_time_seconds = excluded.study_time_seconds,
                retention_rate = excluded.retention_rate,
                updated_at = excluded.updated_at
            "#,
            params![
                format_day(self.day),
                self.cards_learned,
                self.study_time_seconds,
                self.retention_rate,
                format_datetime(self.updated_at),
            ],
        )?;
        Ok(())
    }
}

// ==================== Datetime helpers ====================

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DAY_FORMAT: &str = "%Y-%m-%d";

pub fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.format(DATETIME_FORMAT).to_string()
}

pub fn parse_datetime(value: String) -> DateTime<Utc> {
    NaiveDateTime::parse_from_str(&value, DATETIME_FORMAT)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .or_else(|_| DateTime::parse_from_rfc3339(&value).map(|dt| dt.with_timezone(&Utc)))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

pub fn format_day(day: NaiveDate) -> String {
    day.format(DAY_FORMAT).to_string()
}

pub fn parse_day(value: String) -> NaiveDate {
    NaiveDate::parse_from_str(&value, DAY_FORMAT).unwrap_or_default()
}
