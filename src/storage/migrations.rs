//! Versioned schema migrations.
//!
//! Each migration runs in its own transaction and is recorded in the
//! `schema_migrations` table, so opening an older database upgrades it
//! incrementally.

use rusqlite::Connection;

use crate::storage::{StorageError, StorageResult};

pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// V1: base tables. Memory state and review logs hang off cards with
/// cascade deletes; sessions carry the `aggregated` marker consumed by the
/// daily-aggregation pass.
const INIT_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS card (
    id TEXT PRIMARY KEY,
    deck_id TEXT NOT NULL,
    term TEXT NOT NULL,
    definition TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS memory_state (
    card_id TEXT PRIMARY KEY REFERENCES card(id) ON DELETE CASCADE,
    stability REAL NOT NULL DEFAULT 0,
    difficulty REAL NOT NULL DEFAULT 5.0,
    retrievability REAL NOT NULL DEFAULT 0.9,
    due_date TEXT NOT NULL,
    last_review_at TEXT,
    state INTEGER NOT NULL DEFAULT 0,
    reps INTEGER NOT NULL DEFAULT 0,
    lapses INTEGER NOT NULL DEFAULT 0,
    scheduled_days REAL NOT NULL DEFAULT 0,
    elapsed_days REAL NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS review_log (
    id TEXT PRIMARY KEY,
    card_id TEXT NOT NULL REFERENCES card(id) ON DELETE CASCADE,
    session_id TEXT,
    rating INTEGER NOT NULL,
    review_at TEXT NOT NULL,
    scheduled_days REAL NOT NULL DEFAULT 0,
    elapsed_days REAL NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS study_session (
    id TEXT PRIMARY KEY,
    mode TEXT NOT NULL DEFAULT 'scheduled',
    started_at TEXT NOT NULL,
    ended_at TEXT,
    cards_reviewed INTEGER NOT NULL DEFAULT 0,
    aggregated INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS daily_stat (
    day TEXT PRIMARY KEY,
    cards_learned INTEGER NOT NULL DEFAULT 0,
    study_time_seconds INTEGER NOT NULL DEFAULT 0,
    retention_rate REAL NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL
);
"#;

#[derive(Debug, Clone)]
pub struct Migration {
    pub version: i32,
    pub name: String,
    pub sql: String,
}

impl Migration {
    pub fn new(version: i32, name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            version,
            name: name.into(),
            sql: sql.into(),
        }
    }
}

pub fn get_migrations() -> Vec<Migration> {
    vec![
        Migration::new(1, "base tables", INIT_SCHEMA),
        // V2: composite indices for the hot selection and stats queries.
        Migration::new(
            2,
            "selection and stats indices",
            r#"
            CREATE INDEX IF NOT EXISTS idx_ms_due_date
                ON memory_state(due_date);

            CREATE INDEX IF NOT EXISTS idx_ms_state_stability
                ON memory_state(state, stability);

            CREATE INDEX IF NOT EXISTS idx_card_deck
                ON card(deck_id);

            CREATE INDEX IF NOT EXISTS idx_rl_review_at
                ON review_log(review_at);

            CREATE INDEX IF NOT EXISTS idx_rl_card_review_at
                ON review_log(card_id, review_at);

            CREATE INDEX IF NOT EXISTS idx_ss_aggregated_ended
                ON study_session(aggregated, ended_at);
            "#,
        ),
    ]
}

pub fn run_migrations(conn: &Connection) -> StorageResult<()> {
    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
        [],
    )?;

    let applied: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    for migration in get_migrations() {
        if migration.version <= applied {
            continue;
        }
        apply_migration(conn, &migration)?;
    }

    Ok(())
}

fn apply_migration(conn: &Connection, migration: &Migration) -> StorageResult<()> {
    conn.execute_batch("BEGIN")?;

    let result = conn.execute_batch(&migration.sql).and_then(|_| {
        conn.execute(
            "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
            rusqlite::params![migration.version, migration.name],
        )
        .map(|_| ())
    });

    match result {
        Ok(()) => {
            conn.execute_batch("COMMIT")?;
            tracing::debug!(version = migration.version, name = %migration.name, "applied migration");
            Ok(())
        }
        Err(err) => {
            let _ = conn.execute_batch("ROLLBACK");
            Err(StorageError::Migration(format!(
                "migration {} ({}) failed: {err}",
                migration.version, migration.name
            )))
        }
    }
}
