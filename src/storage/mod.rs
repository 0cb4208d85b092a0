//! SQLite persistence for the scheduling and analytics engine.
//!
//! The engine's storage collaborator: cards with attached memory state, the
//! append-only review log, study sessions, and the daily aggregation cache.
//! Repositories share a single connection behind a mutex, which also gives
//! the scheduler its single-writer serialization.

pub mod cards;
pub mod daily_stats;
pub mod migrations;
pub mod models;
pub mod review_logs;
pub mod sessions;

pub use cards::CardRepository;
pub use daily_stats::DailyStatsRepository;
pub use migrations::run_migrations;
pub use models::*;
pub use review_logs::ReviewLogRepository;
pub use sessions::SessionRepository;

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("migration error: {0}")]
    Migration(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("lock poisoned: {0}")]
    LockError(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Owns the SQLite connection and hands out repositories.
///
/// WAL mode and foreign-key enforcement are enabled on open, and pending
/// migrations run before the manager is returned. All writes funnel through
/// the one connection, so per-card mutations never interleave.
pub struct DatabaseManager {
    connection: Arc<Mutex<Connection>>,
}

impl DatabaseManager {
    pub fn new<P: AsRef<Path>>(db_path: P) -> StorageResult<Self> {
        let connection = Connection::open(db_path)?;
        connection.pragma_update(None, "journal_mode", "WAL")?;
        Self::init(connection)
    }

    /// In-memory database, used by tests and previews.
    pub fn in_memory() -> StorageResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(connection: Connection) -> StorageResult<Self> {
        connection.execute_batch("PRAGMA foreign_keys=ON;")?;
        migrations::run_migrations(&connection)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    pub fn connection(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.connection
            .lock()
            .map_err(|e| StorageError::LockError(e.to_string()))
    }

    pub fn cards(&self) -> CardRepository {
        CardRepository::new(Arc::clone(&self.connection))
    }

    pub fn review_logs(&self) -> ReviewLogRepository {
        ReviewLogRepository::new(Arc::clone(&self.connection))
    }

    pub fn sessions(&self) -> SessionRepository {
        SessionRepository::new(Arc::clone(&self.connection))
    }

    pub fn daily_stats(&self) -> DailyStatsRepository {
        DailyStatsRepository::new(Arc::clone(&self.connection))
    }
}
