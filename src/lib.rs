//! # recall-core - Spaced-Repetition Scheduling & Analytics Engine
//!
//! Core engine of a vocabulary-learning app. Each learnable card carries a
//! memory-state record that is updated on every review; the engine decides
//! when each card should next be shown and derives study analytics from the
//! accumulated review history.
//!
//! ## Design goals
//!
//! - **Pure scheduling math** - the algorithm returns plain value objects;
//!   the caller decides whether/how to persist them
//! - **Explicit time** - `now` is injected into every operation, never read
//!   from a global clock
//! - **Defensive normalization** - out-of-range ratings, missing memory
//!   state, clock skew and zero stability are absorbed, never errors
//! - **Fast queries** - card selection and counts are pushed into SQL so the
//!   engine stays sub-100ms at thousands of cards
//!
//! ## Module structure
//!
//! - [`scheduler`] - per-card memory updates, rating previews, card selection
//! - [`stats`] - retention rate, study streaks, memory distributions, and
//!   the incremental daily aggregation cache
//! - [`storage`] - SQLite persistence (cards, memory state, review logs,
//!   study sessions, daily aggregates)
//! - [`config`] - scheduler configuration with env overrides
//! - [`logging`] - tracing setup for embedding applications

pub mod config;
pub mod logging;
pub mod scheduler;
pub mod stats;
pub mod storage;

pub use config::{NewAgainRoute, SchedulerConfig};
pub use scheduler::algorithm::{Rating, ReviewOutcome};
pub use scheduler::{Scheduler, StudyQueueMode};
pub use stats::{
    DailyRetention, DistributionBucket, MemoryMetrics, RetentionStats, StatisticsEngine,
    StreakStats, TimeRange,
};
pub use storage::models::{Card, CardState, DailyStat, MemoryState, ReviewLog, StudyMode, StudySession};
pub use storage::{DatabaseManager, StorageError, StorageResult};
