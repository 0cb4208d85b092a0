//! Pure memory-model math. No I/O: every function maps explicit inputs to a
//! plain value object, and the caller decides what to persist.
//!
//! The forgetting curve is the simplified linear approximation
//! `R(t) = clamp(1 - t/S, 0, 1)` the review history is calibrated to, not
//! the canonical exponential form. Stability is the estimated number of days
//! until recall probability decays to the 0.9 reference threshold, so at the
//! default desired retention the scheduled interval equals the stability.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{NewAgainRoute, SchedulerConfig};
use crate::storage::models::{CardState, MemoryState};

// ==================== Constants ====================

/// Stability floor applied by every update.
const MIN_STABILITY: f64 = 0.1;

/// Interval clamp, in days.
const MIN_INTERVAL_DAYS: f64 = 0.01;
const MAX_INTERVAL_DAYS: f64 = 36500.0;

/// Floor for the `(1 - R)` stability-growth driver, so a success always
/// grows stability even when the review happens at zero elapsed time.
const MIN_GROWTH_DRIVER: f64 = 0.01;

/// Retrievability assigned by a reset.
pub const RESET_RETRIEVABILITY: f64 = 0.9;

/// Default difficulty for unreviewed or reset cards.
pub const DEFAULT_DIFFICULTY: f64 = 5.0;

const MS_PER_DAY: f64 = 86_400_000.0;

// ==================== Parameters ====================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlgorithmParams {
    pub w: [f64; 17],
}

impl Default for AlgorithmParams {
    fn default() -> Self {
        Self {
            w: [
                0.4, 0.6, 2.4, 5.8, // w0-w3: initial stability per rating
                4.93, 0.94, 0.86, 0.01, 1.49, // w4-w8
                0.14, 0.94, 2.18, 0.05, 0.34, // w9-w13
                1.26, 0.29, 2.61, // w14-w16
            ],
        }
    }
}

// ==================== Rating ====================

/// 4-valued ordinal review rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rating {
    Again = 0,
    Hard = 1,
    Good = 2,
    Easy = 3,
}

impl Rating {
    pub const ALL: [Rating; 4] = [Rating::Again, Rating::Hard, Rating::Good, Rating::Easy];

    /// Out-of-range values normalize to `Good` rather than erroring.
    pub fn from_value(value: i64) -> Self {
        match value {
            0 => Self::Again,
            1 => Self::Hard,
            2 => Self::Good,
            3 => Self::Easy,
            _ => Self::Good,
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Again)
    }

    /// 1-based grade used by the weight formulas.
    fn grade(&self) -> i32 {
        *self as i32 + 1
    }
}

// ==================== Review outcome ====================

/// Value object returned by every scheduling operation. The scheduler never
/// mutates a live record; persisting the outcome is the caller's job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewOutcome {
    pub stability: f64,
    pub difficulty: f64,
    /// Pre-review recall probability, always within [0, 1].
    pub retrievability: f64,
    pub due_date: DateTime<Utc>,
    pub state: CardState,
    pub scheduled_days: f64,
    pub elapsed_days: f64,
    pub reps: i32,
    pub lapses: i32,
}

impl ReviewOutcome {
    /// Materializes the outcome as the card's persisted memory state.
    pub fn into_memory_state(self, card_id: impl Into<String>, now: DateTime<Utc>) -> MemoryState {
        MemoryState {
            card_id: card_id.into(),
            stability: self.stability,
            difficulty: self.difficulty,
            retrievability: self.retrievability,
            due_date: self.due_date,
            last_review_at: Some(now),
            state: self.state,
            reps: self.reps,
            lapses: self.lapses,
            scheduled_days: self.scheduled_days,
            elapsed_days: self.elapsed_days,
            updated_at: now,
        }
    }
}

// ==================== Forgetting curve ====================

/// `clamp(1 - t/S, 0, 1)`. Non-positive stability means fully due; negative
/// elapsed time (clock skew) clamps to 1.
pub fn retrievability(stability: f64, elapsed_days: f64) -> f64 {
    if stability <= 0.0 {
        return 0.0;
    }
    (1.0 - elapsed_days / stability).clamp(0.0, 1.0)
}

fn next_interval(stability: f64, desired_retention: f64) -> f64 {
    let dr = desired_retention.clamp(0.70, 0.97);
    // linear curve: time for R to fall from 1 to dr, scaled so that the
    // 0.9 reference threshold maps the interval onto the stability itself
    let interval = stability * (1.0 - dr) * 10.0;
    interval.clamp(MIN_INTERVAL_DAYS, MAX_INTERVAL_DAYS)
}

fn days_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    (later - earlier).num_milliseconds() as f64 / MS_PER_DAY
}

fn interval_duration(days: f64) -> Duration {
    Duration::milliseconds((days * MS_PER_DAY) as i64)
}

// ==================== Weight formulas ====================

fn initial_stability(w: &[f64; 17], grade: i32) -> f64 {
    w[(grade - 1) as usize].max(MIN_STABILITY)
}

fn initial_difficulty(w: &[f64; 17], grade: i32) -> f64 {
    w[4] - (grade - 3) as f64 * w[5]
}

/// Monotone in the rating (`again` raises, `easy` lowers) with weak mean
/// reversion. The result stays unclamped; consumers clamp at bucket time.
fn next_difficulty(w: &[f64; 17], difficulty: f64, grade: i32) -> f64 {
    let delta = -(grade - 3) as f64;
    let d_new = difficulty + w[6] * delta;
    w[7] * initial_difficulty(w, 3) + (1.0 - w[7]) * d_new
}

fn next_recall_stability(
    w: &[f64; 17],
    difficulty: f64,
    stability: f64,
    retrievability: f64,
    grade: i32,
) -> f64 {
    // the growth formula needs difficulty inside its nominal range even when
    // the stored value has drifted outside it
    let d = difficulty.clamp(1.0, 10.0);
    let s = stability.max(MIN_STABILITY);
    let hard_penalty = if grade == 2 { w[15] } else { 1.0 };
    let easy_bonus = if grade == 4 { w[16] } else { 1.0 };
    let driver = (1.0 - retrievability).max(MIN_GROWTH_DRIVER);

    let new_s = s
        * (1.0
            + w[8].exp()
                * (11.0 - d)
                * s.powf(-w[9])
                * (driver * w[10]).exp_m1()
                * hard_penalty
                * easy_bonus);
    new_s.max(MIN_STABILITY)
}

fn next_forget_stability(
    w: &[f64; 17],
    difficulty: f64,
    stability: f64,
    retrievability: f64,
) -> f64 {
    let d = difficulty.clamp(1.0, 10.0);
    let new_s = w[11]
        * d.powf(-w[12])
        * ((stability + 1.0).powf(w[13]) - 1.0)
        * (1.0 - retrievability).powf(w[14]).exp();
    new_s.clamp(MIN_STABILITY, stability.max(MIN_STABILITY))
}

// ==================== State machine ====================

/// Transition table. No terminal state; the machine cycles as reviews
/// continue.
pub fn next_state(current: CardState, rating: Rating, config: &SchedulerConfig) -> CardState {
    match (current, rating) {
        (CardState::New, Rating::Again) => match config.new_again_route {
            NewAgainRoute::Learning => CardState::Learning,
            NewAgainRoute::Relearning => CardState::Relearning,
        },
        (CardState::New, Rating::Easy) if config.graduate_easy_immediately => CardState::Review,
        (CardState::New, _) => CardState::Learning,
        (CardState::Learning, Rating::Again) => CardState::Relearning,
        (CardState::Learning, Rating::Hard) => CardState::Learning,
        (CardState::Learning, _) => CardState::Review,
        (CardState::Review, Rating::Again) => CardState::Relearning,
        (CardState::Review, _) => CardState::Review,
        (CardState::Relearning, Rating::Good | Rating::Easy) => CardState::Review,
        (CardState::Relearning, _) => CardState::Relearning,
    }
}

// ==================== Operations ====================

/// Computes the post-review memory state for one rating.
///
/// A missing memory state (or one that has never been reviewed) takes the
/// first-review path with elapsed time measured from card creation. Clock
/// skew, zero stability and out-of-range ratings are absorbed, never raised.
pub fn process_review(
    state: Option<&MemoryState>,
    card_created_at: DateTime<Utc>,
    rating: Rating,
    now: DateTime<Utc>,
    config: &SchedulerConfig,
    params: &AlgorithmParams,
) -> ReviewOutcome {
    let w = &params.w;
    let grade = rating.grade();
    let desired = config.effective_retention();

    let reviewed = state.filter(|s| s.last_review_at.is_some() && s.reps > 0);

    match reviewed {
        None => {
            let current_state = state.map(|s| s.state).unwrap_or(CardState::New);
            let elapsed = days_between(card_created_at, now).max(0.0);
            let new_stability = initial_stability(w, grade);
            let new_difficulty = initial_difficulty(w, grade);
            let scheduled = next_interval(new_stability, desired);

            ReviewOutcome {
                stability: new_stability,
                difficulty: new_difficulty,
                retrievability: retrievability(state.map(|s| s.stability).unwrap_or(0.0), elapsed),
                due_date: now + interval_duration(scheduled),
                state: next_state(current_state, rating, config),
                scheduled_days: scheduled,
                elapsed_days: elapsed,
                reps: 1,
                lapses: i32::from(!rating.is_success()),
            }
        }
        Some(current) => {
            let last = current.last_review_at.unwrap_or(card_created_at);
            // negative on clock skew; passed through, the clamps absorb it
            let elapsed = days_between(last, now);
            let r = retrievability(current.stability, elapsed);
            let new_difficulty = next_difficulty(w, current.difficulty, grade);

            let (new_stability, new_lapses) = if rating.is_success() {
                (
                    next_recall_stability(w, current.difficulty, current.stability, r, grade),
                    current.lapses,
                )
            } else {
                (
                    next_forget_stability(w, current.difficulty, current.stability, r),
                    current.lapses + 1,
                )
            };

            let scheduled = next_interval(new_stability, desired);

            ReviewOutcome {
                stability: new_stability,
                difficulty: new_difficulty,
                retrievability: r,
                due_date: now + interval_duration(scheduled),
                state: next_state(current.state, rating, config),
                scheduled_days: scheduled,
                elapsed_days: elapsed,
                reps: current.reps + 1,
                lapses: new_lapses,
            }
        }
    }
}

/// What each of the four ratings would produce, without mutating anything.
/// Due dates are strictly increasing again < hard < good < easy.
pub fn preview_ratings(
    state: Option<&MemoryState>,
    card_created_at: DateTime<Utc>,
    now: DateTime<Utc>,
    config: &SchedulerConfig,
    params: &AlgorithmParams,
) -> [ReviewOutcome; 4] {
    Rating::ALL.map(|rating| process_review(state, card_created_at, rating, now, config, params))
}

/// Forgets a card's history: back to `new`, immediately due.
pub fn reset_state(now: DateTime<Utc>) -> ReviewOutcome {
    ReviewOutcome {
        stability: 0.0,
        difficulty: DEFAULT_DIFFICULTY,
        retrievability: RESET_RETRIEVABILITY,
        due_date: now,
        state: CardState::New,
        scheduled_days: 0.0,
        elapsed_days: 0.0,
        reps: 0,
        lapses: 0,
    }
}
