//! Card and memory-state repository.
//!
//! Selection queries (due, cram, learning intake) and the count queries are
//! expressed in SQL against the V2 indices so they stay fast at thousands of
//! cards instead of materializing the whole collection.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, ToSql};

use crate::storage::models::{format_datetime, Card, CardState, MemoryState};
use crate::storage::{StorageError, StorageResult};

pub struct CardRepository {
    conn: Arc<Mutex<Connection>>,
}

impl CardRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    // ========== CRUD ==========

    /// Inserts the card together with its default memory state (immediately
    /// due, `new`) in one transaction.
    pub fn create_card(&self, card: &Card) -> StorageResult<()> {
        let mut conn = self.get_connection()?;
        let tx = conn.transaction()?;
        card.insert(&tx)?;
        MemoryState::new_default(card.id.clone(), card.created_at).upsert(&tx)?;
        tx.commit()?;
        Ok(())
    }

    pub fn get_card(&self, card_id: &str) -> StorageResult<Option<Card>> {
        let conn = self.get_connection()?;
        let card = conn
            .query_row(
                "SELECT * FROM card WHERE id = ?1",
                params![card_id],
                Card::from_row,
            )
            .optional()?;
        Ok(card)
    }

    /// Deletes the card; its memory state and review logs cascade with it.
    pub fn delete_card(&self, card_id: &str) -> StorageResult<()> {
        let conn = self.get_connection()?;
        conn.execute("DELETE FROM card WHERE id = ?1", params![card_id])?;
        Ok(())
    }

    pub fn get_memory_state(&self, card_id: &str) -> StorageResult<Option<MemoryState>> {
        let conn = self.get_connection()?;
        let state = conn
            .query_row(
                "SELECT * FROM memory_state WHERE card_id = ?1",
                params![card_id],
                MemoryState::from_row,
            )
            .optional()?;
        Ok(state)
    }

    pub fn save_memory_state(&self, state: &MemoryState) -> StorageResult<()> {
        let conn = self.get_connection()?;
        state.upsert(&conn)?;
        Ok(())
    }

    // ========== Selection queries ==========

    /// Cards with `due_date <= now`, oldest-due first.
    pub fn due_cards(
        &self,
        now: DateTime<Utc>,
        limit: u32,
        decks: Option<&[String]>,
    ) -> StorageResult<Vec<String>> {
        if deck_filter_is_empty(decks) {
            return Ok(Vec::new());
        }
        let now_str = format_datetime(now);
        self.select_card_ids(
            "ms.due_date <= ?",
            &[&now_str],
            "ORDER BY ms.due_date ASC",
            limit,
            decks,
        )
    }

    /// Cram queue: due dates are ignored, least-known (lowest stability)
    /// cards first.
    pub fn cram_cards(&self, limit: u32, decks: Option<&[String]>) -> StorageResult<Vec<String>> {
        if deck_filter_is_empty(decks) {
            return Ok(Vec::new());
        }
        self.select_card_ids("1 = 1", &[], "ORDER BY ms.stability ASC", limit, decks)
    }

    /// New-card intake: `state IN (new, learning, relearning)`, oldest first.
    pub fn learning_cards(
        &self,
        limit: u32,
        decks: Option<&[String]>,
    ) -> StorageResult<Vec<String>> {
        if deck_filter_is_empty(decks) {
            return Ok(Vec::new());
        }
        let states = format!(
            "ms.state IN ({}, {}, {})",
            CardState::New as i32,
            CardState::Learning as i32,
            CardState::Relearning as i32
        );
        self.select_card_ids(&states, &[], "ORDER BY c.created_at ASC", limit, decks)
    }

    fn select_card_ids(
        &self,
        predicate: &str,
        predicate_params: &[&dyn ToSql],
        ordering: &str,
        limit: u32,
        decks: Option<&[String]>,
    ) -> StorageResult<Vec<String>> {
        let conn = self.get_connection()?;
        let mut sql = format!(
            "SELECT ms.card_id FROM memory_state ms \
             JOIN card c ON c.id = ms.card_id \
             WHERE {predicate}"
        );

        let mut params_vec: Vec<&dyn ToSql> = predicate_params.to_vec();
        if let Some(decks) = decks {
            sql.push_str(&deck_in_clause(decks.len()));
            for deck in decks {
                params_vec.push(deck);
            }
        }

        let limit = limit as i64;
        sql.push_str(&format!(" {ordering} LIMIT ?"));
        params_vec.push(&limit);

        let mut stmt = conn.prepare(&sql)?;
        let ids: Vec<String> = stmt
            .query_map(params_vec.as_slice(), |row| row.get(0))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(ids)
    }

    // ========== Counts ==========

    pub fn due_count(&self, now: DateTime<Utc>, decks: Option<&[String]>) -> StorageResult<i64> {
        if deck_filter_is_empty(decks) {
            return Ok(0);
        }
        let now_str = format_datetime(now);
        self.count_where("ms.due_date <= ?", &[&now_str], decks)
    }

    pub fn new_count(&self, decks: Option<&[String]>) -> StorageResult<i64> {
        if deck_filter_is_empty(decks) {
            return Ok(0);
        }
        let state = CardState::New as i32;
        self.count_where("ms.state = ?", &[&state], decks)
    }

    pub fn card_count(&self) -> StorageResult<i64> {
        let conn = self.get_connection()?;
        let count = conn.query_row("SELECT COUNT(*) FROM card", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Distinct deck ids present in the collection, sorted.
    pub fn decks(&self) -> StorageResult<Vec<String>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare("SELECT DISTINCT deck_id FROM card ORDER BY deck_id ASC")?;
        let decks: Vec<String> = stmt
            .query_map([], |row| row.get(0))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(decks)
    }

    fn count_where(
        &self,
        predicate: &str,
        predicate_params: &[&dyn ToSql],
        decks: Option<&[String]>,
    ) -> StorageResult<i64> {
        let conn = self.get_connection()?;
        let mut sql = format!(
            "SELECT COUNT(*) FROM memory_state ms \
             JOIN card c ON c.id = ms.card_id \
             WHERE {predicate}"
        );

        let mut params_vec: Vec<&dyn ToSql> = predicate_params.to_vec();
        if let Some(decks) = decks {
            sql.push_str(&deck_in_clause(decks.len()));
            for deck in decks {
                params_vec.push(deck);
            }
        }

        let count = conn.query_row(&sql, params_vec.as_slice(), |row| row.get(0))?;
        Ok(count)
    }

    // ========== Metrics support ==========

    /// Memory states whose last review falls inside the window. `None` start
    /// means all reviewed cards.
    pub fn reviewed_states(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> StorageResult<Vec<MemoryState>> {
        let conn = self.get_connection()?;
        let mut sql = String::from("SELECT * FROM memory_state WHERE last_review_at IS NOT NULL");
        let since_str = since.map(format_datetime);
        let mut params_vec: Vec<&dyn ToSql> = Vec::new();
        if let Some(ref since_str) = since_str {
            sql.push_str(" AND last_review_at >= ?");
            params_vec.push(since_str);
        }

        let mut stmt = conn.prepare(&sql)?;
        let states: Vec<MemoryState> = stmt
            .query_map(params_vec.as_slice(), MemoryState::from_row)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(states)
    }

    fn get_connection(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StorageError::LockError(e.to_string()))
    }
}

/// An explicitly empty deck set selects nothing, not "all decks".
fn deck_filter_is_empty(decks: Option<&[String]>) -> bool {
    matches!(decks, Some(d) if d.is_empty())
}

fn deck_in_clause(count: usize) -> String {
    let placeholders = vec!["?"; count].join(", ");
    format!(" AND c.deck_id IN ({placeholders})")
}
