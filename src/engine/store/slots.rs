// ── Mnemo Engine: Slot Store ───────────────────────────────────────────────
// Versioned structured key-value state scoped to (user, agent).
//
// Invariants enforced here:
//   - one live row per (user, agent, key); upserts bump version by exactly 1
//   - every read path first drops rows whose expires_at is in the past
//   - keys beginning with '_' are engine bookkeeping and never appear in
//     the current-state snapshot

use crate::atoms::constants::{CUSTOM_CATEGORY, INTERNAL_KEY_PREFIX, KNOWN_CATEGORIES};
use crate::atoms::error::{MemoryError, MemoryResult};
use crate::atoms::memory_types::{Slot, SlotFilter, SlotSource, SlotWrite};
use crate::engine::scope::ScopeKey;
use crate::engine::store::{now_ts, MemoryStore};
use log::{debug, info};
use rusqlite::{params, OptionalExtension, Row};
use serde_json::Value;
use std::collections::BTreeMap;

/// Derive a category from the first dot-segment of a key.
pub fn infer_category(key: &str) -> String {
    let head = key.split('.').next().unwrap_or("");
    if KNOWN_CATEGORIES.contains(&head) {
        head.to_string()
    } else {
        CUSTOM_CATEGORY.to_string()
    }
}

const SLOT_COLUMNS: &str =
    "id, user_id, agent_id, key, category, value, source, confidence, version, \
     created_at, updated_at, expires_at";

fn slot_from_row(row: &Row) -> rusqlite::Result<Slot> {
    let value_json: String = row.get(5)?;
    let source_str: String = row.get(6)?;
    Ok(Slot {
        id: row.get(0)?,
        user_id: row.get(1)?,
        agent_id: row.get(2)?,
        key: row.get(3)?,
        category: row.get(4)?,
        value: serde_json::from_str(&value_json).unwrap_or(Value::Null),
        source: SlotSource::parse(&source_str).unwrap_or(SlotSource::Manual),
        confidence: row.get::<_, f64>(7)? as f32,
        version: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
        expires_at: row.get(11)?,
    })
}

impl MemoryStore {
    /// Upsert a slot. Replaces value/category/source/confidence/expires_at
    /// on an existing row and bumps its version; inserts with version 1
    /// otherwise. Atomic per key: the whole read-modify-write runs inside
    /// one transaction under the store mutex.
    pub fn set_slot(&self, scope: &ScopeKey, write: SlotWrite) -> MemoryResult<Slot> {
        if write.key.trim().is_empty() {
            return Err(MemoryError::validation("slot key must not be empty"));
        }
        let category = write
            .category
            .clone()
            .unwrap_or_else(|| infer_category(&write.key));
        let source = write.source.unwrap_or(SlotSource::Manual);
        let confidence = write.confidence.unwrap_or(1.0).clamp(0.0, 1.0) as f64;
        let value_json = serde_json::to_string(&write.value)?;
        let now = now_ts();

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let existing: Option<i64> = tx
            .query_row(
                "SELECT version FROM memory_slots
                 WHERE user_id = ?1 AND agent_id = ?2 AND key = ?3",
                params![scope.user, scope.agent, write.key],
                |r| r.get(0),
            )
            .optional()?;

        match existing {
            Some(version) => {
                tx.execute(
                    "UPDATE memory_slots
                     SET value = ?4, category = ?5, source = ?6, confidence = ?7,
                         expires_at = ?8, version = ?9, updated_at = ?10
                     WHERE user_id = ?1 AND agent_id = ?2 AND key = ?3",
                    params![
                        scope.user,
                        scope.agent,
                        write.key,
                        value_json,
                        category,
                        source.as_str(),
                        confidence,
                        write.expires_at,
                        version + 1,
                        now,
                    ],
                )?;
            }
            None => {
                tx.execute(
                    "INSERT INTO memory_slots
                     (user_id, agent_id, key, category, value, source, confidence,
                      version, created_at, updated_at, expires_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8, ?8, ?9)",
                    params![
                        scope.user,
                        scope.agent,
                        write.key,
                        category,
                        value_json,
                        source.as_str(),
                        confidence,
                        now,
                        write.expires_at,
                    ],
                )?;
            }
        }

        let slot = tx.query_row(
            &format!(
                "SELECT {SLOT_COLUMNS} FROM memory_slots
                 WHERE user_id = ?1 AND agent_id = ?2 AND key = ?3"
            ),
            params![scope.user, scope.agent, write.key],
            slot_from_row,
        )?;
        tx.commit()?;

        debug!(
            "[slots] set {}:{} {} v{}",
            scope.user, scope.agent, slot.key, slot.version
        );
        Ok(slot)
    }

    /// Remove all rows in this scope whose expiry has passed. Runs before
    /// every read so expired slots are never observable.
    pub fn clean_expired_slots(&self, scope: &ScopeKey) -> MemoryResult<usize> {
        let conn = self.conn.lock();
        let removed = conn.execute(
            "DELETE FROM memory_slots
             WHERE user_id = ?1 AND agent_id = ?2
               AND expires_at IS NOT NULL AND expires_at < ?3",
            params![scope.user, scope.agent, now_ts()],
        )?;
        if removed > 0 {
            info!("[slots] Expired {} slots in {}:{}", removed, scope.user, scope.agent);
        }
        Ok(removed)
    }

    pub fn get_slot(&self, scope: &ScopeKey, key: &str) -> MemoryResult<Option<Slot>> {
        self.clean_expired_slots(scope)?;
        let conn = self.conn.lock();
        let slot = conn
            .query_row(
                &format!(
                    "SELECT {SLOT_COLUMNS} FROM memory_slots
                     WHERE user_id = ?1 AND agent_id = ?2 AND key = ?3"
                ),
                params![scope.user, scope.agent, key],
                slot_from_row,
            )
            .optional()?;
        Ok(slot)
    }

    /// Slots of one category, ordered by key.
    pub fn get_slots_by_category(
        &self,
        scope: &ScopeKey,
        category: &str,
    ) -> MemoryResult<Vec<Slot>> {
        self.clean_expired_slots(scope)?;
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SLOT_COLUMNS} FROM memory_slots
             WHERE user_id = ?1 AND agent_id = ?2 AND category = ?3
             ORDER BY key ASC"
        ))?;
        let slots = stmt
            .query_map(params![scope.user, scope.agent, category], slot_from_row)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(slots)
    }

    /// All slots in the scope, ordered by category then key.
    pub fn get_all_slots(&self, scope: &ScopeKey) -> MemoryResult<Vec<Slot>> {
        self.clean_expired_slots(scope)?;
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SLOT_COLUMNS} FROM memory_slots
             WHERE user_id = ?1 AND agent_id = ?2
             ORDER BY category ASC, key ASC"
        ))?;
        let slots = stmt
            .query_map(params![scope.user, scope.agent], slot_from_row)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(slots)
    }

    /// Filtered listing. `prefix` is a `key LIKE 'prefix%'` match.
    pub fn list_slots(&self, scope: &ScopeKey, filter: &SlotFilter) -> MemoryResult<Vec<Slot>> {
        self.clean_expired_slots(scope)?;
        let conn = self.conn.lock();
        let like = filter.prefix.as_ref().map(|p| format!("{}%", p));
        let rows = match (&filter.category, &like) {
            (Some(cat), Some(like)) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {SLOT_COLUMNS} FROM memory_slots
                     WHERE user_id = ?1 AND agent_id = ?2 AND category = ?3 AND key LIKE ?4
                     ORDER BY category ASC, key ASC"
                ))?;
                let result: Vec<Slot> = stmt
                    .query_map(params![scope.user, scope.agent, cat, like], slot_from_row)?
                    .filter_map(|r| r.ok())
                    .collect();
                result
            }
            (Some(cat), None) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {SLOT_COLUMNS} FROM memory_slots
                     WHERE user_id = ?1 AND agent_id = ?2 AND category = ?3
                     ORDER BY category ASC, key ASC"
                ))?;
                let result: Vec<Slot> = stmt
                    .query_map(params![scope.user, scope.agent, cat], slot_from_row)?
                    .filter_map(|r| r.ok())
                    .collect();
                result
            }
            (None, Some(like)) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {SLOT_COLUMNS} FROM memory_slots
                     WHERE user_id = ?1 AND agent_id = ?2 AND key LIKE ?3
                     ORDER BY category ASC, key ASC"
                ))?;
                let result: Vec<Slot> = stmt
                    .query_map(params![scope.user, scope.agent, like], slot_from_row)?
                    .filter_map(|r| r.ok())
                    .collect();
                result
            }
            (None, None) => {
                drop(conn);
                return self.get_all_slots(scope);
            }
        };
        Ok(rows)
    }

    /// Two-level snapshot `category → key → value`, skipping internal keys.
    pub fn get_current_state(
        &self,
        scope: &ScopeKey,
    ) -> MemoryResult<BTreeMap<String, BTreeMap<String, Value>>> {
        let slots = self.get_all_slots(scope)?;
        let mut state: BTreeMap<String, BTreeMap<String, Value>> = BTreeMap::new();
        for slot in slots {
            if slot.key.starts_with(INTERNAL_KEY_PREFIX) {
                continue;
            }
            state
                .entry(slot.category)
                .or_default()
                .insert(slot.key, slot.value);
        }
        Ok(state)
    }

    /// Returns true if a row was removed.
    pub fn delete_slot(&self, scope: &ScopeKey, key: &str) -> MemoryResult<bool> {
        let conn = self.conn.lock();
        let removed = conn.execute(
            "DELETE FROM memory_slots WHERE user_id = ?1 AND agent_id = ?2 AND key = ?3",
            params![scope.user, scope.agent, key],
        )?;
        Ok(removed > 0)
    }

    pub fn count_slots(&self, scope: &ScopeKey) -> MemoryResult<i64> {
        let conn = self.conn.lock();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM memory_slots WHERE user_id = ?1 AND agent_id = ?2",
            params![scope.user, scope.agent],
            |r| r.get(0),
        )?;
        Ok(count)
    }

    /// Enforce the per-scope slot cap. Oldest-updated `custom` slots go
    /// first; named categories are never pruned automatically.
    pub fn prune_slots(&self, scope: &ScopeKey, max_slots: usize) -> MemoryResult<usize> {
        let count = self.count_slots(scope)?;
        let excess = (count as i64) - (max_slots as i64);
        if excess <= 0 {
            return Ok(0);
        }
        let conn = self.conn.lock();
        let pruned = conn.execute(
            "DELETE FROM memory_slots WHERE id IN (
                SELECT id FROM memory_slots
                WHERE user_id = ?1 AND agent_id = ?2 AND category = ?3
                ORDER BY updated_at ASC
                LIMIT ?4
             )",
            params![scope.user, scope.agent, CUSTOM_CATEGORY, excess],
        )?;
        if pruned > 0 {
            info!(
                "[slots] Pruned {} custom slots in {}:{} (cap {})",
                pruned, scope.user, scope.agent, max_slots
            );
        }
        Ok(pruned)
    }
}
