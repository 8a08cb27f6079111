// ── Mnemo Engine: Local Store ──────────────────────────────────────────────
// Single SQLite database holding the structured side of the memory system:
// slots and the entity/relationship graph. Opened once per process; the
// connection lives behind a mutex and is the only writer in this process.
//
// Schema rules:
//   - All statements are idempotent (CREATE IF NOT EXISTS).
//   - WAL journaling for concurrent reads, foreign keys enforced so the
//     edge table cascades when an entity row is deleted.
//   - Timestamps are "%Y-%m-%dT%H:%M:%SZ" strings (text comparison works).

pub mod graph;
pub mod slots;

use crate::atoms::error::MemoryResult;
use log::info;
use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::{Path, PathBuf};

/// Thread-safe database wrapper.
pub struct MemoryStore {
    pub(crate) conn: Mutex<Connection>,
}

/// Resolve the store file path under the configured state directory.
fn store_db_path(state_dir: Option<&Path>) -> PathBuf {
    let dir = state_dir.map(|p| p.to_path_buf()).unwrap_or_else(|| {
        dirs::home_dir().unwrap_or_default().join(".mnemo")
    });
    std::fs::create_dir_all(&dir).ok();
    dir.join("memory.db")
}

impl MemoryStore {
    /// Open (or create) the store and run migrations.
    pub fn open(state_dir: Option<&Path>) -> MemoryResult<Self> {
        let path = store_db_path(state_dir);
        info!("[store] Opening memory store at {:?}", path);
        let conn = Connection::open(&path)?;
        Self::init(conn)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> MemoryResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> MemoryResult<Self> {
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(MemoryStore { conn: Mutex::new(conn) })
    }

    /// Row counts across all tables, logged at startup and surfaced by the
    /// slot-list tool's detail record.
    pub fn stats(&self) -> MemoryResult<StoreStats> {
        let conn = self.conn.lock();
        let slots: i64 = conn.query_row("SELECT COUNT(*) FROM memory_slots", [], |r| r.get(0))?;
        let entities: i64 =
            conn.query_row("SELECT COUNT(*) FROM graph_entities", [], |r| r.get(0))?;
        let relationships: i64 =
            conn.query_row("SELECT COUNT(*) FROM graph_relationships", [], |r| r.get(0))?;
        Ok(StoreStats { slots, entities, relationships })
    }
}

/// Summary counts for the local store.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct StoreStats {
    pub slots: i64,
    pub entities: i64,
    pub relationships: i64,
}

/// Current UTC timestamp in the store's canonical format.
pub(crate) fn now_ts() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS memory_slots (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id TEXT NOT NULL,
        agent_id TEXT NOT NULL,
        key TEXT NOT NULL,
        category TEXT NOT NULL DEFAULT 'custom',
        value TEXT NOT NULL,
        source TEXT NOT NULL DEFAULT 'manual',
        confidence REAL NOT NULL DEFAULT 1.0,
        version INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        expires_at TEXT,
        UNIQUE(user_id, agent_id, key)
    );

    CREATE INDEX IF NOT EXISTS idx_slots_scope
        ON memory_slots(user_id, agent_id);
    CREATE INDEX IF NOT EXISTS idx_slots_category
        ON memory_slots(user_id, agent_id, category);
    CREATE INDEX IF NOT EXISTS idx_slots_updated
        ON memory_slots(updated_at);

    CREATE TABLE IF NOT EXISTS graph_entities (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        agent_id TEXT NOT NULL,
        name TEXT NOT NULL,
        entity_type TEXT NOT NULL,
        properties TEXT NOT NULL DEFAULT '{}',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_entities_scope
        ON graph_entities(user_id, agent_id);
    CREATE INDEX IF NOT EXISTS idx_entities_type
        ON graph_entities(entity_type);
    CREATE INDEX IF NOT EXISTS idx_entities_name
        ON graph_entities(name);

    CREATE TABLE IF NOT EXISTS graph_relationships (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        agent_id TEXT NOT NULL,
        source_id TEXT NOT NULL REFERENCES graph_entities(id) ON DELETE CASCADE,
        target_id TEXT NOT NULL REFERENCES graph_entities(id) ON DELETE CASCADE,
        relation_type TEXT NOT NULL,
        weight REAL NOT NULL DEFAULT 1.0,
        properties TEXT NOT NULL DEFAULT '{}',
        created_at TEXT NOT NULL,
        UNIQUE(source_id, target_id, relation_type)
    );

    CREATE INDEX IF NOT EXISTS idx_rel_source
        ON graph_relationships(source_id);
    CREATE INDEX IF NOT EXISTS idx_rel_target
        ON graph_relationships(target_id);
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_in_memory_runs_migrations() {
        let store = MemoryStore::open_in_memory().unwrap();
        let stats = store.stats().unwrap();
        assert_eq!(stats.slots, 0);
        assert_eq!(stats.entities, 0);
        assert_eq!(stats.relationships, 0);
    }

    #[test]
    fn now_ts_is_sortable_format() {
        let ts = now_ts();
        assert_eq!(ts.len(), 20);
        assert!(ts.ends_with('Z'));
        assert_eq!(&ts[4..5], "-");
    }
}
