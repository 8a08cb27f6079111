// ── Mnemo Engine: Graph Store ──────────────────────────────────────────────
// Entities and directed weighted relationships, scoped like slots.
//
// Invariants enforced here:
//   - (source_id, target_id, relation_type) is unique; a second create
//     upserts weight and properties in place
//   - both endpoints must exist in the same scope at create time
//   - deleting an entity removes every incident edge in one transaction
//
// Traversal keeps explicit visited sets; edges reference entities by id so
// the naturally cyclic graph never forms in-process ownership cycles.

use crate::atoms::error::{MemoryError, MemoryResult};
use crate::atoms::memory_types::{Direction, Entity, GraphTraversal, Relationship};
use crate::engine::scope::ScopeKey;
use crate::engine::store::{now_ts, MemoryStore};
use log::debug;
use rusqlite::{params, OptionalExtension, Row};
use serde_json::Value;
use std::collections::{HashSet, VecDeque};

const ENTITY_COLUMNS: &str =
    "id, user_id, agent_id, name, entity_type, properties, created_at, updated_at";
const REL_COLUMNS: &str =
    "id, user_id, agent_id, source_id, target_id, relation_type, weight, properties, created_at";

fn entity_from_row(row: &Row) -> rusqlite::Result<Entity> {
    let props: String = row.get(5)?;
    Ok(Entity {
        id: row.get(0)?,
        user_id: row.get(1)?,
        agent_id: row.get(2)?,
        name: row.get(3)?,
        entity_type: row.get(4)?,
        properties: serde_json::from_str(&props).unwrap_or(Value::Null),
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn rel_from_row(row: &Row) -> rusqlite::Result<Relationship> {
    let props: String = row.get(7)?;
    Ok(Relationship {
        id: row.get(0)?,
        user_id: row.get(1)?,
        agent_id: row.get(2)?,
        source_id: row.get(3)?,
        target_id: row.get(4)?,
        relation_type: row.get(5)?,
        weight: row.get::<_, f64>(6)? as f32,
        properties: serde_json::from_str(&props).unwrap_or(Value::Null),
        created_at: row.get(8)?,
    })
}

impl MemoryStore {
    // ── Entities ───────────────────────────────────────────────────────

    pub fn create_entity(
        &self,
        scope: &ScopeKey,
        name: &str,
        entity_type: &str,
        properties: Value,
    ) -> MemoryResult<Entity> {
        if name.trim().is_empty() {
            return Err(MemoryError::validation("entity name must not be empty"));
        }
        let id = uuid::Uuid::new_v4().to_string();
        let now = now_ts();
        let props_json = serde_json::to_string(&properties)?;
        {
            let conn = self.conn.lock();
            conn.execute(
                "INSERT INTO graph_entities
                 (id, user_id, agent_id, name, entity_type, properties, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                params![id, scope.user, scope.agent, name, entity_type, props_json, now],
            )?;
        }
        debug!("[graph] entity {} ({}) created", name, &id[..8]);
        self.get_entity(scope, &id)?
            .ok_or_else(|| MemoryError::Other("entity vanished after insert".into()))
    }

    pub fn get_entity(&self, scope: &ScopeKey, id: &str) -> MemoryResult<Option<Entity>> {
        let conn = self.conn.lock();
        let entity = conn
            .query_row(
                &format!(
                    "SELECT {ENTITY_COLUMNS} FROM graph_entities
                     WHERE id = ?1 AND user_id = ?2 AND agent_id = ?3"
                ),
                params![id, scope.user, scope.agent],
                entity_from_row,
            )
            .optional()?;
        Ok(entity)
    }

    /// `entity_type` is an equality match, `name_contains` a substring match.
    pub fn list_entities(
        &self,
        scope: &ScopeKey,
        entity_type: Option<&str>,
        name_contains: Option<&str>,
        limit: usize,
    ) -> MemoryResult<Vec<Entity>> {
        let conn = self.conn.lock();
        let name_like = name_contains.map(|n| format!("%{}%", n));
        let mut stmt = conn.prepare(&format!(
            "SELECT {ENTITY_COLUMNS} FROM graph_entities
             WHERE user_id = ?1 AND agent_id = ?2
               AND (?3 IS NULL OR entity_type = ?3)
               AND (?4 IS NULL OR name LIKE ?4)
             ORDER BY updated_at DESC
             LIMIT ?5"
        ))?;
        let entities = stmt
            .query_map(
                params![scope.user, scope.agent, entity_type, name_like, limit as i64],
                entity_from_row,
            )?
            .filter_map(|r| r.ok())
            .collect();
        Ok(entities)
    }

    /// Update name/type/properties of an existing entity. Returns the
    /// refreshed row, or None when the entity is not in this scope.
    pub fn update_entity(
        &self,
        scope: &ScopeKey,
        id: &str,
        name: Option<&str>,
        entity_type: Option<&str>,
        properties: Option<Value>,
    ) -> MemoryResult<Option<Entity>> {
        let props_json = match properties {
            Some(p) => Some(serde_json::to_string(&p)?),
            None => None,
        };
        let updated = {
            let conn = self.conn.lock();
            conn.execute(
                "UPDATE graph_entities
                 SET name = COALESCE(?4, name),
                     entity_type = COALESCE(?5, entity_type),
                     properties = COALESCE(?6, properties),
                     updated_at = ?7
                 WHERE id = ?1 AND user_id = ?2 AND agent_id = ?3",
                params![id, scope.user, scope.agent, name, entity_type, props_json, now_ts()],
            )?
        };
        if updated == 0 {
            return Ok(None);
        }
        self.get_entity(scope, id)
    }

    /// Delete an entity and every edge incident on it, in one transaction.
    /// Returns true iff the entity row was removed.
    pub fn delete_entity(&self, scope: &ScopeKey, id: &str) -> MemoryResult<bool> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM graph_relationships
             WHERE user_id = ?2 AND agent_id = ?3 AND (source_id = ?1 OR target_id = ?1)",
            params![id, scope.user, scope.agent],
        )?;
        let removed = tx.execute(
            "DELETE FROM graph_entities WHERE id = ?1 AND user_id = ?2 AND agent_id = ?3",
            params![id, scope.user, scope.agent],
        )?;
        tx.commit()?;
        Ok(removed > 0)
    }

    // ── Relationships ──────────────────────────────────────────────────

    /// Upsert on the unique (source, target, relation_type) triple. A
    /// second create with the same triple updates weight and properties
    /// in place and keeps the original edge id.
    pub fn create_relationship(
        &self,
        scope: &ScopeKey,
        source_id: &str,
        target_id: &str,
        relation_type: &str,
        weight: f32,
        properties: Value,
    ) -> MemoryResult<Relationship> {
        if relation_type.trim().is_empty() {
            return Err(MemoryError::validation("relation_type must not be empty"));
        }
        if self.get_entity(scope, source_id)?.is_none() {
            return Err(MemoryError::NotFound(format!("source entity {}", source_id)));
        }
        if self.get_entity(scope, target_id)?.is_none() {
            return Err(MemoryError::NotFound(format!("target entity {}", target_id)));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let props_json = serde_json::to_string(&properties)?;
        let weight = weight.clamp(0.0, 1.0) as f64;
        {
            let conn = self.conn.lock();
            conn.execute(
                "INSERT INTO graph_relationships
                 (id, user_id, agent_id, source_id, target_id, relation_type,
                  weight, properties, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(source_id, target_id, relation_type)
                 DO UPDATE SET weight = excluded.weight, properties = excluded.properties",
                params![
                    id,
                    scope.user,
                    scope.agent,
                    source_id,
                    target_id,
                    relation_type,
                    weight,
                    props_json,
                    now_ts(),
                ],
            )?;
        }
        self.get_relationship_by_triple(scope, source_id, target_id, relation_type)?
            .ok_or_else(|| MemoryError::Other("relationship vanished after upsert".into()))
    }

    pub fn get_relationship(
        &self,
        scope: &ScopeKey,
        id: &str,
    ) -> MemoryResult<Option<Relationship>> {
        let conn = self.conn.lock();
        let rel = conn
            .query_row(
                &format!(
                    "SELECT {REL_COLUMNS} FROM graph_relationships
                     WHERE id = ?1 AND user_id = ?2 AND agent_id = ?3"
                ),
                params![id, scope.user, scope.agent],
                rel_from_row,
            )
            .optional()?;
        Ok(rel)
    }

    pub fn get_relationship_by_triple(
        &self,
        scope: &ScopeKey,
        source_id: &str,
        target_id: &str,
        relation_type: &str,
    ) -> MemoryResult<Option<Relationship>> {
        let conn = self.conn.lock();
        let rel = conn
            .query_row(
                &format!(
                    "SELECT {REL_COLUMNS} FROM graph_relationships
                     WHERE source_id = ?1 AND target_id = ?2 AND relation_type = ?3
                       AND user_id = ?4 AND agent_id = ?5"
                ),
                params![source_id, target_id, relation_type, scope.user, scope.agent],
                rel_from_row,
            )
            .optional()?;
        Ok(rel)
    }

    /// Edges incident on an entity, ordered by weight descending.
    pub fn get_relationships(
        &self,
        scope: &ScopeKey,
        entity_id: &str,
        direction: Direction,
    ) -> MemoryResult<Vec<Relationship>> {
        let clause = match direction {
            Direction::Outgoing => "source_id = ?3",
            Direction::Incoming => "target_id = ?3",
            Direction::Both => "(source_id = ?3 OR target_id = ?3)",
        };
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {REL_COLUMNS} FROM graph_relationships
             WHERE user_id = ?1 AND agent_id = ?2 AND {clause}
             ORDER BY weight DESC"
        ))?;
        let rels = stmt
            .query_map(params![scope.user, scope.agent, entity_id], rel_from_row)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rels)
    }

    pub fn delete_relationship(&self, scope: &ScopeKey, id: &str) -> MemoryResult<bool> {
        let conn = self.conn.lock();
        let removed = conn.execute(
            "DELETE FROM graph_relationships
             WHERE id = ?1 AND user_id = ?2 AND agent_id = ?3",
            params![id, scope.user, scope.agent],
        )?;
        Ok(removed > 0)
    }

    pub fn delete_relationship_by_triple(
        &self,
        scope: &ScopeKey,
        source_id: &str,
        target_id: &str,
        relation_type: &str,
    ) -> MemoryResult<bool> {
        let conn = self.conn.lock();
        let removed = conn.execute(
            "DELETE FROM graph_relationships
             WHERE source_id = ?1 AND target_id = ?2 AND relation_type = ?3
               AND user_id = ?4 AND agent_id = ?5",
            params![source_id, target_id, relation_type, scope.user, scope.agent],
        )?;
        Ok(removed > 0)
    }

    // ── Traversal ──────────────────────────────────────────────────────

    /// Bounded BFS from `start`, both directions, optionally restricted to
    /// one relation type. Returns unique entities and edges in visit
    /// order. A missing start entity yields empty sets.
    pub fn traverse_graph(
        &self,
        scope: &ScopeKey,
        start: &str,
        max_depth: u32,
        relation_type: Option<&str>,
    ) -> MemoryResult<GraphTraversal> {
        let mut result = GraphTraversal::default();
        let Some(root) = self.get_entity(scope, start)? else {
            return Ok(result);
        };

        let mut visited: HashSet<String> = HashSet::new();
        let mut seen_edges: HashSet<String> = HashSet::new();
        let mut frontier: VecDeque<String> = VecDeque::new();

        visited.insert(root.id.clone());
        result.entities.push(root);
        frontier.push_back(start.to_string());

        let mut depth = 0;
        while depth < max_depth && !frontier.is_empty() {
            let mut next: VecDeque<String> = VecDeque::new();
            while let Some(current) = frontier.pop_front() {
                let edges = self.get_relationships(scope, &current, Direction::Both)?;
                for edge in edges {
                    if let Some(rt) = relation_type {
                        if edge.relation_type != rt {
                            continue;
                        }
                    }
                    let other = if edge.source_id == current {
                        edge.target_id.clone()
                    } else {
                        edge.source_id.clone()
                    };
                    if seen_edges.insert(edge.id.clone()) {
                        result.relationships.push(edge);
                    }
                    if visited.insert(other.clone()) {
                        if let Some(entity) = self.get_entity(scope, &other)? {
                            result.entities.push(entity);
                            next.push_back(other);
                        }
                    }
                }
            }
            frontier = next;
            depth += 1;
        }

        Ok(result)
    }
}
