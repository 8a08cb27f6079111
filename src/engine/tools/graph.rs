// ── Mnemo Engine: Graph Tools ──────────────────────────────────────────────
// memory_graph_entity_get / memory_graph_entity_set / memory_graph_rel_add
// memory_graph_rel_remove / memory_graph_search

use crate::atoms::constants::{GRAPH_SEARCH_MAX_DEPTH, GRAPH_SEARCH_MIN_DEPTH};
use crate::atoms::error::{MemoryError, MemoryResult};
use crate::atoms::types::ToolOutput;
use crate::engine::scope::ScopeKey;
use crate::engine::state::MemoryEngine;
use crate::engine::tools::{optional_str, required_str};
use log::info;
use serde_json::{json, Value};

const ENTITY_LIST_LIMIT: usize = 20;

fn scope_for(agent_id: &str) -> ScopeKey {
    ScopeKey::from_session("", agent_id)
}

pub fn entity_get(engine: &MemoryEngine, args: &Value, agent_id: &str) -> MemoryResult<ToolOutput> {
    let scope = scope_for(agent_id);

    if let Some(id) = optional_str(args, "id") {
        return match engine.store.get_entity(&scope, id)? {
            Some(entity) => Ok(ToolOutput::ok(
                format!("{} ({})", entity.name, entity.entity_type),
                serde_json::to_value(&entity)?,
            )),
            None => Ok(ToolOutput::ok(
                format!("No entity with id {}.", id),
                json!({ "entity": null }),
            )),
        };
    }

    let entities = engine.store.list_entities(
        &scope,
        optional_str(args, "type"),
        optional_str(args, "name"),
        ENTITY_LIST_LIMIT,
    )?;
    let text = if entities.is_empty() {
        "No entities match.".to_string()
    } else {
        format!(
            "{} entities: {}",
            entities.len(),
            entities
                .iter()
                .map(|e| e.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )
    };
    Ok(ToolOutput::ok(text, json!({ "entities": entities })))
}

pub fn entity_set(engine: &MemoryEngine, args: &Value, agent_id: &str) -> MemoryResult<ToolOutput> {
    let name = required_str(args, "name")?;
    let entity_type = required_str(args, "type")?;
    let properties = args.get("properties").cloned().unwrap_or(json!({}));
    let scope = scope_for(agent_id);

    if let Some(id) = optional_str(args, "id") {
        let updated = engine
            .store
            .update_entity(&scope, id, Some(name), Some(entity_type), Some(properties))?
            .ok_or_else(|| MemoryError::NotFound(format!("entity {}", id)))?;
        info!("[tools] entity {} updated", id);
        return Ok(ToolOutput::ok(
            format!("Entity {} updated.", updated.name),
            serde_json::to_value(&updated)?,
        ));
    }

    let entity = engine.store.create_entity(&scope, name, entity_type, properties)?;
    info!("[tools] entity {} ({}) created", entity.name, &entity.id[..8]);
    Ok(ToolOutput::ok(
        format!("Entity {} created (id: {}).", entity.name, entity.id),
        serde_json::to_value(&entity)?,
    ))
}

pub fn rel_add(engine: &MemoryEngine, args: &Value, agent_id: &str) -> MemoryResult<ToolOutput> {
    let source_id = required_str(args, "source_id")?;
    let target_id = required_str(args, "target_id")?;
    let relation_type = required_str(args, "relation_type")?;
    let weight = args["weight"].as_f64().unwrap_or(1.0) as f32;
    let properties = args.get("properties").cloned().unwrap_or(json!({}));

    let scope = scope_for(agent_id);
    let rel = engine.store.create_relationship(
        &scope,
        source_id,
        target_id,
        relation_type,
        weight,
        properties,
    )?;
    Ok(ToolOutput::ok(
        format!(
            "Relationship {} -[{}]-> {} (weight {:.2}).",
            source_id, relation_type, target_id, rel.weight
        ),
        serde_json::to_value(&rel)?,
    ))
}

pub fn rel_remove(engine: &MemoryEngine, args: &Value, agent_id: &str) -> MemoryResult<ToolOutput> {
    let scope = scope_for(agent_id);

    let removed = if let Some(id) = optional_str(args, "id") {
        engine.store.delete_relationship(&scope, id)?
    } else {
        let source_id = required_str(args, "source_id")?;
        let target_id = required_str(args, "target_id")?;
        let relation_type = required_str(args, "relation_type")?;
        engine
            .store
            .delete_relationship_by_triple(&scope, source_id, target_id, relation_type)?
    };

    let text = if removed {
        "Relationship removed.".to_string()
    } else {
        "Relationship did not exist.".to_string()
    };
    Ok(ToolOutput::ok(text, json!({ "removed": removed })))
}

pub fn graph_search(
    engine: &MemoryEngine,
    args: &Value,
    agent_id: &str,
) -> MemoryResult<ToolOutput> {
    let entity_id = required_str(args, "entity_id")?;
    let depth = (args["depth"].as_u64().unwrap_or(2) as u32)
        .clamp(GRAPH_SEARCH_MIN_DEPTH, GRAPH_SEARCH_MAX_DEPTH);
    let relation_type = optional_str(args, "relation_type");

    let scope = scope_for(agent_id);
    let traversal = engine
        .store
        .traverse_graph(&scope, entity_id, depth, relation_type)?;

    if traversal.entities.is_empty() {
        return Ok(ToolOutput::ok(
            format!("No entity with id {}.", entity_id),
            json!({ "entities": [], "relationships": [] }),
        ));
    }

    let mut lines = vec![format!(
        "Found {} entities and {} relationships within depth {}:",
        traversal.entities.len(),
        traversal.relationships.len(),
        depth
    )];
    for entity in &traversal.entities {
        lines.push(format!("- {} ({})", entity.name, entity.entity_type));
    }
    for rel in &traversal.relationships {
        lines.push(format!(
            "  {} -[{}]-> {} (w {:.2})",
            rel.source_id, rel.relation_type, rel.target_id, rel.weight
        ));
    }

    Ok(ToolOutput::ok(
        lines.join("\n"),
        serde_json::to_value(&traversal)?,
    ))
}
