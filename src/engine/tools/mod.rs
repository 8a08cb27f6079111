// ── Mnemo Engine: Tool Surface ─────────────────────────────────────────────
// The twelve memory tools exposed to the agent runtime. Definitions carry
// JSON-schema parameters; execution dispatches to the per-domain modules
// and reports failures in-band via ToolOutput::is_error.

pub mod graph;
pub mod memory;
pub mod slots;

use crate::atoms::error::{MemoryError, MemoryResult};
use crate::atoms::types::{FunctionDefinition, ToolDefinition, ToolOutput};
use crate::engine::state::MemoryEngine;
use log::info;
use serde_json::{json, Value};

fn tool(name: &str, description: &str, parameters: Value) -> ToolDefinition {
    ToolDefinition {
        tool_type: "function".into(),
        function: FunctionDefinition {
            name: name.into(),
            description: description.into(),
            parameters,
        },
    }
}

pub fn definitions() -> Vec<ToolDefinition> {
    vec![
        tool(
            "memory_slot_get",
            "Read structured memory slots. Look up a single slot by key, list a category, or dump all slots. Slots are versioned facts like profile.name or project.current_task.",
            json!({
                "type": "object",
                "properties": {
                    "key": { "type": "string", "description": "Dot-notation slot key (e.g. profile.name)" },
                    "category": { "type": "string", "description": "List all slots in this category" },
                    "scope": { "type": "string", "enum": ["private", "team", "public", "all"], "description": "Which sharing tier to read (default: all)" }
                }
            }),
        ),
        tool(
            "memory_slot_set",
            "Create or update a structured memory slot. The value can be any JSON. Re-setting an existing key bumps its version.",
            json!({
                "type": "object",
                "properties": {
                    "key": { "type": "string", "description": "Dot-notation slot key (e.g. project.tech_stack)" },
                    "value": { "description": "Any JSON value" },
                    "category": { "type": "string", "description": "Override the inferred category" },
                    "source": { "type": "string", "enum": ["auto_capture", "manual", "tool"], "description": "Provenance (default: tool)" },
                    "scope": { "type": "string", "enum": ["private", "team", "public"], "description": "Sharing tier to write to (default: private)" }
                },
                "required": ["key", "value"]
            }),
        ),
        tool(
            "memory_slot_list",
            "List memory slots, optionally filtered by category or key prefix, grouped per sharing tier.",
            json!({
                "type": "object",
                "properties": {
                    "category": { "type": "string" },
                    "prefix": { "type": "string", "description": "Key prefix match (e.g. 'project.')" },
                    "scope": { "type": "string", "enum": ["private", "team", "public", "all"] }
                }
            }),
        ),
        tool(
            "memory_slot_delete",
            "Delete a memory slot by key. Returns whether a slot was removed.",
            json!({
                "type": "object",
                "properties": {
                    "key": { "type": "string" }
                },
                "required": ["key"]
            }),
        ),
        tool(
            "memory_graph_entity_get",
            "Read knowledge-graph entities. Look one up by id, or filter by type and/or name substring.",
            json!({
                "type": "object",
                "properties": {
                    "id": { "type": "string" },
                    "type": { "type": "string", "description": "Entity type filter (person, project, technology, concept, ...)" },
                    "name": { "type": "string", "description": "Name substring filter" }
                }
            }),
        ),
        tool(
            "memory_graph_entity_set",
            "Create a knowledge-graph entity, or update one when id is given.",
            json!({
                "type": "object",
                "properties": {
                    "id": { "type": "string", "description": "Existing entity id to update" },
                    "name": { "type": "string" },
                    "type": { "type": "string" },
                    "properties": { "type": "object", "description": "Free-form attributes" }
                },
                "required": ["name", "type"]
            }),
        ),
        tool(
            "memory_graph_rel_add",
            "Create a directed relationship between two entities. Re-adding the same (source, target, type) triple updates its weight and properties.",
            json!({
                "type": "object",
                "properties": {
                    "source_id": { "type": "string" },
                    "target_id": { "type": "string" },
                    "relation_type": { "type": "string", "description": "e.g. works_on, uses, knows" },
                    "weight": { "type": "number", "description": "Edge strength 0.0-1.0 (default 1.0)" },
                    "properties": { "type": "object" }
                },
                "required": ["source_id", "target_id", "relation_type"]
            }),
        ),
        tool(
            "memory_graph_rel_remove",
            "Remove a relationship, either by its id or by the (source_id, target_id, relation_type) triple.",
            json!({
                "type": "object",
                "properties": {
                    "id": { "type": "string" },
                    "source_id": { "type": "string" },
                    "target_id": { "type": "string" },
                    "relation_type": { "type": "string" }
                }
            }),
        ),
        tool(
            "memory_graph_search",
            "Explore the knowledge graph from an entity outward (breadth-first, both directions). Returns the entities and relationships reached.",
            json!({
                "type": "object",
                "properties": {
                    "entity_id": { "type": "string" },
                    "depth": { "type": "integer", "description": "Traversal depth, clamped to 1-3 (default 2)" },
                    "relation_type": { "type": "string", "description": "Only follow edges of this type" }
                },
                "required": ["entity_id"]
            }),
        ),
        tool(
            "memory_search",
            "Semantic search over stored memories. Returns the most relevant memories ranked by similarity.",
            json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string" },
                    "limit": { "type": "integer", "description": "1-20, default 5" },
                    "namespace": { "type": "string", "description": "Restrict to one namespace (default: this agent's namespaces)" },
                    "sessionId": { "type": "string" },
                    "userId": { "type": "string" },
                    "minScore": { "type": "number", "description": "Minimum similarity score (default 0.7)" },
                    "sourceAgent": { "type": "string", "description": "Only memories captured by this agent" }
                },
                "required": ["query"]
            }),
        ),
        tool(
            "memory_store",
            "Store a free-text memory for future semantic recall. Near-duplicates update the existing memory instead of creating a new one.",
            json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string", "description": "The fact to remember (max 10000 chars)" },
                    "namespace": { "type": "string", "description": "Target namespace (default: this agent's)" },
                    "sessionId": { "type": "string" },
                    "userId": { "type": "string" },
                    "metadata": { "type": "object" }
                },
                "required": ["text"]
            }),
        ),
        tool(
            "memory_auto_capture",
            "Run the fact-extraction pipeline over a piece of text: mines slot updates, stale-slot removals, and memories, then persists them.",
            json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" },
                    "use_llm": { "type": "boolean", "description": "Extract with the LLM (default true); false stores the text directly" }
                },
                "required": ["text"]
            }),
        ),
    ]
}

/// Dispatch a tool call. Returns None for unknown names so the host can
/// fall through to its other tool providers.
pub async fn execute(
    engine: &MemoryEngine,
    name: &str,
    args: &Value,
    session_id: &str,
    agent_id: &str,
) -> Option<ToolOutput> {
    let result = match name {
        "memory_slot_get" => slots::slot_get(engine, args, agent_id),
        "memory_slot_set" => slots::slot_set(engine, args, agent_id),
        "memory_slot_list" => slots::slot_list(engine, args, agent_id),
        "memory_slot_delete" => slots::slot_delete(engine, args, agent_id),
        "memory_graph_entity_get" => graph::entity_get(engine, args, agent_id),
        "memory_graph_entity_set" => graph::entity_set(engine, args, agent_id),
        "memory_graph_rel_add" => graph::rel_add(engine, args, agent_id),
        "memory_graph_rel_remove" => graph::rel_remove(engine, args, agent_id),
        "memory_graph_search" => graph::graph_search(engine, args, agent_id),
        "memory_search" => memory::search(engine, args, agent_id).await,
        "memory_store" => memory::store(engine, args, session_id, agent_id).await,
        "memory_auto_capture" => memory::auto_capture(engine, args, session_id, agent_id).await,
        _ => return None,
    };

    Some(result.unwrap_or_else(|e| {
        info!("[tools] {} failed: {}", name, e);
        ToolOutput::error(e.to_string(), e.kind().as_str())
    }))
}

// ── Shared argument helpers ────────────────────────────────────────────────

pub(crate) fn required_str<'a>(args: &'a Value, key: &str) -> MemoryResult<&'a str> {
    args[key]
        .as_str()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| MemoryError::validation(format!("missing required argument '{}'", key)))
}

pub(crate) fn optional_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args[key].as_str().filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::types::MemoryEngineConfig;

    #[test]
    fn twelve_tools_defined_with_unique_names() {
        let defs = definitions();
        assert_eq!(defs.len(), 12);
        let mut names: Vec<&str> = defs.iter().map(|d| d.function.name.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 12);
        assert!(names.contains(&"memory_slot_set"));
        assert!(names.contains(&"memory_graph_search"));
        assert!(names.contains(&"memory_auto_capture"));
    }

    #[tokio::test]
    async fn unknown_tool_returns_none() {
        let engine = MemoryEngine::for_tests(MemoryEngineConfig::default());
        let out = execute(&engine, "memory_unknown", &json!({}), "s", "assistant").await;
        assert!(out.is_none());
    }

    #[tokio::test]
    async fn validation_errors_are_in_band() {
        let engine = MemoryEngine::for_tests(MemoryEngineConfig::default());
        let out = execute(&engine, "memory_slot_delete", &json!({}), "s", "assistant")
            .await
            .unwrap();
        assert!(out.is_error);
        assert_eq!(out.details["kind"], "validation");
    }
}
