// ── Mnemo Engine: Auto-Recall Injector ─────────────────────────────────────
// Assembles the context block injected into the agent's next prompt:
//
//   <memory-context>
//     <current-state>      three-tier slot merge, freshest value wins
//     <knowledge-graph>    up to ten private entities, two edges each
//     <recent-updates>     five most recently updated slots, any tier
//     <semantic-memories>  k-NN hits for the latest user message
//   </memory-context>
//
// The merge reads each scope independently; freshness (updated_at) decides
// every (category, key) collision, never scope priority. Any failure in
// the semantic section leaves it silently empty — recall must never cost
// the agent its turn.

use crate::atoms::constants::{
    CONTEXT_BLOCK_CLOSE, CONTEXT_BLOCK_OPEN, INTERNAL_KEY_PREFIX, RENDER_VALUE_MAX_CHARS,
    SYSTEM_SECTION_CLOSE,
};
use crate::atoms::error::MemoryResult;
use crate::atoms::memory_types::{Direction, Slot};
use crate::atoms::types::AgentStartEvent;
use crate::engine::context_window::extract_message_text;
use crate::engine::noise::NoiseFilter;
use crate::engine::scope::ScopeKey;
use crate::engine::state::MemoryEngine;
use crate::engine::vector::must_filter_with_any;
use log::debug;
use serde_json::Value;
use std::collections::BTreeMap;

/// Entities listed in the graph summary.
const GRAPH_SUMMARY_ENTITIES: usize = 10;
/// Entities whose outgoing edges are expanded.
const GRAPH_SUMMARY_EDGE_ENTITIES: usize = 5;
/// Outgoing edges listed per expanded entity.
const GRAPH_SUMMARY_EDGES_EACH: usize = 2;
/// Slots in the recent-updates section.
const RECENT_UPDATES_LIMIT: usize = 5;

/// Build the full context block for a turn, or None when every section
/// came up empty.
pub async fn build_context_block(
    engine: &MemoryEngine,
    event: &AgentStartEvent,
) -> MemoryResult<Option<String>> {
    let scope = ScopeKey::from_session(&event.session_id, &event.agent_id);
    let tiers = scope.all_tiers();

    let current_state = render_current_state(engine, &tiers)?;
    let graph = render_graph_summary(engine, &scope)?;
    let recent = render_recent_updates(engine, &tiers)?;
    let semantic = render_semantic_memories(engine, &scope, event).await;

    // Assemble in priority order under the injection token budget. A
    // section that would overflow is dropped whole; later (lower-priority)
    // sections may still fit.
    let budget = engine.config.inject_budget_tokens;
    let mut used_tokens = 0usize;
    let mut sections: Vec<String> = Vec::new();
    for (tag, body) in [
        ("current-state", current_state),
        ("knowledge-graph", graph),
        ("recent-updates", recent),
        ("semantic-memories", semantic),
    ] {
        if body.is_empty() {
            continue;
        }
        let rendered = format!("<{tag}>\n{body}\n</{tag}>");
        let cost = rendered.len().div_ceil(4);
        if used_tokens + cost > budget {
            debug!(
                "[recall] Dropping <{}> section (~{} tokens over {} budget)",
                tag, cost, budget
            );
            continue;
        }
        used_tokens += cost;
        sections.push(rendered);
    }

    if sections.is_empty() {
        return Ok(None);
    }

    Ok(Some(format!(
        "{}\n{}\n{}",
        CONTEXT_BLOCK_OPEN,
        sections.join("\n"),
        CONTEXT_BLOCK_CLOSE
    )))
}

/// Splice the block into an existing system prompt: immediately after a
/// closing `</system>` tag when present, otherwise prepended.
pub fn inject(system_prompt: Option<&str>, block: &str) -> String {
    match system_prompt {
        Some(prompt) => {
            if let Some(pos) = prompt.find(SYSTEM_SECTION_CLOSE) {
                let insert_at = pos + SYSTEM_SECTION_CLOSE.len();
                format!(
                    "{}\n{}\n{}",
                    &prompt[..insert_at],
                    block,
                    prompt[insert_at..].trim_start_matches('\n')
                )
            } else {
                format!("{}\n\n{}", block, prompt)
            }
        }
        None => block.to_string(),
    }
}

// ── Current state (three-tier freshness merge) ─────────────────────────────

/// Freshest value per (category, key) across the given scopes, in query
/// order private → team → public. The winner is decided purely by
/// updated_at; readers tolerate a value from one scope being newer than a
/// not-yet-read value in another.
fn merged_state(
    engine: &MemoryEngine,
    tiers: &[ScopeKey],
) -> MemoryResult<BTreeMap<(String, String), Slot>> {
    let mut merged: BTreeMap<(String, String), Slot> = BTreeMap::new();
    for tier in tiers {
        for slot in engine.store.get_all_slots(tier)? {
            if slot.key.starts_with(INTERNAL_KEY_PREFIX) {
                continue;
            }
            let entry_key = (slot.category.clone(), slot.key.clone());
            match merged.get(&entry_key) {
                Some(existing) if existing.updated_at >= slot.updated_at => {}
                _ => {
                    merged.insert(entry_key, slot);
                }
            }
        }
    }
    Ok(merged)
}

fn render_current_state(engine: &MemoryEngine, tiers: &[ScopeKey]) -> MemoryResult<String> {
    let merged = merged_state(engine, tiers)?;
    if merged.is_empty() {
        return Ok(String::new());
    }

    let mut by_category: BTreeMap<String, Vec<&Slot>> = BTreeMap::new();
    for ((category, _), slot) in &merged {
        by_category.entry(category.clone()).or_default().push(slot);
    }

    let mut lines = Vec::new();
    for (category, slots) in by_category {
        lines.push(format!("[{}]", category));
        for slot in slots {
            lines.push(format!("  {}: {}", slot.key, render_value(&slot.value)));
        }
    }
    Ok(lines.join("\n"))
}

// ── Graph summary ──────────────────────────────────────────────────────────

fn render_graph_summary(engine: &MemoryEngine, scope: &ScopeKey) -> MemoryResult<String> {
    let entities = engine
        .store
        .list_entities(scope, None, None, GRAPH_SUMMARY_ENTITIES)?;
    if entities.is_empty() {
        return Ok(String::new());
    }

    let mut lines = Vec::new();
    for (i, entity) in entities.iter().enumerate() {
        let mut line = format!("{} ({})", entity.name, entity.entity_type);
        if i < GRAPH_SUMMARY_EDGE_ENTITIES {
            let edges = engine
                .store
                .get_relationships(scope, &entity.id, Direction::Outgoing)?;
            let rendered: Vec<String> = edges
                .iter()
                .take(GRAPH_SUMMARY_EDGES_EACH)
                .filter_map(|edge| {
                    engine
                        .store
                        .get_entity(scope, &edge.target_id)
                        .ok()
                        .flatten()
                        .map(|target| format!("{} -> {}", edge.relation_type, target.name))
                })
                .collect();
            if !rendered.is_empty() {
                line.push_str(&format!(": {}", rendered.join(", ")));
            }
        }
        lines.push(line);
    }
    Ok(lines.join("\n"))
}

// ── Recent updates ─────────────────────────────────────────────────────────

fn render_recent_updates(engine: &MemoryEngine, tiers: &[ScopeKey]) -> MemoryResult<String> {
    let mut all: Vec<Slot> = Vec::new();
    for tier in tiers {
        all.extend(engine.store.get_all_slots(tier)?);
    }
    all.retain(|s| !s.key.starts_with(INTERNAL_KEY_PREFIX));
    all.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    all.truncate(RECENT_UPDATES_LIMIT);

    if all.is_empty() {
        return Ok(String::new());
    }
    let lines: Vec<String> = all
        .iter()
        .map(|s| format!("{} = {} ({})", s.key, render_value(&s.value), s.updated_at))
        .collect();
    Ok(lines.join("\n"))
}

// ── Semantic memories ──────────────────────────────────────────────────────

async fn render_semantic_memories(
    engine: &MemoryEngine,
    scope: &ScopeKey,
    event: &AgentStartEvent,
) -> String {
    let query = event
        .messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map(|m| extract_message_text(&m.content))
        .unwrap_or_default();
    if query.trim().is_empty() {
        return String::new();
    }

    let filter = NoiseFilter::new(&event.agent_id);
    let vector = engine.embedder.embed(&query).await;
    let search_filter = must_filter_with_any(
        &[("userId", scope.user.as_str())],
        "namespace",
        filter.namespaces(),
    );

    let hits = match engine
        .vector
        .search(&vector, engine.config.recall_limit, Some(search_filter))
        .await
    {
        Ok(hits) => hits,
        Err(e) => {
            debug!("[recall] Semantic search unavailable: {}", e);
            return String::new();
        }
    };

    let lines: Vec<String> = hits
        .iter()
        .filter(|h| h.score >= engine.config.min_recall_score)
        .map(|h| format!("- {} (score {:.2})", truncate(h.text(), RENDER_VALUE_MAX_CHARS), h.score))
        .collect();
    lines.join("\n")
}

// ── Rendering helpers ──────────────────────────────────────────────────────

fn render_value(value: &Value) -> String {
    let text = match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string(other).unwrap_or_default(),
    };
    truncate(&text, RENDER_VALUE_MAX_CHARS)
}

/// Char-boundary-safe truncation with an ellipsis.
fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}…", cut)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::memory_types::SlotWrite;
    use crate::atoms::types::MemoryEngineConfig;
    use serde_json::json;

    fn section<'a>(block: &'a str, tag: &str) -> &'a str {
        let open = format!("<{}>", tag);
        let close = format!("</{}>", tag);
        let start = block.find(&open).map(|p| p + open.len()).unwrap_or(0);
        let end = block.find(&close).unwrap_or(block.len());
        &block[start..end]
    }

    fn engine() -> MemoryEngine {
        MemoryEngine::for_tests(MemoryEngineConfig::default())
    }

    fn start_event(agent: &str) -> AgentStartEvent {
        AgentStartEvent {
            session_id: "sess".into(),
            agent_id: agent.into(),
            messages: vec![],
            system_prompt: None,
        }
    }

    fn backdate(engine: &MemoryEngine, user: &str, agent: &str, key: &str, ts: &str) {
        let conn = engine.store.conn.lock();
        conn.execute(
            "UPDATE memory_slots SET updated_at = ?4
             WHERE user_id = ?1 AND agent_id = ?2 AND key = ?3",
            rusqlite::params![user, agent, key, ts],
        )
        .unwrap();
    }

    #[tokio::test]
    async fn empty_store_yields_no_block() {
        let block = build_context_block(&engine(), &start_event("assistant")).await.unwrap();
        assert!(block.is_none());
    }

    #[tokio::test]
    async fn freshest_scope_wins_merge() {
        let engine = engine();
        let private = ScopeKey::new("default", "assistant");
        let team = private.tier(crate::atoms::memory_types::SharingTier::Team);

        engine
            .store
            .set_slot(&private, SlotWrite::new("project.status", json!("private-old")))
            .unwrap();
        engine
            .store
            .set_slot(&team, SlotWrite::new("project.status", json!("team-new")))
            .unwrap();
        backdate(&engine, "default", "assistant", "project.status", "2000-01-01T00:00:00Z");

        let block = build_context_block(&engine, &start_event("assistant"))
            .await
            .unwrap()
            .unwrap();
        let state = section(&block, "current-state");
        assert!(state.contains("team-new"));
        assert!(!state.contains("private-old"));
    }

    #[tokio::test]
    async fn older_other_tier_does_not_shadow_private() {
        let engine = engine();
        let private = ScopeKey::new("default", "assistant");
        let public = private.tier(crate::atoms::memory_types::SharingTier::Public);

        engine
            .store
            .set_slot(&public, SlotWrite::new("profile.name", json!("public-old")))
            .unwrap();
        backdate(&engine, "__public__", "__public__", "profile.name", "2000-01-01T00:00:00Z");
        engine
            .store
            .set_slot(&private, SlotWrite::new("profile.name", json!("private-new")))
            .unwrap();

        let block = build_context_block(&engine, &start_event("assistant"))
            .await
            .unwrap()
            .unwrap();
        let state = section(&block, "current-state");
        assert!(state.contains("private-new"));
        assert!(!state.contains("public-old"));
    }

    #[tokio::test]
    async fn internal_keys_never_rendered() {
        let engine = engine();
        let scope = ScopeKey::new("default", "assistant");
        engine
            .store
            .set_slot(&scope, SlotWrite::new("_meta.cursor", json!("secret")))
            .unwrap();
        engine
            .store
            .set_slot(&scope, SlotWrite::new("profile.name", json!("Ana")))
            .unwrap();

        let block = build_context_block(&engine, &start_event("assistant"))
            .await
            .unwrap()
            .unwrap();
        assert!(!block.contains("_meta.cursor"));
        assert!(!block.contains("secret"));
    }

    #[tokio::test]
    async fn graph_summary_lists_entities_and_edges() {
        let engine = engine();
        let scope = ScopeKey::new("default", "assistant");
        let a = engine.store.create_entity(&scope, "Ana", "person", json!({})).unwrap();
        let b = engine.store.create_entity(&scope, "Mnemo", "project", json!({})).unwrap();
        engine
            .store
            .create_relationship(&scope, &a.id, &b.id, "works_on", 1.0, json!({}))
            .unwrap();

        let block = build_context_block(&engine, &start_event("assistant"))
            .await
            .unwrap()
            .unwrap();
        assert!(block.contains("<knowledge-graph>"));
        assert!(block.contains("Ana (person)"));
        assert!(block.contains("works_on -> Mnemo"));
    }

    #[tokio::test]
    async fn recent_updates_capped_at_five() {
        let engine = engine();
        let scope = ScopeKey::new("default", "assistant");
        for i in 0..8 {
            engine
                .store
                .set_slot(&scope, SlotWrite::new(format!("custom.k{}", i), json!(i)))
                .unwrap();
        }
        let block = build_context_block(&engine, &start_event("assistant"))
            .await
            .unwrap()
            .unwrap();
        let recent = section(&block, "recent-updates");
        assert_eq!(recent.trim().lines().count(), 5);
    }

    #[test]
    fn long_values_truncated_with_ellipsis() {
        let long = "x".repeat(250);
        let rendered = render_value(&json!(long));
        assert!(rendered.chars().count() <= RENDER_VALUE_MAX_CHARS + 1);
        assert!(rendered.ends_with('…'));
    }

    #[test]
    fn truncate_respects_multibyte_boundaries() {
        let text = "đẹp ".repeat(60);
        let out = truncate(&text, 100);
        assert!(out.ends_with('…'));
        assert_eq!(out.chars().count(), 101);
    }

    #[tokio::test]
    async fn tiny_budget_drops_sections() {
        let config = MemoryEngineConfig {
            inject_budget_tokens: 30,
            ..Default::default()
        };
        let engine = MemoryEngine::for_tests(config);
        let scope = ScopeKey::new("default", "assistant");
        for i in 0..20 {
            engine
                .store
                .set_slot(
                    &scope,
                    SlotWrite::new(
                        format!("custom.key_number_{}", i),
                        json!(format!("a reasonably long value string {}", i)),
                    ),
                )
                .unwrap();
        }

        // Every section overflows a 30-token budget, so nothing is injected.
        let block = build_context_block(&engine, &start_event("assistant")).await.unwrap();
        assert!(block.is_none());
    }

    #[test]
    fn inject_splices_after_system_close() {
        let prompt = "<system>base rules</system>\nMore instructions.";
        let out = inject(Some(prompt), "<memory-context>\nx\n</memory-context>");
        let sys_end = out.find("</system>").unwrap();
        let block_pos = out.find("<memory-context>").unwrap();
        assert!(block_pos > sys_end);
        assert!(out.contains("More instructions."));
    }

    #[test]
    fn inject_prepends_without_system_tag() {
        let out = inject(Some("plain prompt"), "BLOCK");
        assert!(out.starts_with("BLOCK"));
        assert!(out.ends_with("plain prompt"));
        assert_eq!(inject(None, "BLOCK"), "BLOCK");
    }

    #[tokio::test]
    async fn block_is_wrapped_in_markers() {
        let engine = engine();
        let scope = ScopeKey::new("default", "assistant");
        engine
            .store
            .set_slot(&scope, SlotWrite::new("profile.name", json!("Ana")))
            .unwrap();
        let block = build_context_block(&engine, &start_event("assistant"))
            .await
            .unwrap()
            .unwrap();
        assert!(block.starts_with(CONTEXT_BLOCK_OPEN));
        assert!(block.ends_with(CONTEXT_BLOCK_CLOSE));
    }
}
