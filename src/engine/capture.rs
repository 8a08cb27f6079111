// ── Mnemo Engine: Auto-Capture Pipeline ────────────────────────────────────
// Mines a just-completed turn for facts and persists them: slot removals
// first, then slot updates, then deduplicated vector memories.
//
// Ordering matters: a phase transition arrives as a removal of the stale
// slot plus an update with the new value. Applying removals first means
// the recreated slot starts over at version 1.
//
// The pipeline holds the process-wide capture guard for its whole run and
// refuses to start while another run is in flight (dropped, not queued).
// Its own synthetic messages are recognised by marker strings so a
// captured turn can never re-trigger capture of itself.

use crate::atoms::constants::CAPTURE_MARKERS;
use crate::atoms::error::MemoryResult;
use crate::atoms::memory_types::{
    ExtractedMemory, Extraction, MemoryPoint, SlotSource, SlotWrite, SourceType,
};
use crate::atoms::types::AgentEndEvent;
use crate::engine::context_window::{
    extract_message_text, flatten_conversation, select_messages_within_budget, WindowConfig,
};
use crate::engine::dedupe::{find_duplicate, DUPLICATE_SCORE_THRESHOLD};
use crate::engine::http::truncate_utf8;
use crate::engine::noise::NoiseFilter;
use crate::engine::scope::ScopeKey;
use crate::engine::state::MemoryEngine;
use crate::engine::store::now_ts;
use crate::engine::vector::{must_filter, VectorRecord};
use log::{debug, info, warn};

/// Neighbours fetched per memory for duplicate detection.
const DEDUP_NEIGHBOURS: usize = 5;

/// What a capture run did, for logging and the auto-capture tool summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// Another capture run holds the guard; this one was dropped.
    Busy,
    /// The agent is on the capture blocklist.
    Blocked,
    /// The turn contained the engine's own synthetic markers.
    SelfTriggered,
    /// The turn matched a noise pattern.
    Noise,
    /// Extraction produced nothing to persist.
    Empty,
    Captured {
        slots_updated: usize,
        slots_removed: usize,
        memories_stored: usize,
        memories_deduped: usize,
    },
}

/// Run the capture pipeline for a finished turn.
pub async fn run(engine: &MemoryEngine, event: &AgentEndEvent) -> MemoryResult<CaptureOutcome> {
    // 1. Re-entrancy guard. Cleared on every exit path via Drop.
    let Some(_guard) = engine.try_begin_capture() else {
        debug!("[capture] Already capturing, dropping run for {}", event.session_id);
        return Ok(CaptureOutcome::Busy);
    };

    // 2. Scope + per-agent policy.
    let scope = ScopeKey::from_session(&event.session_id, &event.agent_id);
    let filter = NoiseFilter::new(&event.agent_id);
    if filter.is_blocked() {
        return Ok(CaptureOutcome::Blocked);
    }

    // 3. Self-trigger check against the raw (unfiltered) turn.
    let flattened: Vec<String> = event
        .messages
        .iter()
        .map(|m| extract_message_text(&m.content))
        .collect();
    if flattened
        .iter()
        .any(|text| CAPTURE_MARKERS.iter().any(|marker| text.contains(marker)))
    {
        debug!("[capture] Turn contains capture markers, skipping");
        return Ok(CaptureOutcome::SelfTriggered);
    }

    // 4. Noise check on the concatenated turn.
    let combined = flattened.join("\n");
    if filter.should_skip(&combined) {
        debug!("[capture] Noise filter skipped turn for {}", event.agent_id);
        return Ok(CaptureOutcome::Noise);
    }

    // 5. Token-budgeted window.
    let window = WindowConfig {
        max_conversation_tokens: engine.config.max_conversation_tokens,
        absolute_max_messages: engine.config.absolute_max_messages,
        token_estimate_divisor: engine.config.token_estimate_divisor,
    };
    let selection = select_messages_within_budget(&event.messages, &window);
    if selection.selected.is_empty() {
        return Ok(CaptureOutcome::Empty);
    }
    debug!(
        "[capture] Window: {}/{} messages, ~{} tokens ({:.0}% of budget)",
        selection.stats.selected_messages,
        selection.stats.total_messages,
        selection.stats.estimated_tokens,
        selection.stats.budget_used_percent,
    );

    // 6. Extraction. The extractor swallows its own failures.
    let conversation = flatten_conversation(&selection.selected);
    let current_state = engine.store.get_current_state(&scope)?;
    let current_slots = serde_json::to_value(&current_state)?;
    let extraction = engine.extractor.extract(&conversation, &current_slots).await;
    if extraction.is_empty() {
        return Ok(CaptureOutcome::Empty);
    }

    // 7/8. Removals first, then updates.
    let (slots_updated, slots_removed) = apply_slot_changes(engine, &scope, &extraction);

    // 9. Memories: embed, dedup against neighbours, upsert or insert.
    let mut memories_stored = 0usize;
    let mut memories_deduped = 0usize;
    for memory in &extraction.memories {
        match persist_memory(engine, &scope, &filter, event, memory).await {
            Ok(true) => memories_stored += 1,
            Ok(false) => memories_deduped += 1,
            Err(e) => warn!("[capture] Failed to store memory: {}", e),
        }
    }

    info!(
        "[capture] {}: {} slot updates, {} removals, {} memories ({} deduped)",
        event.agent_id, slots_updated, slots_removed, memories_stored, memories_deduped
    );
    Ok(CaptureOutcome::Captured {
        slots_updated,
        slots_removed,
        memories_stored,
        memories_deduped,
    })
}

/// Apply the extraction's slot changes and return (updated, removed)
/// counts. Removals go first: a removed-then-updated key restarts at
/// version 1 instead of continuing the stale slot's history. One failed
/// write never aborts the rest of the batch.
pub(crate) fn apply_slot_changes(
    engine: &MemoryEngine,
    scope: &ScopeKey,
    extraction: &Extraction,
) -> (usize, usize) {
    let mut slots_removed = 0usize;
    for removal in &extraction.slot_removals {
        match engine.store.delete_slot(scope, &removal.key) {
            Ok(true) => {
                info!("[capture] Removed stale slot {} ({})", removal.key, removal.reason);
                slots_removed += 1;
            }
            Ok(false) => {}
            Err(e) => warn!("[capture] Failed to remove slot {}: {}", removal.key, e),
        }
    }

    let mut slots_updated = 0usize;
    for update in &extraction.slot_updates {
        let write = SlotWrite {
            key: update.key.clone(),
            value: update.value.clone(),
            category: update.category.clone(),
            source: Some(SlotSource::AutoCapture),
            confidence: Some(update.confidence),
            expires_at: None,
        };
        match engine.set_slot_capped(scope, write) {
            Ok(slot) => {
                debug!("[capture] Slot {} → v{}", slot.key, slot.version);
                slots_updated += 1;
            }
            Err(e) => warn!("[capture] Failed to update slot {}: {}", update.key, e),
        }
    }
    (slots_updated, slots_removed)
}

/// Store one extracted memory in the vector store. Returns true on a fresh
/// insert, false when an existing point was refreshed instead.
async fn persist_memory(
    engine: &MemoryEngine,
    scope: &ScopeKey,
    filter: &NoiseFilter,
    event: &AgentEndEvent,
    memory: &ExtractedMemory,
) -> MemoryResult<bool> {
    // Auto-captured memories always land in the agent's target namespace.
    // The extractor proposes a namespace per memory, but routing is the
    // noise filter's decision; only the explicit memory_store tool argument
    // may direct a memory elsewhere.
    let namespace = filter.target_namespace();

    let vector = engine.embedder.embed(&memory.text).await;
    let neighbours = engine
        .vector
        .search(
            &vector,
            DEDUP_NEIGHBOURS,
            Some(must_filter(&[
                ("namespace", namespace),
                ("userId", &scope.user),
            ])),
        )
        .await?;

    let duplicate_id = find_duplicate(&neighbours, DUPLICATE_SCORE_THRESHOLD).map(|d| d.id.clone());
    let now = now_ts();
    let is_update = duplicate_id.is_some();
    let id = duplicate_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let point = MemoryPoint {
        text: memory.text.clone(),
        namespace: namespace.to_string(),
        source_agent: event.agent_id.clone(),
        source_type: SourceType::AutoCapture,
        user_id: scope.user.clone(),
        timestamp: now.clone(),
        updated_at: now,
        session_id: Some(event.session_id.clone()),
        confidence: Some(memory.confidence),
        tags: Vec::new(),
        metadata: serde_json::Value::Null,
    };

    engine
        .vector
        .upsert(&[VectorRecord { id: id.clone(), vector, payload: point.to_payload() }])
        .await?;

    if is_update {
        debug!("[capture] Memory updated in place ({})", truncate_utf8(&id, 8));
    } else {
        debug!("[capture] Memory stored ({})", truncate_utf8(&id, 8));
    }
    Ok(!is_update)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::types::{IncomingMessage, MemoryEngineConfig};

    fn event(agent: &str, texts: &[&str]) -> AgentEndEvent {
        AgentEndEvent {
            session_id: "sess-1".into(),
            agent_id: agent.into(),
            messages: texts.iter().map(|t| IncomingMessage::text("user", *t)).collect(),
        }
    }

    #[tokio::test]
    async fn blocked_agent_is_not_captured() {
        let engine = MemoryEngine::for_tests(MemoryEngineConfig::default());
        let outcome = run(&engine, &event("system", &["substantive content here"]))
            .await
            .unwrap();
        assert_eq!(outcome, CaptureOutcome::Blocked);
    }

    #[tokio::test]
    async fn own_markers_prevent_self_trigger() {
        let engine = MemoryEngine::for_tests(MemoryEngineConfig::default());
        for marker in ["[AutoCapture] summary", "Memory stored (id: ab)", "Memory updated"] {
            let outcome = run(&engine, &event("assistant", &[marker])).await.unwrap();
            assert_eq!(outcome, CaptureOutcome::SelfTriggered, "marker: {}", marker);
        }
    }

    #[tokio::test]
    async fn noise_turn_is_skipped() {
        let engine = MemoryEngine::for_tests(MemoryEngineConfig::default());
        let outcome = run(&engine, &event("assistant", &["thanks!"])).await.unwrap();
        assert_eq!(outcome, CaptureOutcome::Noise);
    }

    #[tokio::test]
    async fn empty_turn_produces_empty_outcome() {
        let engine = MemoryEngine::for_tests(MemoryEngineConfig::default());
        let outcome = run(
            &engine,
            &AgentEndEvent {
                session_id: "s".into(),
                agent_id: "assistant".into(),
                messages: vec![IncomingMessage::text("tool", "tool output only")],
            },
        )
        .await
        .unwrap();
        assert_eq!(outcome, CaptureOutcome::Empty);
    }

    #[tokio::test]
    async fn second_capture_is_dropped() {
        let engine = MemoryEngine::for_tests(MemoryEngineConfig::default());
        let _held = engine.try_begin_capture().unwrap();
        let outcome = run(&engine, &event("assistant", &["real content worth capturing"]))
            .await
            .unwrap();
        assert_eq!(outcome, CaptureOutcome::Busy);
    }

    #[tokio::test]
    async fn phase_transition_recreates_slot_at_v1() {
        use crate::atoms::memory_types::SlotWrite;
        use serde_json::json;

        let engine = MemoryEngine::for_tests(MemoryEngineConfig::default());
        let scope = ScopeKey::new("default", "assistant");

        // Seed the stale epic and age it by 8 days worth of history.
        engine
            .store
            .set_slot(&scope, SlotWrite::new("project.current_epic", json!("Phase 10")))
            .unwrap();
        engine
            .store
            .set_slot(&scope, SlotWrite::new("project.current_epic", json!("Phase 10")))
            .unwrap();
        {
            let conn = engine.store.conn.lock();
            conn.execute(
                "UPDATE memory_slots SET updated_at = '2026-01-01T00:00:00Z'
                 WHERE key = 'project.current_epic'",
                [],
            )
            .unwrap();
        }

        // What the extractor returns for "Phase 10 done, moving to Phase 11".
        let extraction: Extraction = serde_json::from_value(json!({
            "slot_removals": [{ "key": "project.current_epic", "reason": "phase completed" }],
            "slot_updates": [{ "key": "project.current_epic", "value": "Phase 11", "confidence": 0.95 }]
        }))
        .unwrap();

        let (updated, removed) = apply_slot_changes(&engine, &scope, &extraction);
        assert_eq!((updated, removed), (1, 1));

        // One slot, new value, version restarted at 1.
        let slot = engine.store.get_slot(&scope, "project.current_epic").unwrap().unwrap();
        assert_eq!(slot.value, json!("Phase 11"));
        assert_eq!(slot.version, 1);
        assert_eq!(slot.source, SlotSource::AutoCapture);
        assert_eq!(engine.store.count_slots(&scope).unwrap(), 1);
    }

    #[tokio::test]
    async fn removal_of_missing_key_is_noop() {
        use serde_json::json;

        let engine = MemoryEngine::for_tests(MemoryEngineConfig::default());
        let scope = ScopeKey::new("default", "assistant");
        let extraction: Extraction = serde_json::from_value(json!({
            "slot_removals": [{ "key": "project.ghost", "reason": "never existed" }]
        }))
        .unwrap();
        let (updated, removed) = apply_slot_changes(&engine, &scope, &extraction);
        assert_eq!((updated, removed), (0, 0));
    }

    #[tokio::test]
    async fn guard_released_after_run() {
        let engine = MemoryEngine::for_tests(MemoryEngineConfig::default());
        // A noise run exits early; the guard must still be released.
        let _ = run(&engine, &event("assistant", &["ok"])).await.unwrap();
        assert!(engine.try_begin_capture().is_some());
    }
}
