// ── Mnemo Engine: Memory Tools ─────────────────────────────────────────────
// memory_search / memory_store / memory_auto_capture
//
// The result strings of memory_store double as the capture pipeline's
// self-trigger markers ("Memory stored" / "Memory updated"), which is what
// keeps a tool result from being re-captured next turn.

use crate::atoms::constants::{ALL_NAMESPACES, MEMORY_SEARCH_MAX_LIMIT, MEMORY_STORE_MAX_CHARS};
use crate::atoms::error::{MemoryError, MemoryResult};
use crate::atoms::memory_types::{MemoryPoint, SourceType};
use crate::atoms::types::{AgentEndEvent, IncomingMessage, ToolOutput};
use crate::engine::capture::{self, CaptureOutcome};
use crate::engine::dedupe::{find_duplicate, DUPLICATE_SCORE_THRESHOLD};
use crate::engine::http::truncate_utf8;
use crate::engine::noise::NoiseFilter;
use crate::engine::scope::ScopeKey;
use crate::engine::state::MemoryEngine;
use crate::engine::store::now_ts;
use crate::engine::tools::{optional_str, required_str};
use crate::engine::vector::{match_condition, must_filter_with_any, VectorRecord};
use log::info;
use serde_json::{json, Value};

fn validate_namespace(ns: &str) -> MemoryResult<()> {
    if ALL_NAMESPACES.contains(&ns) {
        Ok(())
    } else {
        Err(MemoryError::validation(format!(
            "unknown namespace '{}' (expected one of: {})",
            ns,
            ALL_NAMESPACES.join(", ")
        )))
    }
}

pub async fn search(
    engine: &MemoryEngine,
    args: &Value,
    agent_id: &str,
) -> MemoryResult<ToolOutput> {
    let query = required_str(args, "query")?;
    let limit = (args["limit"].as_u64().unwrap_or(5) as usize).clamp(1, MEMORY_SEARCH_MAX_LIMIT);
    let min_score = args["minScore"].as_f64().unwrap_or(0.7) as f32;

    let scope = ScopeKey::from_session("", agent_id);
    let filter_agent = NoiseFilter::new(agent_id);

    let user_id = optional_str(args, "userId").unwrap_or(scope.user.as_str());
    let mut pairs: Vec<(&str, &str)> = vec![("userId", user_id)];
    if let Some(session) = optional_str(args, "sessionId") {
        pairs.push(("sessionId", session));
    }
    if let Some(source_agent) = optional_str(args, "sourceAgent") {
        pairs.push(("source_agent", source_agent));
    }

    // One explicit namespace beats the agent's default OR-list.
    let filter = if let Some(ns) = optional_str(args, "namespace") {
        validate_namespace(ns)?;
        let mut conditions: Vec<Value> =
            pairs.iter().map(|(k, v)| match_condition(k, v)).collect();
        conditions.push(match_condition("namespace", ns));
        json!({ "must": conditions })
    } else {
        must_filter_with_any(&pairs, "namespace", filter_agent.namespaces())
    };

    let vector = engine.embedder.embed(query).await;
    let hits = engine.vector.search(&vector, limit, Some(filter)).await?;
    let kept: Vec<_> = hits.into_iter().filter(|h| h.score >= min_score).collect();

    if kept.is_empty() {
        return Ok(ToolOutput::ok(
            "No relevant memories found.",
            json!({ "results": [] }),
        ));
    }

    let mut text = format!("Found {} relevant memories:\n", kept.len());
    for (i, hit) in kept.iter().enumerate() {
        text.push_str(&format!(
            "{}. [{}] {} (score {:.2})\n",
            i + 1,
            hit.namespace(),
            hit.text(),
            hit.score
        ));
    }
    Ok(ToolOutput::ok(text.trim_end(), json!({ "results": kept })))
}

pub async fn store(
    engine: &MemoryEngine,
    args: &Value,
    session_id: &str,
    agent_id: &str,
) -> MemoryResult<ToolOutput> {
    let text = required_str(args, "text")?;
    if text.chars().count() > MEMORY_STORE_MAX_CHARS {
        return Err(MemoryError::validation(format!(
            "text exceeds {} characters",
            MEMORY_STORE_MAX_CHARS
        )));
    }

    let scope = ScopeKey::from_session(session_id, agent_id);
    let filter_agent = NoiseFilter::new(agent_id);
    let namespace = match optional_str(args, "namespace") {
        Some(ns) => {
            validate_namespace(ns)?;
            ns
        }
        None => filter_agent.namespaces()[0],
    };
    let user_id = optional_str(args, "userId").unwrap_or(scope.user.as_str());

    let vector = engine.embedder.embed(text).await;
    let neighbours = engine
        .vector
        .search(
            &vector,
            5,
            Some(json!({
                "must": [
                    match_condition("namespace", namespace),
                    match_condition("userId", user_id),
                ]
            })),
        )
        .await?;

    let duplicate = find_duplicate(&neighbours, DUPLICATE_SCORE_THRESHOLD).map(|d| d.id.clone());
    let updated = duplicate.is_some();
    let id = duplicate.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let now = now_ts();

    let point = MemoryPoint {
        text: text.to_string(),
        namespace: namespace.to_string(),
        source_agent: agent_id.to_string(),
        source_type: SourceType::ToolCall,
        user_id: user_id.to_string(),
        timestamp: now.clone(),
        updated_at: now,
        session_id: optional_str(args, "sessionId")
            .map(|s| s.to_string())
            .or_else(|| Some(session_id.to_string())),
        confidence: None,
        tags: Vec::new(),
        metadata: args.get("metadata").cloned().unwrap_or(Value::Null),
    };

    engine
        .vector
        .upsert(&[VectorRecord { id: id.clone(), vector, payload: point.to_payload() }])
        .await?;

    let short = truncate_utf8(&id, 8);
    info!("[tools] memory_store → {} ({})", short, namespace);
    let text = if updated {
        format!("Memory updated (id: {}).", short)
    } else {
        format!("Memory stored (id: {}).", short)
    };
    Ok(ToolOutput::ok(
        text,
        json!({ "id": id, "namespace": namespace, "updated": updated }),
    ))
}

pub async fn auto_capture(
    engine: &MemoryEngine,
    args: &Value,
    session_id: &str,
    agent_id: &str,
) -> MemoryResult<ToolOutput> {
    let text = required_str(args, "text")?;
    let use_llm = args["use_llm"].as_bool().unwrap_or(true);

    if !use_llm {
        // Direct storage path: no extraction, just dedup + persist.
        let stored = store(
            engine,
            &json!({ "text": text, "sessionId": session_id }),
            session_id,
            agent_id,
        )
        .await?;
        return Ok(ToolOutput::ok(
            format!("[AutoCapture] {}", stored.text),
            stored.details,
        ));
    }

    let event = AgentEndEvent {
        session_id: session_id.to_string(),
        agent_id: agent_id.to_string(),
        messages: vec![IncomingMessage::text("user", text)],
    };
    let outcome = capture::run(engine, &event).await?;

    let (text, details) = match outcome {
        CaptureOutcome::Captured {
            slots_updated,
            slots_removed,
            memories_stored,
            memories_deduped,
        } => (
            format!(
                "[AutoCapture] {} slot updates, {} removals, {} memories stored ({} duplicates).",
                slots_updated, slots_removed, memories_stored, memories_deduped
            ),
            json!({
                "slots_updated": slots_updated,
                "slots_removed": slots_removed,
                "memories_stored": memories_stored,
                "memories_deduped": memories_deduped,
            }),
        ),
        CaptureOutcome::Busy => (
            "[AutoCapture] A capture run is already in flight; this one was dropped.".to_string(),
            json!({ "outcome": "busy" }),
        ),
        other => (
            format!("[AutoCapture] Nothing captured ({:?}).", other),
            json!({ "outcome": format!("{:?}", other) }),
        ),
    };
    Ok(ToolOutput::ok(text, details))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::types::MemoryEngineConfig;

    fn engine() -> MemoryEngine {
        MemoryEngine::for_tests(MemoryEngineConfig::default())
    }

    #[tokio::test]
    async fn store_rejects_oversized_text() {
        let engine = engine();
        let long = "x".repeat(MEMORY_STORE_MAX_CHARS + 1);
        let err = store(&engine, &json!({ "text": long }), "s", "assistant")
            .await
            .unwrap_err();
        assert_eq!(err.kind().as_str(), "validation");
    }

    #[tokio::test]
    async fn store_rejects_unknown_namespace() {
        let engine = engine();
        let err = store(
            &engine,
            &json!({ "text": "fact", "namespace": "nope" }),
            "s",
            "assistant",
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind().as_str(), "validation");
    }

    #[tokio::test]
    async fn search_requires_query() {
        let engine = engine();
        let err = search(&engine, &json!({}), "assistant").await.unwrap_err();
        assert_eq!(err.kind().as_str(), "validation");
    }

    #[tokio::test]
    async fn auto_capture_busy_is_reported_in_band() {
        let engine = engine();
        let _held = engine.try_begin_capture().unwrap();
        let out = auto_capture(
            &engine,
            &json!({ "text": "the user lives in Hanoi" }),
            "s",
            "assistant",
        )
        .await
        .unwrap();
        assert!(!out.is_error);
        assert_eq!(out.details["outcome"], "busy");
    }
}
