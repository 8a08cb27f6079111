// ── Mnemo Engine: Slot Tools ───────────────────────────────────────────────
// memory_slot_get / memory_slot_set / memory_slot_list / memory_slot_delete

use crate::atoms::error::{MemoryError, MemoryResult};
use crate::atoms::memory_types::{SharingTier, SlotFilter, SlotSource, SlotWrite};
use crate::atoms::types::ToolOutput;
use crate::engine::scope::ScopeKey;
use crate::engine::state::MemoryEngine;
use crate::engine::tools::{optional_str, required_str};
use log::info;
use serde_json::{json, Value};

/// Resolve the `scope` argument into the tiers to read, in merge order.
fn read_tiers(args: &Value) -> MemoryResult<Vec<SharingTier>> {
    match optional_str(args, "scope") {
        None | Some("all") => Ok(vec![SharingTier::Private, SharingTier::Team, SharingTier::Public]),
        Some(s) => SharingTier::parse(s)
            .map(|t| vec![t])
            .ok_or_else(|| MemoryError::validation(format!("unknown scope '{}'", s))),
    }
}

/// Resolve the `scope` argument into a single write tier (default private).
fn write_tier(args: &Value) -> MemoryResult<SharingTier> {
    match optional_str(args, "scope") {
        None => Ok(SharingTier::Private),
        Some("all") => Err(MemoryError::validation("scope 'all' is read-only")),
        Some(s) => SharingTier::parse(s)
            .ok_or_else(|| MemoryError::validation(format!("unknown scope '{}'", s))),
    }
}

pub fn slot_get(engine: &MemoryEngine, args: &Value, agent_id: &str) -> MemoryResult<ToolOutput> {
    let base = ScopeKey::from_session("", agent_id);
    let tiers = read_tiers(args)?;

    if let Some(key) = optional_str(args, "key") {
        let mut matches = Vec::new();
        for tier in &tiers {
            if let Some(slot) = engine.store.get_slot(&base.tier(*tier), key)? {
                matches.push(json!({ "scope": tier.as_str(), "slot": slot }));
            }
        }
        let text = match matches.len() {
            0 => format!("No slot '{}' found.", key),
            1 => format!(
                "{} = {} ({}, v{})",
                key,
                matches[0]["slot"]["value"],
                matches[0]["scope"].as_str().unwrap_or(""),
                matches[0]["slot"]["version"],
            ),
            n => format!("Slot '{}' found in {} scopes.", key, n),
        };
        return Ok(ToolOutput::ok(text, json!({ "matches": matches })));
    }

    let mut groups = serde_json::Map::new();
    let mut total = 0usize;
    for tier in &tiers {
        let scope = base.tier(*tier);
        let slots = match optional_str(args, "category") {
            Some(cat) => engine.store.get_slots_by_category(&scope, cat)?,
            None => engine.store.get_all_slots(&scope)?,
        };
        total += slots.len();
        groups.insert(tier.as_str().to_string(), serde_json::to_value(slots)?);
    }
    Ok(ToolOutput::ok(
        format!("{} slots across {} scopes.", total, tiers.len()),
        json!({ "scopes": groups }),
    ))
}

pub fn slot_set(engine: &MemoryEngine, args: &Value, agent_id: &str) -> MemoryResult<ToolOutput> {
    let key = required_str(args, "key")?;
    if args.get("value").is_none() || args["value"].is_null() {
        return Err(MemoryError::validation("missing required argument 'value'"));
    }
    let tier = write_tier(args)?;
    let source = optional_str(args, "source")
        .and_then(SlotSource::parse)
        .unwrap_or(SlotSource::Tool);

    let scope = ScopeKey::from_session("", agent_id).tier(tier);
    let write = SlotWrite {
        key: key.to_string(),
        value: args["value"].clone(),
        category: optional_str(args, "category").map(|s| s.to_string()),
        source: Some(source),
        confidence: None,
        expires_at: None,
    };
    let slot = engine.set_slot_capped(&scope, write)?;
    info!(
        "[tools] slot_set {} v{} ({} scope)",
        slot.key,
        slot.version,
        tier.as_str()
    );
    Ok(ToolOutput::ok(
        format!(
            "Slot {} set (v{}, category {}, {} scope).",
            slot.key,
            slot.version,
            slot.category,
            tier.as_str()
        ),
        serde_json::to_value(&slot)?,
    ))
}

pub fn slot_list(engine: &MemoryEngine, args: &Value, agent_id: &str) -> MemoryResult<ToolOutput> {
    let base = ScopeKey::from_session("", agent_id);
    let tiers = read_tiers(args)?;
    let filter = SlotFilter {
        category: optional_str(args, "category").map(|s| s.to_string()),
        prefix: optional_str(args, "prefix").map(|s| s.to_string()),
    };

    let mut groups = serde_json::Map::new();
    let mut lines = Vec::new();
    for tier in &tiers {
        let slots = engine.store.list_slots(&base.tier(*tier), &filter)?;
        if !slots.is_empty() {
            lines.push(format!("{}: {} slots", tier.as_str(), slots.len()));
        }
        groups.insert(tier.as_str().to_string(), serde_json::to_value(slots)?);
    }

    let stats = engine.store.stats()?;
    let text = if lines.is_empty() {
        "No slots match.".to_string()
    } else {
        lines.join(", ")
    };
    Ok(ToolOutput::ok(
        text,
        json!({ "scopes": groups, "store": stats }),
    ))
}

pub fn slot_delete(engine: &MemoryEngine, args: &Value, agent_id: &str) -> MemoryResult<ToolOutput> {
    let key = required_str(args, "key")?;
    let scope = ScopeKey::from_session("", agent_id);
    let removed = engine.store.delete_slot(&scope, key)?;
    let text = if removed {
        format!("Slot {} deleted.", key)
    } else {
        format!("Slot {} did not exist.", key)
    };
    Ok(ToolOutput::ok(text, json!({ "removed": removed })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::types::MemoryEngineConfig;

    fn engine() -> MemoryEngine {
        MemoryEngine::for_tests(MemoryEngineConfig::default())
    }

    #[test]
    fn set_then_get_reports_version() {
        let engine = engine();
        let out = slot_set(
            &engine,
            &json!({ "key": "profile.name", "value": "Ana" }),
            "assistant",
        )
        .unwrap();
        assert!(!out.is_error);
        assert!(out.text.contains("v1"));

        let out = slot_set(
            &engine,
            &json!({ "key": "profile.name", "value": "Ana B" }),
            "assistant",
        )
        .unwrap();
        assert!(out.text.contains("v2"));

        let out = slot_get(&engine, &json!({ "key": "profile.name" }), "assistant").unwrap();
        assert_eq!(out.details["matches"][0]["scope"], "private");
        assert_eq!(out.details["matches"][0]["slot"]["version"], 2);
    }

    #[test]
    fn team_scope_visible_from_all_read() {
        let engine = engine();
        slot_set(
            &engine,
            &json!({ "key": "project.status", "value": "green", "scope": "team" }),
            "assistant",
        )
        .unwrap();

        // Team slots are visible to a different agent reading scope=all.
        let out = slot_get(&engine, &json!({ "key": "project.status" }), "scrum").unwrap();
        assert_eq!(out.details["matches"][0]["scope"], "team");

        // But not when it restricts itself to private.
        let out = slot_get(
            &engine,
            &json!({ "key": "project.status", "scope": "private" }),
            "scrum",
        )
        .unwrap();
        assert_eq!(out.details["matches"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn list_groups_by_scope_and_includes_stats() {
        let engine = engine();
        slot_set(&engine, &json!({ "key": "project.a", "value": 1 }), "assistant").unwrap();
        slot_set(
            &engine,
            &json!({ "key": "project.b", "value": 2, "scope": "public" }),
            "assistant",
        )
        .unwrap();

        let out = slot_list(&engine, &json!({ "prefix": "project." }), "assistant").unwrap();
        assert_eq!(out.details["scopes"]["private"].as_array().unwrap().len(), 1);
        assert_eq!(out.details["scopes"]["public"].as_array().unwrap().len(), 1);
        assert_eq!(out.details["store"]["slots"], 2);
    }

    #[test]
    fn delete_reports_boolean() {
        let engine = engine();
        slot_set(&engine, &json!({ "key": "temp.x", "value": 1 }), "assistant").unwrap();
        let out = slot_delete(&engine, &json!({ "key": "temp.x" }), "assistant").unwrap();
        assert_eq!(out.details["removed"], true);
        let out = slot_delete(&engine, &json!({ "key": "temp.x" }), "assistant").unwrap();
        assert_eq!(out.details["removed"], false);
    }

    #[test]
    fn writes_to_all_scope_rejected() {
        let engine = engine();
        let err = slot_set(
            &engine,
            &json!({ "key": "a.b", "value": 1, "scope": "all" }),
            "assistant",
        )
        .unwrap_err();
        assert_eq!(err.kind().as_str(), "validation");
    }

    #[test]
    fn missing_value_rejected() {
        let engine = engine();
        let err = slot_set(&engine, &json!({ "key": "a.b" }), "assistant").unwrap_err();
        assert_eq!(err.kind().as_str(), "validation");
    }
}
