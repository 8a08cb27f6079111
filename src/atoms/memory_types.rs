// ── Mnemo Atoms: Memory Domain Types ───────────────────────────────────────
// Slots, graph entities/relationships, vector points, extraction results.
// Timestamps are stored as "%Y-%m-%dT%H:%M:%SZ" strings, which compare
// correctly as plain text.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Sharing tiers ──────────────────────────────────────────────────────────

/// Selects the storage coordinates a slot/entity is stored under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SharingTier {
    Private,
    Team,
    Public,
}

impl SharingTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            SharingTier::Private => "private",
            SharingTier::Team => "team",
            SharingTier::Public => "public",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "private" => Some(SharingTier::Private),
            "team" => Some(SharingTier::Team),
            "public" => Some(SharingTier::Public),
            _ => None,
        }
    }
}

// ── Slots ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotSource {
    AutoCapture,
    Manual,
    Tool,
}

impl SlotSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotSource::AutoCapture => "auto_capture",
            SlotSource::Manual => "manual",
            SlotSource::Tool => "tool",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "auto_capture" => Some(SlotSource::AutoCapture),
            "manual" => Some(SlotSource::Manual),
            "tool" => Some(SlotSource::Tool),
            _ => None,
        }
    }
}

/// A structured fact, uniquely keyed by `(user, agent, key)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slot {
    pub id: i64,
    pub user_id: String,
    pub agent_id: String,
    pub key: String,
    pub category: String,
    pub value: Value,
    pub source: SlotSource,
    pub confidence: f32,
    pub version: i64,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

/// Input for a slot upsert. Omitted fields fall back to inference
/// (category) or defaults (source = manual, confidence = 1.0).
#[derive(Debug, Clone, Default)]
pub struct SlotWrite {
    pub key: String,
    pub value: Value,
    pub category: Option<String>,
    pub source: Option<SlotSource>,
    pub confidence: Option<f32>,
    pub expires_at: Option<String>,
}

impl SlotWrite {
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        SlotWrite { key: key.into(), value, ..Default::default() }
    }
}

/// Filter for slot listings.
#[derive(Debug, Clone, Default)]
pub struct SlotFilter {
    pub category: Option<String>,
    /// `key LIKE 'prefix%'`
    pub prefix: Option<String>,
}

// ── Graph ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub user_id: String,
    pub agent_id: String,
    pub name: String,
    pub entity_type: String,
    pub properties: Value,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub id: String,
    pub user_id: String,
    pub agent_id: String,
    pub source_id: String,
    pub target_id: String,
    pub relation_type: String,
    pub weight: f32,
    pub properties: Value,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outgoing,
    Incoming,
    Both,
}

/// Result of a bounded BFS: unique entities and edges in visit order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GraphTraversal {
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
}

// ── Vector points ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    AutoCapture,
    Manual,
    ToolCall,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::AutoCapture => "auto_capture",
            SourceType::Manual => "manual",
            SourceType::ToolCall => "tool_call",
        }
    }
}

/// Payload of a memory point in the vector store. Field names follow the
/// remote collection's keyword indices (`userId`, `updatedAt`, …).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryPoint {
    pub text: String,
    pub namespace: String,
    pub source_agent: String,
    pub source_type: SourceType,
    #[serde(rename = "userId")]
    pub user_id: String,
    pub timestamp: String,
    #[serde(rename = "updatedAt")]
    pub updated_at: String,
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub metadata: Value,
}

impl MemoryPoint {
    pub fn to_payload(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// A search hit from the vector store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f32,
    #[serde(default)]
    pub payload: Value,
}

impl ScoredPoint {
    pub fn text(&self) -> &str {
        self.payload["text"].as_str().unwrap_or("")
    }

    pub fn namespace(&self) -> &str {
        self.payload["namespace"].as_str().unwrap_or("")
    }
}

// ── LLM extraction ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct SlotUpdate {
    pub key: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub confidence: f32,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlotRemoval {
    pub key: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractedMemory {
    pub text: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub confidence: f32,
}

/// Parsed extractor output. All lists default to empty so a partial reply
/// still deserializes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Extraction {
    #[serde(default)]
    pub slot_updates: Vec<SlotUpdate>,
    #[serde(default)]
    pub slot_removals: Vec<SlotRemoval>,
    #[serde(default)]
    pub memories: Vec<ExtractedMemory>,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        self.slot_updates.is_empty() && self.slot_removals.is_empty() && self.memories.is_empty()
    }

    /// Drop updates and memories below the threshold. Removals are applied
    /// unfiltered: a removal is the model reporting staleness, not
    /// asserting a new fact.
    pub fn confidence_filter(mut self, min_confidence: f32) -> Self {
        self.slot_updates.retain(|u| u.confidence >= min_confidence);
        self.memories.retain(|m| m.confidence >= min_confidence);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn memory_point_payload_uses_remote_field_names() {
        let point = MemoryPoint {
            text: "t".into(),
            namespace: "agent_decisions".into(),
            source_agent: "assistant".into(),
            source_type: SourceType::AutoCapture,
            user_id: "default".into(),
            timestamp: "2026-01-01T00:00:00Z".into(),
            updated_at: "2026-01-01T00:00:00Z".into(),
            session_id: None,
            confidence: Some(0.9),
            tags: vec![],
            metadata: Value::Null,
        };
        let payload = point.to_payload();
        assert_eq!(payload["userId"], "default");
        assert_eq!(payload["updatedAt"], "2026-01-01T00:00:00Z");
        assert_eq!(payload["source_type"], "auto_capture");
        assert!(payload.get("sessionId").is_none());
    }

    #[test]
    fn confidence_filter_spares_removals() {
        let extraction: Extraction = serde_json::from_value(json!({
            "slot_updates": [
                {"key": "profile.name", "value": "A", "confidence": 0.9},
                {"key": "profile.city", "value": "B", "confidence": 0.4}
            ],
            "slot_removals": [{"key": "project.phase", "reason": "stale"}],
            "memories": [{"text": "m", "confidence": 0.2}]
        }))
        .unwrap();

        let filtered = extraction.confidence_filter(0.7);
        assert_eq!(filtered.slot_updates.len(), 1);
        assert_eq!(filtered.slot_removals.len(), 1);
        assert!(filtered.memories.is_empty());
    }

    #[test]
    fn extraction_defaults_allow_partial_replies() {
        let e: Extraction = serde_json::from_str(r#"{"slot_updates": []}"#).unwrap();
        assert!(e.is_empty());
    }
}
