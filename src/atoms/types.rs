// ── Mnemo Atoms: Host-Facing Types ─────────────────────────────────────────
// All plain struct/enum definitions shared with the agent runtime.
// Atoms layer rule: no I/O, no side effects, no imports from engine/.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

// ── Host events ────────────────────────────────────────────────────────────

/// A message as delivered by the host runtime. `content` is deliberately
/// untyped: hosts send plain strings, block lists, or nested objects, and
/// the context-window flattener handles all of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub role: String,
    #[serde(default)]
    pub content: Value,
}

impl IncomingMessage {
    pub fn new(role: impl Into<String>, content: Value) -> Self {
        IncomingMessage { role: role.into(), content }
    }

    pub fn text(role: impl Into<String>, text: impl Into<String>) -> Self {
        IncomingMessage { role: role.into(), content: Value::String(text.into()) }
    }
}

/// Fired before the agent starts a turn. The callback may return a
/// replacement system prompt with recalled context spliced in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStartEvent {
    pub session_id: String,
    pub agent_id: String,
    #[serde(default)]
    pub messages: Vec<IncomingMessage>,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

/// Fired after the agent finishes a turn, carrying the final message list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEndEvent {
    pub session_id: String,
    pub agent_id: String,
    #[serde(default)]
    pub messages: Vec<IncomingMessage>,
}

// ── Tool surface ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionDefinition,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Result of a tool invocation: a one-line human summary plus a structured
/// details record. Errors are reported in-band via `is_error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    pub text: String,
    pub details: Value,
    #[serde(default)]
    pub is_error: bool,
}

impl ToolOutput {
    pub fn ok(text: impl Into<String>, details: Value) -> Self {
        ToolOutput { text: text.into(), details, is_error: false }
    }

    pub fn error(text: impl Into<String>, kind: &str) -> Self {
        ToolOutput {
            text: text.into(),
            details: serde_json::json!({ "kind": kind }),
            is_error: true,
        }
    }
}

// ── Engine configuration ───────────────────────────────────────────────────

fn default_slot_categories() -> Vec<String> {
    crate::atoms::constants::KNOWN_CATEGORIES
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_max_slots() -> usize { 256 }
fn default_inject_budget_tokens() -> usize { 1_500 }
fn default_vector_host() -> String { "127.0.0.1".into() }
fn default_vector_port() -> u16 { 6333 }
fn default_vector_collection() -> String { "agent_memory".into() }
fn default_vector_size() -> usize { 768 }
fn default_vector_timeout_secs() -> u64 { 10 }
fn default_vector_max_retries() -> u32 { 3 }
fn default_llm_base_url() -> String { "http://localhost:11434/v1".into() }
fn default_llm_model() -> String { "llama3.1".into() }
fn default_llm_timeout_secs() -> u64 { 30 }
fn default_embedding_base_url() -> String { "http://localhost:11434".into() }
fn default_embedding_model() -> String { "nomic-embed-text".into() }
fn default_true() -> bool { true }
fn default_min_confidence() -> f32 { 0.7 }
fn default_max_conversation_tokens() -> usize { 12_000 }
fn default_absolute_max_messages() -> usize { 50 }
fn default_token_estimate_divisor() -> usize { 4 }
fn default_recall_limit() -> usize { 5 }
fn default_min_recall_score() -> f32 { 0.7 }

/// Engine configuration, deserialized by the host and handed to
/// `MemoryEngine::new`. Every field has a workable default so an empty
/// `{}` config produces a functional local setup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEngineConfig {
    /// Directory for the local store file. Defaults to `~/.mnemo`.
    #[serde(default)]
    pub state_dir: Option<PathBuf>,

    /// Category whitelist used for inference from the first key segment.
    #[serde(default = "default_slot_categories")]
    pub slot_categories: Vec<String>,
    /// Cap on live slots per scope; oldest custom slots are pruned first.
    #[serde(default = "default_max_slots")]
    pub max_slots: usize,
    /// Token budget for the injected context block.
    #[serde(default = "default_inject_budget_tokens")]
    pub inject_budget_tokens: usize,

    // Vector store
    #[serde(default = "default_vector_host")]
    pub vector_host: String,
    #[serde(default = "default_vector_port")]
    pub vector_port: u16,
    #[serde(default = "default_vector_collection")]
    pub vector_collection: String,
    #[serde(default = "default_vector_size")]
    pub vector_size: usize,
    #[serde(default = "default_vector_timeout_secs")]
    pub vector_timeout_secs: u64,
    #[serde(default = "default_vector_max_retries")]
    pub vector_max_retries: u32,

    // LLM extraction endpoint (OpenAI-compatible)
    #[serde(default = "default_llm_base_url")]
    pub llm_base_url: String,
    #[serde(default)]
    pub llm_api_key: String,
    #[serde(default = "default_llm_model")]
    pub llm_model: String,
    #[serde(default = "default_llm_timeout_secs")]
    pub llm_timeout_secs: u64,

    // Embedding endpoint
    #[serde(default = "default_embedding_base_url")]
    pub embedding_base_url: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_vector_size")]
    pub embedding_dims: usize,

    // Auto-capture
    #[serde(default = "default_true")]
    pub auto_capture: bool,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,

    // Context window selection
    #[serde(default = "default_max_conversation_tokens")]
    pub max_conversation_tokens: usize,
    #[serde(default = "default_absolute_max_messages")]
    pub absolute_max_messages: usize,
    #[serde(default = "default_token_estimate_divisor")]
    pub token_estimate_divisor: usize,

    // Auto-recall
    #[serde(default = "default_recall_limit")]
    pub recall_limit: usize,
    #[serde(default = "default_min_recall_score")]
    pub min_recall_score: f32,
}

impl Default for MemoryEngineConfig {
    fn default() -> Self {
        serde_json::from_value(Value::Object(Default::default()))
            .expect("empty config deserializes via field defaults")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let cfg: MemoryEngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.vector_port, 6333);
        assert_eq!(cfg.max_conversation_tokens, 12_000);
        assert!((cfg.min_confidence - 0.7).abs() < f32::EPSILON);
        assert!(cfg.auto_capture);
        assert_eq!(cfg.slot_categories.len(), 4);
    }

    #[test]
    fn incoming_message_defaults_to_null_content() {
        let m: IncomingMessage = serde_json::from_str(r#"{"role":"user"}"#).unwrap();
        assert!(m.content.is_null());
    }
}
