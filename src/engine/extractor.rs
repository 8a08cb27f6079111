// ── Mnemo Engine: LLM Fact Extractor ───────────────────────────────────────
// Mines a completed conversation turn for slot updates, stale-slot
// removals, and durable memories via an OpenAI-compatible chat endpoint.
//
// Failure contract: the extractor NEVER propagates an error. A timeout,
// HTTP failure, or unparseable reply yields an empty extraction and the
// capture pipeline exits silently. No automatic retry: the next turn is a
// fresh chance.

use crate::atoms::constants::{ALL_NAMESPACES, VOLATILE_STATUS_KEYS};
use crate::atoms::error::{MemoryError, MemoryResult};
use crate::atoms::memory_types::Extraction;
use crate::atoms::types::MemoryEngineConfig;
use crate::engine::http::truncate_utf8;
use log::{debug, warn};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

pub struct LlmExtractor {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
    min_confidence: f32,
}

impl LlmExtractor {
    pub fn new(config: &MemoryEngineConfig) -> Self {
        LlmExtractor {
            client: Client::new(),
            base_url: config.llm_base_url.trim_end_matches('/').to_string(),
            api_key: config.llm_api_key.clone(),
            model: config.llm_model.clone(),
            timeout: Duration::from_secs(config.llm_timeout_secs),
            min_confidence: config.min_confidence,
        }
    }

    /// Extract facts from a conversation. `current_slots` is the snapshot
    /// the model reasons against when deciding staleness (internal keys
    /// already stripped by the caller).
    pub async fn extract(&self, conversation: &str, current_slots: &Value) -> Extraction {
        match self.try_extract(conversation, current_slots).await {
            Ok(extraction) => extraction.confidence_filter(self.min_confidence),
            Err(e) => {
                warn!("[extract] Extraction failed, returning empty result: {}", e);
                Extraction::default()
            }
        }
    }

    async fn try_extract(
        &self,
        conversation: &str,
        current_slots: &Value,
    ) -> MemoryResult<Extraction> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = json!({
            "model": self.model,
            "temperature": 0.1,
            "messages": [
                { "role": "system", "content": system_prompt() },
                { "role": "user", "content": user_prompt(conversation, current_slots) },
            ],
        });

        let mut req = self.client.post(&url).json(&body).timeout(self.timeout);
        if !self.api_key.is_empty() {
            req = req.bearer_auth(&self.api_key);
        }
        let resp = req.send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(MemoryError::provider(
                "llm",
                format!("{} {}", status.as_u16(), truncate_utf8(&text, 200)),
            ));
        }

        let v: Value = resp.json().await?;
        let content = v["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| MemoryError::provider("llm", "no choices[0].message.content"))?;

        let extraction = parse_extraction(content)
            .ok_or_else(|| MemoryError::provider("llm", "reply contained no parseable JSON"))?;
        debug!(
            "[extract] {} updates, {} removals, {} memories",
            extraction.slot_updates.len(),
            extraction.slot_removals.len(),
            extraction.memories.len(),
        );
        Ok(extraction)
    }
}

// ── Prompts ────────────────────────────────────────────────────────────────

fn system_prompt() -> String {
    format!(
        "You maintain an agent's long-term memory. Given a conversation and the \
current memory slots, do three jobs:\n\
1. slot_updates: extract new or changed structured facts as dot-path slots \
(categories: profile, preferences, project, environment, custom).\n\
2. slot_removals: detect slots that the conversation shows are stale. Pay \
special attention to these volatile status keys and remove them the moment \
the conversation implies they no longer hold: {volatile}.\n\
3. memories: extract durable free-text facts worth recalling in future \
sessions, each assigned to one namespace of: {namespaces}.\n\
\n\
Reply with JSON ONLY, no prose, in exactly this shape:\n\
{{\"slot_updates\": [{{\"key\": \"...\", \"value\": ..., \"confidence\": 0.0, \
\"category\": \"...\"}}], \"slot_removals\": [{{\"key\": \"...\", \"reason\": \
\"...\"}}], \"memories\": [{{\"text\": \"...\", \"namespace\": \"...\", \
\"confidence\": 0.0}}]}}\n\
Confidence is in [0,1]. Only include facts actually stated or clearly \
implied. Empty lists are fine.",
        volatile = VOLATILE_STATUS_KEYS.join(", "),
        namespaces = ALL_NAMESPACES.join(", "),
    )
}

fn user_prompt(conversation: &str, current_slots: &Value) -> String {
    format!(
        "Current memory slots:\n{slots}\n\n\
=== CONVERSATION START ===\n{conversation}\n=== CONVERSATION END ===",
        slots = serde_json::to_string_pretty(current_slots)
            .unwrap_or_else(|_| "{}".to_string()),
    )
}

// ── Response parsing ───────────────────────────────────────────────────────

/// Extract the first balanced `{...}` block from the reply and parse it.
/// Tolerates markdown fences, leading prose, and trailing junk.
pub fn parse_extraction(text: &str) -> Option<Extraction> {
    let block = first_json_block(text)?;
    serde_json::from_str(block).ok()
}

/// Find the first balanced top-level JSON object in `text`, respecting
/// string literals and escapes.
fn first_json_block(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_plain_json_reply() {
        let reply = r#"{"slot_updates":[{"key":"profile.name","value":"Ana","confidence":0.9}],"slot_removals":[],"memories":[]}"#;
        let e = parse_extraction(reply).unwrap();
        assert_eq!(e.slot_updates.len(), 1);
        assert_eq!(e.slot_updates[0].key, "profile.name");
        assert_eq!(e.slot_updates[0].value, json!("Ana"));
    }

    #[test]
    fn parses_fenced_reply_with_prose() {
        let reply = "Here is the extraction:\n```json\n{\"memories\": [{\"text\": \"likes chess\", \"namespace\": \"user_profile\", \"confidence\": 0.8}]}\n```\nDone.";
        let e = parse_extraction(reply).unwrap();
        assert_eq!(e.memories.len(), 1);
        assert_eq!(e.memories[0].text, "likes chess");
    }

    #[test]
    fn braces_inside_strings_do_not_confuse_parser() {
        let reply = r#"{"memories":[{"text":"uses {braces} and \"quotes\"","confidence":0.9}]}"#;
        let e = parse_extraction(reply).unwrap();
        assert_eq!(e.memories[0].text, "uses {braces} and \"quotes\"");
    }

    #[test]
    fn garbage_yields_none() {
        assert!(parse_extraction("I could not find any facts.").is_none());
        assert!(parse_extraction("{not json").is_none());
        assert!(parse_extraction("").is_none());
    }

    #[test]
    fn wrong_shape_json_yields_none() {
        // Parses as JSON but slot_updates is not a list.
        assert!(parse_extraction(r#"{"slot_updates": "nope"}"#).is_none());
    }

    #[test]
    fn system_prompt_names_volatile_keys_and_namespaces() {
        let p = system_prompt();
        assert!(p.contains("project.current_epic"));
        assert!(p.contains("agent_decisions"));
        assert!(p.contains("trading_signals"));
        assert!(p.contains("JSON ONLY"));
    }

    #[test]
    fn user_prompt_delimits_conversation() {
        let p = user_prompt("user: hi", &json!({"profile": {}}));
        assert!(p.contains("=== CONVERSATION START ==="));
        assert!(p.contains("=== CONVERSATION END ==="));
        assert!(p.contains("user: hi"));
    }
}
