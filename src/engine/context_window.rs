// ── Mnemo Engine: Context Window Selection ─────────────────────────────────
// Picks the subset of a turn's messages that fits the extraction token
// budget, newest first, and flattens arbitrary host message content into
// plain text.
//
// Content arrives as untyped JSON: hosts send strings, block lists
// (text / tool_use / tool_result / image), or nested objects. The
// flattener handles every shape and must never emit "[object Object]" —
// unknown shapes are serialised as JSON instead.

use crate::atoms::types::IncomingMessage;
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct WindowConfig {
    pub max_conversation_tokens: usize,
    pub absolute_max_messages: usize,
    pub token_estimate_divisor: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        WindowConfig {
            max_conversation_tokens: 12_000,
            absolute_max_messages: 50,
            token_estimate_divisor: 4,
        }
    }
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SelectionStats {
    pub total_messages: usize,
    pub filtered_messages: usize,
    pub selected_messages: usize,
    pub estimated_tokens: usize,
    pub budget_used_percent: f32,
}

#[derive(Debug, Clone)]
pub struct WindowSelection {
    pub selected: Vec<IncomingMessage>,
    pub stats: SelectionStats,
}

/// Estimate tokens for one message as `ceil(len("role: text") / divisor)`.
fn estimate_tokens(role: &str, text: &str, divisor: usize) -> usize {
    let divisor = divisor.max(1);
    let len = role.len() + 2 + text.len();
    len.div_ceil(divisor)
}

/// Select the most recent user/assistant messages that fit the budget.
/// Returned messages keep their original chronological order.
pub fn select_messages_within_budget(
    messages: &[IncomingMessage],
    config: &WindowConfig,
) -> WindowSelection {
    let total_messages = messages.len();

    // 1. Only user/assistant turns carry extractable facts.
    let mut filtered: Vec<&IncomingMessage> = messages
        .iter()
        .filter(|m| m.role == "user" || m.role == "assistant")
        .collect();
    let filtered_messages = filtered.len();

    // 2. Hard cap before token accounting.
    if filtered.len() > config.absolute_max_messages {
        let drop = filtered.len() - config.absolute_max_messages;
        filtered.drain(..drop);
    }

    // 3. Newest to oldest, accumulate until the next message would
    //    overflow the budget.
    let mut selected_rev: Vec<&IncomingMessage> = Vec::new();
    let mut estimated_tokens = 0usize;
    for msg in filtered.iter().rev() {
        let text = extract_message_text(&msg.content);
        let cost = estimate_tokens(&msg.role, &text, config.token_estimate_divisor);
        if estimated_tokens + cost > config.max_conversation_tokens {
            break;
        }
        estimated_tokens += cost;
        selected_rev.push(msg);
    }

    // 4. Back to chronological order.
    let selected: Vec<IncomingMessage> =
        selected_rev.into_iter().rev().cloned().collect();

    let budget_used_percent = if config.max_conversation_tokens > 0 {
        (estimated_tokens as f32 / config.max_conversation_tokens as f32) * 100.0
    } else {
        0.0
    };

    WindowSelection {
        stats: SelectionStats {
            total_messages,
            filtered_messages,
            selected_messages: selected.len(),
            estimated_tokens,
            budget_used_percent,
        },
        selected,
    }
}

/// Flatten any host content shape into readable text.
pub fn extract_message_text(content: &Value) -> String {
    match content {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(blocks) => blocks
            .iter()
            .map(render_block)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Object(obj) => {
            if let Some(Value::String(text)) = obj.get("text") {
                text.clone()
            } else if let Some(inner) = obj.get("content") {
                extract_message_text(inner)
            } else {
                serde_json::to_string(content).unwrap_or_default()
            }
        }
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

fn render_block(block: &Value) -> String {
    match block {
        Value::String(s) => s.clone(),
        Value::Object(obj) => match obj.get("type").and_then(|t| t.as_str()) {
            Some("text") => obj
                .get("text")
                .and_then(|t| t.as_str())
                .unwrap_or("")
                .to_string(),
            Some("tool_use") => {
                let name = obj.get("name").and_then(|n| n.as_str()).unwrap_or("unknown");
                format!("[Tool: {}]", name)
            }
            Some("tool_result") => "[Tool Result]".to_string(),
            Some("image") | Some("image_url") => "[Image]".to_string(),
            _ => {
                if let Some(Value::String(text)) = obj.get("text") {
                    text.clone()
                } else {
                    serde_json::to_string(block).unwrap_or_default()
                }
            }
        },
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

/// Flatten one turn into "role: text" lines for the extractor prompt.
pub fn flatten_conversation(messages: &[IncomingMessage]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.role, extract_message_text(&m.content)))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn msg(role: &str, text: &str) -> IncomingMessage {
        IncomingMessage::text(role, text)
    }

    #[test]
    fn drops_non_user_assistant_roles() {
        let messages = vec![
            msg("system", "prompt"),
            msg("user", "hi"),
            msg("tool", "output"),
            msg("assistant", "hello"),
        ];
        let sel = select_messages_within_budget(&messages, &WindowConfig::default());
        assert_eq!(sel.stats.total_messages, 4);
        assert_eq!(sel.stats.filtered_messages, 2);
        assert_eq!(sel.selected.len(), 2);
        assert!(sel.selected.iter().all(|m| m.role != "system" && m.role != "tool"));
    }

    #[test]
    fn preserves_chronological_order() {
        let messages = vec![msg("user", "first"), msg("assistant", "second"), msg("user", "third")];
        let sel = select_messages_within_budget(&messages, &WindowConfig::default());
        let texts: Vec<String> = sel
            .selected
            .iter()
            .map(|m| extract_message_text(&m.content))
            .collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
    }

    #[test]
    fn budget_keeps_newest_messages() {
        // Each message is "user: xxxxxxxxxx" = 16 chars → 4 tokens.
        let messages: Vec<IncomingMessage> =
            (0..10).map(|i| msg("user", &format!("message-{:03}", i))).collect();
        let config = WindowConfig {
            max_conversation_tokens: 10,
            ..Default::default()
        };
        let sel = select_messages_within_budget(&messages, &config);
        assert!(sel.stats.estimated_tokens <= 10);
        assert!(!sel.selected.is_empty());
        // The newest message must be present.
        let last = extract_message_text(&sel.selected.last().unwrap().content);
        assert_eq!(last, "message-009");
    }

    #[test]
    fn absolute_max_messages_caps_before_budget() {
        let messages: Vec<IncomingMessage> = (0..100).map(|i| msg("user", &i.to_string())).collect();
        let config = WindowConfig {
            absolute_max_messages: 10,
            ..Default::default()
        };
        let sel = select_messages_within_budget(&messages, &config);
        assert!(sel.selected.len() <= 10);
        let last = extract_message_text(&sel.selected.last().unwrap().content);
        assert_eq!(last, "99");
    }

    #[test]
    fn token_estimate_uses_ceiling() {
        // "user: abc" = 9 chars, divisor 4 → ceil = 3
        assert_eq!(estimate_tokens("user", "abc", 4), 3);
        assert_eq!(estimate_tokens("user", "ab", 4), 2);
        assert_eq!(estimate_tokens("user", "", 4), 2);
    }

    #[test]
    fn flattens_string_content() {
        assert_eq!(extract_message_text(&json!("plain text")), "plain text");
        assert_eq!(extract_message_text(&Value::Null), "");
    }

    #[test]
    fn flattens_block_list() {
        let content = json!([
            { "type": "text", "text": "look at this" },
            { "type": "tool_use", "name": "memory_search", "input": {} },
            { "type": "tool_result", "content": "..." },
            { "type": "image", "source": { "data": "..." } },
        ]);
        let text = extract_message_text(&content);
        assert!(text.contains("look at this"));
        assert!(text.contains("[Tool: memory_search]"));
        assert!(text.contains("[Tool Result]"));
        assert!(text.contains("[Image]"));
    }

    #[test]
    fn flattens_nested_object_content() {
        let content = json!({ "content": { "text": "nested" } });
        assert_eq!(extract_message_text(&content), "nested");
    }

    #[test]
    fn never_emits_object_object() {
        let shapes = vec![
            json!({ "weird": { "deeply": ["nested", 1, null] } }),
            json!([{ "no_type": true }, 42, null, ["inner"]]),
            json!(3.15),
            json!(true),
            json!({ "content": [{"type": "mystery", "data": {"a": 1}}] }),
        ];
        for shape in shapes {
            let text = extract_message_text(&shape);
            assert!(
                !text.contains("[object Object]"),
                "flattened {:?} produced [object Object]",
                shape
            );
        }
    }

    #[test]
    fn flatten_conversation_prefixes_roles() {
        let messages = vec![msg("user", "hi"), msg("assistant", "hello")];
        assert_eq!(flatten_conversation(&messages), "user: hi\nassistant: hello");
    }
}
