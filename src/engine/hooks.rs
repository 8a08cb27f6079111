// ── Mnemo Engine: Host Hooks ───────────────────────────────────────────────
// The two lifecycle callbacks the agent runtime drives. Neither may ever
// raise into the host: recall degrades to "no injection", capture logs and
// swallows. The agent's reply pathway is untouched either way.

use crate::atoms::types::{AgentEndEvent, AgentStartEvent};
use crate::engine::capture::{self, CaptureOutcome};
use crate::engine::recall;
use crate::engine::state::MemoryEngine;
use log::{debug, warn};

impl MemoryEngine {
    /// `before_agent_start`: assemble and splice the recall block.
    /// Returns the replacement system prompt, or None when nothing was
    /// injected (the host keeps its own prompt).
    pub async fn before_agent_start(&self, event: &AgentStartEvent) -> Option<String> {
        match recall::build_context_block(self, event).await {
            Ok(Some(block)) => {
                debug!(
                    "[recall] Injecting {} chars of context for {}",
                    block.len(),
                    event.agent_id
                );
                Some(recall::inject(event.system_prompt.as_deref(), &block))
            }
            Ok(None) => None,
            Err(e) => {
                warn!("[recall] Context assembly failed, skipping injection: {}", e);
                None
            }
        }
    }

    /// `agent_end`: mine the finished turn. Fire-and-forget; every failure
    /// is logged and swallowed.
    pub async fn agent_end(&self, event: &AgentEndEvent) {
        if !self.config.auto_capture {
            return;
        }
        match capture::run(self, event).await {
            Ok(CaptureOutcome::Captured {
                slots_updated,
                slots_removed,
                memories_stored,
                memories_deduped,
            }) => {
                debug!(
                    "[capture] Done: +{} slots, -{} slots, {} memories ({} dupes)",
                    slots_updated, slots_removed, memories_stored, memories_deduped
                );
            }
            Ok(outcome) => debug!("[capture] No-op: {:?}", outcome),
            Err(e) => warn!("[capture] Capture failed: {}", e),
        }
    }
}
