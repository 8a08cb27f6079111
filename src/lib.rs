// Mnemo — durable structured + semantic memory for conversational agents.
//
// The engine sits between an agent runtime and three external
// collaborators: a local SQLite store (slots + knowledge graph), a vector
// database (semantic memory), and an LLM endpoint (fact extraction). Per
// turn it does two jobs: inject distilled prior context into the next
// prompt (auto-recall) and mine the finished turn for facts (auto-capture),
// with scope isolation between users, agents, and sharing tiers.
//
// Host integration:
//
// ```no_run
// use mnemo::{MemoryEngine, MemoryEngineConfig, AgentStartEvent, AgentEndEvent};
//
// # async fn run() -> mnemo::MemoryResult<()> {
// let engine = MemoryEngine::new(MemoryEngineConfig::default())?;
// engine.start().await;
//
// // before_agent_start: maybe override the system prompt
// # let event: AgentStartEvent = todo!();
// if let Some(prompt) = engine.before_agent_start(&event).await {
//     // hand `prompt` back to the runtime
// }
//
// // agent_end: fire-and-forget capture
// # let end: AgentEndEvent = todo!();
// engine.agent_end(&end).await;
// # Ok(())
// # }
// ```

pub mod atoms;
pub mod engine;

pub use atoms::error::{ErrorKind, MemoryError, MemoryResult};
pub use atoms::memory_types::{
    Direction, Entity, Extraction, GraphTraversal, MemoryPoint, Relationship, ScoredPoint,
    SharingTier, Slot, SlotFilter, SlotSource, SlotWrite, SourceType,
};
pub use atoms::types::{
    AgentEndEvent, AgentStartEvent, IncomingMessage, MemoryEngineConfig, ToolDefinition,
    ToolOutput,
};
pub use engine::scope::ScopeKey;
pub use engine::state::MemoryEngine;
pub use engine::store::{MemoryStore, StoreStats};
pub use engine::tools::{definitions as tool_definitions, execute as execute_tool};
