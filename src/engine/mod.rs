// ── Mnemo Engine ───────────────────────────────────────────────────────────
// All behaviour lives here, layered leaves-first:
//
//   scope            → storage coordinates for users, agents, tiers
//   store            → SQLite: slots + entity/relationship graph
//   http             → retry classification and backoff
//   vector           → external vector DB adapter (Qdrant REST)
//   embedding        → embedding service adapter + deterministic fallback
//   extractor        → LLM fact extraction
//   dedupe           → duplicate detection
//   context_window   → token-budgeted message selection + flattening
//   noise            → per-agent capture policy + namespace routing
//   capture          → the auto-capture pipeline
//   recall           → the auto-recall injector
//   state, hooks     → the engine object and its host callbacks
//   tools            → the agent-facing tool surface

pub mod capture;
pub mod context_window;
pub mod dedupe;
pub mod embedding;
pub mod extractor;
pub mod hooks;
pub mod http;
pub mod noise;
pub mod recall;
pub mod scope;
pub mod state;
pub mod store;
pub mod tools;
pub mod vector;
