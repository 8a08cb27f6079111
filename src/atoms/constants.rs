// ── Mnemo Atoms: Constants ─────────────────────────────────────────────────
// All named constants for the crate live here.
// Rationale: collecting constants in one place eliminates magic strings,
// makes auditing easier, and keeps every layer's code self-documenting.

// ── Scope coordinates ──────────────────────────────────────────────────────
// Session-derived user ids all normalise to DEFAULT_USER so that ephemeral
// session ids cannot fragment the slot space. The two reserved markers are
// the only other values ever written to the user/agent columns by the
// engine itself. Treat all three as stable identifiers: changing them
// orphans existing rows.
pub const DEFAULT_USER: &str = "default";
pub const TEAM_AGENT_MARKER: &str = "__team__";
pub const PUBLIC_MARKER: &str = "__public__";

/// Slot keys starting with this prefix are engine bookkeeping and are
/// excluded from current-state snapshots, extraction input, and recall.
pub const INTERNAL_KEY_PREFIX: char = '_';

// ── Slot categories ────────────────────────────────────────────────────────
/// First path segments that map to a named category; everything else
/// becomes "custom".
pub const KNOWN_CATEGORIES: &[&str] = &["profile", "preferences", "project", "environment"];
pub const CUSTOM_CATEGORY: &str = "custom";

// ── Vector namespaces ──────────────────────────────────────────────────────
pub const NS_AGENT_DECISIONS: &str = "agent_decisions";
pub const NS_USER_PROFILE: &str = "user_profile";
pub const NS_PROJECT_CONTEXT: &str = "project_context";
pub const NS_TRADING_SIGNALS: &str = "trading_signals";

/// The closed set of valid namespaces. Extraction output naming anything
/// else is routed to the agent's default namespace instead.
pub const ALL_NAMESPACES: &[&str] = &[
    NS_AGENT_DECISIONS,
    NS_USER_PROFILE,
    NS_PROJECT_CONTEXT,
    NS_TRADING_SIGNALS,
];

// ── Volatile status keys ───────────────────────────────────────────────────
// The extractor is instructed to actively detect staleness on these keys
// and emit removals when the conversation shows they no longer hold.
pub const VOLATILE_STATUS_KEYS: &[&str] = &[
    "project.current",
    "project.current_task",
    "project.current_epic",
    "project.phase",
    "project.status",
];

// ── Auto-capture self-trigger markers ──────────────────────────────────────
// If any harvested message contains one of these strings the turn is the
// engine's own output and must not be captured again.
pub const CAPTURE_MARKERS: &[&str] = &["[AutoCapture]", "Memory stored", "Memory updated"];

// ── Recall rendering ───────────────────────────────────────────────────────
pub const CONTEXT_BLOCK_OPEN: &str = "<memory-context>";
pub const CONTEXT_BLOCK_CLOSE: &str = "</memory-context>";
/// If the host system prompt contains this closing tag, the recall block is
/// spliced immediately after it instead of being prepended.
pub const SYSTEM_SECTION_CLOSE: &str = "</system>";
/// Slot values longer than this are truncated with an ellipsis in the
/// rendered context block.
pub const RENDER_VALUE_MAX_CHARS: usize = 100;

// ── Tool limits ────────────────────────────────────────────────────────────
pub const MEMORY_STORE_MAX_CHARS: usize = 10_000;
pub const GRAPH_SEARCH_MIN_DEPTH: u32 = 1;
pub const GRAPH_SEARCH_MAX_DEPTH: u32 = 3;
pub const MEMORY_SEARCH_MAX_LIMIT: usize = 20;
