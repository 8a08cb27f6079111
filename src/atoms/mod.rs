// ── Mnemo Atoms ────────────────────────────────────────────────────────────
// Pure data types and constants. No I/O, no side effects, no imports
// from engine/.

pub mod constants;
pub mod error;
pub mod memory_types;
pub mod types;
