// ── Mnemo Atoms: Error Types ───────────────────────────────────────────────
// Single canonical error enum for the engine, built with `thiserror`.
//
// Design rules:
//   • Variants are coarse-grained by domain (I/O, DB, Remote, Validation…).
//   • The `#[from]` attribute wires std/external error conversions automatically.
//   • `kind()` maps every variant onto the machine-readable taxonomy that
//     tool results report in their `details` record.
//   • No variant carries secret material (API keys) in its message.

use thiserror::Error;

// ── Primary error enum ─────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum MemoryError {
    /// Filesystem or OS-level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization / deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP / network failure (reqwest layer).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// SQLite / rusqlite database failure.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Remote service returned a non-retryable application-level failure.
    #[error("Provider error: {provider}: {message}")]
    Provider { provider: String, message: String },

    /// Caller supplied invalid arguments. Never retried.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The requested row does not exist. Most read paths return
    /// `Option`/`false` instead; this variant is for operations that
    /// require the row to exist (e.g. relationship endpoints).
    #[error("Not found: {0}")]
    NotFound(String),

    /// Engine configuration is invalid or missing.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Catch-all for errors that do not yet have a dedicated variant.
    /// Prefer adding a specific variant over using this in new code.
    #[error("{0}")]
    Other(String),
}

// ── Error taxonomy for tool details ────────────────────────────────────────

/// Machine-readable error classification surfaced in tool `details`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Validation,
    Storage,
    Remote,
    Extraction,
    Other,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Validation => "validation",
            ErrorKind::Storage => "storage",
            ErrorKind::Remote => "remote",
            ErrorKind::Extraction => "extraction",
            ErrorKind::Other => "other",
        }
    }
}

impl MemoryError {
    /// Create a provider error with name and message.
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider { provider: provider.into(), message: message.into() }
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Classify this error for the tool-surface `details` record.
    pub fn kind(&self) -> ErrorKind {
        match self {
            MemoryError::NotFound(_) => ErrorKind::NotFound,
            MemoryError::Validation(_) | MemoryError::Config(_) => ErrorKind::Validation,
            MemoryError::Io(_) | MemoryError::Database(_) => ErrorKind::Storage,
            MemoryError::Network(_) | MemoryError::Provider { .. } => ErrorKind::Remote,
            MemoryError::Serialization(_) => ErrorKind::Extraction,
            MemoryError::Other(_) => ErrorKind::Other,
        }
    }
}

// ── Migration bridge: String → MemoryError ─────────────────────────────────
// Allows `?` on helpers that report plain-string failures (argument
// extraction in tool handlers) inside functions returning MemoryResult<T>.

impl From<String> for MemoryError {
    fn from(s: String) -> Self {
        MemoryError::Other(s)
    }
}

impl From<&str> for MemoryError {
    fn from(s: &str) -> Self {
        MemoryError::Other(s.to_string())
    }
}

// ── Convenience alias ──────────────────────────────────────────────────────

/// All engine operations should return this type.
pub type MemoryResult<T> = Result<T, MemoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_taxonomy() {
        assert_eq!(MemoryError::NotFound("x".into()).kind().as_str(), "not_found");
        assert_eq!(MemoryError::validation("bad").kind().as_str(), "validation");
        assert_eq!(
            MemoryError::provider("vector", "503").kind().as_str(),
            "remote"
        );
        assert_eq!(
            MemoryError::Database(rusqlite::Error::InvalidQuery).kind().as_str(),
            "storage"
        );
    }
}
