// ── Mnemo Engine: HTTP Retry Utilities ─────────────────────────────────────
// Shared retry classification and backoff used by the vector gateway.
//
//   • Exponential backoff (base 1s, capped at 10s)
//   • Retry on 429 (rate limit), 500, 502, 503, 504
//   • Retry on connect/timeout transport errors
//
// The LLM and embedding calls deliberately do not retry: a slow extractor
// is worth less than an empty extraction, and the embedder has a local
// fallback.

use std::time::Duration;

/// Default maximum number of attempts per vector request.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Initial retry delay in milliseconds (doubles each attempt).
const INITIAL_RETRY_DELAY_MS: u64 = 1_000;

/// Maximum retry delay cap in milliseconds.
const MAX_RETRY_DELAY_MS: u64 = 10_000;

/// Check if an HTTP status code represents a transient/retryable error.
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

/// Check if a transport-level error is worth retrying.
/// Connection refused, timeouts, and aborted requests are transient;
/// anything else (TLS, malformed URL, decode) is not.
pub fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

/// Backoff for the given 1-based attempt: `min(2^(attempt-1) * 1s, 10s)`.
pub fn backoff_delay(attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(10);
    let ms = (INITIAL_RETRY_DELAY_MS * 2u64.pow(exp)).min(MAX_RETRY_DELAY_MS);
    Duration::from_millis(ms)
}

/// UTF-8–safe string truncation.  Returns a `&str` of at most `max_bytes`
/// bytes, backing up to the previous char boundary if `max_bytes` falls
/// inside a multi-byte character. Remote error bodies are arbitrary
/// non-ASCII text, so use this instead of `&s[..s.len().min(N)]` which
/// panics on non-ASCII.
pub fn truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    // Walk backwards from max_bytes to find a valid char boundary
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_statuses() {
        for s in [429u16, 500, 502, 503, 504] {
            assert!(is_retryable_status(s), "{} should be retryable", s);
        }
        for s in [400u16, 401, 403, 404, 409, 422] {
            assert!(!is_retryable_status(s), "{} should not be retryable", s);
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(backoff_delay(1), Duration::from_millis(1_000));
        assert_eq!(backoff_delay(2), Duration::from_millis(2_000));
        assert_eq!(backoff_delay(3), Duration::from_millis(4_000));
        assert_eq!(backoff_delay(4), Duration::from_millis(8_000));
        assert_eq!(backoff_delay(5), Duration::from_millis(10_000));
        assert_eq!(backoff_delay(30), Duration::from_millis(10_000));
    }

    #[test]
    fn truncate_utf8_backs_up_to_char_boundary() {
        // "đ" is 2 bytes; byte 3 falls mid-character.
        let s = "đđđ";
        assert_eq!(truncate_utf8(s, 3), "đ");
        assert_eq!(truncate_utf8(s, 4), "đđ");
        assert_eq!(truncate_utf8(s, 6), "đđđ");
        assert_eq!(truncate_utf8(s, 100), "đđđ");
        assert_eq!(truncate_utf8("ascii", 3), "asc");
        assert_eq!(truncate_utf8("", 5), "");
    }
}
