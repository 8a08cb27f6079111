// ── Mnemo Engine: Noise Filter & Namespace Routing ─────────────────────────
// Decides per agent whether a turn is worth capturing at all, and which
// vector namespace its memories belong to.
//
// The trader agent is special-cased twice: its turns are additionally
// screened against trading-signal patterns (signal chatter arrives every
// few seconds and would swamp the store), and its auto-captured content
// always routes to the general decisions namespace. Trading content only
// enters `trading_signals` via explicit tool calls.

use crate::atoms::constants::{
    NS_AGENT_DECISIONS, NS_PROJECT_CONTEXT, NS_TRADING_SIGNALS, NS_USER_PROFILE,
};
use regex::Regex;
use std::sync::LazyLock;

/// Agents whose turns are never captured.
const BLOCKED_AGENTS: &[&str] = &["system", "heartbeat"];

const TRADER_AGENT: &str = "trader";

static GENERAL_NOISE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // Bare acknowledgements and greetings carry no facts.
        r"(?i)^\s*(ok(ay)?|yes|no|yep|nope|sure|got it|sounds good|cool|nice|great|perfect)\s*[.!?]*\s*$",
        r"(?i)^\s*(hi|hello|hey|good (morning|afternoon|evening)|thanks?|thank you|bye|goodbye)\s*[.!?,]*\s*$",
        // Pure status pings.
        r"(?i)^\s*(ping|test(ing)?|status\?*)\s*$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static noise pattern compiles"))
    .collect()
});

static TRADING_SIGNAL_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\b(buy|sell)\s+signal\b",
        r"(?i)\b(long|short)\s+(entry|exit|position)\b",
        r"(?i)\bstop[-\s]?loss\b",
        r"(?i)\btake[-\s]?profit\b",
        r"(?i)\bprice\s+target\b",
        r"(?i)\b(bullish|bearish)\s+(divergence|crossover|breakout)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static trading pattern compiles"))
    .collect()
});

/// Per-agent capture policy. Cheap to construct; holds only the agent id.
#[derive(Debug, Clone)]
pub struct NoiseFilter {
    agent_id: String,
}

impl NoiseFilter {
    pub fn new(agent_id: &str) -> Self {
        NoiseFilter { agent_id: agent_id.to_string() }
    }

    pub fn is_blocked(&self) -> bool {
        BLOCKED_AGENTS.contains(&self.agent_id.as_str())
    }

    /// True when the text matches a general noise pattern, or (for the
    /// trader agent only) a trading-signal pattern.
    pub fn should_skip(&self, text: &str) -> bool {
        if GENERAL_NOISE_PATTERNS.iter().any(|p| p.is_match(text)) {
            return true;
        }
        if self.agent_id == TRADER_AGENT
            && TRADING_SIGNAL_PATTERNS.iter().any(|p| p.is_match(text))
        {
            return true;
        }
        false
    }

    /// The namespace auto-captured memories default to. First entry of the
    /// search list, except for the trader which always captures into the
    /// decisions namespace.
    pub fn target_namespace(&self) -> &'static str {
        if self.agent_id == TRADER_AGENT {
            return NS_AGENT_DECISIONS;
        }
        self.namespaces()[0]
    }

    /// Ordered namespace search list for this agent.
    pub fn namespaces(&self) -> &'static [&'static str] {
        match self.agent_id.as_str() {
            "assistant" => &[NS_AGENT_DECISIONS, NS_USER_PROFILE],
            "scrum" | "fullstack" | "creator" => &[NS_AGENT_DECISIONS, NS_PROJECT_CONTEXT],
            TRADER_AGENT => &[NS_TRADING_SIGNALS, NS_AGENT_DECISIONS],
            _ => &[NS_AGENT_DECISIONS],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocklist_membership() {
        assert!(NoiseFilter::new("system").is_blocked());
        assert!(NoiseFilter::new("heartbeat").is_blocked());
        assert!(!NoiseFilter::new("assistant").is_blocked());
    }

    #[test]
    fn general_noise_skipped_for_all_agents() {
        for agent in ["assistant", "scrum", "trader", "anything"] {
            let filter = NoiseFilter::new(agent);
            assert!(filter.should_skip("ok"), "agent {}", agent);
            assert!(filter.should_skip("  Thanks!  "));
            assert!(filter.should_skip("good morning"));
        }
    }

    #[test]
    fn substantive_text_not_skipped() {
        let filter = NoiseFilter::new("assistant");
        assert!(!filter.should_skip("The user prefers dark mode and lives in Hanoi."));
        assert!(!filter.should_skip("ok, so the plan is to migrate the database tomorrow"));
    }

    #[test]
    fn trading_patterns_skip_only_for_trader() {
        let signal = "BTC buy signal confirmed, stop-loss at 61k";
        assert!(NoiseFilter::new("trader").should_skip(signal));
        assert!(!NoiseFilter::new("assistant").should_skip(signal));
        assert!(!NoiseFilter::new("fullstack").should_skip(signal));
    }

    #[test]
    fn routing_table() {
        assert_eq!(
            NoiseFilter::new("assistant").namespaces(),
            &["agent_decisions", "user_profile"]
        );
        assert_eq!(
            NoiseFilter::new("scrum").namespaces(),
            &["agent_decisions", "project_context"]
        );
        assert_eq!(
            NoiseFilter::new("fullstack").namespaces(),
            &["agent_decisions", "project_context"]
        );
        assert_eq!(
            NoiseFilter::new("creator").namespaces(),
            &["agent_decisions", "project_context"]
        );
        assert_eq!(
            NoiseFilter::new("trader").namespaces(),
            &["trading_signals", "agent_decisions"]
        );
        assert_eq!(NoiseFilter::new("someone-else").namespaces(), &["agent_decisions"]);
    }

    #[test]
    fn trader_auto_capture_routes_to_decisions() {
        assert_eq!(NoiseFilter::new("trader").target_namespace(), "agent_decisions");
        assert_eq!(NoiseFilter::new("assistant").target_namespace(), "agent_decisions");
        assert_eq!(NoiseFilter::new("scrum").target_namespace(), "agent_decisions");
    }
}
