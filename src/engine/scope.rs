// ── Mnemo Engine: Scope Resolution ─────────────────────────────────────────
// Maps session identifiers and sharing tiers onto the `(user, agent)`
// storage coordinates every store row is keyed by.

use crate::atoms::constants::{DEFAULT_USER, PUBLIC_MARKER, TEAM_AGENT_MARKER};
use crate::atoms::memory_types::SharingTier;

/// Storage coordinates of a memory row: `(user, agent)`.
///
/// Session-derived keys always normalise the user component to the single
/// canonical value so ephemeral session ids cannot fragment the slot space.
/// The reserved markers (`__team__`, `__public__`) are only ever produced
/// by `tier()`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopeKey {
    pub user: String,
    pub agent: String,
}

impl ScopeKey {
    pub fn new(user: impl Into<String>, agent: impl Into<String>) -> Self {
        ScopeKey { user: user.into(), agent: agent.into() }
    }

    /// Resolve the private scope for a session. The session id itself only
    /// identifies a conversation, never a user, so the user component is
    /// the canonical default.
    pub fn from_session(_session_id: &str, agent_id: &str) -> Self {
        ScopeKey {
            user: DEFAULT_USER.to_string(),
            agent: agent_id.trim().to_string(),
        }
    }

    /// Map this (private) scope onto a sharing tier's storage coordinates.
    pub fn tier(&self, tier: SharingTier) -> ScopeKey {
        match tier {
            SharingTier::Private => self.clone(),
            SharingTier::Team => ScopeKey {
                user: self.user.clone(),
                agent: TEAM_AGENT_MARKER.to_string(),
            },
            SharingTier::Public => ScopeKey {
                user: PUBLIC_MARKER.to_string(),
                agent: PUBLIC_MARKER.to_string(),
            },
        }
    }

    /// The three tiers in recall merge order: private, team, public.
    pub fn all_tiers(&self) -> [ScopeKey; 3] {
        [
            self.tier(SharingTier::Private),
            self.tier(SharingTier::Team),
            self.tier(SharingTier::Public),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_user_normalises_to_default() {
        let a = ScopeKey::from_session("sess-8f2a", "assistant");
        let b = ScopeKey::from_session("sess-0001", "assistant");
        assert_eq!(a, b);
        assert_eq!(a.user, "default");
        assert_eq!(a.agent, "assistant");
    }

    #[test]
    fn tiers_map_to_reserved_coordinates() {
        let scope = ScopeKey::from_session("s", "scrum");
        assert_eq!(scope.tier(SharingTier::Private), scope);
        let team = scope.tier(SharingTier::Team);
        assert_eq!(team.user, "default");
        assert_eq!(team.agent, "__team__");
        let public = scope.tier(SharingTier::Public);
        assert_eq!(public.user, "__public__");
        assert_eq!(public.agent, "__public__");
    }

    #[test]
    fn tier_order_is_private_team_public() {
        let tiers = ScopeKey::from_session("s", "creator").all_tiers();
        assert_eq!(tiers[0].agent, "creator");
        assert_eq!(tiers[1].agent, "__team__");
        assert_eq!(tiers[2].user, "__public__");
    }
}
