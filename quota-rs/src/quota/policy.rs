//! Cap, reconciliation and remediation rules
//!
//! Everything here is pure: the tracker feeds in counts and gets back
//! numbers or decisions, with no I/O.

use serde::{Deserialize, Serialize};

use super::types::{Decision, Identity, QuotaUsage};

/// Monthly download caps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaLimits {
    /// Cap for browsers without a session
    pub anonymous_cap: u32,
    /// Cap for signed-in accounts that have not donated
    pub authenticated_cap: u32,
}

impl Default for QuotaLimits {
    fn default() -> Self {
        QuotaLimits {
            anonymous_cap: 3,
            authenticated_cap: 6,
        }
    }
}

impl QuotaLimits {
    /// Cap for an identity, `None` when unconstrained.
    ///
    /// The donor flag only exists on accounts, so it is ignored for
    /// anonymous identities.
    pub fn cap_for(&self, identity: &Identity, has_donated: bool) -> Option<u32> {
        match identity {
            Identity::Anonymous(_) => Some(self.anonymous_cap),
            Identity::Account(_) if has_donated => None,
            Identity::Account(_) => Some(self.authenticated_cap),
        }
    }
}

/// How the local cached count and the server count are combined
/// into the pre-check value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcilePolicy {
    /// Larger of the two; never under-counts, but a stale-low server row
    /// is masked only if the local cache survived
    #[default]
    Max,
    /// Server row when present, local cache otherwise
    PreferServer,
    /// Local cache only; the server row is written but never read back
    PreferLocal,
}

impl ReconcilePolicy {
    pub fn reconcile(&self, local: u32, server: Option<u32>) -> u32 {
        match self {
            ReconcilePolicy::Max => server.map_or(local, |server| server.max(local)),
            ReconcilePolicy::PreferServer => server.unwrap_or(local),
            ReconcilePolicy::PreferLocal => local,
        }
    }
}

/// Routes offered when a download is blocked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemediationRoutes {
    /// Sign up, then donate
    pub anonymous: String,
    /// Donate
    pub authenticated: String,
}

impl Default for RemediationRoutes {
    fn default() -> Self {
        RemediationRoutes {
            anonymous: "/signup?redirect=/donate".to_string(),
            authenticated: "/donate".to_string(),
        }
    }
}

impl RemediationRoutes {
    pub fn route_for(&self, identity: &Identity) -> &str {
        if identity.is_authenticated() {
            &self.authenticated
        } else {
            &self.anonymous
        }
    }
}

/// Blocked decision with the user-facing explanation
pub fn blocked(identity: &Identity, used: u32, cap: u32, routes: &RemediationRoutes) -> Decision {
    let usage = QuotaUsage { used, cap: Some(cap) };
    let remaining = usage.remaining().unwrap_or(0);

    let hint = if identity.is_authenticated() {
        "Make a donation to unlock unlimited downloads."
    } else {
        "Sign up and make a donation to unlock unlimited downloads."
    };

    Decision::Blocked {
        usage,
        message: format!(
            "You have used {} of your {} downloads this month ({} remaining). {}",
            used, cap, remaining, hint
        ),
        redirect: routes.route_for(identity).to_string(),
    }
}

/// Allowed decision for a download that has just been counted
pub fn allowed(used: u32, cap: Option<u32>) -> Decision {
    let usage = QuotaUsage { used, cap };

    let message = match (cap, usage.remaining()) {
        (Some(cap), Some(remaining)) => format!(
            "Download {} of {} this month ({} remaining).",
            used, cap, remaining
        ),
        _ => "Unlimited downloads. Thank you for your donation!".to_string(),
    };

    Decision::Allowed { usage, message }
}
