//! Rollout tier policies — canary, default, conservative.

use fleetgrid_state::{Confidence, Tier};

/// How the version target for a tier is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TargetRule {
    /// Track the system version, whatever its confidence.
    SystemVersion,
    /// Newest version at or below the system version with at least this confidence.
    MinimumConfidence { confidence: Confidence },
}

/// Per-tier upgrade policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TierPolicy {
    pub tier: Tier,
    pub target: TargetRule,
    /// Upgrades to a broken version are kept. Canaries must keep probing
    /// the bleeding edge, or a fix could never be verified on them.
    pub exempt_from_broken_cancellation: bool,
    /// Pending upgrades not aiming at the current target are cancelled
    /// even when healthy.
    pub cancel_outdated: bool,
    /// Failing upgrades not aiming at the current target are cancelled.
    pub cancel_failing_outdated: bool,
}

impl TierPolicy {
    pub const fn of(tier: Tier) -> Self {
        match tier {
            Tier::Canary => Self {
                tier,
                target: TargetRule::SystemVersion,
                exempt_from_broken_cancellation: true,
                cancel_outdated: true,
                cancel_failing_outdated: false,
            },
            Tier::Default => Self {
                tier,
                target: TargetRule::MinimumConfidence {
                    confidence: Confidence::Normal,
                },
                exempt_from_broken_cancellation: false,
                cancel_outdated: false,
                cancel_failing_outdated: true,
            },
            Tier::Conservative => Self {
                tier,
                target: TargetRule::MinimumConfidence {
                    confidence: Confidence::High,
                },
                exempt_from_broken_cancellation: false,
                cancel_outdated: false,
                cancel_failing_outdated: true,
            },
        }
    }

    /// Policies for every tier, in visiting order.
    pub fn all() -> [TierPolicy; 3] {
        Tier::ALL.map(TierPolicy::of)
    }
}
