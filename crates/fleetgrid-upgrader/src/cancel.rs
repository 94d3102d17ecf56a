//! Cancellation planning.
//!
//! Decides which pending platform upgrades must be dropped before new
//! upgrades are triggered. Planning is pure: it reads one fleet snapshot and
//! returns batches, one per rule, in the order the rules apply:
//!
//! 1. upgrades to a broken version, except on canaries;
//! 2. canary upgrades not aiming at the canary target;
//! 3. failing default/conservative upgrades not aiming at their tier target.
//!
//! Upgrades to other versions are left alone, so applications close to
//! finishing an older upgrade are not starved. An application appears in at
//! most one batch.

use std::collections::HashSet;
use std::fmt;

use fleetgrid_state::{ApplicationId, Tier};
use semver::Version;

use crate::applications::ApplicationList;
use crate::target::Targets;
use crate::tier::TierPolicy;

/// Why an upgrade was cancelled.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum CancelReason {
    BrokenTarget { version: Version },
    OutdatedTarget { tier: Tier },
    FailingOnOutdatedVersion { tier: Tier },
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::BrokenTarget { version } => write!(f, "{version} is broken"),
            CancelReason::OutdatedTarget { tier } => {
                write!(f, "outdated target version for {tier} applications")
            }
            CancelReason::FailingOnOutdatedVersion { tier } => {
                write!(f, "{tier} application failing on outdated version")
            }
        }
    }
}

/// Applications whose platform upgrade is cancelled for one reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelBatch {
    pub reason: CancelReason,
    pub applications: Vec<ApplicationId>,
}

/// Plan every cancellation for this run.
///
/// `broken` lists the versions whose effective confidence is broken.
pub fn plan_cancellations(
    applications: &ApplicationList,
    targets: &Targets,
    broken: &[Version],
) -> Vec<CancelBatch> {
    let mut planned = HashSet::new();
    let mut batches = Vec::new();
    let mut push = |reason: CancelReason, selected: ApplicationList| {
        let ids: Vec<ApplicationId> = selected
            .ids()
            .into_iter()
            .filter(|id| planned.insert(id.clone()))
            .collect();
        batches.push(CancelBatch {
            reason,
            applications: ids,
        });
    };

    for version in broken {
        let mut selected = applications.clone().upgrading_to(version);
        for policy in TierPolicy::all() {
            if policy.exempt_from_broken_cancellation {
                selected = selected.without_tier(policy.tier);
            }
        }
        push(
            CancelReason::BrokenTarget {
                version: version.clone(),
            },
            selected,
        );
    }

    for policy in TierPolicy::all() {
        if policy.cancel_outdated {
            let selected = applications
                .clone()
                .with_tier(policy.tier)
                .not_upgrading_to(targets.get(policy.tier));
            push(CancelReason::OutdatedTarget { tier: policy.tier }, selected);
        }
    }

    for policy in TierPolicy::all() {
        if policy.cancel_failing_outdated {
            let selected = applications
                .clone()
                .with_tier(policy.tier)
                .failing()
                .not_upgrading_to(targets.get(policy.tier));
            push(
                CancelReason::FailingOnOutdatedVersion { tier: policy.tier },
                selected,
            );
        }
    }

    batches
}
