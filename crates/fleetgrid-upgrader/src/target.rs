//! Target version selection per rollout tier.
//!
//! A tier's target is the newest version, never newer than the system
//! version, whose *effective* confidence meets the tier's threshold.
//! Effective confidence is the operator override for a version when one
//! exists, the computed confidence otherwise. Canaries skip the threshold
//! and target the system version itself.

use std::collections::BTreeMap;

use fleetgrid_state::{Confidence, Tier, VersionRecord};
use semver::Version;

use crate::tier::{TargetRule, TierPolicy};

/// Read-only view over the version registry plus confidence overrides.
pub struct TargetSelector<'a> {
    /// Oldest first.
    versions: &'a [VersionRecord],
    system_version: Option<&'a Version>,
    overrides: &'a BTreeMap<Version, Confidence>,
}

impl<'a> TargetSelector<'a> {
    pub fn new(
        versions: &'a [VersionRecord],
        system_version: Option<&'a Version>,
        overrides: &'a BTreeMap<Version, Confidence>,
    ) -> Self {
        Self {
            versions,
            system_version,
            overrides,
        }
    }

    /// Confidence of a registry entry after applying overrides.
    pub fn effective_confidence(&self, record: &VersionRecord) -> Confidence {
        self.overrides
            .get(&record.version)
            .copied()
            .unwrap_or(record.confidence)
    }

    /// Newest version at or below the system version with at least `threshold`.
    ///
    /// Without a known system version nothing qualifies.
    pub fn select(&self, threshold: Confidence) -> Option<Version> {
        let system_version = self.system_version?;
        self.versions
            .iter()
            .rev()
            .filter(|record| record.version <= *system_version)
            .find(|record| self.effective_confidence(record).equal_or_higher_than(threshold))
            .map(|record| record.version.clone())
    }

    /// The system version's registry entry, regardless of its confidence.
    pub fn system_target(&self) -> Option<Version> {
        let system_version = self.system_version?;
        self.versions
            .iter()
            .find(|record| record.version == *system_version)
            .map(|record| record.version.clone())
    }

    pub fn target_for(&self, policy: &TierPolicy) -> Option<Version> {
        match policy.target {
            TargetRule::SystemVersion => self.system_target(),
            TargetRule::MinimumConfidence { confidence } => self.select(confidence),
        }
    }

    /// Targets for all tiers.
    pub fn targets(&self) -> Targets {
        Targets {
            canary: self.target_for(&TierPolicy::of(Tier::Canary)),
            default: self.target_for(&TierPolicy::of(Tier::Default)),
            conservative: self.target_for(&TierPolicy::of(Tier::Conservative)),
        }
    }

    /// Versions whose effective confidence is `broken`, oldest first.
    pub fn broken_versions(&self) -> Vec<Version> {
        self.versions
            .iter()
            .filter(|record| self.effective_confidence(record) == Confidence::Broken)
            .map(|record| record.version.clone())
            .collect()
    }
}

/// One target version per tier; `None` skips the tier this run.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct Targets {
    pub canary: Option<Version>,
    pub default: Option<Version>,
    pub conservative: Option<Version>,
}

impl Targets {
    pub fn get(&self, tier: Tier) -> Option<&Version> {
        match tier {
            Tier::Canary => self.canary.as_ref(),
            Tier::Default => self.default.as_ref(),
            Tier::Conservative => self.conservative.as_ref(),
        }
    }
}
