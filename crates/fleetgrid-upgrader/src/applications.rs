//! Composable queries over a fleet snapshot.
//!
//! `ApplicationList` wraps a snapshot from the fleet directory. Every filter
//! consumes the list and returns the narrowed one, so queries read as a
//! pipeline:
//!
//! ```text
//! list.with_tier(Tier::Default).upgrading().failing().not_upgrading_to(target)
//! ```

use chrono::{DateTime, Utc};
use fleetgrid_state::{ApplicationId, ApplicationRecord, Tier};
use semver::Version;

#[derive(Debug, Clone, Default)]
pub struct ApplicationList {
    applications: Vec<ApplicationRecord>,
}

impl From<Vec<ApplicationRecord>> for ApplicationList {
    fn from(applications: Vec<ApplicationRecord>) -> Self {
        Self { applications }
    }
}

impl ApplicationList {
    fn filter(mut self, keep: impl FnMut(&ApplicationRecord) -> bool) -> Self {
        self.applications.retain(keep);
        self
    }

    pub fn with_tier(self, tier: Tier) -> Self {
        self.filter(|a| a.tier == tier)
    }

    pub fn without_tier(self, tier: Tier) -> Self {
        self.filter(|a| a.tier != tier)
    }

    /// Applications with a pending platform change.
    pub fn upgrading(self) -> Self {
        self.filter(ApplicationRecord::is_upgrading)
    }

    pub fn upgrading_to(self, version: &Version) -> Self {
        self.filter(|a| a.is_upgrading_to(version))
    }

    /// Applications with a pending platform change to anything but `version`.
    /// With no version at all, every upgrading application qualifies.
    pub fn not_upgrading_to(self, version: Option<&Version>) -> Self {
        match version {
            Some(version) => self.filter(|a| a.is_upgrading() && !a.is_upgrading_to(version)),
            None => self.upgrading(),
        }
    }

    /// Applications with a production deployment that is currently failing.
    pub fn failing(self) -> Self {
        self.filter(ApplicationRecord::is_failing)
    }

    pub fn has_production_deployment(self) -> Self {
        self.filter(|a| !a.deployments.is_empty())
    }

    /// Applications whose oldest production deployment runs a version below `version`.
    pub fn on_lower_version_than(self, version: &Version) -> Self {
        self.filter(|a| a.oldest_deployed_version().is_some_and(|v| v < version))
    }

    /// Applications allowed onto `target_major`: the application's own pinned
    /// major, or `default_major` when it pins none, must be at least `target_major`.
    pub fn allow_major_version(self, target_major: u64, default_major: u64) -> Self {
        self.filter(|a| a.major_version.unwrap_or(default_major) >= target_major)
    }

    /// Applications with nothing in flight: no pending change of any kind
    /// and no running deployment job.
    pub fn not_deploying(self) -> Self {
        self.filter(|a| !a.is_deploying())
    }

    pub fn not_failing_on(self, version: &Version) -> Self {
        self.filter(|a| !a.is_failing_on(version))
    }

    /// Applications outside their upgrade-blocked window at `at`.
    pub fn can_upgrade_at(self, at: DateTime<Utc>) -> Self {
        self.filter(|a| !a.is_blocked_at(at))
    }

    /// Lowest deployed version first. Ties keep their current order.
    pub fn by_increasing_deployed_version(mut self) -> Self {
        self.applications
            .sort_by(|a, b| a.oldest_deployed_version().cmp(&b.oldest_deployed_version()));
        self
    }

    pub fn first(mut self, n: usize) -> Self {
        self.applications.truncate(n);
        self
    }

    pub fn ids(&self) -> Vec<ApplicationId> {
        self.applications.iter().map(|a| a.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.applications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.applications.is_empty()
    }

    pub fn as_slice(&self) -> &[ApplicationRecord] {
        &self.applications
    }
}
