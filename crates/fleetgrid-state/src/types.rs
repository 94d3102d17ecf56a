//! Domain types for the FleetGrid state store.
//!
//! These types represent the persisted state of applications, platform
//! versions and upgrade settings. All types are serializable to/from JSON
//! for storage in redb tables.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use semver::Version;
use serde::{Deserialize, Serialize};

/// Upgrade rate used when none has been written yet.
pub const DEFAULT_UPGRADES_PER_MINUTE: f64 = 0.5;

// ── Application ───────────────────────────────────────────────────

/// Identity of an application: the owning tenant plus the application name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApplicationId {
    pub tenant: String,
    pub application: String,
}

impl ApplicationId {
    pub fn new(tenant: &str, application: &str) -> Self {
        Self {
            tenant: tenant.to_string(),
            application: application.to_string(),
        }
    }

    /// Build the composite key for the applications table.
    pub fn table_key(&self) -> String {
        format!("{}/{}", self.tenant, self.application)
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tenant, self.application)
    }
}

/// How aggressively an application adopts new platform versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Canary,
    Default,
    Conservative,
}

impl Tier {
    /// All tiers, in the order the upgrader visits them.
    pub const ALL: [Tier; 3] = [Tier::Canary, Tier::Default, Tier::Conservative];
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tier::Canary => "canary",
            Tier::Default => "default",
            Tier::Conservative => "conservative",
        };
        f.write_str(name)
    }
}

/// A production deployment of an application in one zone.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Deployment {
    pub zone: String,
    /// Platform version currently running in this zone.
    pub version: Version,
    /// Platform version the latest failed production job ran on, while the
    /// failure is unresolved.
    #[serde(default)]
    pub failing_on: Option<Version>,
    /// Whether a deployment job is running in this zone right now.
    #[serde(default)]
    pub deploying: bool,
}

impl Deployment {
    pub fn new(zone: &str, version: Version) -> Self {
        Self {
            zone: zone.to_string(),
            version,
            failing_on: None,
            deploying: false,
        }
    }

    pub fn is_failing(&self) -> bool {
        self.failing_on.is_some()
    }
}

/// Tag used to address one kind of pending change, e.g. when cancelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Platform,
    Application,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Platform => f.write_str("platform"),
            ChangeKind::Application => f.write_str("application"),
        }
    }
}

/// A pending state transition for an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Change {
    /// Upgrade to a specific platform version.
    Platform { version: Version },
    /// An independent application content/config change.
    Application { revision: String },
}

impl Change {
    pub fn platform(version: Version) -> Self {
        Change::Platform { version }
    }

    pub fn kind(&self) -> ChangeKind {
        match self {
            Change::Platform { .. } => ChangeKind::Platform,
            Change::Application { .. } => ChangeKind::Application,
        }
    }

    /// The target platform version, if this is a platform change.
    pub fn platform_version(&self) -> Option<&Version> {
        match self {
            Change::Platform { version } => Some(version),
            Change::Application { .. } => None,
        }
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Change::Platform { version } => write!(f, "platform {version}"),
            Change::Application { revision } => write!(f, "application {revision}"),
        }
    }
}

/// Weekly UTC window during which platform upgrades must not start.
///
/// Hours cover `from_hour..to_hour`; a window with `from_hour > to_hour`
/// wraps past midnight, and `from_hour == to_hour` blocks the whole day.
/// An empty `days` list blocks every day. Days serialize as short or long
/// English names (`"Mon"`, `"monday"`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BlockWindow {
    #[serde(default)]
    pub days: Vec<Weekday>,
    pub from_hour: u8,
    pub to_hour: u8,
}

impl BlockWindow {
    /// Whether this window is active at `at`.
    pub fn blocks(&self, at: DateTime<Utc>) -> bool {
        if !self.days.is_empty() && !self.days.contains(&at.weekday()) {
            return false;
        }
        let hour = at.hour();
        let (from_hour, to_hour) = (u32::from(self.from_hour), u32::from(self.to_hour));
        match from_hour.cmp(&to_hour) {
            std::cmp::Ordering::Less => hour >= from_hour && hour < to_hour,
            std::cmp::Ordering::Greater => hour >= from_hour || hour < to_hour,
            std::cmp::Ordering::Equal => true,
        }
    }
}

/// An application in the fleet, as seen by the upgrader.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApplicationRecord {
    pub id: ApplicationId,
    pub tier: Tier,
    /// Production deployments, one per zone.
    #[serde(default)]
    pub deployments: Vec<Deployment>,
    /// The single pending change, if any.
    #[serde(default)]
    pub change: Option<Change>,
    /// Major version this application pins itself to.
    #[serde(default)]
    pub major_version: Option<u64>,
    #[serde(default)]
    pub upgrade_block: Option<BlockWindow>,
}

impl ApplicationRecord {
    pub fn new(id: ApplicationId, tier: Tier) -> Self {
        Self {
            id,
            tier,
            deployments: Vec::new(),
            change: None,
            major_version: None,
            upgrade_block: None,
        }
    }

    /// Build the composite key for the applications table.
    pub fn table_key(&self) -> String {
        self.id.table_key()
    }

    /// Lowest platform version across production deployments.
    pub fn oldest_deployed_version(&self) -> Option<&Version> {
        self.deployments.iter().map(|d| &d.version).min()
    }

    /// Whether a platform change is pending.
    pub fn is_upgrading(&self) -> bool {
        self.upgrade_target().is_some()
    }

    pub fn upgrade_target(&self) -> Option<&Version> {
        self.change.as_ref().and_then(Change::platform_version)
    }

    pub fn is_upgrading_to(&self, version: &Version) -> bool {
        self.upgrade_target() == Some(version)
    }

    /// Whether any production deployment is currently failing.
    pub fn is_failing(&self) -> bool {
        self.deployments.iter().any(Deployment::is_failing)
    }

    /// Whether a production deployment is failing on exactly this version.
    pub fn is_failing_on(&self, version: &Version) -> bool {
        self.deployments
            .iter()
            .any(|d| d.failing_on.as_ref() == Some(version))
    }

    /// Whether anything is in flight: a pending change or a running deployment job.
    pub fn is_deploying(&self) -> bool {
        self.change.is_some() || self.deployments.iter().any(|d| d.deploying)
    }

    pub fn is_blocked_at(&self, at: DateTime<Utc>) -> bool {
        self.upgrade_block
            .as_ref()
            .is_some_and(|window| window.blocks(at))
    }
}

// ── Versions ──────────────────────────────────────────────────────

/// Quality rating of a platform version, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    /// Known bad. Nothing but canaries may upgrade to it.
    Broken,
    Low,
    Normal,
    High,
}

impl Confidence {
    pub fn equal_or_higher_than(self, other: Confidence) -> bool {
        self >= other
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Confidence::Broken => "broken",
            Confidence::Low => "low",
            Confidence::Normal => "normal",
            Confidence::High => "high",
        };
        f.write_str(name)
    }
}

/// A platform version known to the fleet, with its computed confidence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VersionRecord {
    pub version: Version,
    pub confidence: Confidence,
    #[serde(default)]
    pub is_system_version: bool,
}

/// Snapshot of the platform versions in the fleet.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VersionStatus {
    /// Version the controllers themselves run.
    pub system_version: Option<Version>,
    /// Known versions, oldest first.
    #[serde(default)]
    pub versions: Vec<VersionRecord>,
}

impl VersionStatus {
    /// Build a status, sorting the records oldest first and flagging the
    /// system version.
    pub fn new(system_version: Option<Version>, mut versions: Vec<VersionRecord>) -> Self {
        versions.sort_by(|a, b| a.version.cmp(&b.version));
        for record in &mut versions {
            record.is_system_version = system_version.as_ref() == Some(&record.version);
        }
        Self {
            system_version,
            versions,
        }
    }
}

// ── Settings ──────────────────────────────────────────────────────

/// All upgrade knobs, read together for reporting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpgradeSettings {
    pub upgrades_per_minute: f64,
    pub target_major_version: Option<u64>,
    pub confidence_overrides: BTreeMap<Version, Confidence>,
}

impl Default for UpgradeSettings {
    fn default() -> Self {
        Self {
            upgrades_per_minute: DEFAULT_UPGRADES_PER_MINUTE,
            target_major_version: None,
            confidence_overrides: BTreeMap::new(),
        }
    }
}
