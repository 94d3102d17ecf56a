//! fleetgrid-upgrader — schedules platform version upgrades across the fleet.
//!
//! Each application belongs to an upgrade tier. Per run, the [`Upgrader`]
//! picks a target version for every tier from the confidence registry,
//! cancels upgrades that are unsafe or stale, and triggers a throttled number
//! of new upgrades toward each target.
//!
//! The pieces are usable on their own:
//! - [`TargetSelector`] picks per-tier target versions
//! - [`plan_cancellations`] decides which pending upgrades to drop
//! - [`select_candidates`] decides which applications to upgrade next
//! - [`UpgradePolicy`] reads and writes the persisted knobs

pub mod applications;
pub mod cancel;
pub mod candidates;
pub mod error;
pub mod fleet;
pub mod policy;
pub mod target;
pub mod throttle;
pub mod tier;
pub mod upgrader;

pub use applications::ApplicationList;
pub use cancel::{CancelBatch, CancelReason, plan_cancellations};
pub use candidates::{CandidateQuery, select_candidates};
pub use error::{UpgraderError, UpgraderResult};
pub use fleet::{ConfidenceRegistry, FleetDirectory, TriggerDispatcher};
pub use policy::{CONFIDENCE_OVERRIDES_LOCK, UpgradePolicy};
pub use target::{TargetSelector, Targets};
pub use tier::{TargetRule, TierPolicy};
pub use upgrader::{Cancellation, TriggeredUpgrade, UpgradeReport, Upgrader};
