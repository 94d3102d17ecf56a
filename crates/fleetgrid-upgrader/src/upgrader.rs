//! Upgrader — the periodic control loop that schedules platform upgrades.
//!
//! Each run computes a target version per tier, cancels unsafe or stale
//! platform upgrades, then triggers throttled upgrades toward each target.
//! A run keeps no memory between invocations: everything is re-derived from
//! the fleet directory, the confidence registry and the policy store, so
//! running twice in a row triggers and cancels nothing the second time.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fleetgrid_state::{ApplicationId, Change, ChangeKind, Confidence, StateStore, Tier, VersionRecord};
use semver::Version;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::applications::ApplicationList;
use crate::cancel::{CancelBatch, CancelReason, plan_cancellations};
use crate::candidates::{CandidateQuery, select_candidates};
use crate::error::UpgraderResult;
use crate::fleet::{ConfidenceRegistry, FleetDirectory, TriggerDispatcher};
use crate::policy::UpgradePolicy;
use crate::target::{TargetSelector, Targets};
use crate::throttle;

/// A platform upgrade cancelled during a run.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Cancellation {
    pub application: ApplicationId,
    pub reason: CancelReason,
}

/// A platform upgrade triggered during a run.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct TriggeredUpgrade {
    pub application: ApplicationId,
    pub tier: Tier,
    pub version: Version,
}

/// What a single run decided and dispatched.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct UpgradeReport {
    pub targets: Targets,
    pub cancelled: Vec<Cancellation>,
    pub triggered: Vec<TriggeredUpgrade>,
    /// Dispatcher calls that failed; retried on the next run.
    pub failures: usize,
}

impl UpgradeReport {
    /// Whether the run changed nothing.
    pub fn is_noop(&self) -> bool {
        self.cancelled.is_empty() && self.triggered.is_empty() && self.failures == 0
    }
}

/// Schedules applications for platform version upgrades.
pub struct Upgrader {
    fleet: Arc<dyn FleetDirectory>,
    registry: Arc<dyn ConfidenceRegistry>,
    dispatcher: Arc<dyn TriggerDispatcher>,
    policy: UpgradePolicy,
    /// Invocation period, also the window the throttle budget covers.
    interval: Duration,
}

impl Upgrader {
    pub fn new(
        fleet: Arc<dyn FleetDirectory>,
        registry: Arc<dyn ConfidenceRegistry>,
        dispatcher: Arc<dyn TriggerDispatcher>,
        policy: UpgradePolicy,
        interval: Duration,
    ) -> Self {
        Self {
            fleet,
            registry,
            dispatcher,
            policy,
            interval,
        }
    }

    /// An upgrader whose fleet, registry, dispatcher and knobs all live in `store`.
    pub fn from_store(store: StateStore, interval: Duration) -> Self {
        let shared = Arc::new(store.clone());
        Self::new(
            shared.clone(),
            shared.clone(),
            shared,
            UpgradePolicy::new(store),
            interval,
        )
    }

    pub fn policy(&self) -> &UpgradePolicy {
        &self.policy
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Current target version per tier.
    pub fn targets(&self) -> UpgraderResult<Targets> {
        let (versions, system_version, overrides) = self.version_view()?;
        Ok(TargetSelector::new(&versions, system_version.as_ref(), &overrides).targets())
    }

    /// Run once at the current wall-clock time.
    pub fn maintain(&self) -> UpgraderResult<UpgradeReport> {
        self.maintain_at(Utc::now())
    }

    /// Run once, evaluating upgrade-blocked windows at `now`.
    pub fn maintain_at(&self, now: DateTime<Utc>) -> UpgraderResult<UpgradeReport> {
        let (versions, system_version, overrides) = self.version_view()?;
        let selector = TargetSelector::new(&versions, system_version.as_ref(), &overrides);
        let targets = selector.targets();
        debug!(
            canary = ?targets.canary,
            default = ?targets.default,
            conservative = ?targets.conservative,
            "upgrade targets"
        );

        let mut report = UpgradeReport {
            targets: targets.clone(),
            ..Default::default()
        };

        let applications = ApplicationList::from(self.fleet.list_applications()?);
        for batch in plan_cancellations(&applications, &targets, &selector.broken_versions()) {
            self.cancel(batch, &mut report);
        }

        // Re-read so selection sees this run's cancellations.
        let applications = ApplicationList::from(self.fleet.list_applications()?);
        let budget = throttle::budget(self.interval, self.policy.upgrades_per_minute()?);
        let target_major_version = self.policy.target_major_version()?;

        for tier in Tier::ALL {
            let Some(target) = targets.get(tier) else {
                debug!(%tier, "no target version, skipping tier");
                continue;
            };
            let query = CandidateQuery {
                target,
                target_major_version,
                now,
                budget,
            };
            for id in select_candidates(applications.clone().with_tier(tier), &query) {
                self.trigger(tier, id, target, &mut report);
            }
        }

        Ok(report)
    }

    /// Run `maintain` every interval until `shutdown` flips.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs(), "upgrader started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    match self.maintain() {
                        Ok(report) if report.is_noop() => debug!("upgrader run changed nothing"),
                        Ok(report) => info!(
                            cancelled = report.cancelled.len(),
                            triggered = report.triggered.len(),
                            failures = report.failures,
                            "upgrader run complete"
                        ),
                        Err(e) => error!(error = %e, "upgrader run failed"),
                    }
                }
                _ = shutdown.changed() => {
                    info!("upgrader shutting down");
                    break;
                }
            }
        }
    }

    // ── Internal helpers ────────────────────────────────────────────

    fn version_view(
        &self,
    ) -> UpgraderResult<(Vec<VersionRecord>, Option<Version>, BTreeMap<Version, Confidence>)> {
        Ok((
            self.registry.versions()?,
            self.registry.system_version()?,
            self.policy.confidence_overrides()?,
        ))
    }

    fn cancel(&self, batch: CancelBatch, report: &mut UpgradeReport) {
        if batch.applications.is_empty() {
            return;
        }
        info!(
            count = batch.applications.len(),
            reason = %batch.reason,
            "cancelling upgrades"
        );
        for id in batch.applications {
            match self.dispatcher.cancel_change(&id, ChangeKind::Platform) {
                Ok(()) => report.cancelled.push(Cancellation {
                    application: id,
                    reason: batch.reason.clone(),
                }),
                Err(e) => {
                    warn!(application = %id, error = %e, "failed to cancel upgrade");
                    report.failures += 1;
                }
            }
        }
    }

    fn trigger(&self, tier: Tier, id: ApplicationId, target: &Version, report: &mut UpgradeReport) {
        match self
            .dispatcher
            .trigger_change(&id, &Change::platform(target.clone()))
        {
            Ok(()) => {
                info!(application = %id, %tier, version = %target, "upgrade triggered");
                report.triggered.push(TriggeredUpgrade {
                    application: id,
                    tier,
                    version: target.clone(),
                });
            }
            Err(e) => {
                warn!(application = %id, version = %target, error = %e, "failed to trigger upgrade");
                report.failures += 1;
            }
        }
    }
}
