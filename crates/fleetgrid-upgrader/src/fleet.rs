//! Collaborators the upgrader reads from and dispatches to.
//!
//! The upgrader never owns application or version state. It reads a fleet
//! snapshot through [`FleetDirectory`], version confidence through
//! [`ConfidenceRegistry`], and issues commands through [`TriggerDispatcher`].
//! `StateStore` implements all three so a single daemon can run on its own.

use fleetgrid_state::{
    ApplicationId, ApplicationRecord, Change, ChangeKind, StateError, StateStore, VersionRecord,
};
use semver::Version;
use tracing::debug;

use crate::error::UpgraderResult;

/// Enumerates applications and their deployment state.
pub trait FleetDirectory: Send + Sync {
    /// Snapshot of every application in the fleet.
    fn list_applications(&self) -> UpgraderResult<Vec<ApplicationRecord>>;
}

/// Platform versions with their computed confidence.
pub trait ConfidenceRegistry: Send + Sync {
    /// Known versions, oldest first.
    fn versions(&self) -> UpgraderResult<Vec<VersionRecord>>;

    /// The version the system itself currently runs.
    fn system_version(&self) -> UpgraderResult<Option<Version>>;
}

/// Executes (or drops) pending changes. Both calls must be idempotent.
pub trait TriggerDispatcher: Send + Sync {
    fn trigger_change(&self, id: &ApplicationId, change: &Change) -> UpgraderResult<()>;

    /// Cancel the pending change of the given kind. Changes of the other
    /// kind are left alone.
    fn cancel_change(&self, id: &ApplicationId, kind: ChangeKind) -> UpgraderResult<()>;
}

impl FleetDirectory for StateStore {
    fn list_applications(&self) -> UpgraderResult<Vec<ApplicationRecord>> {
        Ok(StateStore::list_applications(self)?)
    }
}

impl ConfidenceRegistry for StateStore {
    fn versions(&self) -> UpgraderResult<Vec<VersionRecord>> {
        Ok(self.version_status()?.versions)
    }

    fn system_version(&self) -> UpgraderResult<Option<Version>> {
        Ok(self.version_status()?.system_version)
    }
}

impl TriggerDispatcher for StateStore {
    fn trigger_change(&self, id: &ApplicationId, change: &Change) -> UpgraderResult<()> {
        let changed = self.update_application(&id.table_key(), |record| {
            match &record.change {
                Some(pending) if pending == change => Ok(false),
                Some(pending) if pending.kind() != change.kind() => Err(StateError::Conflict(
                    format!("{id} has pending {pending}, cannot trigger {change}"),
                )),
                _ => {
                    record.change = Some(change.clone());
                    Ok(true)
                }
            }
        })?;
        debug!(application = %id, %change, changed, "trigger change");
        Ok(())
    }

    fn cancel_change(&self, id: &ApplicationId, kind: ChangeKind) -> UpgraderResult<()> {
        let changed = self.update_application(&id.table_key(), |record| {
            if record.change.as_ref().map(Change::kind) == Some(kind) {
                record.change = None;
                Ok(true)
            } else {
                Ok(false)
            }
        })?;
        debug!(application = %id, %kind, changed, "cancel change");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UpgraderError;
    use fleetgrid_state::{Tier, VersionStatus};

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn store_with_app() -> (StateStore, ApplicationId) {
        let store = StateStore::open_in_memory().unwrap();
        let id = ApplicationId::new("tenant", "app");
        store
            .put_application(&ApplicationRecord::new(id.clone(), Tier::Default))
            .unwrap();
        (store, id)
    }

    fn pending(store: &StateStore, id: &ApplicationId) -> Option<Change> {
        store.get_application(&id.table_key()).unwrap().unwrap().change
    }

    #[test]
    fn trigger_is_idempotent() {
        let (store, id) = store_with_app();
        let change = Change::platform(v("7.2.0"));

        store.trigger_change(&id, &change).unwrap();
        store.trigger_change(&id, &change).unwrap();

        assert_eq!(pending(&store, &id), Some(change));
    }

    #[test]
    fn trigger_platform_retargets_pending_platform_change() {
        let (store, id) = store_with_app();
        store.trigger_change(&id, &Change::platform(v("7.1.0"))).unwrap();
        store.trigger_change(&id, &Change::platform(v("7.2.0"))).unwrap();
        assert_eq!(pending(&store, &id), Some(Change::platform(v("7.2.0"))));
    }

    #[test]
    fn trigger_platform_refuses_over_application_change() {
        let (store, id) = store_with_app();
        let app_change = Change::Application {
            revision: "1.0.7".to_string(),
        };
        store.trigger_change(&id, &app_change).unwrap();

        let result = store.trigger_change(&id, &Change::platform(v("7.2.0")));
        assert!(matches!(
            result,
            Err(UpgraderError::State(StateError::Conflict(_)))
        ));
        assert_eq!(pending(&store, &id), Some(app_change));
    }

    #[test]
    fn cancel_platform_leaves_application_change() {
        let (store, id) = store_with_app();
        let app_change = Change::Application {
            revision: "1.0.7".to_string(),
        };
        store.trigger_change(&id, &app_change).unwrap();

        store.cancel_change(&id, ChangeKind::Platform).unwrap();
        assert_eq!(pending(&store, &id), Some(app_change));

        store.cancel_change(&id, ChangeKind::Application).unwrap();
        assert_eq!(pending(&store, &id), None);
    }

    #[test]
    fn cancel_without_pending_change_is_noop() {
        let (store, id) = store_with_app();
        store.cancel_change(&id, ChangeKind::Platform).unwrap();
        assert_eq!(pending(&store, &id), None);
    }

    #[test]
    fn unknown_application_is_not_found() {
        let store = StateStore::open_in_memory().unwrap();
        let id = ApplicationId::new("tenant", "ghost");
        let result = store.trigger_change(&id, &Change::platform(v("7.2.0")));
        assert!(matches!(
            result,
            Err(UpgraderError::State(StateError::NotFound(_)))
        ));
    }

    #[test]
    fn registry_reads_version_status() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.system_version().unwrap().is_none());

        store
            .put_version_status(&VersionStatus::new(
                Some(v("7.2.0")),
                vec![VersionRecord {
                    version: v("7.2.0"),
                    confidence: fleetgrid_state::Confidence::Low,
                    is_system_version: false,
                }],
            ))
            .unwrap();

        assert_eq!(store.system_version().unwrap(), Some(v("7.2.0")));
        assert_eq!(ConfidenceRegistry::versions(&store).unwrap().len(), 1);
    }
}
