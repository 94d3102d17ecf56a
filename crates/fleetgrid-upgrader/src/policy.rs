//! Upgrade policy store — the persisted knobs that parameterize the upgrader.
//!
//! Reads go straight to the state store. Writing a single confidence override
//! is a read-modify-write of the whole override map, so it runs under the
//! [`CONFIDENCE_OVERRIDES_LOCK`] named lock; other knobs are single writes.

use std::collections::BTreeMap;

use fleetgrid_state::{Confidence, StateStore, UpgradeSettings};
use semver::Version;
use tracing::info;

use crate::error::{UpgraderError, UpgraderResult};

/// Lock guarding read-modify-write of the confidence override map.
pub const CONFIDENCE_OVERRIDES_LOCK: &str = "confidence_overrides";

/// Handle to the upgrade knobs. Cheap to clone; clones share the store.
///
/// The override lock only serializes writers within this process. redb holds
/// an exclusive file lock, so a second process cannot open the same database
/// at all.
#[derive(Clone)]
pub struct UpgradePolicy {
    store: StateStore,
}

impl UpgradePolicy {
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }

    /// Number of upgrades per minute, per tier.
    pub fn upgrades_per_minute(&self) -> UpgraderResult<f64> {
        Ok(self.store.read_upgrades_per_minute()?)
    }

    /// Set the number of upgrades per minute. Negative and non-finite rates
    /// are rejected and never persisted.
    pub fn set_upgrades_per_minute(&self, n: f64) -> UpgraderResult<()> {
        if !n.is_finite() || n < 0.0 {
            return Err(UpgraderError::InvalidRate(n));
        }
        self.store.write_upgrades_per_minute(n)?;
        info!(upgrades_per_minute = n, "upgrade rate changed");
        Ok(())
    }

    /// Major version for applications that do not pin one.
    pub fn target_major_version(&self) -> UpgraderResult<Option<u64>> {
        Ok(self.store.read_target_major_version()?)
    }

    /// Set the default target major version. `None` restores the normal
    /// rule of staying within the target's own major.
    pub fn set_target_major_version(&self, major: Option<u64>) -> UpgraderResult<()> {
        self.store.write_target_major_version(major)?;
        info!(target_major_version = ?major, "target major version changed");
        Ok(())
    }

    pub fn confidence_overrides(&self) -> UpgraderResult<BTreeMap<Version, Confidence>> {
        Ok(self.store.read_confidence_overrides()?)
    }

    /// Override the confidence of `version`, replacing its computed value.
    pub fn override_confidence(&self, version: Version, confidence: Confidence) -> UpgraderResult<()> {
        let _lock = self.store.lock(CONFIDENCE_OVERRIDES_LOCK);
        let mut overrides = self.store.read_confidence_overrides()?;
        overrides.insert(version.clone(), confidence);
        self.store.write_confidence_overrides(&overrides)?;
        info!(%version, %confidence, "confidence overridden");
        Ok(())
    }

    /// Remove every override whose version matches `predicate`. Returns the
    /// number removed.
    pub fn remove_confidence_overrides<P>(&self, mut predicate: P) -> UpgraderResult<usize>
    where
        P: FnMut(&Version) -> bool,
    {
        let _lock = self.store.lock(CONFIDENCE_OVERRIDES_LOCK);
        let mut overrides = self.store.read_confidence_overrides()?;
        let before = overrides.len();
        overrides.retain(|version, _| !predicate(version));
        let removed = before - overrides.len();
        if removed > 0 {
            self.store.write_confidence_overrides(&overrides)?;
            info!(removed, "confidence overrides removed");
        }
        Ok(removed)
    }

    /// Remove the override for one version. Returns whether it existed.
    pub fn remove_confidence_override(&self, version: &Version) -> UpgraderResult<bool> {
        Ok(self.remove_confidence_overrides(|v| v == version)? > 0)
    }

    /// All knobs at once.
    pub fn settings(&self) -> UpgraderResult<UpgradeSettings> {
        Ok(UpgradeSettings {
            upgrades_per_minute: self.upgrades_per_minute()?,
            target_major_version: self.target_major_version()?,
            confidence_overrides: self.confidence_overrides()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn policy() -> UpgradePolicy {
        UpgradePolicy::new(StateStore::open_in_memory().unwrap())
    }

    #[test]
    fn rate_rejects_negative_and_keeps_old_value() {
        let policy = policy();
        policy.set_upgrades_per_minute(2.0).unwrap();

        let result = policy.set_upgrades_per_minute(-1.0);
        assert!(matches!(result, Err(UpgraderError::InvalidRate(_))));
        assert!(matches!(
            policy.set_upgrades_per_minute(f64::NAN),
            Err(UpgraderError::InvalidRate(_))
        ));
        assert_eq!(policy.upgrades_per_minute().unwrap(), 2.0);
    }

    #[test]
    fn rate_rejects_infinity_and_keeps_old_value() {
        let policy = policy();
        policy.set_upgrades_per_minute(2.0).unwrap();

        for rate in [f64::INFINITY, f64::NEG_INFINITY] {
            assert!(matches!(
                policy.set_upgrades_per_minute(rate),
                Err(UpgraderError::InvalidRate(_))
            ));
        }
        assert_eq!(policy.upgrades_per_minute().unwrap(), 2.0);
        assert_eq!(policy.settings().unwrap().upgrades_per_minute, 2.0);
    }

    #[test]
    fn zero_rate_is_allowed() {
        let policy = policy();
        policy.set_upgrades_per_minute(0.0).unwrap();
        assert_eq!(policy.upgrades_per_minute().unwrap(), 0.0);
    }

    #[test]
    fn target_major_version_set_and_clear() {
        let policy = policy();
        assert_eq!(policy.target_major_version().unwrap(), None);
        policy.set_target_major_version(Some(7)).unwrap();
        assert_eq!(policy.target_major_version().unwrap(), Some(7));
        policy.set_target_major_version(None).unwrap();
        assert_eq!(policy.target_major_version().unwrap(), None);
    }

    #[test]
    fn override_replaces_previous_value() {
        let policy = policy();
        policy.override_confidence(v("7.1.0"), Confidence::High).unwrap();
        policy.override_confidence(v("7.1.0"), Confidence::Broken).unwrap();

        let overrides = policy.confidence_overrides().unwrap();
        assert_eq!(overrides.len(), 1);
        assert_eq!(overrides[&v("7.1.0")], Confidence::Broken);
    }

    #[test]
    fn remove_overrides_by_predicate() {
        let policy = policy();
        policy.override_confidence(v("6.9.0"), Confidence::Low).unwrap();
        policy.override_confidence(v("7.1.0"), Confidence::Broken).unwrap();
        policy.override_confidence(v("7.2.0"), Confidence::High).unwrap();

        let removed = policy.remove_confidence_overrides(|v| v.major == 7).unwrap();
        assert_eq!(removed, 2);
        assert_eq!(
            policy.confidence_overrides().unwrap().keys().collect::<Vec<_>>(),
            vec![&v("6.9.0")]
        );

        assert!(policy.remove_confidence_override(&v("6.9.0")).unwrap());
        assert!(!policy.remove_confidence_override(&v("6.9.0")).unwrap());
    }

    #[test]
    fn lock_is_released_after_each_write() {
        let store = StateStore::open_in_memory().unwrap();
        let policy = UpgradePolicy::new(store.clone());
        policy.override_confidence(v("7.1.0"), Confidence::High).unwrap();

        // Would block forever if the previous write leaked the lock.
        let _guard = store.lock(CONFIDENCE_OVERRIDES_LOCK);
    }

    #[test]
    fn concurrent_override_writes_are_not_lost() {
        let policy = policy();

        thread::scope(|s| {
            for writer in 0..4u64 {
                let policy = policy.clone();
                s.spawn(move || {
                    for patch in 0..25u64 {
                        policy
                            .override_confidence(Version::new(writer, 0, patch), Confidence::Normal)
                            .unwrap();
                    }
                });
            }
        });

        assert_eq!(policy.confidence_overrides().unwrap().len(), 100);
    }

    #[test]
    fn settings_reads_every_knob() {
        let policy = policy();
        policy.set_upgrades_per_minute(1.5).unwrap();
        policy.set_target_major_version(Some(8)).unwrap();
        policy.override_confidence(v("8.0.0"), Confidence::Low).unwrap();

        let settings = policy.settings().unwrap();
        assert_eq!(settings.upgrades_per_minute, 1.5);
        assert_eq!(settings.target_major_version, Some(8));
        assert_eq!(settings.confidence_overrides.len(), 1);
    }
}
