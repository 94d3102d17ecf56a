//! StateStore — redb-backed state persistence for FleetGrid.
//!
//! Provides typed access to application records, the platform version
//! status and the upgrade settings. All values are JSON-serialized into
//! redb's `&[u8]` value columns. The store supports both on-disk and
//! in-memory backends (the latter for testing).

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use semver::Version;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::lock::{LockTable, StoreLock};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
    locks: LockTable,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self {
            db: Arc::new(db),
            locks: LockTable::new(),
        };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self {
            db: Arc::new(db),
            locks: LockTable::new(),
        };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(APPLICATIONS).map_err(map_err!(Table))?;
        txn.open_table(VERSION_STATUS).map_err(map_err!(Table))?;
        txn.open_table(SETTINGS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Acquire the named exclusive lock. Released when the guard drops.
    pub fn lock(&self, name: &str) -> StoreLock {
        self.locks.acquire(name)
    }

    // ── Applications ───────────────────────────────────────────────

    /// Insert or replace an application record.
    pub fn put_application(&self, record: &ApplicationRecord) -> StateResult<()> {
        let key = record.table_key();
        self.put_value(APPLICATIONS, &key, record)?;
        debug!(%key, "application stored");
        Ok(())
    }

    /// Get an application by `{tenant}/{application}` key.
    pub fn get_application(&self, key: &str) -> StateResult<Option<ApplicationRecord>> {
        self.get_value(APPLICATIONS, key)
    }

    /// List all applications, ordered by key.
    pub fn list_applications(&self) -> StateResult<Vec<ApplicationRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(APPLICATIONS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let record: ApplicationRecord =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(record);
        }
        Ok(results)
    }

    /// Delete an application by key. Returns true if it existed.
    pub fn delete_application(&self, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(APPLICATIONS).map_err(map_err!(Table))?;
            existed = table.remove(key).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, existed, "application deleted");
        Ok(existed)
    }

    /// Read-modify-write one application inside a single write transaction.
    ///
    /// `mutate` returns whether it changed the record; unchanged records are
    /// not rewritten. An error from `mutate` aborts the transaction.
    pub fn update_application<F>(&self, key: &str, mutate: F) -> StateResult<bool>
    where
        F: FnOnce(&mut ApplicationRecord) -> StateResult<bool>,
    {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let changed = {
            let mut table = txn.open_table(APPLICATIONS).map_err(map_err!(Table))?;
            let mut record: ApplicationRecord = match table.get(key).map_err(map_err!(Read))? {
                Some(guard) => {
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?
                }
                None => return Err(StateError::NotFound(key.to_string())),
            };
            let changed = mutate(&mut record)?;
            if changed {
                let value = serde_json::to_vec(&record).map_err(map_err!(Serialize))?;
                table
                    .insert(key, value.as_slice())
                    .map_err(map_err!(Write))?;
            }
            changed
        };
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(changed)
    }

    // ── Versions ───────────────────────────────────────────────────

    /// Replace the platform version status.
    pub fn put_version_status(&self, status: &VersionStatus) -> StateResult<()> {
        self.put_value(VERSION_STATUS, VERSION_STATUS_KEY, status)?;
        debug!(
            system_version = ?status.system_version,
            versions = status.versions.len(),
            "version status stored"
        );
        Ok(())
    }

    /// The current version status; empty if none has been written.
    pub fn version_status(&self) -> StateResult<VersionStatus> {
        Ok(self
            .get_value(VERSION_STATUS, VERSION_STATUS_KEY)?
            .unwrap_or_default())
    }

    // ── Settings ───────────────────────────────────────────────────

    pub fn read_upgrades_per_minute(&self) -> StateResult<f64> {
        Ok(self
            .get_value(SETTINGS, UPGRADES_PER_MINUTE_KEY)?
            .unwrap_or(DEFAULT_UPGRADES_PER_MINUTE))
    }

    pub fn write_upgrades_per_minute(&self, n: f64) -> StateResult<()> {
        self.put_value(SETTINGS, UPGRADES_PER_MINUTE_KEY, &n)
    }

    pub fn read_target_major_version(&self) -> StateResult<Option<u64>> {
        Ok(self
            .get_value::<Option<u64>>(SETTINGS, TARGET_MAJOR_VERSION_KEY)?
            .flatten())
    }

    pub fn write_target_major_version(&self, major: Option<u64>) -> StateResult<()> {
        self.put_value(SETTINGS, TARGET_MAJOR_VERSION_KEY, &major)
    }

    pub fn read_confidence_overrides(&self) -> StateResult<BTreeMap<Version, Confidence>> {
        Ok(self
            .get_value(SETTINGS, CONFIDENCE_OVERRIDES_KEY)?
            .unwrap_or_default())
    }

    /// Overwrite the whole override map. Callers doing read-modify-write
    /// must hold the overrides lock.
    pub fn write_confidence_overrides(
        &self,
        overrides: &BTreeMap<Version, Confidence>,
    ) -> StateResult<()> {
        self.put_value(SETTINGS, CONFIDENCE_OVERRIDES_KEY, overrides)?;
        debug!(count = overrides.len(), "confidence overrides stored");
        Ok(())
    }

    // ── Internal helpers ───────────────────────────────────────────

    fn get_value<T: DeserializeOwned>(
        &self,
        definition: TableDefinition<'static, &'static str, &'static [u8]>,
        key: &str,
    ) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(definition).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let value: T =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn put_value<T: Serialize + ?Sized>(
        &self,
        definition: TableDefinition<'static, &'static str, &'static [u8]>,
        key: &str,
        value: &T,
    ) -> StateResult<()> {
        let value = serde_json::to_vec(value).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(definition).map_err(map_err!(Table))?;
            table
                .insert(key, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn test_application(tenant: &str, name: &str) -> ApplicationRecord {
        let mut record = ApplicationRecord::new(ApplicationId::new(tenant, name), Tier::Default);
        record
            .deployments
            .push(Deployment::new("prod.us-east-3", v("7.1.0")));
        record
    }

    // ── Application CRUD ───────────────────────────────────────────

    #[test]
    fn application_put_and_get() {
        let store = StateStore::open_in_memory().unwrap();
        let record = test_application("vespa", "music");

        store.put_application(&record).unwrap();
        let retrieved = store.get_application("vespa/music").unwrap();

        assert_eq!(retrieved, Some(record));
    }

    #[test]
    fn application_get_nonexistent_returns_none() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.get_application("nope/nothing").unwrap().is_none());
    }

    #[test]
    fn application_list_all() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_application(&test_application("t1", "a")).unwrap();
        store.put_application(&test_application("t1", "b")).unwrap();
        store.put_application(&test_application("t2", "c")).unwrap();

        let all = store.list_applications().unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].id, ApplicationId::new("t1", "a"));
    }

    #[test]
    fn application_delete() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_application(&test_application("t", "a")).unwrap();

        assert!(store.delete_application("t/a").unwrap());
        assert!(!store.delete_application("t/a").unwrap());
        assert!(store.get_application("t/a").unwrap().is_none());
    }

    #[test]
    fn update_application_writes_when_changed() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_application(&test_application("t", "a")).unwrap();

        let changed = store
            .update_application("t/a", |record| {
                record.change = Some(Change::platform(v("7.2.0")));
                Ok(true)
            })
            .unwrap();
        assert!(changed);

        let record = store.get_application("t/a").unwrap().unwrap();
        assert!(record.is_upgrading_to(&v("7.2.0")));
    }

    #[test]
    fn update_application_error_leaves_record_untouched() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_application(&test_application("t", "a")).unwrap();

        let result = store.update_application("t/a", |record| {
            record.change = Some(Change::platform(v("7.2.0")));
            Err(StateError::Conflict("refused".to_string()))
        });
        assert!(matches!(result, Err(StateError::Conflict(_))));
        assert!(store.get_application("t/a").unwrap().unwrap().change.is_none());
    }

    #[test]
    fn update_missing_application_is_not_found() {
        let store = StateStore::open_in_memory().unwrap();
        let result = store.update_application("t/missing", |_| Ok(true));
        assert!(matches!(result, Err(StateError::NotFound(_))));
    }

    // ── Versions ───────────────────────────────────────────────────

    #[test]
    fn version_status_defaults_to_empty() {
        let store = StateStore::open_in_memory().unwrap();
        let status = store.version_status().unwrap();
        assert!(status.system_version.is_none());
        assert!(status.versions.is_empty());
    }

    #[test]
    fn version_status_put_and_get() {
        let store = StateStore::open_in_memory().unwrap();
        let status = VersionStatus::new(
            Some(v("7.2.0")),
            vec![VersionRecord {
                version: v("7.2.0"),
                confidence: Confidence::Normal,
                is_system_version: true,
            }],
        );
        store.put_version_status(&status).unwrap();
        assert_eq!(store.version_status().unwrap(), status);
    }

    // ── Settings ───────────────────────────────────────────────────

    #[test]
    fn settings_have_defaults() {
        let store = StateStore::open_in_memory().unwrap();
        assert_eq!(
            store.read_upgrades_per_minute().unwrap(),
            DEFAULT_UPGRADES_PER_MINUTE
        );
        assert_eq!(store.read_target_major_version().unwrap(), None);
        assert!(store.read_confidence_overrides().unwrap().is_empty());
    }

    #[test]
    fn settings_are_independent_records() {
        let store = StateStore::open_in_memory().unwrap();
        store.write_upgrades_per_minute(2.5).unwrap();
        store.write_target_major_version(Some(8)).unwrap();

        assert_eq!(store.read_upgrades_per_minute().unwrap(), 2.5);
        assert_eq!(store.read_target_major_version().unwrap(), Some(8));

        store.write_target_major_version(None).unwrap();
        assert_eq!(store.read_target_major_version().unwrap(), None);
        assert_eq!(store.read_upgrades_per_minute().unwrap(), 2.5);
    }

    #[test]
    fn confidence_overrides_round_trip() {
        let store = StateStore::open_in_memory().unwrap();
        let mut overrides = BTreeMap::new();
        overrides.insert(v("7.1.0"), Confidence::Broken);
        overrides.insert(v("7.2.0"), Confidence::High);

        store.write_confidence_overrides(&overrides).unwrap();
        assert_eq!(store.read_confidence_overrides().unwrap(), overrides);
    }

    #[test]
    fn clones_share_locks() {
        let store = StateStore::open_in_memory().unwrap();
        let clone = store.clone();
        let guard = store.lock("confidence_overrides");
        assert!(clone.locks.is_held("confidence_overrides"));
        drop(guard);
        assert!(!clone.locks.is_held("confidence_overrides"));
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.redb");

        {
            let store = StateStore::open(&db_path).unwrap();
            store.put_application(&test_application("prod", "api")).unwrap();
            store.write_upgrades_per_minute(4.0).unwrap();
        }

        // Reopen the same database file.
        let store = StateStore::open(&db_path).unwrap();
        assert!(store.get_application("prod/api").unwrap().is_some());
        assert_eq!(store.read_upgrades_per_minute().unwrap(), 4.0);
    }
}
