//! The version ledger: one integer version per feature instance.

use crate::Feature;
use crate::error::{ErrorKind, Result};
use crate::models::{VERSION_UNSET, VersionKey, VersionRecord};
use crate::store::Store;
use crate::table::VersionTable;
use std::sync::Arc;
use tracing::instrument;

/// Shared handle to the store a ledger reads and writes.
pub type StoreHandle = Arc<dyn Store>;

/// Records the schema version of each feature instance, so that every
/// feature can be versioned independently of the database containing it.
///
/// The ledger keeps no state of its own beyond the store handle. Its table is
/// created lazily on the first [`set_version`](Self::set_version); until
/// then reads report [`VERSION_UNSET`] and removals do nothing, so callers
/// don't have to provision anything up front.
///
/// Every failure reported by the store surfaces as [`ErrorKind::Database`].
/// Nothing is retried and no locking happens here: concurrent writers to the
/// same key are serialised by the store, and the last write wins.
///
/// # Examples
///
/// ```
/// use mediadb_versions::{Feature, SqliteStore, VersionLedger, VERSION_UNSET};
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> mediadb_versions::error::Result<()> {
/// let ledger = VersionLedger::new(Arc::new(SqliteStore::connect_in_memory().await?));
/// assert_eq!(ledger.get_version(Feature::CacheContentMetadata, "cache1").await?, VERSION_UNSET);
///
/// ledger.set_version(Feature::CacheContentMetadata, "cache1", 2).await?;
/// assert_eq!(ledger.get_version(Feature::CacheContentMetadata, "cache1").await?, 2);
///
/// ledger.remove_version(Feature::CacheContentMetadata, "cache1").await?;
/// assert_eq!(ledger.version(Feature::CacheContentMetadata, "cache1").await?, None);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct VersionLedger {
    store: StoreHandle,
    table: VersionTable,
}

impl VersionLedger {
    /// Create a ledger over the default version table.
    pub fn new(store: StoreHandle) -> Self {
        Self::with_table(store, VersionTable::default())
    }

    pub fn with_table(store: StoreHandle, table: VersionTable) -> Self {
        Self { store, table }
    }

    pub fn table(&self) -> &VersionTable {
        &self.table
    }

    /// Set the version of an instance of a feature, replacing any version
    /// already recorded for it.
    #[instrument(skip(self), fields(store = self.store.name(), table = self.table.name()))]
    pub async fn set_version(&self, feature: Feature, instance_uid: &str, version: i32) -> Result<()> {
        let table = self.table.name();
        self.store.create_table_if_not_exists(table).await.map_err(|err| err.raise(ErrorKind::Database))?;
        let record = VersionRecord::new(feature, instance_uid, version);
        self.store.upsert(table, &record).await.map_err(|err| err.raise(ErrorKind::Database))
    }

    /// Remove the version of an instance of a feature.
    ///
    /// Removing a version that was never set is not an error, and neither is
    /// removing from a database where no version was ever set.
    #[instrument(skip(self), fields(store = self.store.name(), table = self.table.name()))]
    pub async fn remove_version(&self, feature: Feature, instance_uid: &str) -> Result<()> {
        if !self.table_exists().await? {
            tracing::debug!("version table does not exist; nothing to remove");
            return Ok(());
        }
        let key = VersionKey::new(feature, instance_uid);
        let removed = self
            .store
            .delete(self.table.name(), &key)
            .await
            .map_err(|err| err.raise(ErrorKind::Database))?;
        tracing::debug!(removed, "removed version");
        Ok(())
    }

    /// Get the version of an instance of a feature, or [`VERSION_UNSET`] if
    /// no version is set.
    pub async fn get_version(&self, feature: Feature, instance_uid: &str) -> Result<i32> {
        Ok(self.version(feature, instance_uid).await?.unwrap_or(VERSION_UNSET))
    }

    /// Get the version of an instance of a feature, if one is set.
    #[instrument(skip(self), fields(store = self.store.name(), table = self.table.name()))]
    pub async fn version(&self, feature: Feature, instance_uid: &str) -> Result<Option<i32>> {
        if !self.table_exists().await? {
            tracing::debug!("version table does not exist; version is unset");
            return Ok(None);
        }
        let key = VersionKey::new(feature, instance_uid);
        let versions =
            self.store.query(self.table.name(), &key).await.map_err(|err| err.raise(ErrorKind::Database))?;
        if versions.len() > 1 {
            // The primary key should make this impossible; read the first
            // like any other query would and carry on.
            tracing::warn!(rows = versions.len(), "multiple versions recorded for one key");
        }
        Ok(versions.first().copied())
    }

    /// List every recorded version, ordered by feature and instance.
    ///
    /// Rows the store cannot decode (written by another client with an
    /// unknown feature id, say) are left out.
    #[instrument(skip(self), fields(store = self.store.name(), table = self.table.name()))]
    pub async fn list_versions(&self) -> Result<Vec<VersionRecord>> {
        if !self.table_exists().await? {
            return Ok(Vec::new());
        }
        self.store.query_all(self.table.name()).await.map_err(|err| err.raise(ErrorKind::Database))
    }

    async fn table_exists(&self) -> Result<bool> {
        self.store.table_exists(self.table.name()).await.map_err(|err| err.raise(ErrorKind::Database))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, SqliteOptions, SqliteStore};
    use rstest::rstest;

    #[derive(Clone, Copy, Debug)]
    enum Backend {
        Memory,
        Sqlite,
    }

    async fn ledger(backend: Backend) -> VersionLedger {
        let store: StoreHandle = match backend {
            Backend::Memory => Arc::new(MemoryStore::default()),
            Backend::Sqlite => Arc::new(SqliteStore::connect_in_memory().await.unwrap()),
        };
        VersionLedger::new(store)
    }

    #[rstest]
    #[case::memory(Backend::Memory)]
    #[case::sqlite(Backend::Sqlite)]
    #[tokio::test]
    async fn test_set_then_get(#[case] backend: Backend) {
        let ledger = ledger(backend).await;
        for (feature, uid, version) in [
            (Feature::Offline, "downloads", 0),
            (Feature::CacheFileMetadata, "", -7),
            (Feature::External(12), "plugin", i32::MAX),
        ] {
            ledger.set_version(feature, uid, version).await.unwrap();
            assert_eq!(ledger.get_version(feature, uid).await.unwrap(), version);
        }
    }

    #[rstest]
    #[case::memory(Backend::Memory)]
    #[case::sqlite(Backend::Sqlite)]
    #[tokio::test]
    async fn test_unset_key(#[case] backend: Backend) {
        let ledger = ledger(backend).await;
        ledger.set_version(Feature::Offline, "a", 1).await.unwrap();
        assert_eq!(ledger.get_version(Feature::Offline, "never-set").await.unwrap(), VERSION_UNSET);
        assert_eq!(ledger.version(Feature::Offline, "never-set").await.unwrap(), None);
    }

    #[rstest]
    #[case::memory(Backend::Memory)]
    #[case::sqlite(Backend::Sqlite)]
    #[tokio::test]
    async fn test_set_overwrites(#[case] backend: Backend) {
        let ledger = ledger(backend).await;
        ledger.set_version(Feature::CacheContentMetadata, "cache1", 1).await.unwrap();
        ledger.set_version(Feature::CacheContentMetadata, "cache1", 5).await.unwrap();
        assert_eq!(ledger.list_versions().await.unwrap(), vec![VersionRecord::new(
            Feature::CacheContentMetadata,
            "cache1",
            5
        )]);
    }

    #[rstest]
    #[case::memory(Backend::Memory)]
    #[case::sqlite(Backend::Sqlite)]
    #[tokio::test]
    async fn test_remove_then_get(#[case] backend: Backend) {
        let ledger = ledger(backend).await;
        ledger.set_version(Feature::Offline, "a", 3).await.unwrap();
        ledger.remove_version(Feature::Offline, "a").await.unwrap();
        assert_eq!(ledger.get_version(Feature::Offline, "a").await.unwrap(), VERSION_UNSET);
        // Removing again is a no-op.
        ledger.remove_version(Feature::Offline, "a").await.unwrap();
    }

    #[rstest]
    #[case::memory(Backend::Memory)]
    #[case::sqlite(Backend::Sqlite)]
    #[tokio::test]
    async fn test_keys_are_independent(#[case] backend: Backend) {
        let ledger = ledger(backend).await;
        ledger.set_version(Feature::CacheFileMetadata, "a", 5).await.unwrap();
        assert_eq!(ledger.get_version(Feature::CacheFileMetadata, "b").await.unwrap(), VERSION_UNSET);
        ledger.set_version(Feature::Offline, "x", 1).await.unwrap();
        assert_eq!(ledger.get_version(Feature::CacheContentMetadata, "x").await.unwrap(), VERSION_UNSET);
        ledger.set_version(Feature::CacheContentMetadata, "x", 2).await.unwrap();
        ledger.remove_version(Feature::Offline, "x").await.unwrap();
        assert_eq!(ledger.get_version(Feature::CacheContentMetadata, "x").await.unwrap(), 2);
        assert_eq!(ledger.get_version(Feature::CacheFileMetadata, "a").await.unwrap(), 5);
    }

    #[rstest]
    #[case::memory(Backend::Memory)]
    #[case::sqlite(Backend::Sqlite)]
    #[tokio::test]
    async fn test_cache_metadata_lifecycle(#[case] backend: Backend) {
        let ledger = ledger(backend).await;
        ledger.set_version(Feature::CacheContentMetadata, "cache1", 2).await.unwrap();
        assert_eq!(ledger.get_version(Feature::CacheContentMetadata, "cache1").await.unwrap(), 2);
        ledger.set_version(Feature::CacheContentMetadata, "cache1", 3).await.unwrap();
        assert_eq!(ledger.get_version(Feature::CacheContentMetadata, "cache1").await.unwrap(), 3);
        ledger.remove_version(Feature::CacheContentMetadata, "cache1").await.unwrap();
        assert_eq!(ledger.get_version(Feature::CacheContentMetadata, "cache1").await.unwrap(), -1);
    }

    #[rstest]
    #[case::memory(Backend::Memory)]
    #[case::sqlite(Backend::Sqlite)]
    #[tokio::test]
    async fn test_fresh_store_has_no_table(#[case] backend: Backend) {
        let ledger = ledger(backend).await;
        assert_eq!(ledger.get_version(Feature::Offline, "x").await.unwrap(), -1);
        ledger.remove_version(Feature::Offline, "x").await.unwrap();
        assert!(ledger.list_versions().await.unwrap().is_empty());
        assert!(!ledger.store.table_exists(ledger.table().name()).await.unwrap());
        ledger.set_version(Feature::Offline, "x", 1).await.unwrap();
        assert!(ledger.store.table_exists(ledger.table().name()).await.unwrap());
    }

    #[rstest]
    #[case::memory(Backend::Memory)]
    #[case::sqlite(Backend::Sqlite)]
    #[tokio::test]
    async fn test_prefix_case_shares_table(#[case] backend: Backend) {
        let store = ledger(backend).await.store;
        let upper = VersionLedger::with_table(store.clone(), VersionTable::with_prefix("Media").unwrap());
        let lower = VersionLedger::with_table(store, VersionTable::with_prefix("media").unwrap());
        upper.set_version(Feature::Offline, "seed", 1).await.unwrap();
        lower.set_version(Feature::Offline, "a", 5).await.unwrap();
        assert_eq!(lower.get_version(Feature::Offline, "a").await.unwrap(), 5);
        assert_eq!(lower.get_version(Feature::Offline, "seed").await.unwrap(), 1);
        assert_eq!(upper.get_version(Feature::Offline, "a").await.unwrap(), 5);
        lower.remove_version(Feature::Offline, "seed").await.unwrap();
        assert_eq!(upper.get_version(Feature::Offline, "seed").await.unwrap(), VERSION_UNSET);
    }

    #[tokio::test]
    async fn test_custom_table() {
        let store: StoreHandle = Arc::new(SqliteStore::connect_in_memory().await.unwrap());
        let media = VersionLedger::with_table(store.clone(), VersionTable::with_prefix("Media").unwrap());
        let other = VersionLedger::new(store.clone());
        media.set_version(Feature::Offline, "a", 4).await.unwrap();
        assert!(store.table_exists("MediaVersions").await.unwrap());
        assert_eq!(other.get_version(Feature::Offline, "a").await.unwrap(), VERSION_UNSET);
    }

    #[tokio::test]
    async fn test_duplicate_rows_read_first() {
        let table = VersionTable::default();
        let store = MemoryStore::with_rows(table.name(), [
            VersionRecord::new(Feature::Offline, "a", 7),
            VersionRecord::new(Feature::Offline, "a", 8),
        ]);
        let ledger = VersionLedger::with_table(Arc::new(store), table);
        assert_eq!(ledger.get_version(Feature::Offline, "a").await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_store_failures_are_database_errors() {
        let store = Arc::new(MemoryStore::default());
        let ledger = VersionLedger::new(store.clone());
        ledger.set_version(Feature::Offline, "a", 1).await.unwrap();
        store.set_failing(true);
        let err = ledger.set_version(Feature::Offline, "a", 2).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Database);
        let err = ledger.get_version(Feature::Offline, "a").await.unwrap_err();
        assert_eq!(*err, ErrorKind::Database);
        let err = ledger.remove_version(Feature::Offline, "a").await.unwrap_err();
        assert_eq!(*err, ErrorKind::Database);
        let err = ledger.list_versions().await.unwrap_err();
        assert_eq!(*err, ErrorKind::Database);
        store.set_failing(false);
        assert_eq!(ledger.get_version(Feature::Offline, "a").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_closed_sqlite_store_is_a_database_error() {
        let store = Arc::new(SqliteStore::connect_in_memory().await.unwrap());
        let ledger = VersionLedger::new(store.clone());
        store.close().await;
        let err = ledger.set_version(Feature::Offline, "a", 1).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Database);
    }

    #[tokio::test]
    async fn test_versions_survive_reconnect() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("media.db");
        let store = SqliteStore::connect(&path, Default::default()).await.unwrap();
        VersionLedger::new(Arc::new(store.clone())).set_version(Feature::Offline, "dl", 9).await.unwrap();
        store.close().await;
        let store = SqliteStore::connect(&path, Default::default()).await.unwrap();
        let ledger = VersionLedger::new(Arc::new(store.clone()));
        assert_eq!(ledger.get_version(Feature::Offline, "dl").await.unwrap(), 9);
        store.close().await;
    }

    async fn race_first_use(ledger: VersionLedger, writers: i32) {
        let tasks = (0..writers)
            .map(|i| {
                let ledger = ledger.clone();
                tokio::spawn(async move { ledger.set_version(Feature::External(0), &format!("instance-{i}"), i).await })
            })
            .collect::<Vec<_>>();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        let versions = ledger.list_versions().await.unwrap();
        assert_eq!(versions.len(), writers as usize);
        for i in 0..writers {
            assert_eq!(ledger.get_version(Feature::External(0), &format!("instance-{i}")).await.unwrap(), i);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_use_memory() {
        race_first_use(VersionLedger::new(Arc::new(MemoryStore::default())), 8).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_use_sqlite_file() {
        let dir = tempfile::tempdir().unwrap();
        let options = SqliteOptions { max_connections: 8, busy_timeout: std::time::Duration::from_secs(10) };
        let store = SqliteStore::connect(dir.path().join("media.db"), options).await.unwrap();
        race_first_use(VersionLedger::new(Arc::new(store.clone())), 16).await;
        store.close().await;
    }
}
