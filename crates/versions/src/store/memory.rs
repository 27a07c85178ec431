//! In-memory store for testing.

use super::Store;
use crate::error::{ErrorKind, Result};
use crate::models::{VersionKey, VersionRecord};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

type Table = BTreeMap<VersionKey, Vec<i32>>;

/// In-memory store for testing.
///
/// Tables are kept in a `HashMap` behind a [`RwLock`], so all trait methods
/// can operate on `&self` without external synchronisation. Like a real
/// database, querying a table that was never created is an error; the ledger
/// is expected to probe with [`table_exists`](Store::table_exists) first.
/// Table names are case-insensitive, as they are in SQLite.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Table>>,
    failing: AtomicBool,
}

impl MemoryStore {
    /// Create a store that already holds the given rows.
    ///
    /// Rows are kept exactly as given: a key listed twice ends up with two
    /// rows, something a real primary key would never allow. Useful for
    /// testing how readers cope with a broken uniqueness invariant.
    pub fn with_rows(table: impl Into<String>, rows: impl IntoIterator<Item = VersionRecord>) -> Self {
        let mut contents = Table::new();
        for record in rows {
            contents.entry(record.key).or_default().push(record.version);
        }
        Self {
            tables: RwLock::new(HashMap::from([(table_key(&table.into()), contents)])),
            failing: AtomicBool::new(false),
        }
    }

    /// Make every subsequent operation fail (or succeed again), as if the
    /// database had become unavailable.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            exn::bail!(ErrorKind::Query);
        }
        Ok(())
    }
}

fn table_key(table: &str) -> String {
    table.to_ascii_lowercase()
}

#[async_trait]
impl Store for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        self.check_available()?;
        Ok(self.tables.read().await.contains_key(&table_key(table)))
    }

    async fn create_table_if_not_exists(&self, table: &str) -> Result<()> {
        self.check_available()?;
        self.tables.write().await.entry(table_key(table)).or_default();
        Ok(())
    }

    async fn upsert(&self, table: &str, record: &VersionRecord) -> Result<()> {
        self.check_available()?;
        let mut guard = self.tables.write().await;
        let rows = guard.get_mut(&table_key(table)).ok_or_else(|| exn::Exn::from(ErrorKind::Query))?;
        rows.insert(record.key.clone(), vec![record.version]);
        Ok(())
    }

    async fn delete(&self, table: &str, key: &VersionKey) -> Result<u64> {
        self.check_available()?;
        let mut guard = self.tables.write().await;
        let rows = guard.get_mut(&table_key(table)).ok_or_else(|| exn::Exn::from(ErrorKind::Query))?;
        Ok(rows.remove(key).map_or(0, |versions| versions.len() as u64))
    }

    async fn query(&self, table: &str, key: &VersionKey) -> Result<Vec<i32>> {
        self.check_available()?;
        let guard = self.tables.read().await;
        let rows = guard.get(&table_key(table)).ok_or_else(|| exn::Exn::from(ErrorKind::Query))?;
        Ok(rows.get(key).cloned().unwrap_or_default())
    }

    async fn query_all(&self, table: &str) -> Result<Vec<VersionRecord>> {
        self.check_available()?;
        let guard = self.tables.read().await;
        let rows = guard.get(&table_key(table)).ok_or_else(|| exn::Exn::from(ErrorKind::Query))?;
        Ok(rows
            .iter()
            .flat_map(|(key, versions)| {
                versions.iter().map(|version| VersionRecord { key: key.clone(), version: *version })
            })
            .collect())
    }
}
