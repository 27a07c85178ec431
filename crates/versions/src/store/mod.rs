//! Backing store trait and implementations.
//!
//! The ledger never talks to a database directly. It is handed a [`Store`],
//! which provides the handful of table-level primitives the ledger is built
//! from. Swapping the store (SQLite on disk, SQLite in memory, or the plain
//! in-memory [`MemoryStore`] in tests) doesn't touch the ledger logic.

#[cfg(any(test, feature = "mock"))]
mod memory;
mod sqlite;

#[cfg(any(test, feature = "mock"))]
pub use self::memory::MemoryStore;
pub use self::sqlite::{SqliteOptions, SqliteStore};
use crate::error::Result;
use crate::models::{VersionKey, VersionRecord};
use async_trait::async_trait;

/// Table-level primitives the ledger needs from a database.
///
/// Every method takes the table name explicitly; a store may hold many
/// unrelated tables. Apart from [`table_exists`](Self::table_exists) and
/// [`create_table_if_not_exists`](Self::create_table_if_not_exists), methods
/// may assume the table exists: the ledger probes first, since what happens
/// when querying a missing table differs between engines.
#[async_trait]
pub trait Store: Send + Sync {
    /// Name of the backend, used for logging only.
    fn name(&self) -> &str;

    /// Whether a table with the given name exists.
    async fn table_exists(&self, table: &str) -> Result<bool>;

    /// Create the version table if it does not already exist.
    ///
    /// Must be safe to call repeatedly, including concurrently.
    async fn create_table_if_not_exists(&self, table: &str) -> Result<()>;

    /// Insert a record, replacing any existing record with the same key.
    async fn upsert(&self, table: &str, record: &VersionRecord) -> Result<()>;

    /// Delete the record with the given key, returning how many rows were
    /// removed. Zero is not an error.
    async fn delete(&self, table: &str, key: &VersionKey) -> Result<u64>;

    /// Versions of every row matching the key. An empty result is not an
    /// error.
    async fn query(&self, table: &str, key: &VersionKey) -> Result<Vec<i32>>;

    /// Every record in the table, ordered by key.
    async fn query_all(&self, table: &str) -> Result<Vec<VersionRecord>>;
}
