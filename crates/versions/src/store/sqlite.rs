//! SQLite store backed by an sqlx connection pool.

use super::Store;
use crate::error::{ErrorKind, Result};
use crate::models::{VersionKey, VersionRecord, VersionRow};
use async_trait::async_trait;
use exn::ResultExt;
use sqlx::SqliteConnection;
use sqlx::pool::PoolConnectionMetadata;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use std::time::Duration;
use tracing::instrument;

// Version bookkeeping is a handful of tiny statements; a small pool is plenty.
const MAX_CONNECTIONS: u32 = 5;
const BUSY_TIMEOUT: Duration = Duration::from_millis(1500);

/// Pool tuning for [`SqliteStore::connect`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SqliteOptions {
    pub max_connections: u32,
    pub busy_timeout: Duration,
}
impl Default for SqliteOptions {
    fn default() -> Self {
        Self { max_connections: MAX_CONNECTIONS, busy_timeout: BUSY_TIMEOUT }
    }
}

/// SQLite implementation of [`Store`].
///
/// Table names are interpolated into the statements in `queries/`, so they
/// must come from a validated [`VersionTable`](crate::VersionTable).
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    async fn new(options: SqliteConnectOptions, max: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            // `apply_pragmas` settings are per connection; run them on each.
            .after_connect(|conn, meta| Box::pin(async move { Self::apply_pragmas(conn, meta).await }))
            .max_connections(max)
            .connect_with(options)
            .await
            .or_raise(|| ErrorKind::Connection)?;
        Ok(Self { pool })
    }

    /// Connect to the database at the given path.
    ///
    /// Creates the database file if it doesn't exist. No tables are created
    /// until the first version is written.
    #[instrument("connecting to version database", skip(path), fields(path = %path.as_ref().display()))]
    pub async fn connect(path: impl AsRef<Path>, options: SqliteOptions) -> Result<Self> {
        let connect = Self::base_options(options.busy_timeout).filename(path.as_ref()).create_if_missing(true);
        Self::new(connect, options.max_connections.max(1)).await
    }

    /// Connect to a private in-memory database, gone once the store closes.
    ///
    /// Available outside tests so that crates embedding the ledger can use it
    /// in theirs.
    pub async fn connect_in_memory() -> Result<Self> {
        let options = Self::base_options(BUSY_TIMEOUT).filename(":memory:");
        // Every `:memory:` connection is its own database.
        Self::new(options, 1).await
    }

    fn base_options(busy_timeout: Duration) -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            // Version reads happen on startup of every feature, often while
            // another one is writing.
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            // The cache and offline subsystems may share the database file
            // and write at the same time.
            .busy_timeout(busy_timeout)
    }

    /// Pragmas with no `SqliteConnectOptions` setter.
    async fn apply_pragmas(conn: &mut SqliteConnection, _meta: PoolConnectionMetadata) -> sqlx::Result<()> {
        sqlx::query(
            r#"
                PRAGMA locking_mode = NORMAL;
                PRAGMA temp_store = MEMORY;
            "#,
        )
        .execute(conn)
        .await?;
        Ok(())
    }

    /// The pool behind this store, for callers keeping their own tables in
    /// the same database.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the store once every checked-out connection is back.
    ///
    /// Later operations fail with [`ErrorKind::Query`].
    pub async fn close(&self) {
        // Best effort; the pool closes regardless.
        _ = sqlx::query("PRAGMA optimize").execute(&self.pool).await;
        self.pool.close().await;
    }

    fn statement(template: &str, table: &str) -> String {
        template.replace("{table}", table)
    }
}

#[async_trait]
impl Store for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        sqlx::query_scalar::<_, bool>(include_str!("../../queries/table_exists.sql"))
            .bind(table)
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Query)
    }

    #[instrument(level = "debug", skip(self))]
    async fn create_table_if_not_exists(&self, table: &str) -> Result<()> {
        sqlx::query(&Self::statement(include_str!("../../queries/create_table.sql"), table))
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Query)?;
        Ok(())
    }

    async fn upsert(&self, table: &str, record: &VersionRecord) -> Result<()> {
        let row = VersionRow::from(record);
        sqlx::query(&Self::statement(include_str!("../../queries/upsert_version.sql"), table))
            .bind(row.feature)
            .bind(row.instance_uid)
            .bind(row.version)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Query)?;
        Ok(())
    }

    async fn delete(&self, table: &str, key: &VersionKey) -> Result<u64> {
        let result = sqlx::query(&Self::statement(include_str!("../../queries/delete_version.sql"), table))
            .bind(key.feature.id())
            .bind(key.instance_uid.as_str())
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Query)?;
        Ok(result.rows_affected())
    }

    async fn query(&self, table: &str, key: &VersionKey) -> Result<Vec<i32>> {
        let versions: Vec<i64> = sqlx::query_scalar(&Self::statement(include_str!("../../queries/get_version.sql"), table))
            .bind(key.feature.id())
            .bind(key.instance_uid.as_str())
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Query)?;
        versions
            .into_iter()
            .map(|v| i32::try_from(v).or_raise(|| ErrorKind::InvalidData("version")))
            .collect()
    }

    async fn query_all(&self, table: &str) -> Result<Vec<VersionRecord>> {
        let rows: Vec<VersionRow> = sqlx::query_as(&Self::statement(include_str!("../../queries/list_versions.sql"), table))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Query)?;
        // Other clients share this table; one row we can't decode shouldn't
        // hide the rest of the listing.
        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let feature = row.feature;
                VersionRecord::try_from(row)
                    .inspect_err(|err| tracing::warn!(feature, error = ?err, "skipping unreadable version row"))
                    .ok()
            })
            .collect())
    }
}
