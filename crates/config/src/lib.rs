//! Configuration for mediadb.
//!
//! Values are layered, later layers winning:
//! 1. built-in defaults,
//! 2. an optional config file (TOML, YAML or JSON, chosen by extension),
//! 3. environment variables prefixed with `MEDIADB_`, nested with `__`
//!    (for example `MEDIADB_DATABASE__PATH=/tmp/media.db`).

pub mod error;

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use mediadb_versions::{DEFAULT_TABLE_PREFIX, VersionTable};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "MEDIADB_";
const DATABASE_FILE: &str = "media.db";

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub ledger: LedgerConfig,
    pub log: LogConfig,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Location of the SQLite database file.
    pub path: PathBuf,
    pub max_connections: u32,
    /// How long to wait on a locked database before giving up.
    pub busy_timeout_ms: u64,
}
impl Default for DatabaseConfig {
    fn default() -> Self {
        let path = directories::ProjectDirs::from("", "", "mediadb")
            .map(|dirs| dirs.data_dir().join(DATABASE_FILE))
            .unwrap_or_else(|| PathBuf::from(DATABASE_FILE));
        Self { path, max_connections: 5, busy_timeout_ms: 1500 }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct LedgerConfig {
    /// Prefix of the version table name (`{prefix}Versions`).
    pub table_prefix: String,
}
impl Default for LedgerConfig {
    fn default() -> Self {
        Self { table_prefix: DEFAULT_TABLE_PREFIX.to_string() }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct LogConfig {
    /// Default `tracing` filter directive; `RUST_LOG` takes precedence.
    pub level: String,
}
impl Default for LogConfig {
    fn default() -> Self {
        Self { level: "info".to_string() }
    }
}

impl Config {
    /// Build the layered figment: defaults, then `file` (if any), then the
    /// environment.
    pub fn figment(file: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));
        if let Some(path) = file {
            if !path.is_file() {
                exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
            }
            figment = match path.extension().and_then(|ext| ext.to_str()).map(str::to_lowercase).as_deref() {
                Some("toml") => figment.merge(Toml::file(path)),
                Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
                Some("json") => figment.merge(Json::file(path)),
                _ => exn::bail!(ErrorKind::UnsupportedFormat(path.to_path_buf())),
            };
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Load and validate configuration.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        Self::from_figment(Self::figment(file)?)
    }

    /// Extract and validate configuration from an already assembled figment.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        tracing::debug!(database = %config.database.path.display(), "configuration loaded");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.max_connections == 0 {
            exn::bail!(ErrorKind::Invalid("database.max_connections"));
        }
        // Same rule the ledger applies when naming its table.
        if VersionTable::with_prefix(&self.ledger.table_prefix).is_err() {
            exn::bail!(ErrorKind::Invalid("ledger.table_prefix"));
        }
        Ok(())
    }
}
