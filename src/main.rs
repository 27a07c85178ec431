//! Command-line access to the media database version ledger.
//!
//! Mostly useful for debugging migrations: check which version a cache
//! directory was last written with, or reset it to force a rebuild.

use clap::{Parser, Subcommand};
use mediadb_config::Config;
use mediadb_versions::{Feature, SqliteOptions, SqliteStore, VersionLedger, VersionTable};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "mediadb", version, about)]
struct Cli {
    /// Config file (TOML, YAML or JSON).
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,
    /// Database file, overriding the configured one.
    #[arg(long, global = true)]
    database: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the version of a feature instance (-1 if unset).
    Get {
        /// Feature name (`offline`, `cache-content-metadata`,
        /// `cache-file-metadata`, `external[:N]`) or numeric id.
        #[arg(value_parser = parse_feature)]
        feature: Feature,
        instance_uid: String,
    },
    /// Set the version of a feature instance.
    Set {
        #[arg(value_parser = parse_feature)]
        feature: Feature,
        instance_uid: String,
        #[arg(allow_negative_numbers = true)]
        version: i32,
    },
    /// Forget the version of a feature instance.
    Remove {
        #[arg(value_parser = parse_feature)]
        feature: Feature,
        instance_uid: String,
    },
    /// Print every recorded version.
    List,
}

fn parse_feature(s: &str) -> Result<Feature, String> {
    s.parse::<Feature>().map_err(|err| err.to_string())
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().compact().with_target(false).with_writer(std::io::stderr))
        .init();
}

async fn run(cli: Cli, config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let path = cli.database.unwrap_or(config.database.path);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let options = SqliteOptions {
        max_connections: config.database.max_connections,
        busy_timeout: Duration::from_millis(config.database.busy_timeout_ms),
    };
    let store = Arc::new(SqliteStore::connect(&path, options).await.map_err(|err| format!("{err:?}"))?);
    let table = VersionTable::with_prefix(&config.ledger.table_prefix).map_err(|err| format!("{err:?}"))?;
    let ledger = VersionLedger::with_table(store.clone(), table);

    let result = match cli.command {
        Command::Get { feature, instance_uid } => {
            ledger.get_version(feature, &instance_uid).await.map(|version| println!("{version}"))
        },
        Command::Set { feature, instance_uid, version } => ledger.set_version(feature, &instance_uid, version).await,
        Command::Remove { feature, instance_uid } => ledger.remove_version(feature, &instance_uid).await,
        Command::List => ledger.list_versions().await.map(|records| {
            for record in records {
                println!("{}\t{}\t{}", record.key.feature, record.key.instance_uid, record.version);
            }
        }),
    };
    store.close().await;
    result.map_err(|err| format!("{err:?}").into())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err:?}");
            return ExitCode::FAILURE;
        },
    };
    init_logging(&config.log.level);
    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err}");
            ExitCode::FAILURE
        },
    }
}
