//! Collector configuration from environment variables and command-line flags
//!
//! Environment is read first (after `.env` is loaded by the binary), then the
//! command-line flags override the matching fields.

use crate::error::{CollectorError, Result};
use clap::Parser;
use log::LevelFilter;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// DCR mainnet launch, the earliest time any source can have data for.
pub const DEFAULT_PROJECT_EPOCH: i64 = 1_454_889_600;

/// Binance klines page cap.
pub const DEFAULT_BINANCE_LIMIT: usize = 1000;

/// Immutable values handed to every source adapter at construction.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Start bound used when an adapter is asked for full history (`since == 0`).
    pub epoch: i64,

    /// Page size requested from (and capped by) Binance.
    pub binance_limit: usize,

    /// Per-request HTTP timeout.
    pub http_timeout: Duration,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            epoch: DEFAULT_PROJECT_EPOCH,
            binance_limit: DEFAULT_BINANCE_LIMIT,
            http_timeout: Duration::from_secs(300),
        }
    }
}

/// Configuration for the collector runtime
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Path to the SQLite database file
    pub db_path: String,

    /// Poll interval in seconds
    pub interval_secs: i64,

    /// How many seconds before an interval boundary a poll fires
    pub lead_secs: i64,

    /// Paginated backfill stops once records are this close to now
    pub backfill_safety_secs: i64,

    /// Enabled exchange source names, in collection order
    pub exchange_sources: Vec<String>,

    /// Enabled pool source names, in collection order
    pub pow_sources: Vec<String>,

    /// Only log errors
    pub quiet: bool,

    /// Drop both tables and exit without collecting
    pub drop_tables: bool,

    pub sources: SourceConfig,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            db_path: "dcrextdata.db".to_string(),
            interval_secs: 1800,
            lead_secs: 70,
            backfill_safety_secs: 3600,
            exchange_sources: vec!["bleutrade".to_string(), "binance".to_string()],
            pow_sources: vec!["luxor".to_string(), "f2pool".to_string()],
            quiet: false,
            drop_tables: false,
            sources: SourceConfig::default(),
        }
    }
}

impl CollectorConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `DCREXTDATA_DB_PATH` (default: dcrextdata.db)
    /// - `COLLECT_INTERVAL_SECS` (default: 1800)
    /// - `COLLECT_LEAD_SECS` (default: 70)
    /// - `BACKFILL_SAFETY_SECS` (default: 3600)
    /// - `HTTP_TIMEOUT_SECS` (default: 300)
    /// - `BINANCE_LIMIT` (default: 1000)
    /// - `PROJECT_EPOCH` (default: 1454889600)
    /// - `EXCHANGE_SOURCES` (default: bleutrade,binance)
    /// - `POW_SOURCES` (default: luxor,f2pool)
    /// - `QUIET` (default: false)
    /// - `DROP_TABLES` (default: false)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reads values through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let interval_secs = parse_or(&lookup, "COLLECT_INTERVAL_SECS", defaults.interval_secs)?;
        if interval_secs <= 0 {
            return Err(CollectorError::Config(
                "COLLECT_INTERVAL_SECS must be positive".to_string(),
            ));
        }

        let lead_secs = parse_or(&lookup, "COLLECT_LEAD_SECS", defaults.lead_secs)?;
        if lead_secs < 0 || lead_secs >= interval_secs {
            return Err(CollectorError::Config(format!(
                "COLLECT_LEAD_SECS must be in [0, {})",
                interval_secs
            )));
        }

        let binance_limit = parse_or(&lookup, "BINANCE_LIMIT", defaults.sources.binance_limit)?;
        if binance_limit == 0 {
            return Err(CollectorError::Config("BINANCE_LIMIT must be positive".to_string()));
        }

        let timeout_secs: u64 = parse_or(
            &lookup,
            "HTTP_TIMEOUT_SECS",
            defaults.sources.http_timeout.as_secs(),
        )?;

        Ok(Self {
            db_path: lookup("DCREXTDATA_DB_PATH").unwrap_or(defaults.db_path),
            interval_secs,
            lead_secs,
            backfill_safety_secs: parse_or(
                &lookup,
                "BACKFILL_SAFETY_SECS",
                defaults.backfill_safety_secs,
            )?,
            exchange_sources: lookup("EXCHANGE_SOURCES")
                .map(|s| split_list(&s))
                .unwrap_or(defaults.exchange_sources),
            pow_sources: lookup("POW_SOURCES")
                .map(|s| split_list(&s))
                .unwrap_or(defaults.pow_sources),
            quiet: parse_or(&lookup, "QUIET", defaults.quiet)?,
            drop_tables: parse_or(&lookup, "DROP_TABLES", defaults.drop_tables)?,
            sources: SourceConfig {
                epoch: parse_or(&lookup, "PROJECT_EPOCH", defaults.sources.epoch)?,
                binance_limit,
                http_timeout: Duration::from_secs(timeout_secs),
            },
        })
    }
}

/// Command-line overrides for the collector binary
#[derive(Debug, Parser)]
#[command(name = "collector", about = "DCR exchange and mining pool data collector")]
pub struct CliArgs {
    /// SQLite database path (overrides DCREXTDATA_DB_PATH)
    #[arg(long)]
    pub db_path: Option<String>,

    /// Only log errors
    #[arg(long)]
    pub quiet: bool,

    /// Drop the exchange_data and pow_stats tables, then exit
    #[arg(long)]
    pub drop_tables: bool,
}

impl CliArgs {
    pub fn apply(self, config: &mut CollectorConfig) {
        if let Some(path) = self.db_path {
            config.db_path = path;
        }
        config.quiet |= self.quiet;
        config.drop_tables |= self.drop_tables;
    }
}

/// Logger for the collector binary, writing to stderr.
///
/// `quiet` ignores `RUST_LOG` entirely, so module directives cannot re-enable
/// anything below error.
pub fn logger_builder(quiet: bool) -> env_logger::Builder {
    let mut builder = if quiet {
        let mut builder = env_logger::Builder::new();
        builder.filter_level(LevelFilter::Error);
        builder
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
    };
    builder.target(env_logger::Target::Stderr);
    builder
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .to_lowercase()
            .parse::<T>()
            .map_err(|_| CollectorError::Config(format!("{} has invalid value '{}'", key, raw))),
        None => Ok(default),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|name| name.trim().to_lowercase())
        .filter(|name| !name.is_empty())
        .collect()
}
