//! # dcrextdata
//!
//! Incremental collector for DCR/BTC exchange candles and mining pool statistics.
//!
//! ## Architecture
//!
//! ```text
//! Scheduler ──► FamilyPipeline<T> ──► FamilyCollector<T> ──► Source<T> (one per provider)
//!                      │
//!                      └──────────► FamilyStore<T> (SQLite: exchange_data, pow_stats)
//! ```
//!
//! - `sources` - provider adapters normalizing JSON into canonical ticks
//! - `collector` - per-family union and paginated backfill
//! - `store` - table lifecycle, watermark query, duplicate-safe inserts
//! - `scheduler` - bootstrap, interval loop, cooperative cancellation
//! - `config` - environment and command-line configuration
//!
//! Two families are collected independently: exchange ticks ([`ExchangeTick`])
//! and pool statistics ([`PowTick`]). Each keeps its own watermark, the time of
//! the newest data it is known to hold, and only asks sources for data newer than
//! that on the next poll.

pub mod collector;
pub mod config;
pub mod error;
pub mod scheduler;
pub mod sources;
pub mod store;
pub mod types;

pub use collector::FamilyCollector;
pub use config::{CliArgs, CollectorConfig, SourceConfig};
pub use error::{CollectorError, Result};
pub use scheduler::{FamilyPipeline, Phase, Schedule, Scheduler};
pub use sources::Source;
pub use store::{FamilyStore, InsertReport, SqliteStore};
pub use types::{ExchangeTick, Family, PowTick, Tick};
