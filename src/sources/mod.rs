//! External data source adapters
//!
//! Every adapter fetches one provider endpoint, normalizes the payload into a
//! canonical record ([`ExchangeTick`] or [`PowTick`]) and drops records older than
//! the requested `since` bound. Adapters never retry; the first network, decode
//! or conversion failure is returned to the caller.
//!
//! ## Registry
//!
//! | name        | family   | page limit |
//! |-------------|----------|------------|
//! | `poloniex`  | exchange | -          |
//! | `bittrex`   | exchange | -          |
//! | `bleutrade` | exchange | -          |
//! | `binance`   | exchange | 1000       |
//! | `luxor`     | pow      | -          |
//! | `f2pool`    | pow      | -          |

pub mod binance;
pub mod bittrex;
pub mod bleutrade;
pub mod f2pool;
pub mod luxor;
pub mod poloniex;

use crate::config::SourceConfig;
use crate::error::{CollectorError, Result};
use crate::types::{ExchangeTick, PowTick, Tick};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use std::sync::atomic::{AtomicI64, Ordering};

pub use binance::BinanceSource;
pub use bittrex::BittrexSource;
pub use bleutrade::BleutradeSource;
pub use f2pool::F2poolSource;
pub use luxor::LuxorSource;
pub use poloniex::PoloniexSource;

/// One external data source producing records of a single family.
#[async_trait]
pub trait Source<T: Tick>: Send + Sync {
    /// Stable identifier, also stored as the record's source column.
    fn name(&self) -> &'static str;

    /// Fixed provider page size, if the provider caps responses.
    ///
    /// A page of exactly this many records means more data may follow.
    fn page_limit(&self) -> Option<usize> {
        None
    }

    /// Newest record time returned by a successful collect.
    fn last_update_time(&self) -> i64;

    /// Fetch and normalize every record with `time >= since`.
    ///
    /// `since == 0` asks for all available history.
    async fn collect(&self, since: i64) -> Result<Vec<T>>;
}

/// Builds an adapter from the shared client, source settings and a starting
/// last-update time.
pub type SourceConstructor<T> = fn(reqwest::Client, &SourceConfig, i64) -> Box<dyn Source<T>>;

pub const EXCHANGE_REGISTRY: &[(&str, SourceConstructor<ExchangeTick>)] = &[
    (poloniex::NAME, PoloniexSource::boxed),
    (bittrex::NAME, BittrexSource::boxed),
    (bleutrade::NAME, BleutradeSource::boxed),
    (binance::NAME, BinanceSource::boxed),
];

pub const POW_REGISTRY: &[(&str, SourceConstructor<PowTick>)] = &[
    (luxor::NAME, LuxorSource::boxed),
    (f2pool::NAME, F2poolSource::boxed),
];

/// Build the named sources from `registry`, preserving the order of `names`.
///
/// Every source starts with `last_update` as its last-update time, normally the
/// family's persisted watermark.
pub fn build_sources<T: Tick>(
    registry: &[(&str, SourceConstructor<T>)],
    names: &[String],
    client: &reqwest::Client,
    config: &SourceConfig,
    last_update: i64,
) -> Result<Vec<Box<dyn Source<T>>>> {
    names
        .iter()
        .map(|name| {
            registry
                .iter()
                .find(|(registered, _)| *registered == name.as_str())
                .map(|(_, constructor)| constructor(client.clone(), config, last_update))
                .ok_or_else(|| {
                    CollectorError::Config(format!(
                        "unknown {} source '{}' (known: {})",
                        T::FAMILY,
                        name,
                        registry
                            .iter()
                            .map(|(n, _)| *n)
                            .collect::<Vec<_>>()
                            .join(", ")
                    ))
                })
        })
        .collect()
}

/// Shared HTTP client with the configured per-request timeout.
pub fn http_client(config: &SourceConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()
        .map_err(|e| CollectorError::connectivity("http", e))
}

/// State common to every adapter: client, endpoint and last-seen time.
pub(crate) struct SourceInfo {
    name: &'static str,
    client: reqwest::Client,
    base_url: String,
    last_update: AtomicI64,
}

impl SourceInfo {
    pub(crate) fn new(
        name: &'static str,
        client: reqwest::Client,
        base_url: &str,
        last_update: i64,
    ) -> Self {
        Self {
            name,
            client,
            base_url: base_url.to_string(),
            last_update: AtomicI64::new(last_update),
        }
    }

    pub(crate) fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn last_update(&self) -> i64 {
        self.last_update.load(Ordering::Relaxed)
    }

    pub(crate) fn record<T: Tick>(&self, records: &[T]) {
        if let Some(newest) = records.iter().map(Tick::time).max() {
            self.last_update.fetch_max(newest, Ordering::Relaxed);
        }
    }

    /// GET `url` and decode the JSON body into `R`.
    pub(crate) async fn get_json<R: DeserializeOwned>(&self, url: &str) -> Result<R> {
        log::debug!("🌐 {} GET {}", self.name, url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CollectorError::connectivity(self.name, e))?;

        if !response.status().is_success() {
            return Err(CollectorError::connectivity(
                self.name,
                format!("HTTP status {}", response.status()),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| CollectorError::connectivity(self.name, e))?;

        serde_json::from_str(&body).map_err(|e| CollectorError::decode(self.name, e))
    }
}

/// Lower time bound for a request: the project epoch stands in for "everything".
pub(crate) fn start_bound(since: i64, epoch: i64) -> i64 {
    if since == 0 {
        epoch
    } else {
        since
    }
}

pub(crate) fn parse_float(source: &str, field: &'static str, raw: &str) -> Result<f64> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| CollectorError::conversion(source, field, raw))
}

/// Parse a zone-less UTC timestamp with the given `chrono` format.
pub(crate) fn parse_utc(source: &str, field: &'static str, raw: &str, format: &str) -> Result<i64> {
    NaiveDateTime::parse_from_str(raw.trim(), format)
        .map(|t| t.and_utc().timestamp())
        .map_err(|_| CollectorError::conversion(source, field, raw))
}

pub(crate) fn parse_rfc3339(source: &str, field: &'static str, raw: &str) -> Result<i64> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|t| t.timestamp())
        .map_err(|_| CollectorError::conversion(source, field, raw))
}

/// Accept a decimal either as JSON string or number and keep it as text.
pub(crate) fn decimal_text<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Text {
        Str(String),
        Num(serde_json::Number),
    }

    Ok(match Text::deserialize(deserializer)? {
        Text::Str(s) => s,
        Text::Num(n) => n.to_string(),
    })
}
