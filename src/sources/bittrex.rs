//! Bittrex BTC-DCR thirty minute ticks
//!
//! The `start` query parameter is ignored by Bittrex, so the full tick list is
//! fetched every time and filtered locally.

use super::{parse_utc, start_bound, Source, SourceInfo};
use crate::config::SourceConfig;
use crate::error::{CollectorError, Result};
use crate::types::ExchangeTick;
use async_trait::async_trait;
use serde::Deserialize;

pub const NAME: &str = "bittrex";
pub const BASE_URL: &str = "https://bittrex.com/Api/v2.0/pub/market/GetTicks";

const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Deserialize)]
pub struct BittrexTick {
    #[serde(rename = "H")]
    pub high: f64,
    #[serde(rename = "L")]
    pub low: f64,
    #[serde(rename = "O")]
    pub open: f64,
    #[serde(rename = "C")]
    pub close: f64,
    #[serde(rename = "BV")]
    pub volume: f64,
    #[serde(rename = "T")]
    pub time: String,
}

#[derive(Debug, Deserialize)]
pub struct BittrexResponse {
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub result: Option<Vec<BittrexTick>>,
}

fn default_success() -> bool {
    true
}

pub struct BittrexSource {
    info: SourceInfo,
    epoch: i64,
}

impl BittrexSource {
    pub fn new(client: reqwest::Client, config: &SourceConfig, last_update: i64) -> Self {
        Self::with_base_url(client, config, last_update, BASE_URL)
    }

    /// Same as [`new`](Self::new) against a different endpoint.
    pub fn with_base_url(
        client: reqwest::Client,
        config: &SourceConfig,
        last_update: i64,
        base_url: &str,
    ) -> Self {
        Self {
            info: SourceInfo::new(NAME, client, base_url, last_update),
            epoch: config.epoch,
        }
    }

    pub fn boxed(
        client: reqwest::Client,
        config: &SourceConfig,
        last_update: i64,
    ) -> Box<dyn Source<ExchangeTick>> {
        Box::new(Self::new(client, config, last_update))
    }
}

pub fn normalize(response: BittrexResponse, start: i64) -> Result<Vec<ExchangeTick>> {
    if !response.success {
        return Err(CollectorError::decode(
            NAME,
            response.message.unwrap_or_else(|| "request unsuccessful".to_string()),
        ));
    }

    let mut ticks = Vec::new();
    for tick in response.result.unwrap_or_default() {
        // Some rows carry fractional seconds; only the first 19 chars are the timestamp.
        let raw = tick.time.get(..19).unwrap_or(&tick.time);
        let time = parse_utc(NAME, "T", raw, TIME_FORMAT)?;
        if time < start {
            continue;
        }

        ticks.push(ExchangeTick {
            high: tick.high,
            low: tick.low,
            open: tick.open,
            close: tick.close,
            volume: tick.volume,
            time,
            exchange: NAME.to_string(),
        });
    }

    Ok(ticks)
}

#[async_trait]
impl Source<ExchangeTick> for BittrexSource {
    fn name(&self) -> &'static str {
        NAME
    }

    fn last_update_time(&self) -> i64 {
        self.info.last_update()
    }

    async fn collect(&self, since: i64) -> Result<Vec<ExchangeTick>> {
        let url = format!(
            "{}?marketName=BTC-DCR&tickInterval=thirtyMin",
            self.info.base_url()
        );

        let response: BittrexResponse = self.info.get_json(&url).await?;
        let ticks = normalize(response, start_bound(since, self.epoch))?;
        self.info.record(&ticks);

        Ok(ticks)
    }
}
