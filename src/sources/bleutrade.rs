//! Bleutrade DCR_BTC 30m candles
//!
//! No start option; every numeric field arrives as a string.

use super::{parse_float, parse_utc, start_bound, Source, SourceInfo};
use crate::config::SourceConfig;
use crate::error::Result;
use crate::types::ExchangeTick;
use async_trait::async_trait;
use serde::Deserialize;

pub const NAME: &str = "bleutrade";
pub const BASE_URL: &str = "https://bleutrade.com/api/v2/public/getcandles";

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Deserialize)]
pub struct BleutradeCandle {
    #[serde(alias = "High")]
    pub high: String,
    #[serde(alias = "Low")]
    pub low: String,
    #[serde(alias = "Open")]
    pub open: String,
    #[serde(alias = "Close")]
    pub close: String,
    #[serde(alias = "Volume")]
    pub volume: String,
    #[serde(rename = "TimeStamp")]
    pub time: String,
}

#[derive(Debug, Deserialize)]
pub struct BleutradeResponse {
    #[serde(default)]
    pub result: Vec<BleutradeCandle>,
}

pub struct BleutradeSource {
    info: SourceInfo,
    epoch: i64,
}

impl BleutradeSource {
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

pub fn normalize(response: BleutradeResponse, start: i64) -> Result<Vec<ExchangeTick>> {
    let mut ticks = Vec::with_capacity(response.result.len());

    for candle in response.result {
        let time = parse_utc(NAME, "TimeStamp", &candle.time, TIME_FORMAT)?;
        if time < start {
            continue;
        }

        ticks.push(ExchangeTick {
            high: parse_float(NAME, "high", &candle.high)?,
            low: parse_float(NAME, "low", &candle.low)?,
            open: parse_float(NAME, "open", &candle.open)?,
            close: parse_float(NAME, "close", &candle.close)?,
            volume: parse_float(NAME, "volume", &candle.volume)?,
            time,
            exchange: NAME.to_string(),
        });
    }

    Ok(ticks)
}

#[async_trait]
impl Source<ExchangeTick> for BleutradeSource {
    fn name(&self) -> &'static str {
        NAME
    }

    fn last_update_time(&self) -> i64 {
        self.info.last_update()
    }

    async fn collect(&self, since: i64) -> Result<Vec<ExchangeTick>> {
        let url = format!("{}?market=DCR_BTC&count=999999&period=30m", self.info.base_url());

        let response: BleutradeResponse = self.info.get_json(&url).await?;
        let ticks = normalize(response, start_bound(since, self.epoch))?;
        self.info.record(&ticks);

        Ok(ticks)
    }
}
