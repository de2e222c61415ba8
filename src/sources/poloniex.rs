//! Poloniex BTC_DCR 30 minute chart data
//!
//! The only exchange here that honours a start parameter in unix seconds and
//! returns plain JSON numbers.

use super::{start_bound, Source, SourceInfo};
use crate::config::SourceConfig;
use crate::error::Result;
use crate::types::ExchangeTick;
use async_trait::async_trait;
use serde::Deserialize;

pub const NAME: &str = "poloniex";
pub const BASE_URL: &str = "https://poloniex.com/public";

#[derive(Debug, Deserialize)]
pub struct PoloniexCandle {
    pub high: f64,
    pub low: f64,
    pub open: f64,
    pub close: f64,
    pub volume: f64,
    pub date: i64,
}

pub struct PoloniexSource {
    info: SourceInfo,
    epoch: i64,
}

impl PoloniexSource {
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

/// Convert chart candles, dropping anything older than `start`.
pub fn normalize(candles: Vec<PoloniexCandle>, start: i64) -> Vec<ExchangeTick> {
    candles
        .into_iter()
        .filter(|c| c.date >= start)
        .map(|c| ExchangeTick {
            high: c.high,
            low: c.low,
            open: c.open,
            close: c.close,
            volume: c.volume,
            time: c.date,
            exchange: NAME.to_string(),
        })
        .collect()
}

#[async_trait]
impl Source<ExchangeTick> for PoloniexSource {
    fn name(&self) -> &'static str {
        NAME
    }

    fn last_update_time(&self) -> i64 {
        self.info.last_update()
    }

    async fn collect(&self, since: i64) -> Result<Vec<ExchangeTick>> {
        let start = start_bound(since, self.epoch);
        let url = format!(
            "{}?command=returnChartData&currencyPair=BTC_DCR&start={}&end=9999999999&period=1800",
            self.info.base_url(),
            start
        );

        let candles: Vec<PoloniexCandle> = self.info.get_json(&url).await?;
        let ticks = normalize(candles, start);
        self.info.record(&ticks);

        Ok(ticks)
    }
}
