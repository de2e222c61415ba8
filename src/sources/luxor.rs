//! Luxor DCR pool statistics
//!
//! A single snapshot call returning recent global stats; no start parameter and
//! no history beyond what the snapshot contains.

use super::{decimal_text, parse_rfc3339, start_bound, Source, SourceInfo};
use crate::config::SourceConfig;
use crate::error::Result;
use crate::types::PowTick;
use async_trait::async_trait;
use serde::Deserialize;

pub const NAME: &str = "luxor";
pub const BASE_URL: &str = "http://mining.luxor.tech/API/DCR/stats";

#[derive(Debug, Deserialize)]
pub struct LuxorStat {
    pub time: String,
    #[serde(alias = "networkHashrate")]
    pub network_hashrate: i64,
    #[serde(alias = "poolHashrate")]
    pub pool_hashrate: f64,
    pub workers: i64,
    #[serde(alias = "networkDifficulty")]
    pub network_difficulty: f64,
    #[serde(alias = "coinPrice", deserialize_with = "decimal_text")]
    pub coin_price: String,
    #[serde(alias = "btcPrice", deserialize_with = "decimal_text")]
    pub btc_price: String,
}

#[derive(Debug, Deserialize)]
pub struct LuxorResponse {
    #[serde(rename = "globalStats", default)]
    pub global_stats: Vec<LuxorStat>,
}

pub struct LuxorSource {
    info: SourceInfo,
    epoch: i64,
}

impl LuxorSource {
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
    ) -> Box<dyn Source<PowTick>> {
        Box::new(Self::new(client, config, last_update))
    }
}

pub fn normalize(response: LuxorResponse, start: i64) -> Result<Vec<PowTick>> {
    let mut ticks = Vec::with_capacity(response.global_stats.len());

    for stat in response.global_stats {
        let time = parse_rfc3339(NAME, "time", &stat.time)?;
        if time < start {
            continue;
        }

        ticks.push(PowTick {
            time,
            network_hashrate: stat.network_hashrate,
            pool_hashrate: stat.pool_hashrate,
            workers: stat.workers,
            network_difficulty: stat.network_difficulty,
            coin_price: stat.coin_price,
            btc_price: stat.btc_price,
            source: NAME.to_string(),
        });
    }

    Ok(ticks)
}

#[async_trait]
impl Source<PowTick> for LuxorSource {
    fn name(&self) -> &'static str {
        NAME
    }

    fn last_update_time(&self) -> i64 {
        self.info.last_update()
    }

    async fn collect(&self, since: i64) -> Result<Vec<PowTick>> {
        let response: LuxorResponse = self.info.get_json(self.info.base_url()).await?;
        let ticks = normalize(response, start_bound(since, self.epoch))?;
        self.info.record(&ticks);

        Ok(ticks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollectorError;
    use crate::sources::test_server;

    const SAMPLE: &str = r#"{"globalStats":[
        {"time":"2019-05-01T00:00:00.000Z","network_hashrate":380000000000000000,"pool_hashrate":21000000000000000.5,"workers":431,"network_difficulty":5400000000.25,"coin_price":"24.71","btc_price":"0.00466"},
        {"time":"2019-05-01T00:30:00.000Z","network_hashrate":382000000000000000,"pool_hashrate":22000000000000000,"workers":435,"network_difficulty":5400000000.25,"coin_price":24.8,"btc_price":"0.00467"}
    ]}"#;

    #[test]
    fn test_normalize_global_stats() {
        let response: LuxorResponse = serde_json::from_str(SAMPLE).unwrap();
        let ticks = normalize(response, 0).unwrap();

        assert_eq!(ticks.len(), 2);
        assert_eq!(ticks[0].time, 1_556_668_800);
        assert_eq!(ticks[0].workers, 431);
        assert_eq!(ticks[0].coin_price, "24.71");
        // Numeric prices are kept as their decimal text.
        assert_eq!(ticks[1].coin_price, "24.8");
        assert!(ticks.iter().all(|t| t.source == "luxor"));
    }

    #[test]
    fn test_normalize_drops_stale_stats() {
        let response: LuxorResponse = serde_json::from_str(SAMPLE).unwrap();
        let ticks = normalize(response, 1_556_670_000).unwrap();

        assert_eq!(ticks.len(), 1);
        assert_eq!(ticks[0].time, 1_556_670_600);
    }

    #[test]
    fn test_bad_time_fails_batch() {
        let response: LuxorResponse = serde_json::from_str(
            r#"{"globalStats":[{"time":"05/01/2019","network_hashrate":1,"pool_hashrate":1,"workers":1,"network_difficulty":1,"coin_price":"1","btc_price":"1"}]}"#,
        )
        .unwrap();

        assert!(matches!(
            normalize(response, 0),
            Err(CollectorError::Conversion { field: "time", .. })
        ));
    }

    #[tokio::test]
    async fn test_collect_full_history_filters_at_epoch() {
        let server = test_server::serve(
            200,
            r#"{"globalStats":[
                {"time":"2016-02-01T00:00:00Z","network_hashrate":1,"pool_hashrate":1,"workers":1,"network_difficulty":1,"coin_price":"1","btc_price":"1"},
                {"time":"2019-05-01T00:00:00Z","network_hashrate":2,"pool_hashrate":2,"workers":2,"network_difficulty":2,"coin_price":"2","btc_price":"2"}
            ]}"#,
        )
        .await;
        let config = SourceConfig {
            epoch: 1_500_000_000,
            ..SourceConfig::default()
        };
        let source = LuxorSource::with_base_url(reqwest::Client::new(), &config, 42, &server.base_url);
        assert_eq!(source.last_update_time(), 42);

        let ticks = source.collect(0).await.unwrap();

        assert_eq!(server.requests(), vec!["/api".to_string()]);
        assert_eq!(ticks.len(), 1);
        assert_eq!(ticks[0].time, 1_556_668_800);
        assert_eq!(source.last_update_time(), 1_556_668_800);
    }

    #[tokio::test]
    async fn test_collect_unexpected_shape_is_decode_error() {
        let server = test_server::serve(200, r#"{"globalStats":"unavailable"}"#).await;
        let source = LuxorSource::with_base_url(
            reqwest::Client::new(),
            &SourceConfig::default(),
            0,
            &server.base_url,
        );

        assert!(matches!(source.collect(0).await, Err(CollectorError::Decode { .. })));
    }
}
