//! Binance DCRBTC 30m klines
//!
//! ## API Reference
//!
//! Endpoint: `GET /api/v1/klines?symbol=DCRBTC&interval=30m&limit={limit}&startTime={ms}`
//!
//! Each kline is a positional array:
//! `[open_time_ms, "open", "high", "low", "close", "volume", close_time_ms, ...]`
//!
//! Responses are capped at `limit` rows, so a full page means more history may
//! follow and the collector keeps paging from the last open time.

use super::{parse_float, start_bound, Source, SourceInfo};
use crate::config::SourceConfig;
use crate::error::{CollectorError, Result};
use crate::types::ExchangeTick;
use async_trait::async_trait;
use serde_json::Value;

pub const NAME: &str = "binance";
pub const BASE_URL: &str = "https://api.binance.com/api/v1/klines";

pub type Kline = Vec<Value>;

pub struct BinanceSource {
    info: SourceInfo,
    epoch: i64,
    limit: usize,
}

impl BinanceSource {
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
            limit: config.binance_limit,
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

fn price_field(kline: &Kline, index: usize, field: &'static str) -> Result<f64> {
    match kline.get(index) {
        Some(Value::String(raw)) => parse_float(NAME, field, raw),
        Some(other) => Err(CollectorError::conversion(NAME, field, other.to_string())),
        None => Err(CollectorError::decode(
            NAME,
            format!("kline has {} columns, missing '{}'", kline.len(), field),
        )),
    }
}

fn open_time_secs(kline: &Kline) -> Result<i64> {
    match kline.first() {
        Some(Value::Number(ms)) => ms
            .as_i64()
            .map(|ms| ms / 1000)
            .ok_or_else(|| CollectorError::conversion(NAME, "open_time", ms.to_string())),
        Some(other) => Err(CollectorError::conversion(NAME, "open_time", other.to_string())),
        None => Err(CollectorError::decode(NAME, "empty kline row")),
    }
}

/// Convert kline rows; open time is milliseconds and becomes unix seconds.
pub fn normalize(klines: Vec<Kline>, start: i64) -> Result<Vec<ExchangeTick>> {
    let mut ticks = Vec::with_capacity(klines.len());

    for kline in &klines {
        let time = open_time_secs(kline)?;
        if time < start {
            continue;
        }

        ticks.push(ExchangeTick {
            open: price_field(kline, 1, "open")?,
            high: price_field(kline, 2, "high")?,
            low: price_field(kline, 3, "low")?,
            close: price_field(kline, 4, "close")?,
            volume: price_field(kline, 5, "volume")?,
            time,
            exchange: NAME.to_string(),
        });
    }

    Ok(ticks)
}

#[async_trait]
impl Source<ExchangeTick> for BinanceSource {
    fn name(&self) -> &'static str {
        NAME
    }

    fn page_limit(&self) -> Option<usize> {
        Some(self.limit)
    }

    fn last_update_time(&self) -> i64 {
        self.info.last_update()
    }

    async fn collect(&self, since: i64) -> Result<Vec<ExchangeTick>> {
        let start = start_bound(since, self.epoch);
        let url = format!(
            "{}?symbol=DCRBTC&interval=30m&limit={}&startTime={}",
            self.info.base_url(),
            self.limit,
            start * 1000
        );

        let klines: Vec<Kline> = self.info.get_json(&url).await?;
        let ticks = normalize(klines, start)?;
        self.info.record(&ticks);

        Ok(ticks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::test_server;

    const SAMPLE: &str = r#"[
        [1525132800000,"0.01100000","0.01150000","0.01090000","0.01120000","812.33000000",1525134599999,"9.1","410",0,0,"0"],
        [1525134600000,"0.01120000","0.01130000","0.01105000","0.01110000","402.10000000",1525136399999,"4.5","220",0,0,"0"]
    ]"#;

    #[test]
    fn test_normalize_klines_converts_milliseconds() {
        let klines: Vec<Kline> = serde_json::from_str(SAMPLE).unwrap();
        let ticks = normalize(klines, 0).unwrap();

        assert_eq!(ticks.len(), 2);
        assert_eq!(ticks[0].time, 1_525_132_800);
        assert_eq!(ticks[1].time, 1_525_134_600);
        assert_eq!(ticks[0].open, 0.011);
        assert_eq!(ticks[0].high, 0.0115);
        assert_eq!(ticks[0].low, 0.0109);
        assert_eq!(ticks[0].close, 0.0112);
        assert_eq!(ticks[0].volume, 812.33);
    }

    #[test]
    fn test_non_string_price_is_conversion_error() {
        let klines: Vec<Kline> =
            serde_json::from_str(r#"[[1525132800000, 0.011, "0.0115", "0.0109", "0.0112", "1"]]"#)
                .unwrap();

        let err = normalize(klines, 0).unwrap_err();
        assert!(matches!(err, CollectorError::Conversion { field: "open", .. }));
    }

    #[test]
    fn test_short_row_is_decode_error() {
        let klines: Vec<Kline> =
            serde_json::from_str(r#"[[1525132800000, "0.011", "0.0115"]]"#).unwrap();

        assert!(matches!(normalize(klines, 0), Err(CollectorError::Decode { .. })));
    }

    #[test]
    fn test_page_limit_comes_from_config() {
        let config = SourceConfig {
            binance_limit: 500,
            ..SourceConfig::default()
        };
        let source = BinanceSource::new(reqwest::Client::new(), &config, 0);
        assert_eq!(source.page_limit(), Some(500));
    }

    // One candle before the epoch, two after.
    const EPOCH_PAGE: &str = r#"[
        [1454887800000,"0.0010","0.0011","0.0009","0.0010","5.0",1454889599999,"0","1",0,0,"0"],
        [1454889600000,"0.0010","0.0012","0.0010","0.0011","7.0",1454891399999,"0","1",0,0,"0"],
        [1454891400000,"0.0011","0.0013","0.0011","0.0012","9.0",1454893199999,"0","1",0,0,"0"]
    ]"#;

    #[tokio::test]
    async fn test_collect_full_history_starts_at_epoch() {
        let server = test_server::serve(200, EPOCH_PAGE).await;
        let config = SourceConfig::default();
        let source =
            BinanceSource::with_base_url(reqwest::Client::new(), &config, 0, &server.base_url);

        let ticks = source.collect(0).await.unwrap();

        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].contains("symbol=DCRBTC"));
        assert!(requests[0].contains("interval=30m"));
        assert!(requests[0].contains("limit=1000"));
        assert!(requests[0].contains("startTime=1454889600000"));

        assert_eq!(ticks.len(), 2);
        assert!(ticks.iter().all(|t| t.time >= config.epoch));
        assert_eq!(source.last_update_time(), 1_454_891_400);
    }

    #[tokio::test]
    async fn test_collect_since_is_sent_in_milliseconds() {
        let server = test_server::serve(200, "[]").await;
        let config = SourceConfig {
            binance_limit: 2,
            ..SourceConfig::default()
        };
        let source =
            BinanceSource::with_base_url(reqwest::Client::new(), &config, 7, &server.base_url);

        let ticks = source.collect(1_525_132_800).await.unwrap();

        assert!(ticks.is_empty());
        let requests = server.requests();
        assert!(requests[0].contains("limit=2"));
        assert!(requests[0].contains("startTime=1525132800000"));
        // An empty page leaves the seeded time alone.
        assert_eq!(source.last_update_time(), 7);
    }

    #[tokio::test]
    async fn test_collect_server_error_keeps_last_update() {
        let server = test_server::serve(503, "{}").await;
        let config = SourceConfig::default();
        let source = BinanceSource::with_base_url(
            reqwest::Client::new(),
            &config,
            1_600_000_000,
            &server.base_url,
        );

        let result = source.collect(1_600_000_000).await;

        assert!(matches!(result, Err(CollectorError::Connectivity { .. })));
        assert_eq!(source.last_update_time(), 1_600_000_000);
    }

    #[tokio::test]
    #[ignore] // Run only when testing with live API
    async fn test_collect_live_history_starts_at_epoch() {
        let config = SourceConfig::default();
        let source = BinanceSource::new(super::super::http_client(&config).unwrap(), &config, 0);

        let ticks = source.collect(0).await.unwrap();
        assert!(!ticks.is_empty());
        assert!(ticks.iter().all(|t| t.time >= config.epoch));
        assert_eq!(source.last_update_time(), ticks.iter().map(|t| t.time).max().unwrap());
    }
}
