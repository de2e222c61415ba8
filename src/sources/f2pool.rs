//! F2pool Decred pool hashrate history
//!
//! Only the pool hashrate is published, keyed by RFC3339 timestamp. Every other
//! PowTick field is left at its zero value.

use super::{parse_rfc3339, start_bound, Source, SourceInfo};
use crate::config::SourceConfig;
use crate::error::Result;
use crate::types::PowTick;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;

pub const NAME: &str = "f2pool";
pub const BASE_URL: &str = "https://api.f2pool.com/decred/";

#[derive(Debug, Deserialize)]
pub struct F2poolResponse {
    #[serde(default)]
    pub hashrate: HashMap<String, f64>,
}

pub struct F2poolSource {
    info: SourceInfo,
    epoch: i64,
}

impl F2poolSource {
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

/// Convert the hashrate map into ticks ordered by time.
pub fn normalize(response: F2poolResponse, start: i64) -> Result<Vec<PowTick>> {
    let mut ticks = Vec::with_capacity(response.hashrate.len());

    for (raw_time, pool_hashrate) in response.hashrate {
        let time = parse_rfc3339(NAME, "hashrate.time", &raw_time)?;
        if time < start {
            continue;
        }

        ticks.push(PowTick {
            time,
            network_hashrate: 0,
            pool_hashrate,
            workers: 0,
            network_difficulty: 0.0,
            coin_price: String::new(),
            btc_price: String::new(),
            source: NAME.to_string(),
        });
    }

    ticks.sort_by_key(|t| t.time);
    Ok(ticks)
}

#[async_trait]
impl Source<PowTick> for F2poolSource {
    fn name(&self) -> &'static str {
        NAME
    }

    fn last_update_time(&self) -> i64 {
        self.info.last_update()
    }

    async fn collect(&self, since: i64) -> Result<Vec<PowTick>> {
        let response: F2poolResponse = self.info.get_json(self.info.base_url()).await?;
        let ticks = normalize(response, start_bound(since, self.epoch))?;
        self.info.record(&ticks);

        Ok(ticks)
    }
}
