//! Canonical record shapes shared by every source adapter and the store.

/// Record families collected and persisted independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    Exchange,
    Pow,
}

impl Family {
    pub fn table_name(&self) -> &'static str {
        match self {
            Family::Exchange => "exchange_data",
            Family::Pow => "pow_stats",
        }
    }
}

impl std::fmt::Display for Family {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Family::Exchange => write!(f, "exchange"),
            Family::Pow => write!(f, "pow"),
        }
    }
}

/// One OHLC(V) price observation. Unique by `(time, exchange)`.
///
/// `volume` is kept in memory only: the `exchange_data` table has no volume column.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeTick {
    pub high: f64,
    pub low: f64,
    pub open: f64,
    pub close: f64,
    pub volume: f64,
    pub time: i64,
    pub exchange: String,
}

/// One mining pool statistics snapshot. Unique by `(time, source)`.
#[derive(Debug, Clone, PartialEq)]
pub struct PowTick {
    pub time: i64,
    pub network_hashrate: i64,
    pub pool_hashrate: f64,
    pub workers: i64,
    pub network_difficulty: f64,
    pub coin_price: String,
    pub btc_price: String,
    pub source: String,
}

/// Behaviour every record needs so the collector and store can stay generic.
pub trait Tick: Clone + Send + Sync + 'static {
    const FAMILY: Family;

    /// Unix seconds of the observation.
    fn time(&self) -> i64;

    /// Natural key, `(time, source identifier)`.
    fn key(&self) -> (i64, &str);
}

impl Tick for ExchangeTick {
    const FAMILY: Family = Family::Exchange;

    fn time(&self) -> i64 {
        self.time
    }

    fn key(&self) -> (i64, &str) {
        (self.time, &self.exchange)
    }
}

impl Tick for PowTick {
    const FAMILY: Family = Family::Pow;

    fn time(&self) -> i64 {
        self.time
    }

    fn key(&self) -> (i64, &str) {
        (self.time, &self.source)
    }
}
