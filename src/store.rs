//! SQLite cursor store and idempotent tick writer
//!
//! Tables (created on bootstrap, dropped only by the administrative reset):
//! - `exchange_data` - PRIMARY KEY (time, exchange)
//! - `pow_stats` - PRIMARY KEY (time, source)
//!
//! Inserts are plain `INSERT`s; a primary-key violation is recognised by its
//! extended result code, counted as a duplicate and skipped. Any other failure
//! rolls back the whole batch.

use crate::error::Result;
use crate::types::{ExchangeTick, Family, PowTick, Tick};
use rusqlite::{ffi, params, Connection, ErrorCode, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

pub const CREATE_EXCHANGE_DATA: &str = "CREATE TABLE IF NOT EXISTS exchange_data (
    high FLOAT8, low FLOAT8, open FLOAT8, close FLOAT8, time INT, exchange VARCHAR(25),
    CONSTRAINT tick PRIMARY KEY (time, exchange))";

pub const CREATE_POW_STATS: &str = "CREATE TABLE IF NOT EXISTS pow_stats (
    time INT, network_hashrate INT, pool_hashrate FLOAT, workers INT, network_difficulty FLOAT8,
    coin_price VARCHAR(25), btc_price VARCHAR(25), source VARCHAR(25),
    PRIMARY KEY (time, source))";

/// Outcome of one batch insert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertReport {
    pub inserted: usize,
    pub duplicates: usize,
}

/// A tick that knows its table contract.
pub trait StoredTick: Tick {
    const CREATE_TABLE: &'static str;

    fn insert(&self, conn: &Connection) -> rusqlite::Result<usize>;
}

impl StoredTick for ExchangeTick {
    const CREATE_TABLE: &'static str = CREATE_EXCHANGE_DATA;

    fn insert(&self, conn: &Connection) -> rusqlite::Result<usize> {
        conn.prepare_cached(
            "INSERT INTO exchange_data (high, low, open, close, time, exchange)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?
        .execute(params![
            self.high,
            self.low,
            self.open,
            self.close,
            self.time,
            self.exchange,
        ])
    }
}

impl StoredTick for PowTick {
    const CREATE_TABLE: &'static str = CREATE_POW_STATS;

    fn insert(&self, conn: &Connection) -> rusqlite::Result<usize> {
        conn.prepare_cached(
            "INSERT INTO pow_stats (time, network_hashrate, pool_hashrate, workers,
                network_difficulty, coin_price, btc_price, source)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?
        .execute(params![
            self.time,
            self.network_hashrate,
            self.pool_hashrate,
            self.workers,
            self.network_difficulty,
            self.coin_price,
            self.btc_price,
            self.source,
        ])
    }
}

/// Cursor and persistence operations for one record family.
pub trait FamilyStore<T: Tick>: Send + Sync {
    /// Whether the family's table has been created.
    fn exists(&self) -> Result<bool>;

    /// Newest persisted record time; `None` when the table is empty.
    fn latest_time(&self) -> Result<Option<i64>>;

    /// Newest persisted record time, or 0 when the table is missing or empty.
    fn stored_watermark(&self) -> Result<i64> {
        if !self.exists()? {
            return Ok(0);
        }
        Ok(self.latest_time()?.unwrap_or(0))
    }

    fn create_table(&self) -> Result<()>;

    fn drop_table(&self) -> Result<()>;

    /// Insert every record, skipping ones whose natural key already exists.
    fn insert_many(&self, records: &[T]) -> Result<InsertReport>;
}

/// SQLite-backed store shared by both families.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database file and enable WAL mode.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref())?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        // Fails fast if the file is not a usable database.
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;

        log::info!("📊 Opened SQLite database {}", db_path.as_ref().display());

        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn table_exists(&self, family: Family) -> Result<bool> {
        let conn = self.lock();
        let mut stmt =
            conn.prepare_cached("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1")?;
        Ok(stmt.exists([family.table_name()])?)
    }
}

/// True for a primary-key or unique constraint violation.
pub fn is_duplicate_key(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.code == ErrorCode::ConstraintViolation
                && (e.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                    || e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE)
        }
        _ => false,
    }
}

impl<T: StoredTick> FamilyStore<T> for SqliteStore {
    fn exists(&self) -> Result<bool> {
        self.table_exists(T::FAMILY)
    }

    fn latest_time(&self) -> Result<Option<i64>> {
        let conn = self.lock();
        let sql = format!(
            "SELECT time FROM {} ORDER BY time DESC LIMIT 1",
            T::FAMILY.table_name()
        );
        Ok(conn.query_row(&sql, [], |row| row.get(0)).optional()?)
    }

    fn create_table(&self) -> Result<()> {
        self.lock().execute(T::CREATE_TABLE, [])?;
        log::info!("🔧 Created table {}", T::FAMILY.table_name());
        Ok(())
    }

    fn drop_table(&self) -> Result<()> {
        self.lock()
            .execute(&format!("DROP TABLE IF EXISTS {}", T::FAMILY.table_name()), [])?;
        log::info!("🗑️  Dropped table {}", T::FAMILY.table_name());
        Ok(())
    }

    fn insert_many(&self, records: &[T]) -> Result<InsertReport> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let mut report = InsertReport::default();

        for record in records {
            match record.insert(&tx) {
                Ok(_) => report.inserted += 1,
                Err(e) if is_duplicate_key(&e) => report.duplicates += 1,
                // Dropping `tx` rolls the batch back.
                Err(e) => return Err(e.into()),
            }
        }

        tx.commit()?;

        log::debug!(
            "✅ {}: {} inserted, {} duplicates skipped",
            T::FAMILY.table_name(),
            report.inserted,
            report.duplicates
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollectorError;
    use tempfile::tempdir;

    fn exchange_tick(time: i64, exchange: &str) -> ExchangeTick {
        ExchangeTick {
            high: 0.012,
            low: 0.010,
            open: 0.011,
            close: 0.0115,
            volume: 3.0,
            time,
            exchange: exchange.to_string(),
        }
    }

    fn pow_tick(time: i64, source: &str) -> PowTick {
        PowTick {
            time,
            network_hashrate: 380_000_000_000_000_000,
            pool_hashrate: 2.1e16,
            workers: 431,
            network_difficulty: 5.4e9,
            coin_price: "24.71".to_string(),
            btc_price: "0.00466".to_string(),
            source: source.to_string(),
        }
    }

    fn open_store() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("test.db")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_table_lifecycle() {
        let (_dir, store) = open_store();

        assert!(!FamilyStore::<ExchangeTick>::exists(&store).unwrap());
        FamilyStore::<ExchangeTick>::create_table(&store).unwrap();
        assert!(FamilyStore::<ExchangeTick>::exists(&store).unwrap());
        // The pow family is independent.
        assert!(!FamilyStore::<PowTick>::exists(&store).unwrap());

        FamilyStore::<ExchangeTick>::drop_table(&store).unwrap();
        assert!(!FamilyStore::<ExchangeTick>::exists(&store).unwrap());
    }

    #[test]
    fn test_latest_time_empty_table_is_none() {
        let (_dir, store) = open_store();
        FamilyStore::<PowTick>::create_table(&store).unwrap();

        assert_eq!(FamilyStore::<PowTick>::latest_time(&store).unwrap(), None);

        FamilyStore::<PowTick>::insert_many(
            &store,
            &[pow_tick(300, "luxor"), pow_tick(900, "f2pool"), pow_tick(600, "luxor")],
        )
        .unwrap();
        assert_eq!(FamilyStore::<PowTick>::latest_time(&store).unwrap(), Some(900));
    }

    #[test]
    fn test_stored_watermark_defaults_to_zero() {
        let (_dir, store) = open_store();
        // Missing table.
        assert_eq!(FamilyStore::<PowTick>::stored_watermark(&store).unwrap(), 0);

        FamilyStore::<PowTick>::create_table(&store).unwrap();
        assert_eq!(FamilyStore::<PowTick>::stored_watermark(&store).unwrap(), 0);

        FamilyStore::<PowTick>::insert_many(&store, &[pow_tick(1_800, "luxor")]).unwrap();
        assert_eq!(FamilyStore::<PowTick>::stored_watermark(&store).unwrap(), 1_800);
    }

    #[test]
    fn test_latest_time_missing_table_is_error() {
        let (_dir, store) = open_store();
        let result = FamilyStore::<ExchangeTick>::latest_time(&store);
        assert!(matches!(result, Err(CollectorError::Database(_))));
    }

    #[test]
    fn test_insert_same_tick_twice_stores_one_row() {
        let (_dir, store) = open_store();
        FamilyStore::<ExchangeTick>::create_table(&store).unwrap();

        let tick = exchange_tick(1_525_132_800, "binance");
        let first = FamilyStore::<ExchangeTick>::insert_many(&store, &[tick.clone()]).unwrap();
        let second = FamilyStore::<ExchangeTick>::insert_many(&store, &[tick]).unwrap();

        assert_eq!(first, InsertReport { inserted: 1, duplicates: 0 });
        assert_eq!(second, InsertReport { inserted: 0, duplicates: 1 });

        let count: i64 = store
            .lock()
            .query_row("SELECT COUNT(*) FROM exchange_data", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_duplicate_count_in_mixed_batch() {
        let (_dir, store) = open_store();
        FamilyStore::<ExchangeTick>::create_table(&store).unwrap();

        let existing: Vec<ExchangeTick> =
            (0..3).map(|i| exchange_tick(1_000 + i * 1800, "bleutrade")).collect();
        FamilyStore::<ExchangeTick>::insert_many(&store, &existing).unwrap();

        let mut batch = existing.clone();
        batch.extend((3..8).map(|i| exchange_tick(1_000 + i * 1800, "bleutrade")));
        // Same time, different exchange is a distinct key.
        batch.push(exchange_tick(1_000, "binance"));

        let report = FamilyStore::<ExchangeTick>::insert_many(&store, &batch).unwrap();
        assert_eq!(report, InsertReport { inserted: 6, duplicates: 3 });
    }

    #[test]
    fn test_non_duplicate_error_rolls_back_batch() {
        let (_dir, store) = open_store();
        FamilyStore::<ExchangeTick>::create_table(&store).unwrap();
        store
            .lock()
            .execute_batch(
                "CREATE TRIGGER reject_zero BEFORE INSERT ON exchange_data
                 WHEN NEW.time = 0 BEGIN SELECT RAISE(ABORT, 'zero time'); END;",
            )
            .unwrap();

        let batch = vec![exchange_tick(10, "binance"), exchange_tick(0, "binance")];
        let result = FamilyStore::<ExchangeTick>::insert_many(&store, &batch);
        assert!(matches!(result, Err(CollectorError::Database(_))));

        let count: i64 = store
            .lock()
            .query_row("SELECT COUNT(*) FROM exchange_data", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_pow_round_trip_columns() {
        let (_dir, store) = open_store();
        FamilyStore::<PowTick>::create_table(&store).unwrap();
        FamilyStore::<PowTick>::insert_many(&store, &[pow_tick(1_556_668_800, "luxor")]).unwrap();

        let (hashrate, workers, coin_price): (i64, i64, String) = store
            .lock()
            .query_row(
                "SELECT network_hashrate, workers, coin_price FROM pow_stats WHERE source = 'luxor'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();

        assert_eq!(hashrate, 380_000_000_000_000_000);
        assert_eq!(workers, 431);
        assert_eq!(coin_price, "24.71");
    }
}
