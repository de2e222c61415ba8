//! Bootstrap and fixed-interval collection loop
//!
//! Lifecycle:
//! 1. `bootstrap()` runs in the foreground once per family: a missing table is
//!    created and backfilled from the epoch, an existing one is topped up from its
//!    newest persisted record.
//! 2. `run()` runs in a background task: wait for the next fire time (or
//!    cancellation), collect each family since its watermark, persist, repeat.
//!
//! The loop is fail-stop: the first collection or persistence error ends it and
//! is returned to the caller. Cancellation is only observed while waiting, so a
//! cycle in flight always completes.

use crate::collector::FamilyCollector;
use crate::error::Result;
use crate::store::{FamilyStore, InsertReport};
use crate::types::{ExchangeTick, Family, PowTick, Tick};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Bootstrapping,
    Waiting,
    Collecting,
    Persisting,
    Cancelled,
    Failed,
}

/// Counts for one family in one bootstrap or loop cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub family: Family,
    pub since: i64,
    pub collected: usize,
    pub inserted: usize,
    pub duplicates: usize,
}

/// Collector, store and watermark for one record family.
pub struct FamilyPipeline<T: Tick> {
    collector: FamilyCollector<T>,
    store: Arc<dyn FamilyStore<T>>,
    watermark: i64,
}

impl<T: Tick> FamilyPipeline<T> {
    pub fn new(collector: FamilyCollector<T>, store: Arc<dyn FamilyStore<T>>) -> Self {
        Self {
            collector,
            store,
            watermark: 0,
        }
    }

    /// Time of the newest data this family is known to hold.
    pub fn watermark(&self) -> i64 {
        self.watermark
    }

    /// Create-and-backfill, or resume from the persisted watermark.
    pub async fn bootstrap(&mut self) -> Result<CycleReport> {
        let since = if self.store.exists()? {
            let since = self.store.latest_time()?.unwrap_or(0);
            log::info!(
                "📂 {} table present, collecting from {}",
                T::FAMILY,
                format_time(since)
            );
            since
        } else {
            log::info!("🔧 Creating {} table for full backfill", T::FAMILY);
            self.store.create_table()?;
            0
        };

        let records = self.collector.collect(since).await?;
        let report = self.store.insert_many(&records)?;

        // Resume from what is actually stored, never behind where we started.
        let stored = self.store.latest_time()?.unwrap_or(0);
        self.watermark = since.max(stored);

        Ok(CycleReport {
            family: T::FAMILY,
            since,
            collected: records.len(),
            inserted: report.inserted,
            duplicates: report.duplicates,
        })
    }

    /// Collect everything since the current watermark.
    pub async fn collect(&self) -> Result<Vec<T>> {
        self.collector.collect(self.watermark).await
    }

    /// Persist `records` and advance the watermark to `fired_at`.
    pub fn persist(&mut self, records: &[T], fired_at: i64) -> Result<InsertReport> {
        let report = self.store.insert_many(records)?;
        self.watermark = self.watermark.max(fired_at);
        Ok(report)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Schedule {
    pub interval_secs: i64,
    pub lead_secs: i64,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            interval_secs: 1800,
            lead_secs: 70,
        }
    }
}

impl Schedule {
    /// First fire time: `lead_secs` before the interval boundary following
    /// `watermark`, or before the next boundary after `now` if that has passed.
    pub fn first_fire(&self, watermark: i64, now: i64) -> i64 {
        let interval = self.interval_secs;
        let after_watermark = (watermark.div_euclid(interval) + 1) * interval - self.lead_secs;
        if after_watermark > now {
            return after_watermark;
        }
        ((now + self.lead_secs).div_euclid(interval) + 1) * interval - self.lead_secs
    }
}

pub struct Scheduler {
    exchange: FamilyPipeline<ExchangeTick>,
    pow: FamilyPipeline<PowTick>,
    schedule: Schedule,
    phase: Phase,
}

impl Scheduler {
    pub fn new(
        exchange: FamilyPipeline<ExchangeTick>,
        pow: FamilyPipeline<PowTick>,
        schedule: Schedule,
    ) -> Self {
        Self {
            exchange,
            pow,
            schedule,
            phase: Phase::Bootstrapping,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn watermarks(&self) -> (i64, i64) {
        (self.exchange.watermark(), self.pow.watermark())
    }

    fn set_phase(&mut self, phase: Phase) {
        log::debug!("⏱️  Scheduler {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    /// One-shot backfill of both families. Errors are fatal to startup.
    pub async fn bootstrap(&mut self) -> Result<()> {
        self.set_phase(Phase::Bootstrapping);

        log::info!("🚀 Bootstrapping exchange data");
        let report = self.exchange.bootstrap().await?;
        log_report(&report);

        log::info!("🚀 Bootstrapping POW data");
        let report = self.pow.bootstrap().await?;
        log_report(&report);

        Ok(())
    }

    /// Interval loop until `cancel` fires (`Ok`) or a cycle fails (`Err`).
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let latest = self.exchange.watermark().max(self.pow.watermark());
        let first = self.schedule.first_fire(latest, now);
        let delay = Duration::from_secs((first - now).max(0) as u64);
        let period = Duration::from_secs(self.schedule.interval_secs as u64);

        let mut ticker = interval_at(Instant::now() + delay, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        log::info!(
            "⏰ Starting collector (interval: {}s, first poll at {})",
            self.schedule.interval_secs,
            format_time(first)
        );

        loop {
            self.set_phase(Phase::Waiting);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.set_phase(Phase::Cancelled);
                    log::info!("🛑 Closing collector");
                    return Ok(());
                }
                _ = ticker.tick() => {}
            }

            let fired_at = chrono::Utc::now().timestamp();
            if let Err(e) = self.cycle(fired_at).await {
                self.set_phase(Phase::Failed);
                log::error!("❌ Collection cycle failed, stopping collector: {}", e);
                return Err(e);
            }
        }
    }

    async fn cycle(&mut self, fired_at: i64) -> Result<()> {
        log::info!("📥 Collecting recent exchange data");
        self.set_phase(Phase::Collecting);
        let since = self.exchange.watermark();
        let records = self.exchange.collect().await?;
        self.set_phase(Phase::Persisting);
        let report = self.exchange.persist(&records, fired_at)?;
        log_report(&CycleReport {
            family: Family::Exchange,
            since,
            collected: records.len(),
            inserted: report.inserted,
            duplicates: report.duplicates,
        });

        log::info!("📥 Collecting recent POW data");
        self.set_phase(Phase::Collecting);
        let since = self.pow.watermark();
        let records = self.pow.collect().await?;
        self.set_phase(Phase::Persisting);
        let report = self.pow.persist(&records, fired_at)?;
        log_report(&CycleReport {
            family: Family::Pow,
            since,
            collected: records.len(),
            inserted: report.inserted,
            duplicates: report.duplicates,
        });

        Ok(())
    }
}

fn log_report(report: &CycleReport) {
    log::info!(
        "✅ {} since {}: {} collected, {} stored, {} already present",
        report.family,
        format_time(report.since),
        report.collected,
        report.inserted,
        report.duplicates
    );
}

fn format_time(unix: i64) -> String {
    chrono::DateTime::from_timestamp(unix, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| unix.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_fire_before_next_boundary_after_watermark() {
        let schedule = Schedule::default();
        // Watermark at a boundary; fire 70s before the following one.
        assert_eq!(schedule.first_fire(1_800_000, 1_800_100), 1_801_730);
        // Mid-interval watermark lands on the same boundary.
        assert_eq!(schedule.first_fire(1_800_900, 1_800_950), 1_801_730);
    }

    #[test]
    fn test_first_fire_when_watermark_is_stale() {
        let schedule = Schedule::default();
        // Empty store (watermark 0) aligns to the next boundary after now.
        assert_eq!(schedule.first_fire(0, 1_800_100), 1_801_730);
        // Exactly at a fire time moves on to the next one.
        assert_eq!(schedule.first_fire(0, 1_801_730), 1_803_530);
    }

    #[test]
    fn test_first_fire_is_always_in_future() {
        let schedule = Schedule {
            interval_secs: 600,
            lead_secs: 30,
        };
        for now in (1_000_000..1_002_000).step_by(37) {
            for watermark in [0, now - 5_000, now - 100, now] {
                let fire = schedule.first_fire(watermark, now);
                assert!(fire > now);
                assert!(fire <= now + 600);
                assert_eq!((fire + 30) % 600, 0);
            }
        }
    }
}
