//! Per-family collection across every enabled source
//!
//! Runs each source with the same `since` cursor and unions the results by
//! natural key. Sources that cap their page size are re-invoked from the last
//! returned time until a short page arrives or the data is within the safety
//! margin of now, which is how a bounded source rebuilds full history.
//!
//! Any source failure aborts the whole call; nothing gathered so far is returned.

use crate::error::Result;
use crate::sources::Source;
use crate::types::Tick;
use std::collections::HashSet;

pub struct FamilyCollector<T: Tick> {
    sources: Vec<Box<dyn Source<T>>>,
    safety_margin_secs: i64,
}

impl<T: Tick> FamilyCollector<T> {
    pub fn new(sources: Vec<Box<dyn Source<T>>>, safety_margin_secs: i64) -> Self {
        Self {
            sources,
            safety_margin_secs,
        }
    }

    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Collect everything newer than `since` from all sources.
    pub async fn collect(&self, since: i64) -> Result<Vec<T>> {
        self.collect_at(since, chrono::Utc::now().timestamp()).await
    }

    /// [`collect`](Self::collect) with an explicit "now" for the backfill horizon.
    pub async fn collect_at(&self, since: i64, now: i64) -> Result<Vec<T>> {
        let horizon = now - self.safety_margin_secs;
        let mut records = Vec::new();

        for source in &self.sources {
            let mut page = source.collect(since).await?;
            let mut cursor = since;
            let mut pages = 1usize;
            let mut count = 0usize;

            loop {
                let next_since = next_page_since(source.page_limit(), &page, cursor, horizon);
                count += page.len();
                records.append(&mut page);

                match next_since {
                    Some(next) => {
                        cursor = next;
                        page = source.collect(cursor).await?;
                        pages += 1;
                    }
                    None => break,
                }
            }

            log::debug!(
                "📥 {} {}: {} records in {} page(s), last seen {}",
                T::FAMILY,
                source.name(),
                count,
                pages,
                source.last_update_time()
            );
        }

        Ok(dedup_by_key(records))
    }
}

/// Decide whether a bounded source must be asked for another page.
///
/// Continues only when the page is full, its newest record is still older than
/// `horizon`, and that record moved past `cursor` (a repeated page cannot loop).
pub fn next_page_since<T: Tick>(
    limit: Option<usize>,
    page: &[T],
    cursor: i64,
    horizon: i64,
) -> Option<i64> {
    let limit = limit?;
    if page.len() < limit {
        return None;
    }

    let last = page.iter().map(Tick::time).max()?;
    if last < horizon && last > cursor {
        Some(last)
    } else {
        None
    }
}

/// Keep the first record seen for each natural key.
fn dedup_by_key<T: Tick>(records: Vec<T>) -> Vec<T> {
    let mut seen: HashSet<(i64, String)> = HashSet::with_capacity(records.len());
    records
        .into_iter()
        .filter(|r| {
            let (time, source) = r.key();
            seen.insert((time, source.to_string()))
        })
        .collect()
}
