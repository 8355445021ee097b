//! Read-through availability cache with a fixed time-to-live.
//!
//! Entries are keyed by date. A hit is served only while younger than the TTL;
//! anything older is treated as absent and re-read from the source. Writers
//! call [`AvailabilityCache::invalidate`] after every commit, so staleness is
//! bounded by the TTL and cut short by write activity.
//!
//! Each key has a generation that invalidation bumps (and a global epoch
//! that `invalidate_all` bumps). A read-through records both before fetching
//! and installs its result only if neither moved, so a fetch that raced a
//! commit can't put the pre-commit state back.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tracing::debug;

use crate::engine::{AvailabilitySource, EngineError};
use crate::model::{DateId, DateRecord, Ms};

/// Source of "now" for TTL checks.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> Ms;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> Ms {
        crate::engine::now_ms()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: std::sync::atomic::AtomicI64,
}

impl ManualClock {
    pub fn new(start: Ms) -> Self {
        Self {
            now: std::sync::atomic::AtomicI64::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as Ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> Ms {
        self.now.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    record: DateRecord,
    fetched_at: Ms,
}

pub struct AvailabilityCache {
    source: Arc<dyn AvailabilitySource>,
    ttl_ms: Ms,
    clock: Arc<dyn Clock>,
    entries: DashMap<DateId, CacheEntry>,
    generations: DashMap<DateId, u64>,
    epoch: AtomicU64,
}

impl AvailabilityCache {
    pub fn new(source: Arc<dyn AvailabilitySource>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            source,
            ttl_ms: ttl.as_millis() as Ms,
            clock,
            entries: DashMap::new(),
            generations: DashMap::new(),
            epoch: AtomicU64::new(0),
        }
    }

    fn generation(&self, date: &DateId) -> u64 {
        self.generations.get(date).map_or(0, |g| *g)
    }

    /// The record for `date`, from cache if fresh, otherwise read through.
    /// Source errors propagate and leave nothing cached.
    pub async fn get(&self, date: DateId) -> Result<DateRecord, EngineError> {
        let now = self.clock.now_ms();
        if let Some(entry) = self.entries.get(&date)
            && now - entry.fetched_at < self.ttl_ms
        {
            metrics::counter!(crate::observability::CACHE_HITS_TOTAL).increment(1);
            return Ok(entry.record.clone());
        }
        metrics::counter!(crate::observability::CACHE_MISSES_TOTAL).increment(1);

        let epoch = self.epoch.load(Ordering::SeqCst);
        let generation = self.generation(&date);
        let record = self.source.get_date(date).await?;

        // Hold the generation shard while installing so an invalidation can't
        // slip in between the check and the insert.
        let current = self.generations.entry(date).or_insert(0);
        if *current == generation && self.epoch.load(Ordering::SeqCst) == epoch {
            self.entries.insert(
                date,
                CacheEntry {
                    record: record.clone(),
                    fetched_at: now,
                },
            );
            // `invalidate_all` does not take this shard; undo if it ran meanwhile.
            if self.epoch.load(Ordering::SeqCst) != epoch {
                self.entries.remove(&date);
            }
        } else {
            debug!("cache: discarding read-through for {date}, invalidated mid-fetch");
        }
        drop(current);
        Ok(record)
    }

    /// Drop the entry for `date`; the next `get` re-reads the source.
    pub fn invalidate(&self, date: DateId) {
        let mut generation = self.generations.entry(date).or_insert(0);
        *generation += 1;
        self.entries.remove(&date);
    }

    /// Drop everything.
    pub fn invalidate_all(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
