use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::NaiveDate;

use crate::catalog::SlotCatalog;
use crate::engine::EngineError;
use crate::model::{DateId, TimeSlotId};
use crate::retry::RetryPolicy;

/// Process configuration, read from `SLOTBOOK_*` environment variables.
/// Unset or unparsable values fall back to their defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub cache_ttl: Duration,
    /// First date of the booking horizon; today when unset.
    pub horizon_start: Option<DateId>,
    pub horizon_days: u32,
    pub day_start: TimeSlotId,
    pub day_end: TimeSlotId,
    pub slot_minutes: u16,
    pub retry_attempts: u32,
    pub retry_base: Duration,
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
    pub demo_clients: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let slot = |key: &str, default: TimeSlotId| {
            lookup(key)
                .and_then(|s| TimeSlotId::parse_24h(&s))
                .unwrap_or(default)
        };

        Self {
            data_dir: lookup("SLOTBOOK_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data")),
            cache_ttl: Duration::from_secs(parsed(&lookup, "SLOTBOOK_CACHE_TTL_SECS").unwrap_or(300)),
            horizon_start: lookup("SLOTBOOK_HORIZON_START")
                .and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()),
            horizon_days: parsed(&lookup, "SLOTBOOK_HORIZON_DAYS").unwrap_or(30),
            day_start: slot("SLOTBOOK_DAY_START", TimeSlotId::DAY_START),
            day_end: slot("SLOTBOOK_DAY_END", TimeSlotId::DAY_END),
            slot_minutes: parsed(&lookup, "SLOTBOOK_SLOT_MINUTES").unwrap_or(30),
            retry_attempts: parsed(&lookup, "SLOTBOOK_RETRY_ATTEMPTS").unwrap_or(3),
            retry_base: Duration::from_millis(parsed(&lookup, "SLOTBOOK_RETRY_BASE_MS").unwrap_or(10)),
            compact_threshold: parsed(&lookup, "SLOTBOOK_COMPACT_THRESHOLD").unwrap_or(1000),
            metrics_port: parsed(&lookup, "SLOTBOOK_METRICS_PORT"),
            demo_clients: parsed(&lookup, "SLOTBOOK_DEMO_CLIENTS").unwrap_or(0),
        }
    }

    pub fn catalog(&self) -> Result<SlotCatalog, EngineError> {
        SlotCatalog::new(self.day_start, self.day_end, self.slot_minutes)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_attempts, self.retry_base, self.retry_base * 20)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("slotbook.wal")
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|s| s.trim().parse().ok())
}
