use std::net::SocketAddr;

use crate::engine::{BookingError, CancellationError};
use crate::model::Appointment;

// ── Request-driven metrics ──────────────────────────────────────

/// Counter: booking attempts. Labels: outcome.
pub const BOOKINGS_TOTAL: &str = "slotbook_bookings_total";

/// Counter: cancellation attempts. Labels: outcome.
pub const CANCELLATIONS_TOTAL: &str = "slotbook_cancellations_total";

/// Histogram: end-to-end booking latency in seconds, retries included.
pub const BOOK_DURATION_SECONDS: &str = "slotbook_book_duration_seconds";

/// Counter: retries after a storage failure. Labels: op.
pub const STORE_RETRIES_TOTAL: &str = "slotbook_store_retries_total";

// ── Cache ───────────────────────────────────────────────────────

pub const CACHE_HITS_TOTAL: &str = "slotbook_cache_hits_total";

pub const CACHE_MISSES_TOTAL: &str = "slotbook_cache_misses_total";

// ── Store ───────────────────────────────────────────────────────

/// Gauge: date records in the store.
pub const DATES_ACTIVE: &str = "slotbook_dates_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "slotbook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "slotbook_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

pub fn booking_outcome(result: &Result<Appointment, BookingError>) -> &'static str {
    match result {
        Ok(_) => "booked",
        Err(BookingError::DateNotFound(_)) => "date_not_found",
        Err(BookingError::TimeSlotUnknown(_)) => "time_slot_unknown",
        Err(BookingError::SlotUnavailable { .. }) => "slot_unavailable",
        Err(BookingError::InvalidRequest(_)) => "invalid_request",
        Err(BookingError::StoreTransient(_)) => "store_transient",
    }
}

pub fn cancellation_outcome(result: &Result<Appointment, CancellationError>) -> &'static str {
    match result {
        Ok(_) => "cancelled",
        Err(CancellationError::AppointmentNotFound(_)) => "appointment_not_found",
        Err(CancellationError::Unauthorized(_)) => "unauthorized",
        Err(CancellationError::AlreadyCancelled(_)) => "already_cancelled",
        Err(CancellationError::StoreTransient(_)) => "store_transient",
    }
}
