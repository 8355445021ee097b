use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tracing::{debug, info};
use ulid::Ulid;

use crate::cache::{AvailabilityCache, Clock};
use crate::catalog::dates_between;
use crate::engine::{BookingError, CancellationError, Engine, EngineError};
use crate::limits::MAX_HORIZON_DAYS;
use crate::model::*;
use crate::observability::{booking_outcome, cancellation_outcome};
use crate::retry::RetryPolicy;

/// Caller-facing booking core: engine, availability cache and retry policy.
///
/// Each service owns its cache; two services over one engine share state but
/// not cached views.
pub struct SlotService {
    engine: Arc<Engine>,
    cache: AvailabilityCache,
    retry: RetryPolicy,
}

impl SlotService {
    pub fn new(engine: Arc<Engine>, cache_ttl: Duration, clock: Arc<dyn Clock>, retry: RetryPolicy) -> Self {
        let cache = AvailabilityCache::new(engine.clone(), cache_ttl, clock);
        Self { engine, cache, retry }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn cache(&self) -> &AvailabilityCache {
        &self.cache
    }

    /// Availability for every known date in `[start, end]`, served through the cache.
    pub async fn list_availability(&self, start: DateId, end: DateId) -> Result<Vec<DateRecord>, EngineError> {
        let ids = self.engine.list_date_ids(start, end)?;
        let mut records = Vec::with_capacity(ids.len());
        for date in ids {
            records.push(self.cache.get(date).await?);
        }
        Ok(records)
    }

    /// Availability for one date, served through the cache.
    pub async fn availability_on(&self, date: DateId) -> Result<DateRecord, EngineError> {
        self.cache.get(date).await
    }

    /// Book `slot` on `date` for `owner_id`. Storage failures are retried with
    /// backoff under one appointment id; semantic failures return at once.
    pub async fn book(&self, date: DateId, slot: TimeSlotId, owner_id: &str) -> Result<Ulid, BookingError> {
        let start = Instant::now();
        let id = Ulid::new();
        let result = self
            .retry
            .run("book", BookingError::is_transient, |_| {
                self.engine.book(id, date, slot, owner_id)
            })
            .await;

        metrics::counter!(crate::observability::BOOKINGS_TOTAL, "outcome" => booking_outcome(&result))
            .increment(1);
        metrics::histogram!(crate::observability::BOOK_DURATION_SECONDS)
            .record(start.elapsed().as_secs_f64());

        match result {
            Ok(appt) => {
                self.cache.invalidate(date);
                info!("booked {date} {slot} for {owner_id}: {}", appt.id);
                Ok(appt.id)
            }
            Err(e) => {
                debug!("booking {date} {slot} for {owner_id} failed: {e}");
                Err(e)
            }
        }
    }

    /// Cancel `appointment_id` on behalf of `owner_id`.
    pub async fn cancel(&self, appointment_id: Ulid, owner_id: &str) -> Result<(), CancellationError> {
        let result = self
            .retry
            .run("cancel", CancellationError::is_transient, |_| {
                self.engine.cancel(appointment_id, owner_id)
            })
            .await;

        metrics::counter!(
            crate::observability::CANCELLATIONS_TOTAL,
            "outcome" => cancellation_outcome(&result)
        )
        .increment(1);

        match result {
            Ok(appt) => {
                self.cache.invalidate(appt.date);
                info!("cancelled {appointment_id} ({} {}) for {owner_id}", appt.date, appt.slot);
                Ok(())
            }
            Err(e) => {
                debug!("cancelling {appointment_id} for {owner_id} failed: {e}");
                Err(e)
            }
        }
    }

    /// The owner's appointments, newest first.
    pub fn appointments_for(&self, owner_id: &str) -> Vec<Appointment> {
        self.engine.appointments_for(owner_id)
    }

    /// Seed every missing date in `[start, start + days)` with the full catalog.
    /// Returns how many dates were created.
    pub async fn seed_horizon(&self, start: DateId, days: u32) -> Result<usize, EngineError> {
        if days == 0 {
            return Ok(0);
        }
        if days > MAX_HORIZON_DAYS {
            return Err(EngineError::LimitExceeded("horizon too long"));
        }
        let end = start
            .checked_add_days(chrono::Days::new(u64::from(days) - 1))
            .ok_or(EngineError::LimitExceeded("horizon out of range"))?;
        let full = self.engine.catalog().list_time_slots().to_vec();
        let mut created = 0;
        for date in dates_between(start, end) {
            match self.engine.seed_date(date, full.clone()).await {
                Ok(()) => created += 1,
                Err(EngineError::DateAlreadyExists(_)) => {}
                Err(e) => return Err(e),
            }
        }
        self.cache.invalidate_all();
        if created > 0 {
            info!("seeded {created} dates from {start} through {end}");
        }
        Ok(created)
    }

    /// Committed events for `date`, as they happen.
    pub fn subscribe(&self, date: DateId) -> broadcast::Receiver<Event> {
        self.engine.notify.subscribe(date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use crate::catalog::SlotCatalog;
    use crate::notify::NotifyHub;
    use chrono::NaiveDate;
    use std::path::PathBuf;
    use tokio_test::{assert_err, assert_ok};

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("slotbook_test_service");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    fn day() -> DateId {
        NaiveDate::from_ymd_opt(2025, 10, 1).unwrap()
    }

    fn t(s: &str) -> TimeSlotId {
        s.parse().unwrap()
    }

    fn fast_retry(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::from_millis(1), Duration::from_millis(5))
    }

    async fn service(name: &str, retry: RetryPolicy) -> SlotService {
        let engine = Engine::new(
            test_wal_path(name),
            SlotCatalog::reference(),
            Arc::new(NotifyHub::new()),
        )
        .unwrap();
        let svc = SlotService::new(
            Arc::new(engine),
            Duration::from_secs(300),
            Arc::new(ManualClock::new(0)),
            retry,
        );
        svc.engine()
            .seed_date(day(), vec![t("08-00_AM"), t("08-30_AM")])
            .await
            .unwrap();
        svc
    }

    #[tokio::test]
    async fn reads_reflect_own_writes_despite_ttl() {
        let svc = service("read_own_writes.wal", fast_retry(3)).await;
        assert_eq!(svc.availability_on(day()).await.unwrap().available.len(), 2);

        let id = assert_ok!(svc.book(day(), t("08-00_AM"), "alice").await);
        let after_book = svc.availability_on(day()).await.unwrap();
        assert!(!after_book.is_available(&t("08-00_AM")));

        assert_ok!(svc.cancel(id, "alice").await);
        let after_cancel = svc.availability_on(day()).await.unwrap();
        assert!(after_cancel.is_available(&t("08-00_AM")));
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let svc = service("retry_ok.wal", fast_retry(3)).await;
        svc.engine().fail_next_appends(2);

        let id = assert_ok!(svc.book(day(), t("08-00_AM"), "alice").await);
        let appt = svc.engine().get_appointment(&id).unwrap();
        assert!(appt.is_confirmed());
        assert_eq!(svc.appointments_for("alice").len(), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_store_error() {
        let svc = service("retry_exhausted.wal", fast_retry(3)).await;
        svc.engine().fail_next_appends(5);

        let err = assert_err!(svc.book(day(), t("08-00_AM"), "alice").await);
        assert!(matches!(err, BookingError::StoreTransient(_)));
        assert!(svc.availability_on(day()).await.unwrap().is_available(&t("08-00_AM")));
        assert!(svc.appointments_for("alice").is_empty());
    }

    #[tokio::test]
    async fn cancel_retries_transient_failures() {
        let svc = service("cancel_retry.wal", fast_retry(3)).await;
        let id = svc.book(day(), t("08-30_AM"), "alice").await.unwrap();
        svc.engine().fail_next_appends(1);
        assert_ok!(svc.cancel(id, "alice").await);
        assert!(!svc.engine().get_appointment(&id).unwrap().is_confirmed());
    }

    #[tokio::test]
    async fn semantic_errors_are_not_retried() {
        let slow = RetryPolicy::new(3, Duration::from_millis(500), Duration::from_secs(1));
        let svc = service("no_retry.wal", slow).await;
        svc.book(day(), t("08-00_AM"), "alice").await.unwrap();

        let started = Instant::now();
        assert_eq!(
            svc.book(day(), t("08-00_AM"), "bob").await,
            Err(BookingError::SlotUnavailable {
                date: day(),
                slot: t("08-00_AM")
            })
        );
        let missing = NaiveDate::from_ymd_opt(2030, 1, 1).unwrap();
        assert_eq!(
            svc.book(missing, t("08-00_AM"), "bob").await,
            Err(BookingError::DateNotFound(missing))
        );
        let stranger = Ulid::new();
        assert_eq!(
            svc.cancel(stranger, "bob").await,
            Err(CancellationError::AppointmentNotFound(stranger))
        );
        assert!(started.elapsed() < Duration::from_millis(500), "no backoff may have run");
    }

    #[tokio::test]
    async fn seed_horizon_skips_existing_dates() {
        let svc = service("horizon.wal", RetryPolicy::none()).await;
        // 2025-10-01 already exists.
        assert_eq!(svc.seed_horizon(day(), 7).await.unwrap(), 6);
        assert_eq!(svc.seed_horizon(day(), 7).await.unwrap(), 0);
        assert_eq!(svc.seed_horizon(day(), 0).await.unwrap(), 0);
        assert_eq!(
            svc.seed_horizon(day(), MAX_HORIZON_DAYS + 1).await,
            Err(EngineError::LimitExceeded("horizon too long"))
        );

        let week = svc
            .list_availability(day(), NaiveDate::from_ymd_opt(2025, 10, 7).unwrap())
            .await
            .unwrap();
        assert_eq!(week.len(), 7);
        assert_eq!(week[0].available.len(), 2);
        assert!(week[1..].iter().all(|r| r.available.len() == 16));
    }

    #[tokio::test]
    async fn subscribe_sees_service_bookings() {
        let svc = service("subscribe.wal", RetryPolicy::none()).await;
        let mut rx = svc.subscribe(day());
        let id = svc.book(day(), t("08-30_AM"), "alice").await.unwrap();
        assert!(matches!(
            rx.recv().await.unwrap(),
            Event::AppointmentBooked { id: got, .. } if got == id
        ));
    }
}
