use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use futures::future::join_all;
use ulid::Ulid;

use slotbook::cache::{ManualClock, SystemClock};
use slotbook::catalog::SlotCatalog;
use slotbook::engine::{BookingError, CancellationError, Engine};
use slotbook::model::{DateId, Event, TimeSlotId};
use slotbook::notify::NotifyHub;
use slotbook::retry::RetryPolicy;
use slotbook::service::SlotService;

// ── Test infrastructure ──────────────────────────────────────

fn temp_wal() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("slotbook_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    dir.join("slotbook.wal")
}

fn open_engine(path: &PathBuf) -> Arc<Engine> {
    Arc::new(Engine::new(path.clone(), SlotCatalog::reference(), Arc::new(NotifyHub::new())).unwrap())
}

fn service_over(engine: Arc<Engine>) -> Arc<SlotService> {
    Arc::new(SlotService::new(
        engine,
        Duration::from_secs(300),
        Arc::new(SystemClock),
        RetryPolicy::default(),
    ))
}

fn oct(day: u32) -> DateId {
    NaiveDate::from_ymd_opt(2025, 10, day).unwrap()
}

fn t(s: &str) -> TimeSlotId {
    s.parse().unwrap()
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn clients_racing_for_one_slot_get_one_appointment() {
    let engine = open_engine(&temp_wal());
    let svc = service_over(engine.clone());
    svc.seed_horizon(oct(1), 1).await.unwrap();

    let handles = (0..100).map(|i| {
        let svc = svc.clone();
        tokio::spawn(async move { svc.book(oct(1), t("10-30_AM"), &format!("client-{i}")).await })
    });
    let results: Vec<_> = join_all(handles).await.into_iter().map(|r| r.unwrap()).collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        results.iter().filter(|r| matches!(r, Err(BookingError::SlotUnavailable { .. }))).count(),
        99
    );
    let record = svc.availability_on(oct(1)).await.unwrap();
    assert!(!record.is_available(&t("10-30_AM")));
    assert_eq!(record.available.len(), 15);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_services_share_one_store() {
    let engine = open_engine(&temp_wal());
    let front = service_over(engine.clone());
    let back = service_over(engine);
    front.seed_horizon(oct(1), 2).await.unwrap();

    // Warm the second service's cache, then book through the first.
    assert!(back.availability_on(oct(2)).await.unwrap().is_available(&t("08-00_AM")));
    front.book(oct(2), t("08-00_AM"), "alice").await.unwrap();

    assert_eq!(
        back.book(oct(2), t("08-00_AM"), "bob").await,
        Err(BookingError::SlotUnavailable {
            date: oct(2),
            slot: t("08-00_AM")
        })
    );
}

#[tokio::test]
async fn stale_cache_is_bounded_by_ttl() {
    let engine = open_engine(&temp_wal());
    let clock = Arc::new(ManualClock::new(0));
    let reader = SlotService::new(
        engine.clone(),
        Duration::from_secs(300),
        clock.clone(),
        RetryPolicy::none(),
    );
    let writer = service_over(engine);
    writer.seed_horizon(oct(3), 1).await.unwrap();

    assert_eq!(reader.availability_on(oct(3)).await.unwrap().available.len(), 16);
    writer.book(oct(3), t("09-00_AM"), "alice").await.unwrap();

    // The reader's view may lag until its TTL runs out.
    clock.advance(Duration::from_secs(299));
    assert_eq!(reader.availability_on(oct(3)).await.unwrap().available.len(), 16);
    clock.advance(Duration::from_secs(1));
    assert_eq!(reader.availability_on(oct(3)).await.unwrap().available.len(), 15);
}

#[tokio::test]
async fn state_survives_restart() {
    let path = temp_wal();
    let (kept, released) = {
        let svc = service_over(open_engine(&path));
        svc.seed_horizon(oct(1), 3).await.unwrap();
        let kept = svc.book(oct(2), t("01-00_PM"), "alice").await.unwrap();
        let released = svc.book(oct(2), t("01-30_PM"), "alice").await.unwrap();
        svc.cancel(released, "alice").await.unwrap();
        (kept, released)
    };

    let svc = service_over(open_engine(&path));
    assert_eq!(svc.seed_horizon(oct(1), 3).await.unwrap(), 0);
    let record = svc.availability_on(oct(2)).await.unwrap();
    assert!(!record.is_available(&t("01-00_PM")));
    assert!(record.is_available(&t("01-30_PM")));

    let mine = svc.appointments_for("alice");
    assert_eq!(mine.len(), 2);
    assert!(mine.iter().any(|a| a.id == kept && a.is_confirmed()));
    assert!(mine.iter().any(|a| a.id == released && !a.is_confirmed()));
    assert_eq!(
        svc.cancel(released, "alice").await,
        Err(CancellationError::AlreadyCancelled(released))
    );
}

#[tokio::test]
async fn change_feed_reports_commits_in_order() {
    let svc = service_over(open_engine(&temp_wal()));
    svc.seed_horizon(oct(4), 1).await.unwrap();
    let mut rx = svc.subscribe(oct(4));

    let first = svc.book(oct(4), t("08-00_AM"), "alice").await.unwrap();
    let second = svc.book(oct(4), t("08-30_AM"), "bob").await.unwrap();
    svc.cancel(first, "alice").await.unwrap();

    let mut seen = Vec::new();
    for _ in 0..3 {
        let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        seen.push(event);
    }
    assert!(matches!(&seen[0], Event::AppointmentBooked { id, .. } if *id == first));
    assert!(matches!(&seen[1], Event::AppointmentBooked { id, .. } if *id == second));
    assert!(matches!(&seen[2], Event::AppointmentCancelled { id, .. } if *id == first));
}
