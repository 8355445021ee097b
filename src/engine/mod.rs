mod error;
mod mutations;
mod queries;
mod store;
mod validate;

pub use error::{BookingError, CancellationError, EngineError, StoreError};
pub use store::{AvailabilitySource, Ledger};
pub(crate) use validate::now_ms;

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::catalog::SlotCatalog;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

pub type SharedDateRecord = Arc<RwLock<DateRecord>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// Blocks for the first append, drains whatever else is already queued, then
/// syncs once and answers every sender with the shared result.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let WalCommand::Append { event, response } = cmd else {
            handle_non_append(&mut wal, cmd);
            continue;
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    // Commit what is batched before a compaction or counter read.
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }

        metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let flush_start = std::time::Instant::now();
        let result = flush_batch(&mut wal, &batch);
        metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());
        for (_, tx) in batch {
            let r = match &result {
                Ok(()) => Ok(()),
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            };
            let _ = tx.send(r);
        }

        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let append_result = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event));
    // Flush even after a failed append so a partial frame can't prefix the next batch.
    let flush_result = wal.flush_sync();
    append_result.and(flush_result)
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { event, response } => {
            let _ = response.send(wal.append(&event));
        }
    }
}

/// The availability store and appointment ledger, backed by one WAL.
///
/// Every date is its own lock; bookings and cancellations for a date run as a
/// critical section on that lock, so different dates never contend.
pub struct Engine {
    pub(super) dates: DashMap<DateId, SharedDateRecord>,
    pub(super) ledger: Ledger,
    catalog: SlotCatalog,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    /// Serializes date creation so two seeders can't both persist the same date.
    pub(super) seed_lock: Mutex<()>,
    #[cfg(test)]
    pub(crate) fail_next_appends: std::sync::atomic::AtomicU32,
}

/// Apply a booking-side event to a date (no locking, the caller holds the write lock).
///
/// A booking whose id is already recorded, or whose slot is already taken, is
/// dropped. Live commits never produce either; a replayed log can, when a
/// commit reported failure after its frame reached disk.
fn apply_to_date(rec: &mut DateRecord, event: &Event, ledger: &Ledger) {
    match event {
        Event::AppointmentBooked {
            id,
            date,
            slot,
            owner_id,
            created_at,
        } => {
            if ledger.contains(id) {
                debug!("skipping repeated booking {id}");
                return;
            }
            if !rec.remove_slot(slot) {
                warn!("dropping booking {id}: {date} {slot} is already taken");
                return;
            }
            ledger.insert(Appointment {
                id: *id,
                date: *date,
                slot: *slot,
                owner_id: owner_id.clone(),
                status: AppointmentStatus::Confirmed,
                created_at: *created_at,
                cancelled_at: None,
            });
        }
        Event::AppointmentCancelled {
            id,
            slot,
            cancelled_at,
            ..
        } => {
            // Only a confirmed appointment gives its slot back.
            if ledger.mark_cancelled(id, *cancelled_at) {
                rec.add_slot(*slot);
            }
        }
        Event::AppointmentRestored { appointment } => {
            ledger.insert(appointment.clone());
        }
        // Catalog and date creation are handled at the map level, not here
        Event::CatalogSeeded { .. } | Event::DateSeeded { .. } => {}
    }
}

impl Engine {
    /// Open the store at `wal_path`, replaying history.
    ///
    /// `catalog` is persisted on first open. Afterwards the persisted catalog
    /// wins and a differing argument is only logged.
    pub fn new(wal_path: PathBuf, catalog: SlotCatalog, notify: Arc<NotifyHub>) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let mut wal = Wal::open(&wal_path)?;

        let mut active_catalog = None;
        let mut dates: HashMap<DateId, DateRecord> = HashMap::new();
        let ledger = Ledger::new();

        for event in &events {
            match event {
                Event::CatalogSeeded { slots } => {
                    let persisted = SlotCatalog::from_slots(slots.clone())
                        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
                    active_catalog = Some(persisted);
                }
                Event::DateSeeded { date, available } => {
                    dates.insert(*date, DateRecord::new(*date, available.iter().copied()));
                }
                other => match other.date().and_then(|d| dates.get_mut(&d)) {
                    Some(rec) => apply_to_date(rec, other, &ledger),
                    None => warn!("replay: skipping event for unknown date: {other:?}"),
                },
            }
        }

        let catalog = match active_catalog {
            Some(persisted) => {
                if persisted != catalog {
                    warn!(
                        "configured catalog ({} slots) differs from persisted catalog ({} slots); using persisted",
                        catalog.len(),
                        persisted.len()
                    );
                }
                persisted
            }
            None => {
                wal.append(&Event::CatalogSeeded {
                    slots: catalog.list_time_slots().to_vec(),
                })?;
                catalog
            }
        };

        info!(
            "replayed {} events: {} dates, {} appointments",
            events.len(),
            dates.len(),
            ledger.len()
        );

        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            dates: dates
                .into_iter()
                .map(|(d, rec)| (d, Arc::new(RwLock::new(rec))))
                .collect(),
            ledger,
            catalog,
            wal_tx,
            notify,
            seed_lock: Mutex::new(()),
            #[cfg(test)]
            fail_next_appends: std::sync::atomic::AtomicU32::new(0),
        };
        metrics::gauge!(crate::observability::DATES_ACTIVE).set(engine.dates.len() as f64);
        Ok(engine)
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), StoreError> {
        #[cfg(test)]
        {
            use std::sync::atomic::Ordering;
            if self
                .fail_next_appends
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(StoreError("injected append failure".into()));
            }
        }
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| StoreError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError("WAL writer dropped response".into()))?
            .map_err(|e| StoreError(e.to_string()))
    }

    /// Make the next `n` appends fail as if the disk had.
    #[cfg(test)]
    pub(crate) fn fail_next_appends(&self, n: u32) {
        self.fail_next_appends
            .store(n, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn catalog(&self) -> &SlotCatalog {
        &self.catalog
    }

    pub(super) fn date_record(&self, date: &DateId) -> Option<SharedDateRecord> {
        self.dates.get(date).map(|e| e.value().clone())
    }

    /// WAL-append, then apply and notify. Nothing is applied if the append fails.
    pub(super) async fn persist_and_apply(
        &self,
        rec: &mut DateRecord,
        event: &Event,
    ) -> Result<(), StoreError> {
        self.wal_append(event).await?;
        apply_to_date(rec, event, &self.ledger);
        self.notify.send(rec.date, event);
        Ok(())
    }
}
