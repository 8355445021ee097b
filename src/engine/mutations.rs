use std::sync::Arc;

use tokio::sync::{oneshot, RwLock};
use tracing::{debug, warn};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::validate::{now_ms, validate_owner, validate_slot};
use super::{BookingError, CancellationError, Engine, EngineError, StoreError, WalCommand};

impl Engine {
    /// Create a date with the given starting availability.
    pub async fn seed_date(&self, date: DateId, available: Vec<TimeSlotId>) -> Result<(), EngineError> {
        if let Some(unknown) = available.iter().find(|s| !self.catalog().contains(s)) {
            return Err(EngineError::TimeSlotUnknown(*unknown));
        }

        let _seeding = self.seed_lock.lock().await;
        if self.dates.contains_key(&date) {
            return Err(EngineError::DateAlreadyExists(date));
        }
        if self.dates.len() >= MAX_DATES {
            return Err(EngineError::LimitExceeded("too many dates"));
        }

        let rec = DateRecord::new(date, available);
        let event = Event::DateSeeded {
            date,
            available: rec.available.iter().copied().collect(),
        };
        self.wal_append(&event).await?;
        self.dates.insert(date, Arc::new(RwLock::new(rec)));
        self.notify.send(date, &event);
        metrics::gauge!(crate::observability::DATES_ACTIVE).set(self.dates.len() as f64);
        Ok(())
    }

    /// Take `slot` on `date` for `owner_id` as appointment `id`.
    ///
    /// Check, commit and apply all happen under the date's write lock, so of
    /// several concurrent calls for one slot exactly one succeeds. A failed
    /// commit leaves nothing applied and may be retried with the same `id`.
    pub async fn book(
        &self,
        id: Ulid,
        date: DateId,
        slot: TimeSlotId,
        owner_id: &str,
    ) -> Result<Appointment, BookingError> {
        validate_owner(owner_id)?;
        validate_slot(self.catalog(), &slot)?;
        let rec = self
            .date_record(&date)
            .ok_or(BookingError::DateNotFound(date))?;
        let mut guard = rec.write().await;

        if !guard.is_available(&slot) {
            return Err(BookingError::SlotUnavailable { date, slot });
        }
        if self.ledger.contains(&id) {
            return Err(BookingError::InvalidRequest("appointment id already used"));
        }
        if self.ledger.confirmed_count_for(owner_id) >= MAX_APPOINTMENTS_PER_OWNER {
            return Err(BookingError::InvalidRequest("too many appointments"));
        }

        let created_at = now_ms();
        let event = Event::AppointmentBooked {
            id,
            date,
            slot,
            owner_id: owner_id.to_string(),
            created_at,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        debug!("booked {date} {slot} as {id}");
        Ok(Appointment {
            id,
            date,
            slot,
            owner_id: owner_id.to_string(),
            status: AppointmentStatus::Confirmed,
            created_at,
            cancelled_at: None,
        })
    }

    /// Cancel a confirmed appointment held by `owner_id`, returning its slot to
    /// the date's availability.
    pub async fn cancel(&self, id: Ulid, owner_id: &str) -> Result<Appointment, CancellationError> {
        let date = self
            .ledger
            .date_of(&id)
            .ok_or(CancellationError::AppointmentNotFound(id))?;
        let rec = self
            .date_record(&date)
            .ok_or(CancellationError::AppointmentNotFound(id))?;
        let mut guard = rec.write().await;

        // Re-read under the lock: a concurrent cancel may have committed first.
        let appt = self
            .ledger
            .get(&id)
            .ok_or(CancellationError::AppointmentNotFound(id))?;
        if appt.owner_id != owner_id {
            return Err(CancellationError::Unauthorized(id));
        }
        if !appt.is_confirmed() {
            return Err(CancellationError::AlreadyCancelled(id));
        }

        let cancelled_at = now_ms();
        let event = Event::AppointmentCancelled {
            id,
            date,
            slot: appt.slot,
            cancelled_at,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        debug!("cancelled {id} ({date} {})", appt.slot);
        Ok(Appointment {
            status: AppointmentStatus::Cancelled,
            cancelled_at: Some(cancelled_at),
            ..appt
        })
    }

    /// Rewrite the WAL with only the events needed to recreate the current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let mut events = vec![Event::CatalogSeeded {
            slots: self.catalog().list_time_slots().to_vec(),
        }];

        // No seeding and no date writes while snapshotting, so the snapshot and
        // the log tail it replaces agree.
        let _seeding = self.seed_lock.lock().await;
        let mut ids: Vec<DateId> = self.dates.iter().map(|e| *e.key()).collect();
        ids.sort();
        let mut guards = Vec::with_capacity(ids.len());
        for date in &ids {
            if let Some(rec) = self.date_record(date) {
                guards.push(rec.read_owned().await);
            }
        }
        for guard in &guards {
            events.push(Event::DateSeeded {
                date: guard.date,
                available: guard.available.iter().copied().collect(),
            });
        }
        events.extend(
            self.ledger
                .all()
                .into_iter()
                .map(|appointment| Event::AppointmentRestored { appointment }),
        );

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| StoreError("WAL writer shut down".into()))?;
        let result = rx
            .await
            .map_err(|_| StoreError("WAL writer dropped response".into()))?
            .map_err(|e| StoreError(e.to_string()));
        drop(guards);
        result.map_err(EngineError::from)
    }

    /// Appends since the last compaction. A dead WAL writer reads as 0.
    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            warn!("WAL writer shut down; append count unavailable");
            return 0;
        }
        match rx.await {
            Ok(n) => n,
            Err(_) => {
                warn!("WAL writer dropped append count response");
                0
            }
        }
    }
}
