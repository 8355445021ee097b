use async_trait::async_trait;
use dashmap::DashMap;
use ulid::Ulid;

use crate::model::*;

use super::EngineError;

/// Read side of the availability store, as seen by the cache.
#[async_trait]
pub trait AvailabilitySource: Send + Sync {
    async fn get_date(&self, date: DateId) -> Result<DateRecord, EngineError>;
}

/// Appointment records plus an owner index.
///
/// Entries are only mutated by the engine while it holds the write lock of the
/// date the appointment references.
pub struct Ledger {
    appointments: DashMap<Ulid, Appointment>,
    by_owner: DashMap<String, Vec<Ulid>>,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger {
    pub fn new() -> Self {
        Self {
            appointments: DashMap::new(),
            by_owner: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.appointments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.appointments.is_empty()
    }

    pub fn contains(&self, id: &Ulid) -> bool {
        self.appointments.contains_key(id)
    }

    pub fn get(&self, id: &Ulid) -> Option<Appointment> {
        self.appointments.get(id).map(|e| e.value().clone())
    }

    /// The date an appointment was booked on. Never changes once recorded.
    pub fn date_of(&self, id: &Ulid) -> Option<DateId> {
        self.appointments.get(id).map(|e| e.value().date)
    }

    /// Insert or overwrite. Re-inserting the same id does not duplicate the
    /// owner index entry.
    pub fn insert(&self, appointment: Appointment) {
        let mut ids = self.by_owner.entry(appointment.owner_id.clone()).or_default();
        if !ids.contains(&appointment.id) {
            ids.push(appointment.id);
        }
        drop(ids);
        self.appointments.insert(appointment.id, appointment);
    }

    /// Returns false if the appointment is unknown or no longer confirmed.
    pub fn mark_cancelled(&self, id: &Ulid, at: Ms) -> bool {
        match self.appointments.get_mut(id) {
            Some(mut appt) if appt.is_confirmed() => {
                appt.status = AppointmentStatus::Cancelled;
                appt.cancelled_at = Some(at);
                true
            }
            _ => false,
        }
    }

    pub fn for_owner(&self, owner_id: &str) -> Vec<Appointment> {
        let ids = self
            .by_owner
            .get(owner_id)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        ids.iter().filter_map(|id| self.get(id)).collect()
    }

    pub fn confirmed_count_for(&self, owner_id: &str) -> usize {
        self.by_owner.get(owner_id).map_or(0, |ids| {
            ids.iter()
                .filter(|id| self.appointments.get(*id).is_some_and(|a| a.is_confirmed()))
                .count()
        })
    }

    /// Snapshot of every record, in id (creation) order.
    pub fn all(&self) -> Vec<Appointment> {
        let mut all: Vec<Appointment> = self.appointments.iter().map(|e| e.value().clone()).collect();
        all.sort_by_key(|a| a.id);
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn appt(owner: &str, slot: &str) -> Appointment {
        Appointment {
            id: Ulid::new(),
            date: NaiveDate::from_ymd_opt(2025, 10, 1).unwrap(),
            slot: slot.parse().unwrap(),
            owner_id: owner.into(),
            status: AppointmentStatus::Confirmed,
            created_at: 1,
            cancelled_at: None,
        }
    }

    #[test]
    fn owner_index_tracks_inserts() {
        let ledger = Ledger::new();
        let a = appt("alice", "08-00_AM");
        let b = appt("alice", "08-30_AM");
        let c = appt("bob", "09-00_AM");
        ledger.insert(a.clone());
        ledger.insert(b.clone());
        ledger.insert(c.clone());
        ledger.insert(a.clone());

        assert_eq!(ledger.len(), 3);
        assert_eq!(ledger.for_owner("alice"), vec![a, b]);
        assert_eq!(ledger.for_owner("bob"), vec![c]);
        assert!(ledger.for_owner("carol").is_empty());
    }

    #[test]
    fn mark_cancelled_only_once() {
        let ledger = Ledger::new();
        let a = appt("alice", "08-00_AM");
        ledger.insert(a.clone());

        assert_eq!(ledger.confirmed_count_for("alice"), 1);
        assert!(ledger.mark_cancelled(&a.id, 42));
        assert!(!ledger.mark_cancelled(&a.id, 43));
        assert!(!ledger.mark_cancelled(&Ulid::new(), 43));

        let stored = ledger.get(&a.id).unwrap();
        assert_eq!(stored.status, AppointmentStatus::Cancelled);
        assert_eq!(stored.cancelled_at, Some(42));
        assert_eq!(ledger.confirmed_count_for("alice"), 0);
    }
}
