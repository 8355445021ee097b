use async_trait::async_trait;
use ulid::Ulid;

use crate::limits::MAX_QUERY_DAYS;
use crate::model::*;

use super::{AvailabilitySource, Engine, EngineError};

impl Engine {
    pub async fn get_date(&self, date: DateId) -> Result<DateRecord, EngineError> {
        let rec = self
            .date_record(&date)
            .ok_or(EngineError::DateNotFound(date))?;
        let guard = rec.read().await;
        Ok(guard.clone())
    }

    /// Every date record, ascending by date.
    pub async fn list_dates(&self) -> Vec<DateRecord> {
        let shared: Vec<_> = self.dates.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::with_capacity(shared.len());
        for rec in shared {
            out.push(rec.read().await.clone());
        }
        out.sort_by_key(|r| r.date);
        out
    }

    /// Dates known to the store within `[start, end]`, ascending.
    pub fn list_date_ids(&self, start: DateId, end: DateId) -> Result<Vec<DateId>, EngineError> {
        if (end - start).num_days() >= MAX_QUERY_DAYS {
            return Err(EngineError::LimitExceeded("date range too wide"));
        }
        let mut ids: Vec<DateId> = self
            .dates
            .iter()
            .map(|e| *e.key())
            .filter(|d| *d >= start && *d <= end)
            .collect();
        ids.sort();
        Ok(ids)
    }

    pub fn date_count(&self) -> usize {
        self.dates.len()
    }

    pub fn get_appointment(&self, id: &Ulid) -> Option<Appointment> {
        self.ledger.get(id)
    }

    /// All of an owner's appointments, newest first.
    pub fn appointments_for(&self, owner_id: &str) -> Vec<Appointment> {
        let mut appts = self.ledger.for_owner(owner_id);
        appts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        appts
    }

    /// Confirmed appointments on one date, in slot order.
    pub fn bookings_on(&self, date: DateId) -> Vec<Appointment> {
        let mut appts: Vec<Appointment> = self
            .ledger
            .all()
            .into_iter()
            .filter(|a| a.date == date && a.is_confirmed())
            .collect();
        appts.sort_by_key(|a| a.slot);
        appts
    }
}

#[async_trait]
impl AvailabilitySource for Engine {
    async fn get_date(&self, date: DateId) -> Result<DateRecord, EngineError> {
        Engine::get_date(self, date).await
    }
}
