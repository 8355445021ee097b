use chrono::NaiveDate;

use crate::engine::EngineError;
use crate::limits::MAX_CATALOG_SLOTS;
use crate::model::{DateId, TimeSlotId};

/// The fixed daily schedule. Read-only once the engine has persisted it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotCatalog {
    /// Sorted by time of day, no duplicates.
    slots: Vec<TimeSlotId>,
}

impl SlotCatalog {
    /// Every `step_minutes` from `first` through `last`, inclusive.
    pub fn new(first: TimeSlotId, last: TimeSlotId, step_minutes: u16) -> Result<Self, EngineError> {
        if step_minutes == 0 {
            return Err(EngineError::InvalidCatalog("slot step must be positive"));
        }
        if last < first {
            return Err(EngineError::InvalidCatalog("day ends before it starts"));
        }
        let slots: Vec<TimeSlotId> = (first.minutes_of_day()..=last.minutes_of_day())
            .step_by(step_minutes as usize)
            .filter_map(TimeSlotId::from_minutes_of_day)
            .collect();
        Self::from_slots(slots)
    }

    /// 08:00 through 15:30 in 30-minute steps.
    pub fn reference() -> Self {
        let slots = (16..=31)
            .filter_map(|half_hours: u16| TimeSlotId::from_minutes_of_day(half_hours * 30))
            .collect();
        Self { slots }
    }

    pub fn from_slots(mut slots: Vec<TimeSlotId>) -> Result<Self, EngineError> {
        slots.sort();
        slots.dedup();
        if slots.is_empty() {
            return Err(EngineError::InvalidCatalog("catalog has no slots"));
        }
        if slots.len() > MAX_CATALOG_SLOTS {
            return Err(EngineError::InvalidCatalog("too many slots"));
        }
        Ok(Self { slots })
    }

    pub fn list_time_slots(&self) -> &[TimeSlotId] {
        &self.slots
    }

    pub fn contains(&self, slot: &TimeSlotId) -> bool {
        self.slots.binary_search(slot).is_ok()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Calendar days from `start` through `end`, inclusive. Empty if `end < start`.
pub fn dates_between(start: DateId, end: DateId) -> impl Iterator<Item = NaiveDate> {
    start.iter_days().take_while(move |d| *d <= end)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> TimeSlotId {
        s.parse().unwrap()
    }

    #[test]
    fn reference_catalog_is_eight_to_half_past_three() {
        let c = SlotCatalog::reference();
        assert_eq!(c.len(), 16);
        assert_eq!(c.list_time_slots()[0], t("08-00_AM"));
        assert_eq!(c.list_time_slots()[1], t("08-30_AM"));
        assert_eq!(*c.list_time_slots().last().unwrap(), t("03-30_PM"));
    }

    #[test]
    fn new_matches_reference() {
        let c = SlotCatalog::new(t("08-00_AM"), t("03-30_PM"), 30).unwrap();
        assert_eq!(c, SlotCatalog::reference());
    }

    #[test]
    fn new_step_that_overshoots_last_stops_before_it() {
        let c = SlotCatalog::new(t("09-00_AM"), t("10-00_AM"), 45).unwrap();
        assert_eq!(c.list_time_slots(), &[t("09-00_AM"), t("09-45_AM")]);
    }

    #[test]
    fn new_rejects_bad_bounds() {
        assert!(matches!(
            SlotCatalog::new(t("09-00_AM"), t("08-00_AM"), 30),
            Err(EngineError::InvalidCatalog(_))
        ));
        assert!(matches!(
            SlotCatalog::new(t("08-00_AM"), t("09-00_AM"), 0),
            Err(EngineError::InvalidCatalog(_))
        ));
    }

    #[test]
    fn from_slots_sorts_and_dedups() {
        let c = SlotCatalog::from_slots(vec![t("10-00_AM"), t("08-00_AM"), t("10-00_AM")]).unwrap();
        assert_eq!(c.list_time_slots(), &[t("08-00_AM"), t("10-00_AM")]);
        assert!(c.contains(&t("10-00_AM")));
        assert!(!c.contains(&t("09-00_AM")));
        assert!(SlotCatalog::from_slots(vec![]).is_err());
    }

    #[test]
    fn dates_between_is_inclusive() {
        let start = NaiveDate::from_ymd_opt(2025, 9, 29).unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 10, 2).unwrap();
        let days: Vec<String> = dates_between(start, end).map(|d| d.to_string()).collect();
        assert_eq!(days, ["2025-09-29", "2025-09-30", "2025-10-01", "2025-10-02"]);
        assert_eq!(dates_between(end, start).count(), 0);
        assert_eq!(dates_between(start, start).count(), 1);
    }
}
