use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds. The only timestamp type.
pub type Ms = i64;

/// Calendar date key, rendered as `YYYY-MM-DD`.
pub type DateId = NaiveDate;

/// One fixed point in the daily schedule.
///
/// Canonical text form is the 12-hour `HH-MM_AM` / `HH-MM_PM` (e.g. `08-30_AM`,
/// `12-00_PM` for noon). Ordering is by time of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeSlotId {
    hour: u8,
    minute: u8,
}

impl TimeSlotId {
    /// First slot of the reference day.
    pub const DAY_START: Self = Self { hour: 8, minute: 0 };
    /// Last slot of the reference day.
    pub const DAY_END: Self = Self { hour: 15, minute: 30 };

    /// `hour` is 0..24, `minute` is 0..60.
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(Self { hour, minute })
        } else {
            None
        }
    }

    pub fn minutes_of_day(&self) -> u16 {
        self.hour as u16 * 60 + self.minute as u16
    }

    pub fn from_minutes_of_day(minutes: u16) -> Option<Self> {
        Self::new((minutes / 60).try_into().ok()?, (minutes % 60) as u8)
    }

    /// Parse a 24-hour `HH:MM` string (the configuration format).
    pub fn parse_24h(s: &str) -> Option<Self> {
        let (h, m) = s.trim().split_once(':')?;
        Self::new(h.parse().ok()?, m.parse().ok()?)
    }
}

impl fmt::Display for TimeSlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let period = if self.hour < 12 { "AM" } else { "PM" };
        let h12 = match self.hour % 12 {
            0 => 12,
            h => h,
        };
        write!(f, "{h12:02}-{:02}_{period}", self.minute)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseTimeSlotError(pub String);

impl fmt::Display for ParseTimeSlotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid time slot id: {:?}", self.0)
    }
}

impl std::error::Error for ParseTimeSlotError {}

impl FromStr for TimeSlotId {
    type Err = ParseTimeSlotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseTimeSlotError(s.to_string());
        let (clock, period) = s.split_once('_').ok_or_else(err)?;
        let (h, m) = clock.split_once('-').ok_or_else(err)?;
        if h.len() != 2 || m.len() != 2 {
            return Err(err());
        }
        let h12: u8 = h.parse().map_err(|_| err())?;
        let minute: u8 = m.parse().map_err(|_| err())?;
        if !(1..=12).contains(&h12) {
            return Err(err());
        }
        let hour = match period {
            "AM" => h12 % 12,
            "PM" => h12 % 12 + 12,
            _ => return Err(err()),
        };
        Self::new(hour, minute).ok_or_else(err)
    }
}

impl TryFrom<String> for TimeSlotId {
    type Error = ParseTimeSlotError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<TimeSlotId> for String {
    fn from(slot: TimeSlotId) -> Self {
        slot.to_string()
    }
}

/// Bookable state of one calendar date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRecord {
    pub date: DateId,
    /// Time slots still open for booking, ordered by time of day.
    pub available: BTreeSet<TimeSlotId>,
}

impl DateRecord {
    pub fn new(date: DateId, available: impl IntoIterator<Item = TimeSlotId>) -> Self {
        Self {
            date,
            available: available.into_iter().collect(),
        }
    }

    pub fn is_available(&self, slot: &TimeSlotId) -> bool {
        self.available.contains(slot)
    }

    /// Set-difference primitive. Returns false if the slot was already absent.
    /// Only called while the caller holds this record's write lock.
    pub(crate) fn remove_slot(&mut self, slot: &TimeSlotId) -> bool {
        self.available.remove(slot)
    }

    /// Set-union primitive. Returns false if the slot was already present.
    pub(crate) fn add_slot(&mut self, slot: TimeSlotId) -> bool {
        self.available.insert(slot)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppointmentStatus {
    Confirmed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Ulid,
    pub date: DateId,
    pub slot: TimeSlotId,
    pub owner_id: String,
    pub status: AppointmentStatus,
    pub created_at: Ms,
    pub cancelled_at: Option<Ms>,
}

impl Appointment {
    pub fn is_confirmed(&self) -> bool {
        self.status == AppointmentStatus::Confirmed
    }
}

/// The WAL record format. Flat, no nesting.
///
/// A booking or a cancellation is a single event, so the availability change and
/// the ledger change it implies are committed together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    CatalogSeeded {
        slots: Vec<TimeSlotId>,
    },
    DateSeeded {
        date: DateId,
        available: Vec<TimeSlotId>,
    },
    AppointmentBooked {
        id: Ulid,
        date: DateId,
        slot: TimeSlotId,
        owner_id: String,
        created_at: Ms,
    },
    AppointmentCancelled {
        id: Ulid,
        date: DateId,
        slot: TimeSlotId,
        cancelled_at: Ms,
    },
    /// Ledger entry carried over by compaction; does not touch availability.
    AppointmentRestored {
        appointment: Appointment,
    },
}

impl Event {
    /// The date an event belongs to, if any.
    pub fn date(&self) -> Option<DateId> {
        match self {
            Event::CatalogSeeded { .. } => None,
            Event::DateSeeded { date, .. }
            | Event::AppointmentBooked { date, .. }
            | Event::AppointmentCancelled { date, .. } => Some(*date),
            Event::AppointmentRestored { appointment } => Some(appointment.date),
        }
    }
}
