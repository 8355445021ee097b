use ulid::Ulid;

use crate::model::{DateId, TimeSlotId};

/// The persistence layer failed to commit. Retryable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreError(pub String);

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WAL error: {}", self.0)
    }
}

impl std::error::Error for StoreError {}

/// Errors from seeding, queries and maintenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    DateNotFound(DateId),
    DateAlreadyExists(DateId),
    TimeSlotUnknown(TimeSlotId),
    InvalidCatalog(&'static str),
    LimitExceeded(&'static str),
    Store(StoreError),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::DateNotFound(d) => write!(f, "date not found: {d}"),
            EngineError::DateAlreadyExists(d) => write!(f, "date already exists: {d}"),
            EngineError::TimeSlotUnknown(s) => write!(f, "time slot not in catalog: {s}"),
            EngineError::InvalidCatalog(msg) => write!(f, "invalid catalog: {msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::Store(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        EngineError::Store(e)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingError {
    DateNotFound(DateId),
    TimeSlotUnknown(TimeSlotId),
    /// Someone else holds the slot, or it was never open.
    SlotUnavailable { date: DateId, slot: TimeSlotId },
    InvalidRequest(&'static str),
    StoreTransient(StoreError),
}

impl BookingError {
    pub fn is_transient(&self) -> bool {
        matches!(self, BookingError::StoreTransient(_))
    }
}

impl std::fmt::Display for BookingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookingError::DateNotFound(d) => write!(f, "date not found: {d}"),
            BookingError::TimeSlotUnknown(s) => write!(f, "time slot not in catalog: {s}"),
            BookingError::SlotUnavailable { date, slot } => {
                write!(f, "slot {date} {slot} is no longer available")
            }
            BookingError::InvalidRequest(msg) => write!(f, "invalid booking request: {msg}"),
            BookingError::StoreTransient(e) => write!(f, "booking not committed: {e}"),
        }
    }
}

impl std::error::Error for BookingError {}

impl From<StoreError> for BookingError {
    fn from(e: StoreError) -> Self {
        BookingError::StoreTransient(e)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancellationError {
    AppointmentNotFound(Ulid),
    /// The caller does not own the appointment.
    Unauthorized(Ulid),
    AlreadyCancelled(Ulid),
    StoreTransient(StoreError),
}

impl CancellationError {
    pub fn is_transient(&self) -> bool {
        matches!(self, CancellationError::StoreTransient(_))
    }
}

impl std::fmt::Display for CancellationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancellationError::AppointmentNotFound(id) => write!(f, "appointment not found: {id}"),
            CancellationError::Unauthorized(id) => {
                write!(f, "not authorized to cancel appointment {id}")
            }
            CancellationError::AlreadyCancelled(id) => {
                write!(f, "appointment {id} is already cancelled")
            }
            CancellationError::StoreTransient(e) => write!(f, "cancellation not committed: {e}"),
        }
    }
}

impl std::error::Error for CancellationError {}

impl From<StoreError> for CancellationError {
    fn from(e: StoreError) -> Self {
        CancellationError::StoreTransient(e)
    }
}
