use crate::catalog::SlotCatalog;
use crate::limits::*;
use crate::model::*;

use super::BookingError;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as Ms)
}

pub(crate) fn validate_owner(owner_id: &str) -> Result<(), BookingError> {
    if owner_id.trim().is_empty() {
        return Err(BookingError::InvalidRequest("owner id is empty"));
    }
    if owner_id.len() > MAX_OWNER_ID_LEN {
        return Err(BookingError::InvalidRequest("owner id too long"));
    }
    Ok(())
}

pub(crate) fn validate_slot(catalog: &SlotCatalog, slot: &TimeSlotId) -> Result<(), BookingError> {
    if catalog.contains(slot) {
        Ok(())
    } else {
        Err(BookingError::TimeSlotUnknown(*slot))
    }
}
