use crate::model::*;

use super::store::ReservationStore;
use super::EngineError;

/// First reservation in `room_id` that `span` would overlap, as an error.
pub(crate) fn check_no_conflict(
    store: &ReservationStore,
    room_id: &str,
    span: &Span,
) -> Result<(), EngineError> {
    match store.overlapping(room_id, span).next() {
        Some(existing) => Err(EngineError::Conflict(existing.id)),
        None => Ok(()),
    }
}
