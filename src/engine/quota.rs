use crate::limits::MAX_ACTIVE_PER_USER;
use crate::model::Ms;

use super::store::ReservationStore;
use super::EngineError;

/// Reservations of `user_id` that have not ended at `now`. Recomputed on every call.
pub(crate) fn active_count(store: &ReservationStore, user_id: &str, now: Ms) -> usize {
    store
        .for_user(user_id)
        .filter(|r| r.is_active(now))
        .count()
}

pub(crate) fn check_quota(store: &ReservationStore, user_id: &str, now: Ms) -> Result<(), EngineError> {
    if active_count(store, user_id, now) >= MAX_ACTIVE_PER_USER {
        return Err(EngineError::Forbidden("quota exceeded"));
    }
    Ok(())
}
