use tracing::{debug, info};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::check_no_conflict;
use super::quota::check_quota;
use super::rules::{check_user_id, parse_bound, validate_span};
use super::{Engine, EngineError};

impl Engine {
    /// Admit a reservation of `room_id` for `user_id` over `[start, end)`.
    ///
    /// Rules run in a fixed order and the first failure is returned:
    /// room exists, instants parse, start precedes end, not in the past,
    /// within the booking horizon, at least 15 minutes, at most 8 hours,
    /// user under quota, no overlap in the room.
    pub async fn create(
        &self,
        room_id: &str,
        user_id: &str,
        start: &str,
        end: &str,
    ) -> Result<Reservation, EngineError> {
        let result = self.admit(room_id, user_id, start, end).await;
        match &result {
            Ok(r) => {
                metrics::counter!(crate::observability::RESERVATIONS_CREATED_TOTAL).increment(1);
                info!(
                    "reservation {} admitted: room={} user={} [{}, {})",
                    r.id,
                    r.room_id,
                    r.user_id,
                    format_instant(r.span.start),
                    format_instant(r.span.end)
                );
            }
            Err(e) => {
                metrics::counter!(
                    crate::observability::ADMISSIONS_REJECTED_TOTAL,
                    "kind" => e.kind().as_str()
                )
                .increment(1);
                debug!("reservation rejected: room={room_id} user={user_id}: {e}");
            }
        }
        result
    }

    async fn admit(
        &self,
        room_id: &str,
        user_id: &str,
        start: &str,
        end: &str,
    ) -> Result<Reservation, EngineError> {
        if !self.catalog.exists(room_id) {
            return Err(EngineError::NotFound(room_id.to_string()));
        }
        check_user_id(user_id)?;
        let start = parse_bound("start", start)?;
        let end = parse_bound("end", end)?;

        let mut store = self.store.write().await;
        // Sampled under the lock so the quota sees the same "now" as the write.
        let now = self.clock.now();
        let span = validate_span(start, end, now)?;
        check_quota(&store, user_id, now)?;
        check_no_conflict(&store, room_id, &span)?;
        if store.room_len(room_id) >= MAX_RESERVATIONS_PER_ROOM {
            return Err(EngineError::LimitExceeded("too many reservations in room"));
        }

        let reservation = Reservation {
            id: Ulid::new(),
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
            span,
            created_at: now,
        };
        self.persist_and_apply(&mut store, &Event::created(&reservation))
            .await?;
        Ok(reservation)
    }

    /// Remove reservation `id` on behalf of its owner.
    pub async fn cancel(&self, id: Ulid, user_id: &str) -> Result<(), EngineError> {
        let mut store = self.store.write().await;
        let existing = store
            .get(&id)
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
        if existing.user_id != user_id {
            return Err(EngineError::Forbidden("not the owner"));
        }
        let event = Event::ReservationCancelled {
            id,
            room_id: existing.room_id.clone(),
        };
        self.persist_and_apply(&mut store, &event).await?;

        metrics::counter!(crate::observability::RESERVATIONS_CANCELLED_TOTAL).increment(1);
        info!("reservation {id} cancelled by {user_id}");
        Ok(())
    }
}
