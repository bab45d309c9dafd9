use ulid::Ulid;

use crate::model::*;

use super::rules::parse_bound;
use super::{Engine, EngineError};

impl Engine {
    /// Reservations matching every supplied filter.
    ///
    /// `room_id` is an exact match. `start`/`end` form a window that keeps
    /// reservations overlapping it; a missing bound is open in that direction.
    /// A window with `start >= end` is empty and matches nothing.
    /// Results are ordered by room id, then start.
    pub async fn query(
        &self,
        room_id: Option<&str>,
        start: Option<&str>,
        end: Option<&str>,
    ) -> Result<Vec<Reservation>, EngineError> {
        let start = start.map(|s| parse_bound("start", s)).transpose()?;
        let end = end.map(|e| parse_bound("end", e)).transpose()?;
        if let (Some(start), Some(end)) = (start, end) {
            if start >= end {
                return Ok(Vec::new());
            }
        }
        let window = Span::window(start, end);

        let store = self.store.read().await;
        let found = match room_id {
            Some(room_id) => store.overlapping(room_id, &window).cloned().collect(),
            None => store
                .iter()
                .filter(|r| r.span.overlaps(&window))
                .cloned()
                .collect(),
        };
        Ok(found)
    }

    pub async fn get(&self, id: Ulid) -> Option<Reservation> {
        self.store.read().await.get(&id).cloned()
    }

    /// Every reservation owned by `user_id`, past ones included.
    pub async fn reservations_for_user(&self, user_id: &str) -> Vec<Reservation> {
        let store = self.store.read().await;
        let mut found: Vec<Reservation> = store.for_user(user_id).cloned().collect();
        found.sort_by(|a, b| a.span.start.cmp(&b.span.start).then(a.id.cmp(&b.id)));
        found
    }

    /// Reservations of `user_id` that still count toward the quota.
    pub async fn active_count(&self, user_id: &str) -> usize {
        let store = self.store.read().await;
        super::quota::active_count(&store, user_id, self.clock.now())
    }

    pub async fn reservation_count(&self) -> usize {
        self.store.read().await.len()
    }

    pub fn list_rooms(&self) -> Vec<Room> {
        self.catalog.list()
    }
}
