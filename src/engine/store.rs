use std::collections::{BTreeMap, HashMap};

use ulid::Ulid;

use crate::model::*;

/// The reservation set. Not synchronised; the engine wraps it in a lock.
#[derive(Debug, Default)]
pub struct ReservationStore {
    rooms: BTreeMap<String, RoomSchedule>,
    /// Reverse lookup: reservation id → room id
    reservation_to_room: HashMap<Ulid, String>,
    /// Owner index: user id → reservation ids
    by_user: HashMap<String, Vec<Ulid>>,
}

impl ReservationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.reservation_to_room.len()
    }

    pub fn room_len(&self, room_id: &str) -> usize {
        self.rooms.get(room_id).map_or(0, RoomSchedule::len)
    }

    pub fn get(&self, id: &Ulid) -> Option<&Reservation> {
        let room_id = self.reservation_to_room.get(id)?;
        self.rooms
            .get(room_id)?
            .reservations
            .iter()
            .find(|r| r.id == *id)
    }

    pub fn insert(&mut self, reservation: Reservation) {
        self.reservation_to_room
            .insert(reservation.id, reservation.room_id.clone());
        self.by_user
            .entry(reservation.user_id.clone())
            .or_default()
            .push(reservation.id);
        self.rooms
            .entry(reservation.room_id.clone())
            .or_default()
            .insert(reservation);
    }

    pub fn remove(&mut self, id: &Ulid) -> Option<Reservation> {
        let room_id = self.reservation_to_room.remove(id)?;
        let schedule = self.rooms.get_mut(&room_id)?;
        let removed = schedule.remove(*id)?;
        if schedule.is_empty() {
            self.rooms.remove(&room_id);
        }
        if let Some(ids) = self.by_user.get_mut(&removed.user_id) {
            ids.retain(|r| r != id);
            if ids.is_empty() {
                self.by_user.remove(&removed.user_id);
            }
        }
        Some(removed)
    }

    /// Reservations in `room_id` overlapping `window`.
    pub fn overlapping<'a>(
        &'a self,
        room_id: &str,
        window: &'a Span,
    ) -> impl Iterator<Item = &'a Reservation> + 'a {
        self.rooms
            .get(room_id)
            .into_iter()
            .flat_map(move |schedule| schedule.overlapping(window))
    }

    /// Every reservation, ordered by room id then start.
    pub fn iter(&self) -> impl Iterator<Item = &Reservation> {
        self.rooms.values().flat_map(|s| s.reservations.iter())
    }

    /// Reservations owned by `user_id`, in admission order.
    pub fn for_user<'a>(&'a self, user_id: &str) -> impl Iterator<Item = &'a Reservation> + 'a {
        self.by_user
            .get(user_id)
            .into_iter()
            .flatten()
            .filter_map(move |id| self.get(id))
    }

    pub fn apply_event(&mut self, event: &Event) {
        match event {
            Event::ReservationCreated {
                id,
                room_id,
                user_id,
                span,
                created_at,
            } => self.insert(Reservation {
                id: *id,
                room_id: room_id.clone(),
                user_id: user_id.clone(),
                span: *span,
                created_at: *created_at,
            }),
            Event::ReservationCancelled { id, .. } => {
                self.remove(id);
            }
        }
    }

    /// Minimal event list that rebuilds this store.
    pub fn snapshot_events(&self) -> Vec<Event> {
        self.iter().map(Event::created).collect()
    }
}
