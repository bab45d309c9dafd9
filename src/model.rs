use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds. The only time type.
pub type Ms = i64;

/// Parse an instant from text: RFC 3339 (any offset) or bare unix milliseconds.
/// RFC 3339 fractions below one millisecond are rejected.
pub fn parse_instant(text: &str) -> Option<Ms> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(ms) = text.parse::<Ms>() {
        return Some(ms);
    }
    // Finer than a millisecond cannot be stored without moving the instant.
    DateTime::parse_from_rfc3339(text)
        .ok()
        .filter(|dt| dt.timestamp_subsec_nanos() % 1_000_000 == 0)
        .map(|dt| dt.timestamp_millis())
}

/// Render an instant as RFC 3339 UTC with millisecond precision.
pub fn format_instant(ms: Ms) -> String {
    match DateTime::<Utc>::from_timestamp_millis(ms) {
        Some(dt) => dt.to_rfc3339_opts(SecondsFormat::Millis, true),
        None => ms.to_string(),
    }
}

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// Query window with open ends. Absent bounds extend to the edges of the timeline.
    pub fn window(start: Option<Ms>, end: Option<Ms>) -> Self {
        Self {
            start: start.unwrap_or(Ms::MIN),
            end: end.unwrap_or(Ms::MAX),
        }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    /// The single overlap test. Touching endpoints are adjacency, not overlap.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// A room from the catalog. Read-only to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub name: String,
}

/// An admitted reservation. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub room_id: String,
    pub user_id: String,
    pub span: Span,
    pub created_at: Ms,
}

impl Reservation {
    /// Counts toward the owner's quota while its end is still ahead of `now`.
    pub fn is_active(&self, now: Ms) -> bool {
        self.span.end > now
    }
}

/// Reservations of one room, sorted by `span.start`.
///
/// Admission keeps these pairwise non-overlapping, so starts are unique too.
#[derive(Debug, Clone, Default)]
pub struct RoomSchedule {
    pub reservations: Vec<Reservation>,
}

impl RoomSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.reservations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reservations.is_empty()
    }

    /// Insert maintaining sort order by span.start.
    pub fn insert(&mut self, reservation: Reservation) {
        let pos = self
            .reservations
            .binary_search_by_key(&reservation.span.start, |r| r.span.start)
            .unwrap_or_else(|e| e);
        self.reservations.insert(pos, reservation);
    }

    pub fn remove(&mut self, id: Ulid) -> Option<Reservation> {
        let pos = self.reservations.iter().position(|r| r.id == id)?;
        Some(self.reservations.remove(pos))
    }

    /// Reservations whose span overlaps the query window.
    /// Binary search skips everything starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Reservation> {
        let right_bound = self
            .reservations
            .partition_point(|r| r.span.start < query.end);
        self.reservations[..right_bound]
            .iter()
            .filter(move |r| r.span.overlaps(query))
    }
}

/// WAL record format. Flat, one variant per store mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ReservationCreated {
        id: Ulid,
        room_id: String,
        user_id: String,
        span: Span,
        created_at: Ms,
    },
    ReservationCancelled {
        id: Ulid,
        room_id: String,
    },
}

impl Event {
    pub fn created(reservation: &Reservation) -> Self {
        Event::ReservationCreated {
            id: reservation.id,
            room_id: reservation.room_id.clone(),
            user_id: reservation.user_id.clone(),
            span: reservation.span,
            created_at: reservation.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reservation(start: Ms, end: Ms) -> Reservation {
        Reservation {
            id: Ulid::new(),
            room_id: "R1".into(),
            user_id: "U1".into(),
            span: Span::new(start, end),
            created_at: 0,
        }
    }

    #[test]
    fn span_overlap() {
        let a = Span::new(100, 200);
        let b = Span::new(150, 250);
        let c = Span::new(200, 300);
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c)); // adjacent, not overlapping
        assert!(!c.overlaps(&a));
    }

    #[test]
    fn span_overlap_shapes() {
        let existing = Span::new(100, 200);
        assert!(existing.overlaps(&Span::new(100, 200))); // exact
        assert!(existing.overlaps(&Span::new(120, 180))); // inner
        assert!(existing.overlaps(&Span::new(50, 250))); // enveloping
        assert!(existing.overlaps(&Span::new(50, 150))); // partial start
        assert!(existing.overlaps(&Span::new(150, 250))); // partial end
        assert!(!existing.overlaps(&Span::new(0, 100)));
    }

    #[test]
    fn open_window_covers_everything() {
        let all = Span::window(None, None);
        assert!(all.overlaps(&Span::new(Ms::MIN + 1, Ms::MIN + 2)));
        assert!(all.overlaps(&Span::new(0, 1)));

        let from = Span::window(Some(1000), None);
        assert!(!from.overlaps(&Span::new(0, 1000)));
        assert!(from.overlaps(&Span::new(999, 1001)));

        let until = Span::window(None, Some(1000));
        assert!(until.overlaps(&Span::new(0, 1000)));
        assert!(!until.overlaps(&Span::new(1000, 2000)));
    }

    #[test]
    fn parse_instant_forms() {
        assert_eq!(parse_instant("0"), Some(0));
        assert_eq!(parse_instant(" 1500 "), Some(1500));
        assert_eq!(parse_instant("1970-01-01T00:00:01Z"), Some(1000));
        assert_eq!(parse_instant("1970-01-01T01:00:01+01:00"), Some(1000));
        assert_eq!(parse_instant("2030-01-15T09:00:00.250Z"), Some(1_894_698_000_250));
        assert_eq!(parse_instant(""), None);
        assert_eq!(parse_instant("tomorrow"), None);
        assert_eq!(parse_instant("2030-13-01T00:00:00Z"), None);
    }

    #[test]
    fn parse_instant_rejects_sub_millisecond_fractions() {
        assert_eq!(parse_instant("2030-01-15T10:00:00.0005Z"), None);
        assert_eq!(parse_instant("2030-01-15T10:00:00.000000001Z"), None);
        assert_eq!(parse_instant("2030-01-15T10:00:00.250000Z"), Some(1_894_701_600_250));
        assert_eq!(parse_instant("2030-01-15T10:00:00.250000000Z"), Some(1_894_701_600_250));
    }

    #[test]
    fn format_instant_is_utc_millis() {
        assert_eq!(format_instant(1000), "1970-01-01T00:00:01.000Z");
        assert_eq!(parse_instant(&format_instant(1_894_698_000_250)), Some(1_894_698_000_250));
    }

    #[test]
    fn schedule_keeps_start_order() {
        let mut schedule = RoomSchedule::new();
        schedule.insert(reservation(300, 400));
        schedule.insert(reservation(100, 200));
        schedule.insert(reservation(200, 300));
        let starts: Vec<Ms> = schedule.reservations.iter().map(|r| r.span.start).collect();
        assert_eq!(starts, vec![100, 200, 300]);
    }

    #[test]
    fn schedule_remove() {
        let mut schedule = RoomSchedule::new();
        let r = reservation(100, 200);
        let id = r.id;
        schedule.insert(r);
        schedule.insert(reservation(200, 300));
        assert!(schedule.remove(Ulid::new()).is_none());
        assert_eq!(schedule.remove(id).map(|r| r.id), Some(id));
        assert_eq!(schedule.len(), 1);
    }

    #[test]
    fn overlapping_skips_past_and_future() {
        let mut schedule = RoomSchedule::new();
        schedule.insert(reservation(100, 200));
        schedule.insert(reservation(450, 600));
        schedule.insert(reservation(1000, 1100));

        let hits: Vec<_> = schedule.overlapping(&Span::new(500, 800)).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].span, Span::new(450, 600));
    }

    #[test]
    fn overlapping_adjacent_not_included() {
        let mut schedule = RoomSchedule::new();
        schedule.insert(reservation(100, 200));
        schedule.insert(reservation(300, 400));
        assert_eq!(schedule.overlapping(&Span::new(200, 300)).count(), 0);
        assert_eq!(schedule.overlapping(&Span::new(199, 301)).count(), 2);
    }

    #[test]
    fn overlapping_empty_schedule() {
        let schedule = RoomSchedule::new();
        assert_eq!(schedule.overlapping(&Span::window(None, None)).count(), 0);
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::created(&reservation(1000, 2000));
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
