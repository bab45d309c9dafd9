use crate::model::Ms;

pub const MINUTE_MS: Ms = 60_000;
pub const HOUR_MS: Ms = 60 * MINUTE_MS;

/// Shortest admissible reservation (inclusive).
pub const MIN_RESERVATION_MS: Ms = 15 * MINUTE_MS;
/// Longest admissible reservation (inclusive).
pub const MAX_RESERVATION_MS: Ms = 8 * HOUR_MS;
/// How far ahead a reservation may start, in calendar months.
pub const BOOKING_HORIZON_MONTHS: u32 = 12;
/// Reservations a user may hold with `end > now`.
pub const MAX_ACTIVE_PER_USER: usize = 2;

pub const MAX_USER_ID_LEN: usize = 256;
pub const MAX_ROOM_ID_LEN: usize = 256;
pub const MAX_ROOM_NAME_LEN: usize = 1024;
pub const MAX_ROOMS: usize = 10_000;
pub const MAX_RESERVATIONS_PER_ROOM: usize = 100_000;
