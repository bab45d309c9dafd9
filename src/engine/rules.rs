use chrono::{DateTime, Months, Utc};

use crate::limits::*;
use crate::model::*;

use super::EngineError;

pub(crate) fn check_user_id(user_id: &str) -> Result<(), EngineError> {
    if user_id.is_empty() {
        return Err(EngineError::Invalid("user id required"));
    }
    if user_id.len() > MAX_USER_ID_LEN {
        return Err(EngineError::Invalid("user id too long"));
    }
    Ok(())
}

pub(crate) fn parse_bound(field: &'static str, text: &str) -> Result<Ms, EngineError> {
    parse_instant(text).ok_or_else(|| EngineError::InvalidInstant {
        field,
        value: text.to_string(),
    })
}

/// Latest admissible start: the same wall-clock instant one calendar year on.
pub(crate) fn horizon(now: Ms) -> Ms {
    DateTime::<Utc>::from_timestamp_millis(now)
        .and_then(|dt| dt.checked_add_months(Months::new(BOOKING_HORIZON_MONTHS)))
        .map_or(Ms::MAX, |dt| dt.timestamp_millis())
}

/// Ordering, past, horizon and duration rules, in that order.
pub(crate) fn validate_span(start: Ms, end: Ms, now: Ms) -> Result<Span, EngineError> {
    if start >= end {
        return Err(EngineError::Invalid("start must precede end"));
    }
    if start < now {
        return Err(EngineError::Invalid("cannot reserve in the past"));
    }
    if start > horizon(now) {
        return Err(EngineError::Invalid("too far in the future"));
    }
    let span = Span::new(start, end);
    if span.duration_ms() < MIN_RESERVATION_MS {
        return Err(EngineError::Invalid("too short"));
    }
    if span.duration_ms() > MAX_RESERVATION_MS {
        return Err(EngineError::Invalid("too long"));
    }
    Ok(span)
}
