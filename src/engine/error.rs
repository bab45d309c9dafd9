use ulid::Ulid;

/// Coarse outcome classes a transport maps onto its own status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Invalid,
    Forbidden,
    Conflict,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Invalid => "invalid",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Internal => "internal",
        }
    }
}

#[derive(Debug)]
pub enum EngineError {
    /// Unknown room or reservation id.
    NotFound(String),
    /// Text that does not parse as an instant.
    InvalidInstant {
        field: &'static str,
        value: String,
    },
    /// Request violates an admission rule.
    Invalid(&'static str),
    /// Quota exceeded, or acting on someone else's reservation.
    Forbidden(&'static str),
    /// Overlaps the given existing reservation in the same room.
    Conflict(Ulid),
    LimitExceeded(&'static str),
    WalError(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::NotFound(_) => ErrorKind::NotFound,
            EngineError::InvalidInstant { .. } | EngineError::Invalid(_) => ErrorKind::Invalid,
            EngineError::Forbidden(_) => ErrorKind::Forbidden,
            EngineError::Conflict(_) => ErrorKind::Conflict,
            EngineError::LimitExceeded(_) | EngineError::WalError(_) => ErrorKind::Internal,
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::InvalidInstant { field, value } => {
                write!(f, "invalid {field}: {value:?} is not a valid instant")
            }
            EngineError::Invalid(msg) => write!(f, "invalid: {msg}"),
            EngineError::Forbidden(msg) => write!(f, "forbidden: {msg}"),
            EngineError::Conflict(id) => write!(f, "conflict with reservation: {id}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
