use ulid::Ulid;

use crate::model::BookingStatus;

/// Stable error classification exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Unavailable,
    Forbidden,
    InvalidInput,
    Transient,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Transient => "transient",
        }
    }

    /// Only transient failures are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Transient)
    }
}

#[derive(Debug)]
pub enum EngineError {
    VehicleNotFound(Ulid),
    BookingNotFound(Ulid),
    ResetCodeNotFound,
    /// Dates clash with an existing booking.
    Conflict { vehicle_id: Ulid, booking_id: Ulid },
    /// The owner has switched the vehicle off.
    VehicleUnavailable(Ulid),
    Forbidden { requester: Ulid, owner: Ulid },
    InvalidRange(&'static str),
    InvalidVehicle(&'static str),
    IllegalTransition { from: BookingStatus, to: BookingStatus },
    IdempotencyMismatch(Ulid),
    LimitExceeded(&'static str),
    WalError(String),
    Timeout,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::VehicleNotFound(_)
            | EngineError::BookingNotFound(_)
            | EngineError::ResetCodeNotFound => ErrorKind::NotFound,
            EngineError::Conflict { .. } | EngineError::VehicleUnavailable(_) => {
                ErrorKind::Unavailable
            }
            EngineError::Forbidden { .. } => ErrorKind::Forbidden,
            EngineError::InvalidRange(_)
            | EngineError::InvalidVehicle(_)
            | EngineError::IllegalTransition { .. }
            | EngineError::IdempotencyMismatch(_)
            | EngineError::LimitExceeded(_) => ErrorKind::InvalidInput,
            EngineError::WalError(_) | EngineError::Timeout => ErrorKind::Transient,
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::VehicleNotFound(id) => write!(f, "vehicle not found: {id}"),
            EngineError::BookingNotFound(id) => write!(f, "booking not found: {id}"),
            EngineError::ResetCodeNotFound => write!(f, "reset code is invalid or expired"),
            EngineError::Conflict {
                vehicle_id,
                booking_id,
            } => write!(
                f,
                "vehicle {vehicle_id} is not available for the selected dates (conflicts with booking {booking_id})"
            ),
            EngineError::VehicleUnavailable(id) => {
                write!(f, "vehicle {id} is not accepting bookings")
            }
            EngineError::Forbidden { requester, owner } => write!(
                f,
                "user {requester} is not authorized to modify records owned by {owner}"
            ),
            EngineError::InvalidRange(msg) => write!(f, "invalid date range: {msg}"),
            EngineError::InvalidVehicle(msg) => write!(f, "invalid vehicle: {msg}"),
            EngineError::IllegalTransition { from, to } => {
                write!(f, "cannot change booking status from {from} to {to}")
            }
            EngineError::IdempotencyMismatch(id) => write!(
                f,
                "booking id {id} was already used for a different request"
            ),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
            EngineError::Timeout => write!(
                f,
                "request timed out; outcome unknown, retry with the same booking id"
            ),
        }
    }
}

impl std::error::Error for EngineError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_cover_taxonomy() {
        let id = Ulid::new();
        assert_eq!(EngineError::VehicleNotFound(id).kind(), ErrorKind::NotFound);
        assert_eq!(EngineError::BookingNotFound(id).kind(), ErrorKind::NotFound);
        assert_eq!(
            EngineError::Conflict { vehicle_id: id, booking_id: id }.kind(),
            ErrorKind::Unavailable
        );
        assert_eq!(
            EngineError::Forbidden { requester: id, owner: id }.kind(),
            ErrorKind::Forbidden
        );
        assert_eq!(EngineError::InvalidRange("x").kind(), ErrorKind::InvalidInput);
        assert_eq!(EngineError::WalError("disk".into()).kind(), ErrorKind::Transient);
        assert!(EngineError::Timeout.kind().is_retryable());
        assert!(!EngineError::VehicleUnavailable(id).kind().is_retryable());
    }

    #[test]
    fn messages_are_human_readable() {
        let e = EngineError::IllegalTransition {
            from: BookingStatus::Confirmed,
            to: BookingStatus::Pending,
        };
        assert_eq!(e.to_string(), "cannot change booking status from confirmed to pending");
    }
}
