use crate::model::*;

use super::EngineError;
use super::availability::find_conflict;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or(0)
}

pub(crate) fn validate_range(range: &DateRange) -> Result<(), EngineError> {
    use crate::limits::*;
    if range.pickup < MIN_VALID_TIMESTAMP_MS || range.return_at > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::InvalidRange("date out of supported range"));
    }
    if range.return_at < range.pickup {
        return Err(EngineError::InvalidRange("return date is before pickup date"));
    }
    if range.return_at == range.pickup {
        return Err(EngineError::InvalidRange("return date equals pickup date"));
    }
    if range.duration_ms() > MAX_RENTAL_MS {
        return Err(EngineError::LimitExceeded("rental too long"));
    }
    Ok(())
}

/// The vehicle must be switched on and free for the whole range.
/// Caller holds the vehicle's write lock.
pub(crate) fn check_bookable(vs: &VehicleState, range: &DateRange) -> Result<(), EngineError> {
    if !vs.vehicle.available {
        return Err(EngineError::VehicleUnavailable(vs.vehicle.id));
    }
    if let Some(existing) = find_conflict(vs, range) {
        return Err(EngineError::Conflict {
            vehicle_id: vs.vehicle.id,
            booking_id: existing.id,
        });
    }
    Ok(())
}
