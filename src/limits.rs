use crate::model::{DAY_MS, Ms};

pub const MAX_VEHICLES: usize = 100_000;
pub const MAX_BOOKINGS_PER_VEHICLE: usize = 10_000;

pub const MAX_LOCATION_LEN: usize = 128;
pub const MAX_NAME_LEN: usize = 128;
pub const MAX_DESCRIPTION_LEN: usize = 4_096;
pub const MAX_IMAGE_URL_LEN: usize = 2_048;

/// 2000-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
/// 2200-01-01T00:00:00Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 7_258_118_400_000;

/// Longest single rental.
pub const MAX_RENTAL_DAYS: Ms = 366;
pub const MAX_RENTAL_MS: Ms = MAX_RENTAL_DAYS * DAY_MS;

pub const RESET_CODE_TTL_MS: Ms = 15 * 60 * 1000;
pub const RESET_CODE_MIN: u32 = 10_000;
pub const RESET_CODE_MAX: u32 = 9_999_999;
pub const MAX_LIVE_RESET_CODES: usize = 100_000;

pub const RECENT_BOOKINGS: usize = 3;
