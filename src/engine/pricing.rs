use rust_decimal::Decimal;

use crate::model::{DAY_MS, DateRange, Ms};

/// Whole rental days, rounding any partial day up.
pub fn rental_days(range: &DateRange) -> Ms {
    let span = range.duration_ms();
    if span <= 0 {
        return 0;
    }
    (span + DAY_MS - 1) / DAY_MS
}

/// `price_per_day × ceil(days)`.
pub fn quote(price_per_day: Decimal, range: &DateRange) -> Decimal {
    price_per_day * Decimal::from(rental_days(range))
}
