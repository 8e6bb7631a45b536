use crate::model::*;

// ── Availability Algorithm ────────────────────────────────────────

/// First booking on this vehicle whose range overlaps `query`, whatever its
/// status. Overlap is inclusive: `p1 <= r2 && r1 >= p2`.
pub fn find_conflict<'a>(vehicle: &'a VehicleState, query: &'a DateRange) -> Option<&'a Booking> {
    vehicle.overlapping(query).next()
}

/// True iff no booking overlaps `query`.
pub fn is_range_free(vehicle: &VehicleState, query: &DateRange) -> bool {
    find_conflict(vehicle, query).is_none()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use ulid::Ulid;

    const D: Ms = DAY_MS;

    fn make_vehicle(bookings: Vec<Booking>) -> VehicleState {
        let mut vs = VehicleState::new(Vehicle {
            id: Ulid::new(),
            owner_id: Ulid::new(),
            location: "NYC".into(),
            price_per_day: Decimal::new(50, 0),
            available: true,
            brand: "Toyota".into(),
            model: "Corolla".into(),
            year: Some(2021),
            category: None,
            transmission: None,
            fuel_type: None,
            seating_capacity: None,
            description: None,
            image: None,
            created_at: 0,
        });
        for b in bookings {
            vs.insert_booking(b);
        }
        vs
    }

    fn booking(pickup: Ms, return_at: Ms, status: BookingStatus) -> Booking {
        Booking {
            id: Ulid::new(),
            vehicle_id: Ulid::nil(),
            owner_id: Ulid::nil(),
            renter_id: Ulid::nil(),
            range: DateRange::new(pickup, return_at),
            price: Decimal::ZERO,
            status,
            created_at: 0,
        }
    }

    #[test]
    fn empty_ledger_is_free() {
        let vs = make_vehicle(vec![]);
        assert!(is_range_free(&vs, &DateRange::new(0, 3 * D)));
    }

    #[test]
    fn overlapping_pending_booking_blocks() {
        let vs = make_vehicle(vec![booking(D, 3 * D, BookingStatus::Pending)]);
        assert!(!is_range_free(&vs, &DateRange::new(2 * D, 4 * D)));
    }

    #[test]
    fn confirmed_booking_blocks() {
        let vs = make_vehicle(vec![booking(D, 3 * D, BookingStatus::Confirmed)]);
        assert!(!is_range_free(&vs, &DateRange::new(0, 2 * D)));
    }

    #[test]
    fn cancelled_booking_still_holds_its_dates() {
        let vs = make_vehicle(vec![booking(D, 3 * D, BookingStatus::Cancelled)]);
        assert!(!is_range_free(&vs, &DateRange::new(2 * D, 4 * D)));
        assert!(is_range_free(&vs, &DateRange::new(4 * D, 5 * D)));
    }

    #[test]
    fn same_day_turnover_conflicts() {
        let vs = make_vehicle(vec![booking(D, 3 * D, BookingStatus::Pending)]);
        assert!(!is_range_free(&vs, &DateRange::new(3 * D, 5 * D)));
        assert!(!is_range_free(&vs, &DateRange::new(0, D)));
    }

    #[test]
    fn adjacent_distinct_days_do_not_conflict() {
        let vs = make_vehicle(vec![booking(D, 3 * D, BookingStatus::Pending)]);
        assert!(is_range_free(&vs, &DateRange::new(4 * D, 6 * D)));
        assert!(is_range_free(&vs, &DateRange::new(0, D - 1)));
    }

    #[test]
    fn conflict_reports_the_earliest_overlap() {
        let cancelled = booking(D, 3 * D, BookingStatus::Cancelled);
        let pending = booking(5 * D, 7 * D, BookingStatus::Pending);
        let (cancelled_id, pending_id) = (cancelled.id, pending.id);
        let vs = make_vehicle(vec![pending, cancelled]);
        let hit = find_conflict(&vs, &DateRange::new(2 * D, 6 * D)).map(|b| b.id);
        assert_eq!(hit, Some(cancelled_id));
        let hit = find_conflict(&vs, &DateRange::new(4 * D, 6 * D)).map(|b| b.id);
        assert_eq!(hit, Some(pending_id));
    }

    /// Exhaustive check of the overlap predicate against a brute-force
    /// reference on a small grid.
    #[test]
    fn overlap_matches_reference_on_grid() {
        for p1 in 0..6 {
            for r1 in p1..6 {
                let vs = make_vehicle(vec![booking(p1, r1, BookingStatus::Pending)]);
                for p2 in 0..6 {
                    for r2 in p2..6 {
                        let expected_overlap = p1 <= r2 && r1 >= p2;
                        let free = is_range_free(&vs, &DateRange::new(p2, r2));
                        assert_eq!(
                            free, !expected_overlap,
                            "[{p1},{r1}] vs [{p2},{r2}]"
                        );
                    }
                }
            }
        }
    }
}
