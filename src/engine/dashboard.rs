use rust_decimal::Decimal;
use ulid::Ulid;

use crate::limits::RECENT_BOOKINGS;
use crate::model::*;

use super::Engine;

impl Engine {
    /// Owner summary derived from the owner's bookings at call time.
    ///
    /// `monthly_revenue` sums every confirmed booking regardless of date;
    /// the field keeps its historical name.
    pub async fn owner_dashboard(&self, owner_id: Ulid) -> DashboardSummary {
        let views = self.bookings_for_owner(owner_id).await;
        summarize(self.owner_vehicle_count(&owner_id), views)
    }
}

/// Pure aggregation over an owner's bookings, already sorted newest first.
pub(super) fn summarize(total_vehicles: usize, views: Vec<BookingView>) -> DashboardSummary {
    let mut pending_bookings = 0;
    let mut completed_bookings = 0;
    let mut monthly_revenue = Decimal::ZERO;

    for view in &views {
        match view.booking.status {
            BookingStatus::Pending => pending_bookings += 1,
            BookingStatus::Confirmed => {
                completed_bookings += 1;
                monthly_revenue += view.booking.price;
            }
            BookingStatus::Cancelled => {}
        }
    }

    let total_bookings = views.len();
    let recent_bookings = views.into_iter().take(RECENT_BOOKINGS).collect();

    DashboardSummary {
        total_vehicles,
        total_bookings,
        pending_bookings,
        completed_bookings,
        recent_bookings,
        monthly_revenue,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(status: BookingStatus, price: i64, created_at: Ms) -> BookingView {
        BookingView {
            booking: Booking {
                id: Ulid::new(),
                vehicle_id: Ulid::nil(),
                owner_id: Ulid::nil(),
                renter_id: Ulid::nil(),
                range: DateRange::new(0, DAY_MS),
                price: Decimal::from(price),
                status,
                created_at,
            },
            vehicle: None,
        }
    }

    #[test]
    fn empty_owner() {
        let s = summarize(2, vec![]);
        assert_eq!(s.total_vehicles, 2);
        assert_eq!(s.total_bookings, 0);
        assert!(s.recent_bookings.is_empty());
        assert_eq!(s.monthly_revenue, Decimal::ZERO);
    }

    #[test]
    fn counts_and_revenue() {
        let views = vec![
            view(BookingStatus::Confirmed, 100, 5),
            view(BookingStatus::Pending, 40, 4),
            view(BookingStatus::Cancelled, 70, 3),
            view(BookingStatus::Confirmed, 250, 2),
            view(BookingStatus::Pending, 10, 1),
        ];
        let s = summarize(1, views);
        assert_eq!(s.total_bookings, 5);
        assert_eq!(s.pending_bookings, 2);
        assert_eq!(s.completed_bookings, 2);
        assert_eq!(s.monthly_revenue, Decimal::from(350));
        let recent: Vec<Ms> = s.recent_bookings.iter().map(|v| v.booking.created_at).collect();
        assert_eq!(recent, vec![5, 4, 3]);
    }
}
