use std::collections::HashMap;

use dashmap::DashMap;
use ulid::Ulid;

use crate::model::*;

use super::availability::is_range_free;
use super::conflict::validate_range;
use super::{Engine, EngineError};

impl Engine {
    /// True iff no booking that still holds dates overlaps the range.
    /// A vehicle with no ledger (including an unknown id) is free.
    pub async fn is_available(&self, vehicle_id: Ulid, range: DateRange) -> Result<bool, EngineError> {
        validate_range(&range)?;
        let rs = match self.get_vehicle_state(&vehicle_id) {
            Some(rs) => rs,
            None => return Ok(true),
        };
        let guard = rs.read().await;
        Ok(is_range_free(&guard, &range))
    }

    /// Catalog vehicles at `location` with the flag on and no overlapping
    /// booking. Point-in-time snapshot ordered by vehicle id.
    pub async fn list_available_vehicles(
        &self,
        location: &str,
        range: DateRange,
    ) -> Result<Vec<VehicleAvailability>, EngineError> {
        validate_range(&range)?;
        let candidates = self.find_vehicles_by_location(location).await;
        let mut out = Vec::with_capacity(candidates.len());
        for vehicle in candidates {
            if self.is_available(vehicle.id, range).await? {
                out.push(VehicleAvailability {
                    vehicle,
                    is_available: true,
                });
            }
        }
        Ok(out)
    }

    pub async fn get_booking(&self, booking_id: Ulid) -> Option<BookingView> {
        let vehicle_id = self.vehicle_for_booking(&booking_id)?;
        let rs = self.get_vehicle_state(&vehicle_id)?;
        let guard = rs.read().await;
        let booking = guard.booking(&booking_id)?.clone();
        Some(BookingView {
            booking,
            vehicle: guard.is_listed().then(|| guard.vehicle.clone()),
        })
    }

    /// Bookings made by `user_id`, newest first.
    pub async fn bookings_for_user(&self, user_id: Ulid) -> Vec<BookingView> {
        self.load_views(&self.by_renter, &user_id).await
    }

    /// Bookings on vehicles owned by `owner_id`, newest first.
    pub async fn bookings_for_owner(&self, owner_id: Ulid) -> Vec<BookingView> {
        self.load_views(&self.by_owner, &owner_id).await
    }

    /// Resolve an index entry into joined views, taking each vehicle's read
    /// lock once.
    async fn load_views(&self, index: &DashMap<Ulid, Vec<Ulid>>, key: &Ulid) -> Vec<BookingView> {
        let ids = index.get(key).map(|e| e.value().clone()).unwrap_or_default();

        let mut by_vehicle: HashMap<Ulid, Vec<Ulid>> = HashMap::new();
        for id in ids {
            if let Some(vid) = self.vehicle_for_booking(&id) {
                by_vehicle.entry(vid).or_default().push(id);
            }
        }

        let mut views = Vec::new();
        for (vehicle_id, booking_ids) in by_vehicle {
            let Some(rs) = self.get_vehicle_state(&vehicle_id) else { continue };
            let guard = rs.read().await;
            let vehicle = guard.is_listed().then(|| guard.vehicle.clone());
            for id in booking_ids {
                if let Some(b) = guard.booking(&id) {
                    views.push(BookingView {
                        booking: b.clone(),
                        vehicle: vehicle.clone(),
                    });
                }
            }
        }
        sort_newest_first(&mut views);
        views
    }
}

pub(super) fn sort_newest_first(views: &mut [BookingView]) {
    views.sort_by(|a, b| {
        b.booking
            .created_at
            .cmp(&a.booking.created_at)
            .then_with(|| b.booking.id.cmp(&a.booking.id))
    });
}
