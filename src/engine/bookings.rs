use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use tracing::{debug, info};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::{check_bookable, validate_range};
use super::pricing::quote;
use super::{Engine, EngineError};

impl Engine {
    /// Reserve `vehicle_id` for `range` on behalf of `renter_id`.
    ///
    /// `booking_id` is chosen by the caller and doubles as an idempotency key:
    /// resubmitting the same request returns the stored booking untouched.
    /// The vehicle's write lock spans the overlap check, the WAL append and
    /// the in-memory insert, so at most one of several overlapping requests
    /// can succeed.
    pub async fn create_booking(
        self: &Arc<Self>,
        booking_id: Ulid,
        renter_id: Ulid,
        vehicle_id: Ulid,
        range: DateRange,
    ) -> Result<Booking, EngineError> {
        self.detached(move |engine| async move {
            engine.book(booking_id, renter_id, vehicle_id, range).await
        })
        .await
    }

    async fn book(
        &self,
        booking_id: Ulid,
        renter_id: Ulid,
        vehicle_id: Ulid,
        range: DateRange,
    ) -> Result<Booking, EngineError> {
        validate_range(&range)?;
        let rs = self
            .get_vehicle_state(&vehicle_id)
            .ok_or(EngineError::VehicleNotFound(vehicle_id))?;

        let _gate = self.compaction_gate.read().await;
        let mut guard = rs.write().await;

        if let Some(existing_vehicle) = self.vehicle_for_booking(&booking_id) {
            if existing_vehicle == vehicle_id
                && let Some(existing) = guard.booking(&booking_id)
                && existing.renter_id == renter_id
                && existing.range == range
            {
                debug!("booking {booking_id} resubmitted, returning stored record");
                return Ok(existing.clone());
            }
            return Err(EngineError::IdempotencyMismatch(booking_id));
        }

        if guard.removed {
            return Err(EngineError::VehicleNotFound(vehicle_id));
        }
        if guard.bookings.len() >= MAX_BOOKINGS_PER_VEHICLE {
            return Err(EngineError::LimitExceeded("too many bookings on vehicle"));
        }
        if let Err(e) = check_bookable(&guard, &range) {
            metrics::counter!(crate::observability::BOOKING_CONFLICTS_TOTAL).increment(1);
            return Err(e);
        }

        let booking = Booking {
            id: booking_id,
            vehicle_id,
            owner_id: guard.vehicle.owner_id,
            renter_id,
            range,
            price: quote(guard.vehicle.price_per_day, &range),
            status: BookingStatus::Pending,
            created_at: self.next_created_at(),
        };
        // Claim the id before the WAL write so a concurrent request reusing it
        // on another vehicle can't slip through.
        match self.booking_to_vehicle.entry(booking_id) {
            Entry::Occupied(_) => return Err(EngineError::IdempotencyMismatch(booking_id)),
            Entry::Vacant(slot) => {
                slot.insert(vehicle_id);
            }
        }
        let event = Event::BookingCreated {
            booking: booking.clone(),
        };
        if let Err(e) = self.persist_and_apply(&mut guard, &event).await {
            self.booking_to_vehicle.remove(&booking_id);
            return Err(e);
        }
        metrics::counter!(crate::observability::BOOKINGS_CREATED_TOTAL).increment(1);
        info!(
            "booking {booking_id} created: vehicle {vehicle_id}, renter {renter_id}, price {}",
            booking.price
        );
        Ok(booking)
    }

    /// Owner-gated status change. Re-setting the current status is a no-op;
    /// anything outside the transition table is rejected.
    pub async fn change_status(
        self: &Arc<Self>,
        requester_id: Ulid,
        booking_id: Ulid,
        new_status: BookingStatus,
    ) -> Result<Booking, EngineError> {
        self.detached(move |engine| async move {
            engine.set_status(requester_id, booking_id, new_status).await
        })
        .await
    }

    async fn set_status(
        &self,
        requester_id: Ulid,
        booking_id: Ulid,
        new_status: BookingStatus,
    ) -> Result<Booking, EngineError> {
        let vehicle_id = self
            .vehicle_for_booking(&booking_id)
            .ok_or(EngineError::BookingNotFound(booking_id))?;
        let rs = self
            .get_vehicle_state(&vehicle_id)
            .ok_or(EngineError::BookingNotFound(booking_id))?;

        let _gate = self.compaction_gate.read().await;
        let mut guard = rs.write().await;
        let current = guard
            .booking(&booking_id)
            .cloned()
            .ok_or(EngineError::BookingNotFound(booking_id))?;

        if current.owner_id != requester_id {
            return Err(EngineError::Forbidden {
                requester: requester_id,
                owner: current.owner_id,
            });
        }
        if current.status == new_status {
            return Ok(current);
        }
        if !current.status.can_transition_to(new_status) {
            return Err(EngineError::IllegalTransition {
                from: current.status,
                to: new_status,
            });
        }

        let event = Event::BookingStatusChanged {
            id: booking_id,
            vehicle_id,
            owner_id: current.owner_id,
            renter_id: current.renter_id,
            status: new_status,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        metrics::counter!(crate::observability::STATUS_CHANGES_TOTAL, "status" => new_status.as_str())
            .increment(1);
        info!("booking {booking_id}: {} -> {new_status}", current.status);

        guard
            .booking(&booking_id)
            .cloned()
            .ok_or(EngineError::BookingNotFound(booking_id))
    }
}
