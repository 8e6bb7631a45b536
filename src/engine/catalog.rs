use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::info;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::now_ms;
use super::{Engine, EngineError, SharedVehicleState};

fn check_len(value: &Option<String>, max: usize, what: &'static str) -> Result<(), EngineError> {
    match value {
        Some(s) if s.len() > max => Err(EngineError::InvalidVehicle(what)),
        _ => Ok(()),
    }
}

fn validate_draft(draft: &VehicleDraft) -> Result<(), EngineError> {
    if draft.price_per_day <= Decimal::ZERO {
        return Err(EngineError::InvalidVehicle("price per day must be positive"));
    }
    if draft.location.trim().is_empty() {
        return Err(EngineError::InvalidVehicle("location is required"));
    }
    if draft.location.len() > MAX_LOCATION_LEN {
        return Err(EngineError::InvalidVehicle("location too long"));
    }
    if draft.brand.len() > MAX_NAME_LEN || draft.model.len() > MAX_NAME_LEN {
        return Err(EngineError::InvalidVehicle("brand or model too long"));
    }
    check_len(&draft.category, MAX_NAME_LEN, "category too long")?;
    check_len(&draft.transmission, MAX_NAME_LEN, "transmission too long")?;
    check_len(&draft.fuel_type, MAX_NAME_LEN, "fuel type too long")?;
    check_len(&draft.description, MAX_DESCRIPTION_LEN, "description too long")?;
    check_len(&draft.image, MAX_IMAGE_URL_LEN, "image reference too long")?;
    Ok(())
}

impl Engine {
    /// List a new vehicle for `owner_id`. Vehicles start out bookable.
    pub async fn list_vehicle(self: &Arc<Self>, owner_id: Ulid, draft: VehicleDraft) -> Result<Vehicle, EngineError> {
        self.detached(move |engine| async move { engine.add_vehicle(owner_id, draft).await })
            .await
    }

    async fn add_vehicle(&self, owner_id: Ulid, draft: VehicleDraft) -> Result<Vehicle, EngineError> {
        validate_draft(&draft)?;
        if self.vehicles.len() >= MAX_VEHICLES {
            return Err(EngineError::LimitExceeded("too many vehicles"));
        }
        let id = draft.id.unwrap_or_else(Ulid::new);

        let vehicle = Vehicle {
            id,
            owner_id,
            location: draft.location.trim().to_string(),
            price_per_day: draft.price_per_day,
            available: true,
            brand: draft.brand,
            model: draft.model,
            year: draft.year,
            category: draft.category,
            transmission: draft.transmission,
            fuel_type: draft.fuel_type,
            seating_capacity: draft.seating_capacity,
            description: draft.description,
            image: draft.image,
            created_at: now_ms(),
        };

        let _gate = self.compaction_gate.read().await;
        // The id is claimed with the state already write-locked: readers wait
        // for the WAL append, and a second listing under the same id loses.
        let rs: SharedVehicleState = Arc::new(RwLock::new(VehicleState::new(vehicle.clone())));
        let mut guard = rs.write().await;
        match self.vehicles.entry(id) {
            Entry::Occupied(_) => return Err(EngineError::InvalidVehicle("vehicle id already exists")),
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&rs));
            }
        }

        let event = Event::VehicleListed {
            vehicle: vehicle.clone(),
        };
        if let Err(e) = self.wal_append(&event).await {
            guard.removed = true;
            drop(guard);
            self.vehicles.remove(&id);
            return Err(e);
        }
        self.index_event(&event);
        self.notify.send(&event);
        info!("vehicle {id} listed by {owner_id} in {}", vehicle.location);
        Ok(vehicle)
    }

    fn require_vehicle(&self, vehicle_id: Ulid) -> Result<SharedVehicleState, EngineError> {
        self.get_vehicle_state(&vehicle_id)
            .ok_or(EngineError::VehicleNotFound(vehicle_id))
    }

    pub async fn set_vehicle_availability(
        self: &Arc<Self>,
        requester: Ulid,
        vehicle_id: Ulid,
        available: bool,
    ) -> Result<Vehicle, EngineError> {
        self.detached(move |engine| async move {
            engine.write_availability(requester, vehicle_id, Some(available)).await
        })
        .await
    }

    /// Flip the availability flag. The current value is read under the same
    /// write lock that persists the new one.
    pub async fn toggle_vehicle_availability(
        self: &Arc<Self>,
        requester: Ulid,
        vehicle_id: Ulid,
    ) -> Result<Vehicle, EngineError> {
        self.detached(move |engine| async move { engine.write_availability(requester, vehicle_id, None).await })
            .await
    }

    /// `None` flips the current flag.
    async fn write_availability(
        &self,
        requester: Ulid,
        vehicle_id: Ulid,
        wanted: Option<bool>,
    ) -> Result<Vehicle, EngineError> {
        let rs = self.require_vehicle(vehicle_id)?;
        let _gate = self.compaction_gate.read().await;
        let mut guard = rs.write().await;
        if guard.removed {
            return Err(EngineError::VehicleNotFound(vehicle_id));
        }
        let owner_id = guard.vehicle.owner_id;
        if owner_id != requester {
            return Err(EngineError::Forbidden { requester, owner: owner_id });
        }
        let available = wanted.unwrap_or(!guard.vehicle.available);
        if guard.vehicle.available == available {
            return Ok(guard.vehicle.clone());
        }
        let event = Event::VehicleAvailabilitySet {
            id: vehicle_id,
            owner_id,
            available,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        info!("vehicle {vehicle_id} availability set to {available}");
        Ok(guard.vehicle.clone())
    }

    /// Soft-then-hard removal: the flag goes off first, then the vehicle
    /// leaves the catalog. Its bookings stay readable.
    pub async fn remove_vehicle(self: &Arc<Self>, requester: Ulid, vehicle_id: Ulid) -> Result<(), EngineError> {
        self.detached(move |engine| async move { engine.unlist(requester, vehicle_id).await })
            .await
    }

    async fn unlist(&self, requester: Ulid, vehicle_id: Ulid) -> Result<(), EngineError> {
        let rs = self.require_vehicle(vehicle_id)?;
        let _gate = self.compaction_gate.read().await;
        let mut guard = rs.write().await;
        if guard.removed {
            return Err(EngineError::VehicleNotFound(vehicle_id));
        }
        let owner_id = guard.vehicle.owner_id;
        if owner_id != requester {
            return Err(EngineError::Forbidden { requester, owner: owner_id });
        }
        if guard.vehicle.available {
            let off = Event::VehicleAvailabilitySet {
                id: vehicle_id,
                owner_id,
                available: false,
            };
            self.persist_and_apply(&mut guard, &off).await?;
        }
        let event = Event::VehicleRemoved { id: vehicle_id, owner_id };
        self.persist_and_apply(&mut guard, &event).await?;
        info!("vehicle {vehicle_id} removed by {requester}");
        Ok(())
    }

    /// A listed vehicle by id. Removed vehicles resolve to `None`.
    pub async fn find_vehicle(&self, id: Ulid) -> Option<Vehicle> {
        let rs = self.get_vehicle_state(&id)?;
        let guard = rs.read().await;
        guard.is_listed().then(|| guard.vehicle.clone())
    }

    /// Snapshot of every listed vehicle matching `filter`, ordered by id.
    async fn collect_vehicles(&self, filter: impl Fn(&Vehicle) -> bool) -> Vec<Vehicle> {
        let states: Vec<SharedVehicleState> = self.vehicles.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::new();
        for rs in states {
            let guard = rs.read().await;
            if guard.is_listed() && filter(&guard.vehicle) {
                out.push(guard.vehicle.clone());
            }
        }
        out.sort_by_key(|v| v.id);
        out
    }

    /// Listed vehicles at `location` with the availability flag on.
    pub async fn find_vehicles_by_location(&self, location: &str) -> Vec<Vehicle> {
        let location = location.trim();
        self.collect_vehicles(|v| v.available && v.location == location).await
    }

    /// Every listed vehicle with the availability flag on.
    pub async fn list_catalog(&self) -> Vec<Vehicle> {
        self.collect_vehicles(|v| v.available).await
    }

    pub async fn owner_vehicles(&self, owner_id: Ulid) -> Vec<Vehicle> {
        let ids = self
            .owner_vehicles
            .get(&owner_id)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(v) = self.find_vehicle(id).await {
                out.push(v);
            }
        }
        out.sort_by_key(|v| v.id);
        out
    }

    pub fn owner_vehicle_count(&self, owner_id: &Ulid) -> usize {
        self.owner_vehicles.get(owner_id).map_or(0, |ids| ids.len())
    }
}
