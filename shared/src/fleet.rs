//! Keyed live view of vehicle positions.

use std::collections::HashMap;

use tracing::debug;

use crate::geo::LatLon;
use crate::model::{Presence, Vehicle, VehicleId};
use crate::protocol::ActiveVehicle;

#[derive(Debug, Default)]
pub struct FleetRegistry {
    vehicles: HashMap<VehicleId, Vehicle>,
}

impl FleetRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole fleet with a server snapshot. Every listed vehicle is online.
    pub fn replace_all(&mut self, list: impl IntoIterator<Item = ActiveVehicle>) {
        self.vehicles = list
            .into_iter()
            .map(|v| {
                let vehicle = Vehicle {
                    vehicle_id: v.vehicle_id.clone(),
                    location: v.current_location,
                    presence: Presence::Online,
                };
                (v.vehicle_id, vehicle)
            })
            .collect();
        debug!(count = self.vehicles.len(), "fleet snapshot applied");
    }

    /// Inserts or moves a vehicle. Returns `true` when the id was previously unseen.
    pub fn upsert(&mut self, vehicle_id: VehicleId, location: LatLon) -> bool {
        if let Some(existing) = self.vehicles.get_mut(&vehicle_id) {
            existing.location = location;
            return false;
        }
        self.vehicles.insert(
            vehicle_id.clone(),
            Vehicle {
                vehicle_id,
                location,
                presence: Presence::Online,
            },
        );
        true
    }

    pub fn remove(&mut self, vehicle_id: &VehicleId) -> Option<Vehicle> {
        self.vehicles.remove(vehicle_id)
    }

    #[must_use]
    pub fn get(&self, vehicle_id: &VehicleId) -> Option<&Vehicle> {
        self.vehicles.get(vehicle_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.vehicles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }

    /// Read-only copy ordered by vehicle id, for rendering.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Vehicle> {
        let mut list: Vec<Vehicle> = self.vehicles.values().cloned().collect();
        list.sort_by(|a, b| a.vehicle_id.cmp(&b.vehicle_id));
        list
    }
}
