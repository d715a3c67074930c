use tracing::{debug, info};

use crate::model::{Presence, VehicleId};
use crate::protocol::Outbound;
use crate::AppError;

/// A presence change that has been applied locally and still needs to be
/// persisted and announced.
#[derive(Debug, Clone, PartialEq)]
pub struct PresenceChange {
    pub previous: Presence,
    pub current: Presence,
    pub announce: Outbound,
}

impl PresenceChange {
    #[must_use]
    pub fn went_online(&self) -> bool {
        !self.previous.is_online() && self.current.is_online()
    }

    #[must_use]
    pub fn went_offline(&self) -> bool {
        self.previous.is_online() && !self.current.is_online()
    }
}

/// Responder availability. The only gate for location streaming and request visibility.
#[derive(Debug, Default)]
pub struct PresenceController {
    presence: Presence,
    restored: bool,
    /// A local change the server has not been told about yet.
    unannounced: bool,
}

impl PresenceController {
    #[must_use]
    pub fn presence(&self) -> Presence {
        self.presence
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        self.presence.is_online()
    }

    /// Whether presence has been settled since mount, from storage or by the user.
    #[must_use]
    pub fn is_restored(&self) -> bool {
        self.restored
    }

    /// Flips presence. Without a vehicle identity nothing changes.
    pub fn toggle(&mut self, vehicle: Option<&VehicleId>) -> Result<PresenceChange, AppError> {
        self.set(self.presence.toggled(), vehicle)
    }

    pub fn set(
        &mut self,
        presence: Presence,
        vehicle: Option<&VehicleId>,
    ) -> Result<PresenceChange, AppError> {
        let vehicle = vehicle.ok_or_else(|| {
            AppError::validation("Vehicle details are still loading. Try again in a moment.")
                .with_context("field", "vehicleId")
        })?;

        let previous = self.presence;
        self.presence = presence;
        self.restored = true;
        self.unannounced = true;
        info!(vehicle_id = %vehicle, from = previous.as_str(), to = presence.as_str(), "presence changed");

        Ok(PresenceChange {
            previous,
            current: presence,
            announce: Outbound::UpdateStatus {
                vehicle_id: vehicle.clone(),
                status: presence,
            },
        })
    }

    /// Applies the persisted value without announcing it. A value set since mount wins,
    /// in which case this returns `false`.
    pub fn restore(&mut self, presence: Presence) -> bool {
        if self.restored {
            debug!(presence = presence.as_str(), "ignoring late presence restore");
            return false;
        }
        debug!(presence = presence.as_str(), "presence restored");
        self.presence = presence;
        self.restored = true;
        true
    }

    /// Online responders are announced on every connect; an offline state
    /// only while the server has not confirmed it.
    #[must_use]
    pub fn needs_announcement(&self) -> bool {
        self.presence.is_online() || self.unannounced
    }

    pub fn mark_announced(&mut self) {
        self.unannounced = false;
    }

    /// Current state as an announcement, used after (re)connecting.
    #[must_use]
    pub fn announcement(&self, vehicle: &VehicleId) -> Outbound {
        Outbound::UpdateStatus {
            vehicle_id: vehicle.clone(),
            status: self.presence,
        }
    }

    /// Forgets everything from the previous mount.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
