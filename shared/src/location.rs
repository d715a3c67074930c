//! Device position streaming for online responders.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::geo::LatLon;
use crate::model::VehicleId;
use crate::protocol::Outbound;
use crate::{AppError, ErrorKind, DEFAULT_MIN_DISTANCE_M, DEFAULT_SAMPLE_INTERVAL_MS};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplingPolicy {
    pub interval_ms: u64,
    pub min_distance_m: f64,
}

impl Default for SamplingPolicy {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_SAMPLE_INTERVAL_MS,
            min_distance_m: DEFAULT_MIN_DISTANCE_M,
        }
    }
}

/// Identifies one watch subscription; samples carry it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WatchId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamState {
    #[default]
    Idle,
    Active(WatchId),
    Denied,
}

#[derive(Debug, Default)]
pub struct LocationStreamer {
    policy: SamplingPolicy,
    state: StreamState,
    next_watch: u64,
    last_position: Option<LatLon>,
}

impl LocationStreamer {
    #[must_use]
    pub fn new(policy: SamplingPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn policy(&self) -> SamplingPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: SamplingPolicy) {
        self.policy = policy;
    }

    #[must_use]
    pub fn state(&self) -> StreamState {
        self.state
    }

    #[must_use]
    pub fn active_watch(&self) -> Option<WatchId> {
        match self.state {
            StreamState::Active(id) => Some(id),
            StreamState::Idle | StreamState::Denied => None,
        }
    }

    #[must_use]
    pub fn last_position(&self) -> Option<LatLon> {
        self.last_position
    }

    /// Opens a watch. Returns `None` when one is already running or permission was denied.
    pub fn start(&mut self) -> Option<WatchId> {
        match self.state {
            StreamState::Active(_) => None,
            StreamState::Denied => {
                debug!("location permission denied; not starting watch");
                None
            }
            StreamState::Idle => {
                self.next_watch += 1;
                let id = WatchId(self.next_watch);
                self.state = StreamState::Active(id);
                debug!(watch = id.0, "location watch started");
                Some(id)
            }
        }
    }

    /// Releases the running watch. Returns its id exactly once.
    pub fn stop(&mut self) -> Option<WatchId> {
        let id = self.active_watch()?;
        self.state = StreamState::Idle;
        debug!(watch = id.0, "location watch stopped");
        Some(id)
    }

    /// Turns a sample from `watch` into a location update. Samples from any watch other
    /// than the running one are dropped.
    pub fn on_sample(
        &mut self,
        watch: WatchId,
        position: LatLon,
        vehicle: Option<&VehicleId>,
    ) -> Option<Outbound> {
        if self.active_watch() != Some(watch) {
            debug!(watch = watch.0, "dropping sample from stale watch");
            return None;
        }
        let position = match position.validate() {
            Ok(position) => position,
            Err(e) => {
                warn!(error = %e, "discarding invalid position sample");
                return None;
            }
        };
        self.last_position = Some(position);

        let vehicle = vehicle?;
        Some(Outbound::LocationUpdate {
            vehicle_id: vehicle.clone(),
            position,
        })
    }

    /// Permission was refused. Terminal until the next mount.
    pub fn permission_denied(&mut self) -> AppError {
        self.state = StreamState::Denied;
        AppError::new(
            ErrorKind::LocationPermissionDenied,
            "Allow location access to use this feature.",
        )
    }

    /// Forgets everything from the previous mount, keeping the policy.
    pub fn reset(&mut self) {
        *self = Self::new(self.policy);
    }
}
