//! Emergency request lifecycle.
//!
//! One [`RequestLifecycle`] per request this client takes part in. The server
//! is authoritative: local accepts are optimistic and roll back to the last
//! server-confirmed state when the server disagrees or stays silent.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::geo::LatLon;
use crate::model::{
    EmergencyRequest, RequestDraft, RequestId, RequestStatus, UserId, VehicleId,
};
use crate::protocol::Outbound;
use crate::{AppError, ErrorKind};

/// Status and assignment as last confirmed by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedState {
    pub status: RequestStatus,
    pub assigned_vehicle_id: Option<VehicleId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAccept {
    pub vehicle_id: VehicleId,
    pub started_at_ms: u64,
}

/// Result of applying a server-driven status change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub from: RequestStatus,
    pub to: RequestStatus,
    /// Vehicle that was assigned before the request reached a terminal state.
    pub released: Option<VehicleId>,
}

impl StatusChange {
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.from == self.to
    }
}

#[derive(Debug, Clone)]
pub struct RequestLifecycle {
    request: EmergencyRequest,
    confirmed: ConfirmedState,
    pending_accept: Option<PendingAccept>,
    awaiting_server: bool,
    eta: Option<String>,
}

impl RequestLifecycle {
    /// Validates a requester's draft and creates the request in `pending`.
    pub fn submit(
        draft: &RequestDraft,
        requester: Option<&UserId>,
        location: Option<LatLon>,
    ) -> Result<(Self, Outbound), AppError> {
        let details = draft.emergency_details.trim();
        if details.is_empty() {
            return Err(AppError::validation("Please describe the emergency.")
                .with_context("field", "emergencyDetails"));
        }
        if draft.patient_count < 1 {
            return Err(AppError::validation("At least one patient is required.")
                .with_context("field", "patientCount"));
        }
        let requester = requester
            .ok_or_else(|| AppError::validation("Your profile has not loaded yet."))?
            .clone();
        let location = location
            .ok_or_else(|| {
                AppError::new(ErrorKind::Location, "No device position available yet")
            })?
            .validate()?;

        let request = EmergencyRequest {
            id: RequestId::generate(),
            requester_id: requester.clone(),
            location,
            emergency_details: details.to_string(),
            patient_count: draft.patient_count,
            critical_level: draft.critical_level,
            status: RequestStatus::Pending,
            assigned_vehicle_id: None,
        };

        let outbound = Outbound::EmergencyRequest {
            user_id: requester,
            location,
            emergency_details: request.emergency_details.clone(),
            patient_count: request.patient_count,
            critical_level: request.critical_level,
        };

        let mut lifecycle = Self::tracking(request);
        lifecycle.awaiting_server = true;
        Ok((lifecycle, outbound))
    }

    /// Starts tracking a request received from the server.
    pub fn from_server(request: EmergencyRequest) -> Result<Self, AppError> {
        if !request.assignment_is_consistent() {
            return Err(AppError::new(
                ErrorKind::Protocol,
                "Request assignment does not match its status",
            )
            .with_context("request_id", request.id.to_string())
            .with_context("status", request.status.as_str()));
        }
        Ok(Self::tracking(request))
    }

    fn tracking(request: EmergencyRequest) -> Self {
        let confirmed = ConfirmedState {
            status: request.status,
            assigned_vehicle_id: request.assigned_vehicle_id.clone(),
        };
        Self {
            request,
            confirmed,
            pending_accept: None,
            awaiting_server: false,
            eta: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> &RequestId {
        &self.request.id
    }

    #[must_use]
    pub fn request(&self) -> &EmergencyRequest {
        &self.request
    }

    #[must_use]
    pub fn status(&self) -> RequestStatus {
        self.request.status
    }

    #[must_use]
    pub fn assigned_vehicle_id(&self) -> Option<&VehicleId> {
        self.request.assigned_vehicle_id.as_ref()
    }

    #[must_use]
    pub fn confirmed(&self) -> &ConfirmedState {
        &self.confirmed
    }

    #[must_use]
    pub fn pending_accept(&self) -> Option<&PendingAccept> {
        self.pending_accept.as_ref()
    }

    #[must_use]
    pub fn eta(&self) -> Option<&str> {
        self.eta.as_deref()
    }

    pub fn set_eta(&mut self, eta: Option<String>) {
        if eta.is_some() {
            self.eta = eta;
        }
    }

    /// True for a submission the server has not yet said anything about.
    #[must_use]
    pub fn is_awaiting_server(&self) -> bool {
        self.awaiting_server
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.request.status.is_terminal()
    }

    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.request.assignment_is_consistent()
    }

    /// Whether this request occupies `vehicle`, confirmed or not.
    #[must_use]
    pub fn engages(&self, vehicle: &VehicleId) -> bool {
        !self.is_terminal()
            && (self.request.is_assigned_to(vehicle)
                || self
                    .pending_accept
                    .as_ref()
                    .is_some_and(|p| &p.vehicle_id == vehicle))
    }

    /// Optimistically assigns `vehicle`. Only legal from `pending`.
    pub fn accept(&mut self, vehicle: &VehicleId, now_ms: u64) -> Result<Outbound, AppError> {
        if self.pending_accept.is_some() || self.request.status != RequestStatus::Pending {
            return Err(AppError::conflict(format!(
                "This request can no longer be accepted ({}).",
                self.request.status.display_name()
            ))
            .with_context("request_id", self.request.id.to_string()));
        }

        self.pending_accept = Some(PendingAccept {
            vehicle_id: vehicle.clone(),
            started_at_ms: now_ms,
        });
        self.request.status = RequestStatus::Accepted;
        self.request.assigned_vehicle_id = Some(vehicle.clone());

        debug!(request_id = %self.request.id, vehicle_id = %vehicle, "accept applied optimistically");

        Ok(Outbound::AcceptRequest {
            request_id: self.request.id.clone(),
            vehicle_id: vehicle.clone(),
        })
    }

    /// The server reports the request assigned to `by`.
    pub fn apply_assignment(&mut self, by: &VehicleId) -> Result<(), AppError> {
        self.awaiting_server = false;

        if let Some(pending) = self.pending_accept.take() {
            if &pending.vehicle_id == by {
                self.commit();
                info!(request_id = %self.request.id, vehicle_id = %by, "accept confirmed");
                return Ok(());
            }
            self.rollback();
            warn!(
                request_id = %self.request.id,
                winner = %by,
                "accept lost to another vehicle"
            );
            return Err(
                AppError::conflict("This request was accepted by another ambulance.")
                    .with_internal(format!("assigned to {by}"))
                    .with_context("request_id", self.request.id.to_string()),
            );
        }

        match self.request.status {
            RequestStatus::Pending | RequestStatus::Accepted => {
                self.request.status = RequestStatus::Accepted;
                self.request.assigned_vehicle_id = Some(by.clone());
                self.commit();
                Ok(())
            }
            status => Err(AppError::new(
                ErrorKind::InvalidState,
                format!("Cannot assign a vehicle to a {status} request"),
            )),
        }
    }

    /// The server rejected this client's accept. Returns the error to surface, if an
    /// accept was in flight.
    pub fn reject_accept(&mut self, message: &str) -> Option<AppError> {
        self.pending_accept.take()?;
        self.rollback();
        let message = if message.trim().is_empty() {
            "The request could not be accepted."
        } else {
            message.trim()
        };
        Some(AppError::conflict(message).with_context("request_id", self.request.id.to_string()))
    }

    #[must_use]
    pub fn accept_expired(&self, now_ms: u64, timeout_ms: u64) -> bool {
        self.pending_accept
            .as_ref()
            .is_some_and(|p| now_ms.saturating_sub(p.started_at_ms) >= timeout_ms)
    }

    /// Gives up on an unanswered accept.
    pub fn expire_accept(&mut self) -> Option<AppError> {
        self.pending_accept.take()?;
        self.rollback();
        Some(
            AppError::connectivity("Accept was not confirmed by the server")
                .with_context("request_id", self.request.id.to_string()),
        )
    }

    pub fn mark_in_progress(&mut self) -> Result<StatusChange, AppError> {
        // Progress can only follow a successful accept.
        if self.pending_accept.take().is_some() {
            self.commit();
        }
        self.transition(RequestStatus::InProgress)
    }

    pub fn complete(&mut self) -> Result<StatusChange, AppError> {
        self.transition(RequestStatus::Completed)
    }

    /// Cancels from the local side and produces the status update to emit.
    pub fn cancel(&mut self) -> Result<Outbound, AppError> {
        if !self.request.status.can_transition_to(RequestStatus::Cancelled) {
            return Err(AppError::conflict("This request can no longer be cancelled.")
                .with_context("status", self.request.status.as_str()));
        }
        self.pending_accept = None;
        self.transition(RequestStatus::Cancelled)?;
        Ok(Outbound::UpdateRequestStatus {
            request_id: self.request.id.clone(),
            status: RequestStatus::Cancelled,
        })
    }

    /// Applies a status pushed by the server.
    pub fn apply_remote_status(
        &mut self,
        status: RequestStatus,
        vehicle: Option<&VehicleId>,
    ) -> Result<StatusChange, AppError> {
        self.awaiting_server = false;
        let from = self.request.status;

        if status == from && self.pending_accept.is_none() {
            return Ok(StatusChange {
                from,
                to: from,
                released: None,
            });
        }

        match status {
            RequestStatus::Accepted => {
                let vehicle = vehicle.ok_or_else(|| {
                    AppError::new(ErrorKind::Protocol, "Accepted status without a vehicle")
                })?;
                self.apply_assignment(vehicle)?;
                Ok(StatusChange {
                    from,
                    to: self.request.status,
                    released: None,
                })
            }
            RequestStatus::InProgress => self.mark_in_progress(),
            RequestStatus::Completed => self.complete(),
            RequestStatus::Cancelled => {
                self.pending_accept = None;
                self.transition(RequestStatus::Cancelled)
            }
            RequestStatus::Pending => {
                // Only an unconfirmed accept can be undone this way.
                if self.pending_accept.take().is_some() {
                    self.rollback();
                }
                Ok(StatusChange {
                    from,
                    to: self.request.status,
                    released: None,
                })
            }
        }
    }

    /// Moves to the server id once the server names this request.
    pub fn rekey(&mut self, id: RequestId) {
        self.request.id = id;
    }

    fn transition(&mut self, to: RequestStatus) -> Result<StatusChange, AppError> {
        let from = self.request.status;
        from.validate_transition(to)?;

        self.request.status = to;
        let released = if to.requires_assignment() {
            None
        } else {
            self.request.assigned_vehicle_id.take()
        };
        self.commit();

        debug!(request_id = %self.request.id, %from, %to, "request transitioned");
        Ok(StatusChange { from, to, released })
    }

    fn commit(&mut self) {
        self.confirmed = ConfirmedState {
            status: self.request.status,
            assigned_vehicle_id: self.request.assigned_vehicle_id.clone(),
        };
    }

    fn rollback(&mut self) {
        self.request.status = self.confirmed.status;
        self.request.assigned_vehicle_id = self.confirmed.assigned_vehicle_id.clone();
    }
}

/// Requests this client is engaged with, and which one is on screen.
#[derive(Debug, Default)]
pub struct RequestBook {
    entries: HashMap<RequestId, RequestLifecycle>,
    active: Option<RequestId>,
}

impl RequestBook {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracks a lifecycle and makes it the active one.
    pub fn track(&mut self, lifecycle: RequestLifecycle) -> &mut RequestLifecycle {
        let id = lifecycle.id().clone();
        self.active = Some(id.clone());
        self.entries.entry(id).or_insert(lifecycle)
    }

    #[must_use]
    pub fn get(&self, id: &RequestId) -> Option<&RequestLifecycle> {
        self.entries.get(id)
    }

    pub fn get_mut(&mut self, id: &RequestId) -> Option<&mut RequestLifecycle> {
        self.entries.get_mut(id)
    }

    #[must_use]
    pub fn contains(&self, id: &RequestId) -> bool {
        self.entries.contains_key(id)
    }

    #[must_use]
    pub fn active_id(&self) -> Option<&RequestId> {
        self.active.as_ref()
    }

    #[must_use]
    pub fn active(&self) -> Option<&RequestLifecycle> {
        self.active.as_ref().and_then(|id| self.entries.get(id))
    }

    pub fn active_mut(&mut self) -> Option<&mut RequestLifecycle> {
        let id = self.active.clone()?;
        self.entries.get_mut(&id)
    }

    /// The named request if tracked. Signals without an id address the active request.
    #[must_use]
    pub fn resolve(&self, id: Option<&RequestId>) -> Option<RequestId> {
        match id {
            Some(id) => self.entries.contains_key(id).then(|| id.clone()),
            None => self.active.clone(),
        }
    }

    /// Re-files a tracked request under a new id.
    pub fn rekey(&mut self, from: &RequestId, to: RequestId) -> bool {
        if from == &to || self.entries.contains_key(&to) {
            return false;
        }
        let Some(mut lifecycle) = self.entries.remove(from) else {
            return false;
        };
        lifecycle.rekey(to.clone());
        if self.active.as_ref() == Some(from) {
            self.active = Some(to.clone());
        }
        self.entries.insert(to, lifecycle);
        true
    }

    pub fn remove(&mut self, id: &RequestId) -> Option<RequestLifecycle> {
        if self.active.as_ref() == Some(id) {
            self.active = None;
        }
        self.entries.remove(id)
    }

    /// Removes a finished request from view.
    pub fn dismiss(&mut self, id: &RequestId) -> Result<RequestLifecycle, AppError> {
        let lifecycle = self.entries.get(id).ok_or_else(|| {
            AppError::new(ErrorKind::NotFound, "Request not found")
                .with_context("request_id", id.to_string())
        })?;
        if !lifecycle.is_terminal() {
            return Err(AppError::validation("Only finished requests can be dismissed.")
                .with_context("request_id", id.to_string()));
        }
        self.remove(id).ok_or_else(|| AppError::new(ErrorKind::Internal, "Request vanished"))
    }

    /// True while a non-terminal request is active.
    #[must_use]
    pub fn has_open_active(&self) -> bool {
        self.active().is_some_and(|lifecycle| !lifecycle.is_terminal())
    }

    #[must_use]
    pub fn engagement_of(&self, vehicle: &VehicleId) -> Option<&RequestLifecycle> {
        self.entries.values().find(|lifecycle| lifecycle.engages(vehicle))
    }

    #[must_use]
    pub fn expired_accepts(&self, now_ms: u64, timeout_ms: u64) -> Vec<RequestId> {
        self.entries
            .values()
            .filter(|lifecycle| lifecycle.accept_expired(now_ms, timeout_ms))
            .map(|lifecycle| lifecycle.id().clone())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RequestLifecycle> {
        self.entries.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CriticalLevel;
    use proptest::prelude::*;

    fn server_request(id: &str) -> EmergencyRequest {
        EmergencyRequest {
            id: RequestId::new(id),
            requester_id: UserId::new("user-1"),
            location: LatLon::new(12.9, 77.6),
            emergency_details: "chest pain".into(),
            patient_count: 1,
            critical_level: CriticalLevel::Critical,
            status: RequestStatus::Pending,
            assigned_vehicle_id: None,
        }
    }

    fn amb(id: &str) -> VehicleId {
        VehicleId::new(id)
    }

    mod submit_tests {
        use super::*;

        #[test]
        fn test_submit_creates_pending_request() {
            let draft = RequestDraft::new("  chest pain ")
                .with_critical_level(CriticalLevel::Critical);
            let (lifecycle, outbound) = RequestLifecycle::submit(
                &draft,
                Some(&UserId::new("user-1")),
                Some(LatLon::new(12.9, 77.6)),
            )
            .unwrap();

            assert_eq!(lifecycle.status(), RequestStatus::Pending);
            assert!(lifecycle.is_awaiting_server());
            assert_eq!(lifecycle.request().emergency_details, "chest pain");
            assert_eq!(
                outbound,
                Outbound::EmergencyRequest {
                    user_id: UserId::new("user-1"),
                    location: LatLon::new(12.9, 77.6),
                    emergency_details: "chest pain".into(),
                    patient_count: 1,
                    critical_level: CriticalLevel::Critical,
                }
            );
        }

        #[test]
        fn test_submit_rejects_blank_details() {
            let err = RequestLifecycle::submit(
                &RequestDraft::new("   "),
                Some(&UserId::new("user-1")),
                Some(LatLon::new(0.0, 0.0)),
            )
            .unwrap_err();
            assert_eq!(err.kind, ErrorKind::Validation);
            assert_eq!(
                err.context.get("field").map(String::as_str),
                Some("emergencyDetails")
            );
        }

        #[test]
        fn test_submit_rejects_zero_patients() {
            let err = RequestLifecycle::submit(
                &RequestDraft::new("fall").with_patient_count(0),
                Some(&UserId::new("user-1")),
                Some(LatLon::new(0.0, 0.0)),
            )
            .unwrap_err();
            assert_eq!(err.kind, ErrorKind::Validation);
        }

        #[test]
        fn test_submit_needs_identity_and_position() {
            let draft = RequestDraft::new("fall");
            let err =
                RequestLifecycle::submit(&draft, None, Some(LatLon::new(0.0, 0.0))).unwrap_err();
            assert_eq!(err.kind, ErrorKind::Validation);

            let err =
                RequestLifecycle::submit(&draft, Some(&UserId::new("u")), None).unwrap_err();
            assert_eq!(err.kind, ErrorKind::Location);
        }
    }

    mod accept_tests {
        use super::*;

        #[test]
        fn test_accept_then_confirm() {
            let mut lifecycle = RequestLifecycle::from_server(server_request("r1")).unwrap();
            let outbound = lifecycle.accept(&amb("AMB-1"), 1_000).unwrap();
            assert_eq!(
                outbound,
                Outbound::AcceptRequest {
                    request_id: RequestId::new("r1"),
                    vehicle_id: amb("AMB-1"),
                }
            );
            assert_eq!(lifecycle.status(), RequestStatus::Accepted);
            assert_eq!(lifecycle.confirmed().status, RequestStatus::Pending);

            lifecycle.apply_assignment(&amb("AMB-1")).unwrap();
            assert_eq!(lifecycle.status(), RequestStatus::Accepted);
            assert_eq!(lifecycle.assigned_vehicle_id(), Some(&amb("AMB-1")));
            assert_eq!(lifecycle.confirmed().status, RequestStatus::Accepted);
            assert!(lifecycle.pending_accept().is_none());
        }

        #[test]
        fn test_second_accept_conflicts_without_change() {
            let mut lifecycle = RequestLifecycle::from_server(server_request("r1")).unwrap();
            lifecycle.accept(&amb("AMB-1"), 0).unwrap();
            lifecycle.apply_assignment(&amb("AMB-1")).unwrap();

            let err = lifecycle.accept(&amb("AMB-2"), 0).unwrap_err();
            assert_eq!(err.kind, ErrorKind::Conflict);
            assert_eq!(lifecycle.assigned_vehicle_id(), Some(&amb("AMB-1")));
            assert_eq!(lifecycle.status(), RequestStatus::Accepted);
        }

        #[test]
        fn test_accept_from_every_other_state_conflicts() {
            let states = [
                (RequestStatus::Accepted, Some(amb("AMB-9"))),
                (RequestStatus::InProgress, Some(amb("AMB-9"))),
                (RequestStatus::Completed, None),
                (RequestStatus::Cancelled, None),
            ];
            for (status, assigned) in states {
                let mut request = server_request("r1");
                request.status = status;
                request.assigned_vehicle_id = assigned.clone();
                let mut lifecycle = RequestLifecycle::from_server(request).unwrap();

                let err = lifecycle.accept(&amb("AMB-1"), 0).unwrap_err();
                assert_eq!(err.kind, ErrorKind::Conflict, "from {status}");
                assert_eq!(lifecycle.status(), status);
                assert_eq!(lifecycle.assigned_vehicle_id(), assigned.as_ref());
            }
        }

        #[test]
        fn test_losing_accept_rolls_back() {
            let mut lifecycle = RequestLifecycle::from_server(server_request("r1")).unwrap();
            lifecycle.accept(&amb("AMB-1"), 0).unwrap();

            let err = lifecycle.apply_assignment(&amb("AMB-2")).unwrap_err();
            assert_eq!(err.kind, ErrorKind::Conflict);
            assert_eq!(lifecycle.status(), RequestStatus::Pending);
            assert_eq!(lifecycle.assigned_vehicle_id(), None);
        }

        #[test]
        fn test_rejection_and_expiry_roll_back() {
            let mut lifecycle = RequestLifecycle::from_server(server_request("r1")).unwrap();
            assert!(lifecycle.reject_accept("nope").is_none());

            lifecycle.accept(&amb("AMB-1"), 0).unwrap();
            let err = lifecycle.reject_accept("Request already taken").unwrap();
            assert_eq!(err.message, "Request already taken");
            assert_eq!(lifecycle.status(), RequestStatus::Pending);

            lifecycle.accept(&amb("AMB-1"), 1_000).unwrap();
            assert!(!lifecycle.accept_expired(20_000, 30_000));
            assert!(lifecycle.accept_expired(31_000, 30_000));
            let err = lifecycle.expire_accept().unwrap();
            assert_eq!(err.kind, ErrorKind::Connectivity);
            assert_eq!(lifecycle.status(), RequestStatus::Pending);
            assert!(lifecycle.is_consistent());
        }
    }

    mod progress_tests {
        use super::*;

        fn accepted() -> RequestLifecycle {
            let mut lifecycle = RequestLifecycle::from_server(server_request("r1")).unwrap();
            lifecycle.accept(&amb("AMB-1"), 0).unwrap();
            lifecycle.apply_assignment(&amb("AMB-1")).unwrap();
            lifecycle
        }

        #[test]
        fn test_progress_then_completion_releases_vehicle() {
            let mut lifecycle = accepted();
            lifecycle.mark_in_progress().unwrap();
            assert_eq!(lifecycle.status(), RequestStatus::InProgress);

            let change = lifecycle.complete().unwrap();
            assert_eq!(change.to, RequestStatus::Completed);
            assert_eq!(change.released, Some(amb("AMB-1")));
            assert_eq!(lifecycle.assigned_vehicle_id(), None);
            assert!(lifecycle.is_terminal());
        }

        #[test]
        fn test_completion_requires_progress() {
            let mut lifecycle = accepted();
            let err = lifecycle.complete().unwrap_err();
            assert_eq!(err.kind, ErrorKind::InvalidState);
            assert_eq!(lifecycle.status(), RequestStatus::Accepted);
        }

        #[test]
        fn test_cancel_from_pending_and_accepted_only() {
            let mut lifecycle = RequestLifecycle::from_server(server_request("r1")).unwrap();
            let outbound = lifecycle.cancel().unwrap();
            assert_eq!(
                outbound,
                Outbound::UpdateRequestStatus {
                    request_id: RequestId::new("r1"),
                    status: RequestStatus::Cancelled,
                }
            );

            let mut lifecycle = accepted();
            lifecycle.cancel().unwrap();
            assert_eq!(lifecycle.assigned_vehicle_id(), None);

            let mut lifecycle = accepted();
            lifecycle.mark_in_progress().unwrap();
            assert_eq!(lifecycle.cancel().unwrap_err().kind, ErrorKind::Conflict);
        }

        #[test]
        fn test_remote_status_is_idempotent() {
            let mut lifecycle = accepted();
            let change = lifecycle
                .apply_remote_status(RequestStatus::Accepted, Some(&amb("AMB-1")))
                .unwrap();
            assert!(change.is_noop());

            lifecycle
                .apply_remote_status(RequestStatus::InProgress, None)
                .unwrap();
            let change = lifecycle
                .apply_remote_status(RequestStatus::InProgress, None)
                .unwrap();
            assert!(change.is_noop());
        }

        #[test]
        fn test_requester_sees_assignment() {
            let (mut lifecycle, _) = RequestLifecycle::submit(
                &RequestDraft::new("fall"),
                Some(&UserId::new("user-1")),
                Some(LatLon::new(1.0, 1.0)),
            )
            .unwrap();
            lifecycle.apply_assignment(&amb("AMB-3")).unwrap();
            lifecycle.set_eta(Some("7 min".into()));

            assert!(!lifecycle.is_awaiting_server());
            assert_eq!(lifecycle.assigned_vehicle_id(), Some(&amb("AMB-3")));
            assert_eq!(lifecycle.eta(), Some("7 min"));
        }
    }

    mod book_tests {
        use super::*;

        #[test]
        fn test_track_resolve_and_rekey() {
            let mut book = RequestBook::new();
            book.track(RequestLifecycle::from_server(server_request("local")).unwrap());

            assert_eq!(book.resolve(None), Some(RequestId::new("local")));
            assert_eq!(book.resolve(Some(&RequestId::new("unknown"))), None);

            assert!(book.rekey(&RequestId::new("local"), RequestId::new("srv-1")));
            assert_eq!(book.active_id(), Some(&RequestId::new("srv-1")));
            assert_eq!(book.active().unwrap().id(), &RequestId::new("srv-1"));
        }

        #[test]
        fn test_dismiss_only_terminal() {
            let mut book = RequestBook::new();
            book.track(RequestLifecycle::from_server(server_request("r1")).unwrap());

            let err = book.dismiss(&RequestId::new("r1")).unwrap_err();
            assert_eq!(err.kind, ErrorKind::Validation);

            book.active_mut().unwrap().cancel().unwrap();
            book.dismiss(&RequestId::new("r1")).unwrap();
            assert!(book.is_empty());
            assert!(book.active_id().is_none());

            let err = book.dismiss(&RequestId::new("r1")).unwrap_err();
            assert_eq!(err.kind, ErrorKind::NotFound);
        }

        #[test]
        fn test_engagement_and_expiry_scan() {
            let mut book = RequestBook::new();
            let lifecycle = book.track(RequestLifecycle::from_server(server_request("r1")).unwrap());
            lifecycle.accept(&amb("AMB-1"), 0).unwrap();

            assert!(book.engagement_of(&amb("AMB-1")).is_some());
            assert!(book.engagement_of(&amb("AMB-2")).is_none());
            assert_eq!(book.expired_accepts(30_000, 30_000), vec![RequestId::new("r1")]);
            assert!(book.expired_accepts(29_999, 30_000).is_empty());
        }
    }

    #[derive(Debug, Clone)]
    enum Step {
        Accept(u8),
        Assign(u8),
        Reject,
        Expire,
        Remote(RequestStatus, Option<u8>),
        Cancel,
    }

    fn status_strategy() -> impl Strategy<Value = RequestStatus> {
        prop_oneof![
            Just(RequestStatus::Pending),
            Just(RequestStatus::Accepted),
            Just(RequestStatus::InProgress),
            Just(RequestStatus::Completed),
            Just(RequestStatus::Cancelled),
        ]
    }

    fn step_strategy() -> impl Strategy<Value = Step> {
        prop_oneof![
            (0u8..3).prop_map(Step::Accept),
            (0u8..3).prop_map(Step::Assign),
            Just(Step::Reject),
            Just(Step::Expire),
            (status_strategy(), proptest::option::of(0u8..3))
                .prop_map(|(status, vehicle)| Step::Remote(status, vehicle)),
            Just(Step::Cancel),
        ]
    }

    proptest! {
        #[test]
        fn prop_assignment_matches_status(steps in prop::collection::vec(step_strategy(), 0..30)) {
            let mut lifecycle = RequestLifecycle::from_server(server_request("r1")).unwrap();
            for step in steps {
                let _ = match step {
                    Step::Accept(v) => lifecycle.accept(&amb(&format!("AMB-{v}")), 0).map(|_| ()),
                    Step::Assign(v) => lifecycle.apply_assignment(&amb(&format!("AMB-{v}"))),
                    Step::Reject => {
                        lifecycle.reject_accept("rejected");
                        Ok(())
                    }
                    Step::Expire => {
                        lifecycle.expire_accept();
                        Ok(())
                    }
                    Step::Remote(status, v) => {
                        let vehicle = v.map(|v| amb(&format!("AMB-{v}")));
                        lifecycle.apply_remote_status(status, vehicle.as_ref()).map(|_| ())
                    }
                    Step::Cancel => lifecycle.cancel().map(|_| ()),
                };
                prop_assert!(lifecycle.is_consistent(), "inconsistent after step: {:?}", lifecycle.request());
            }
        }
    }
}
