use serde::{Deserialize, Serialize};

use crate::connection::ConnectionState;
use crate::geo::{format_distance_km, LatLon};
use crate::lifecycle::RequestLifecycle;
use crate::model::{
    CriticalLevel, EmergencyRequest, Model, PermissionState, Presence, RequestStatus, Role,
    ToastKind, ToastMessage, Vehicle,
};
use crate::{AppError, ErrorSeverity, MAP_LATITUDE_DELTA, MAP_LONGITUDE_DELTA};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct UserFacingError {
    pub message: String,
    pub is_transient: bool,
    pub is_retryable: bool,
    pub error_code: String,
}

impl From<&AppError> for UserFacingError {
    fn from(e: &AppError) -> Self {
        Self {
            message: e.user_facing_message(),
            is_transient: e.severity == ErrorSeverity::Transient,
            is_retryable: e.is_retryable(),
            error_code: e.code().to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToastView {
    pub message: String,
    pub kind: ToastKind,
    pub duration_ms: u64,
}

impl From<&ToastMessage> for ToastView {
    fn from(t: &ToastMessage) -> Self {
        Self {
            message: t.message.clone(),
            kind: t.kind,
            duration_ms: t.duration_ms,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ConnectionView {
    pub state: ConnectionState,
    pub is_connected: bool,
    pub can_reconnect: bool,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct MapRegion {
    pub latitude: f64,
    pub longitude: f64,
    pub latitude_delta: f64,
    pub longitude_delta: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct VehicleMarker {
    pub vehicle_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub presence: Presence,
}

impl From<&Vehicle> for VehicleMarker {
    fn from(v: &Vehicle) -> Self {
        Self {
            vehicle_id: v.vehicle_id.to_string(),
            latitude: v.location.latitude,
            longitude: v.location.longitude,
            presence: v.presence,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MapView {
    /// Absent until the first position fix.
    pub region: Option<MapRegion>,
    pub device: Option<LatLon>,
    pub vehicles: Vec<VehicleMarker>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PendingRequestCard {
    pub request_id: String,
    pub emergency_details: String,
    pub patient_count: u32,
    pub critical_level: CriticalLevel,
    pub latitude: f64,
    pub longitude: f64,
    pub distance_km: Option<f64>,
    pub distance_text: String,
    pub can_accept: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ActiveRequestPanel {
    pub request_id: String,
    pub status: RequestStatus,
    pub status_text: String,
    pub assigned_vehicle_id: Option<String>,
    pub eta: Option<String>,
    pub is_confirming: bool,
    pub can_cancel: bool,
    pub can_dismiss: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ViewModel {
    pub role: Option<Role>,
    pub redirect_to: Option<Role>,
    pub requires_login: bool,
    pub connection: ConnectionView,
    pub presence: Presence,
    pub can_toggle_presence: bool,
    pub location_permission: PermissionState,
    pub map: MapView,
    pub pending_requests: Vec<PendingRequestCard>,
    pub active_request: Option<ActiveRequestPanel>,
    pub can_submit: bool,
    pub error: Option<UserFacingError>,
    pub toast: Option<ToastView>,
}

impl ViewModel {
    #[must_use]
    pub fn build(model: &Model) -> Self {
        let state = model.connection.state();

        Self {
            role: model.mounted_role,
            redirect_to: model.redirect_to(),
            requires_login: model.session_expired,
            connection: ConnectionView {
                state,
                is_connected: state.is_connected(),
                can_reconnect: state == ConnectionState::Failed,
            },
            presence: model.presence.presence(),
            can_toggle_presence: model.is_responder() && model.identity.vehicle_id.is_some(),
            location_permission: model.location_permission,
            map: Self::build_map(model),
            pending_requests: Self::build_pending_cards(model),
            active_request: model.requests.active().map(Self::build_active_panel),
            can_submit: model.is_requester()
                && state.is_connected()
                && model.device_location.is_some()
                && !model.requests.has_open_active(),
            error: model.active_error.as_ref().map(UserFacingError::from),
            toast: model.active_toast.as_ref().map(ToastView::from),
        }
    }

    fn build_map(model: &Model) -> MapView {
        MapView {
            region: model.device_location.map(|center| MapRegion {
                latitude: center.latitude,
                longitude: center.longitude,
                latitude_delta: MAP_LATITUDE_DELTA,
                longitude_delta: MAP_LONGITUDE_DELTA,
            }),
            device: model.device_location,
            vehicles: model.fleet.snapshot().iter().map(VehicleMarker::from).collect(),
        }
    }

    fn build_pending_cards(model: &Model) -> Vec<PendingRequestCard> {
        if !model.is_responder() || !model.presence.is_online() {
            return Vec::new();
        }

        // Engaged vehicles and in-flight accepts both disable every card.
        let busy = match &model.identity.vehicle_id {
            Some(vehicle) => model.requests.engagement_of(vehicle).is_some(),
            None => true,
        };
        let connected = model.connection.state().is_connected();

        model
            .pending
            .snapshot()
            .into_iter()
            .map(|request| Self::build_card(request, model.device_location, !busy && connected))
            .collect()
    }

    fn build_card(
        request: EmergencyRequest,
        device: Option<LatLon>,
        can_accept: bool,
    ) -> PendingRequestCard {
        let distance_km = device.map(|device| device.distance_km(request.location));
        PendingRequestCard {
            request_id: request.id.to_string(),
            distance_text: distance_km.map_or_else(|| "Unknown".to_string(), format_distance_km),
            distance_km,
            latitude: request.location.latitude,
            longitude: request.location.longitude,
            emergency_details: request.emergency_details,
            patient_count: request.patient_count,
            critical_level: request.critical_level,
            can_accept: can_accept && request.status == RequestStatus::Pending,
        }
    }

    fn build_active_panel(lifecycle: &RequestLifecycle) -> ActiveRequestPanel {
        let status = lifecycle.status();
        ActiveRequestPanel {
            request_id: lifecycle.id().to_string(),
            status,
            status_text: status.display_name().to_string(),
            assigned_vehicle_id: lifecycle.assigned_vehicle_id().map(ToString::to_string),
            eta: lifecycle.eta().map(str::to_string),
            is_confirming: lifecycle.pending_accept().is_some() || lifecycle.is_awaiting_server(),
            can_cancel: status.can_transition_to(RequestStatus::Cancelled)
                && lifecycle.pending_accept().is_none(),
            can_dismiss: lifecycle.is_terminal(),
        }
    }
}
