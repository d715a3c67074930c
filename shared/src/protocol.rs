//! Channel wire contract: event names and payload shapes.
//!
//! Outbound messages are built from typed values; inbound frames are decoded
//! into [`Inbound`] before any component sees them.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::geo::LatLon;
use crate::model::{
    CriticalLevel, EmergencyRequest, Presence, RequestId, RequestStatus, UserId, VehicleId,
};
use crate::{AppError, ErrorKind};

/// A single named message on the channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default)]
    pub payload: Value,
}

impl Frame {
    pub fn new(event: impl Into<String>, payload: Value) -> Self {
        Self {
            event: event.into(),
            payload,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProtocolError {
    #[error("unknown inbound event '{0}'")]
    UnknownEvent(String),
    #[error("malformed payload for '{event}': {reason}")]
    MalformedPayload { event: String, reason: String },
}

impl From<ProtocolError> for AppError {
    fn from(e: ProtocolError) -> Self {
        let event = match &e {
            ProtocolError::UnknownEvent(event) | ProtocolError::MalformedPayload { event, .. } => {
                event.clone()
            }
        };
        AppError::new(ErrorKind::Protocol, e.to_string()).with_context("event", event)
    }
}

// --- Outbound ---

#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    UpdateStatus {
        vehicle_id: VehicleId,
        status: Presence,
    },
    LocationUpdate {
        vehicle_id: VehicleId,
        position: LatLon,
    },
    EmergencyRequest {
        user_id: UserId,
        location: LatLon,
        emergency_details: String,
        patient_count: u32,
        critical_level: CriticalLevel,
    },
    AcceptRequest {
        request_id: RequestId,
        vehicle_id: VehicleId,
    },
    UpdateRequestStatus {
        request_id: RequestId,
        status: RequestStatus,
    },
    GetPendingRequests,
}

impl Outbound {
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::UpdateStatus { .. } => "update-status",
            Self::LocationUpdate { .. } => "location-update",
            Self::EmergencyRequest { .. } => "emergency-request",
            Self::AcceptRequest { .. } => "accept-request",
            Self::UpdateRequestStatus { .. } => "update-request-status",
            Self::GetPendingRequests => "get-pending-requests",
        }
    }

    #[must_use]
    pub fn payload(&self) -> Value {
        match self {
            Self::UpdateStatus { vehicle_id, status } => json!({
                "vehicleId": vehicle_id,
                "status": status,
            }),
            Self::LocationUpdate {
                vehicle_id,
                position,
            } => json!({
                "vehicleId": vehicle_id,
                "latitude": position.latitude,
                "longitude": position.longitude,
            }),
            Self::EmergencyRequest {
                user_id,
                location,
                emergency_details,
                patient_count,
                critical_level,
            } => json!({
                "userId": user_id,
                "location": location,
                "emergencyDetails": emergency_details,
                "patientCount": patient_count,
                "criticalLevel": critical_level,
            }),
            Self::AcceptRequest {
                request_id,
                vehicle_id,
            } => json!({
                "requestId": request_id,
                "vehicleId": vehicle_id,
            }),
            Self::UpdateRequestStatus { request_id, status } => json!({
                "requestId": request_id,
                "status": status,
            }),
            Self::GetPendingRequests => json!({}),
        }
    }

    #[must_use]
    pub fn to_frame(&self) -> Frame {
        Frame::new(self.event_name(), self.payload())
    }
}

// --- Inbound ---

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveVehicle {
    pub vehicle_id: VehicleId,
    pub current_location: LatLon,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehiclePosition {
    pub vehicle_id: VehicleId,
    pub latitude: f64,
    pub longitude: f64,
}

impl VehiclePosition {
    #[must_use]
    pub const fn position(&self) -> LatLon {
        LatLon::new(self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleRef {
    pub vehicle_id: VehicleId,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestAccepted {
    pub ambulance_id: VehicleId,
    #[serde(default)]
    pub estimated_time: Option<Value>,
    #[serde(default)]
    pub request_id: Option<RequestId>,
}

impl RequestAccepted {
    /// ETA as display text; servers send either minutes or a preformatted string.
    #[must_use]
    pub fn eta_text(&self) -> Option<String> {
        match self.estimated_time.as_ref()? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(format!("{n} min")),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RequestErrorPayload {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSignal {
    #[serde(default)]
    pub request_id: Option<RequestId>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub request_id: RequestId,
    pub status: RequestStatus,
    #[serde(default)]
    pub vehicle_id: Option<VehicleId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    PendingRequests(Vec<EmergencyRequest>),
    NewEmergencyRequest(EmergencyRequest),
    ActiveAmbulances(Vec<ActiveVehicle>),
    AmbulanceLocation(VehiclePosition),
    RemoveAmbulance(VehicleRef),
    RequestAccepted(RequestAccepted),
    RequestError(RequestErrorPayload),
    AcceptedProgress(ProgressSignal),
    AcceptedProgressDisable(ProgressSignal),
    RequestStatusUpdated(StatusUpdate),
}

/// Inbound event names, used as subscription keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum InboundKind {
    PendingRequests,
    NewEmergencyRequest,
    ActiveAmbulances,
    AmbulanceLocation,
    RemoveAmbulance,
    RequestAccepted,
    RequestError,
    AcceptedProgress,
    AcceptedProgressDisable,
    RequestStatusUpdated,
}

impl InboundKind {
    pub const ALL: [Self; 10] = [
        Self::PendingRequests,
        Self::NewEmergencyRequest,
        Self::ActiveAmbulances,
        Self::AmbulanceLocation,
        Self::RemoveAmbulance,
        Self::RequestAccepted,
        Self::RequestError,
        Self::AcceptedProgress,
        Self::AcceptedProgressDisable,
        Self::RequestStatusUpdated,
    ];

    #[must_use]
    pub const fn event_name(self) -> &'static str {
        match self {
            Self::PendingRequests => "pending-requests",
            Self::NewEmergencyRequest => "new-emergency-request",
            Self::ActiveAmbulances => "active-ambulances",
            Self::AmbulanceLocation => "ambulance-location",
            Self::RemoveAmbulance => "remove-ambulance",
            Self::RequestAccepted => "request-accepted",
            Self::RequestError => "request-error",
            Self::AcceptedProgress => "accepted-progress",
            Self::AcceptedProgressDisable => "accepted-progress-disable",
            Self::RequestStatusUpdated => "request-status-updated",
        }
    }

    #[must_use]
    pub fn from_event_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.event_name() == name)
    }
}

impl Inbound {
    /// Decodes a frame received from the server.
    pub fn decode(frame: &Frame) -> Result<Self, ProtocolError> {
        let kind = InboundKind::from_event_name(&frame.event)
            .ok_or_else(|| ProtocolError::UnknownEvent(frame.event.clone()))?;
        let payload = &frame.payload;

        Ok(match kind {
            InboundKind::PendingRequests => Self::PendingRequests(parse(kind, payload)?),
            InboundKind::NewEmergencyRequest => Self::NewEmergencyRequest(parse(kind, payload)?),
            InboundKind::ActiveAmbulances => Self::ActiveAmbulances(parse(kind, payload)?),
            InboundKind::AmbulanceLocation => Self::AmbulanceLocation(parse(kind, payload)?),
            InboundKind::RemoveAmbulance => Self::RemoveAmbulance(parse(kind, payload)?),
            InboundKind::RequestAccepted => Self::RequestAccepted(parse(kind, payload)?),
            InboundKind::RequestError => Self::RequestError(parse(kind, payload)?),
            InboundKind::AcceptedProgress => Self::AcceptedProgress(parse_signal(kind, payload)?),
            InboundKind::AcceptedProgressDisable => {
                Self::AcceptedProgressDisable(parse_signal(kind, payload)?)
            }
            InboundKind::RequestStatusUpdated => Self::RequestStatusUpdated(parse(kind, payload)?),
        })
    }

    #[must_use]
    pub const fn kind(&self) -> InboundKind {
        match self {
            Self::PendingRequests(_) => InboundKind::PendingRequests,
            Self::NewEmergencyRequest(_) => InboundKind::NewEmergencyRequest,
            Self::ActiveAmbulances(_) => InboundKind::ActiveAmbulances,
            Self::AmbulanceLocation(_) => InboundKind::AmbulanceLocation,
            Self::RemoveAmbulance(_) => InboundKind::RemoveAmbulance,
            Self::RequestAccepted(_) => InboundKind::RequestAccepted,
            Self::RequestError(_) => InboundKind::RequestError,
            Self::AcceptedProgress(_) => InboundKind::AcceptedProgress,
            Self::AcceptedProgressDisable(_) => InboundKind::AcceptedProgressDisable,
            Self::RequestStatusUpdated(_) => InboundKind::RequestStatusUpdated,
        }
    }
}

fn parse<T: DeserializeOwned>(kind: InboundKind, payload: &Value) -> Result<T, ProtocolError> {
    T::deserialize(payload).map_err(|e| ProtocolError::MalformedPayload {
        event: kind.event_name().to_string(),
        reason: e.to_string(),
    })
}

// Progress signals are sent with an empty payload, sometimes with none at all.
fn parse_signal(kind: InboundKind, payload: &Value) -> Result<ProgressSignal, ProtocolError> {
    if payload.is_null() {
        return Ok(ProgressSignal::default());
    }
    parse(kind, payload)
}
