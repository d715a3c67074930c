use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::config::CoreConfig;
use crate::connection::ConnectionManager;
use crate::fleet::FleetRegistry;
use crate::geo::LatLon;
use crate::lifecycle::RequestBook;
use crate::location::LocationStreamer;
use crate::pending::PendingRequestRegistry;
use crate::presence::PresenceController;
use crate::{get_current_time_ms, AppError, ErrorKind, RESPONDER_USER_TYPE};

// --- Typed IDs ---

macro_rules! typed_id {
    ($name:ident) => {
        #[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

typed_id!(UserId);
typed_id!(VehicleId);
typed_id!(RequestId);

impl RequestId {
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

// --- Roles & presence ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Requester,
    Responder,
}

impl Role {
    /// Maps the profile's `user.userType` onto a client role.
    #[must_use]
    pub fn from_user_type(user_type: &str) -> Self {
        if user_type.eq_ignore_ascii_case(RESPONDER_USER_TYPE) {
            Self::Responder
        } else {
            Self::Requester
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Requester => "requester",
            Self::Responder => "responder",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    Online,
    #[default]
    Offline,
}

impl Presence {
    #[must_use]
    pub const fn toggled(self) -> Self {
        match self {
            Self::Online => Self::Offline,
            Self::Offline => Self::Online,
        }
    }

    #[must_use]
    pub const fn is_online(self) -> bool {
        matches!(self, Self::Online)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
        }
    }
}

// --- Fleet ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vehicle {
    pub vehicle_id: VehicleId,
    pub location: LatLon,
    pub presence: Presence,
}

// --- Emergency requests ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    #[default]
    Pending,
    Accepted,
    InProgress,
    Completed,
    Cancelled,
}

impl RequestStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Pending => "Waiting for an ambulance",
            Self::Accepted => "Ambulance assigned",
            Self::InProgress => "Ride in progress",
            Self::Completed => "Completed",
            Self::Cancelled => "Cancelled",
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Statuses in which a vehicle must be assigned.
    #[must_use]
    pub const fn requires_assignment(self) -> bool {
        matches!(self, Self::Accepted | Self::InProgress)
    }

    #[must_use]
    pub fn valid_transitions(self) -> &'static [Self] {
        match self {
            Self::Pending => &[Self::Accepted, Self::Cancelled],
            Self::Accepted => &[Self::InProgress, Self::Cancelled],
            Self::InProgress => &[Self::Completed],
            Self::Completed | Self::Cancelled => &[],
        }
    }

    #[must_use]
    pub fn can_transition_to(self, to: Self) -> bool {
        self.valid_transitions().contains(&to)
    }

    pub fn validate_transition(self, to: Self) -> Result<(), TransitionError> {
        if self == to {
            return Err(TransitionError::SameStatus(self));
        }
        if self.is_terminal() {
            return Err(TransitionError::FromTerminalStatus { status: self });
        }
        if !self.can_transition_to(to) {
            return Err(TransitionError::InvalidTransition { from: self, to });
        }
        Ok(())
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Request is already {0}")]
    SameStatus(RequestStatus),
    #[error("Cannot move a {status} request")]
    FromTerminalStatus { status: RequestStatus },
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition {
        from: RequestStatus,
        to: RequestStatus,
    },
}

impl From<TransitionError> for AppError {
    fn from(e: TransitionError) -> Self {
        AppError::new(ErrorKind::InvalidState, e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CriticalLevel {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl CriticalLevel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyRequest {
    #[serde(alias = "_id")]
    pub id: RequestId,
    #[serde(alias = "userId")]
    pub requester_id: UserId,
    pub location: LatLon,
    pub emergency_details: String,
    pub patient_count: u32,
    #[serde(default)]
    pub critical_level: CriticalLevel,
    #[serde(default)]
    pub status: RequestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_vehicle_id: Option<VehicleId>,
}

impl EmergencyRequest {
    /// True when `assigned_vehicle_id` is present exactly for the assigned statuses.
    #[must_use]
    pub fn assignment_is_consistent(&self) -> bool {
        self.status.requires_assignment() == self.assigned_vehicle_id.is_some()
    }

    #[must_use]
    pub fn is_assigned_to(&self, vehicle: &VehicleId) -> bool {
        self.assigned_vehicle_id.as_ref() == Some(vehicle)
    }
}

/// What the requester fills in before submitting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDraft {
    pub emergency_details: String,
    #[serde(default = "default_patient_count")]
    pub patient_count: u32,
    #[serde(default)]
    pub critical_level: CriticalLevel,
}

const fn default_patient_count() -> u32 {
    1
}

impl RequestDraft {
    pub fn new(emergency_details: impl Into<String>) -> Self {
        Self {
            emergency_details: emergency_details.into(),
            patient_count: default_patient_count(),
            critical_level: CriticalLevel::default(),
        }
    }

    #[must_use]
    pub fn with_patient_count(mut self, patient_count: u32) -> Self {
        self.patient_count = patient_count;
        self
    }

    #[must_use]
    pub fn with_critical_level(mut self, critical_level: CriticalLevel) -> Self {
        self.critical_level = critical_level;
        self
    }
}

// --- UI state ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PermissionState {
    #[default]
    Unknown,
    Granted,
    Denied,
}

impl PermissionState {
    #[must_use]
    pub const fn is_denied(self) -> bool {
        matches!(self, Self::Denied)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToastMessage {
    pub message: String,
    pub kind: ToastKind,
    pub created_at_ms: u64,
    pub duration_ms: u64,
}

impl ToastMessage {
    #[must_use]
    pub fn new(message: impl Into<String>, kind: ToastKind) -> Self {
        Self {
            message: message.into(),
            kind,
            created_at_ms: get_current_time_ms(),
            duration_ms: kind.default_duration_ms(),
        }
    }

    #[must_use]
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.created_at_ms) > self.duration_ms
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ToastKind {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

impl ToastKind {
    #[must_use]
    pub const fn default_duration_ms(self) -> u64 {
        match self {
            Self::Info => 3000,
            Self::Success => 2000,
            Self::Warning => 4000,
            Self::Error => 5000,
        }
    }
}

/// Identity delivered by the profile collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Identity {
    pub user_id: Option<UserId>,
    pub profile_role: Option<Role>,
    pub vehicle_id: Option<VehicleId>,
}

#[derive(Debug, Default)]
pub struct Model {
    pub config: CoreConfig,
    pub identity: Identity,
    pub mounted_role: Option<Role>,
    pub session_expired: bool,

    pub connection: ConnectionManager,
    pub presence: PresenceController,
    pub location: LocationStreamer,
    pub fleet: FleetRegistry,
    pub pending: PendingRequestRegistry,
    pub requests: RequestBook,

    pub device_location: Option<LatLon>,
    pub location_permission: PermissionState,

    pub active_error: Option<AppError>,
    pub active_toast: Option<ToastMessage>,
    pub now_ms: u64,
}

impl Model {
    pub fn update_timestamp(&mut self) {
        self.now_ms = get_current_time_ms();
    }

    pub fn set_error(&mut self, error: AppError) {
        self.active_error = Some(error);
    }

    pub fn clear_error(&mut self) {
        self.active_error = None;
    }

    pub fn show_toast(&mut self, message: impl Into<String>, kind: ToastKind) {
        self.active_toast = Some(ToastMessage::new(message, kind));
    }

    pub fn clear_toast(&mut self) {
        self.active_toast = None;
    }

    #[must_use]
    pub fn is_responder(&self) -> bool {
        self.mounted_role == Some(Role::Responder)
    }

    #[must_use]
    pub fn is_requester(&self) -> bool {
        self.mounted_role == Some(Role::Requester)
    }

    /// The role the profile says this user should be on, when it differs from the mounted one.
    #[must_use]
    pub fn redirect_to(&self) -> Option<Role> {
        match (self.mounted_role, self.identity.profile_role) {
            (Some(mounted), Some(profile)) if mounted != profile => Some(profile),
            _ => None,
        }
    }
}
