use serde::{Deserialize, Serialize};

use crate::capabilities::{ChannelOutput, LocationOutput, StoreResult};
use crate::connection::SessionId;
use crate::location::WatchId;
use crate::model::{RequestDraft, RequestId, Role};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum Event {
    // Shell lifecycle
    Configure {
        json: String,
    },
    ProfileLoaded {
        user_id: String,
        user_type: String,
        vehicle_id: Option<String>,
    },
    SessionExpired,
    Mount {
        role: Role,
    },
    Unmount,
    Tick {
        now_ms: u64,
    },

    // User actions
    TogglePresence,
    Reconnect,
    SubmitEmergency(RequestDraft),
    AcceptRequest {
        request_id: RequestId,
    },
    CancelRequest,
    DismissRequest {
        request_id: RequestId,
    },
    RefreshPendingRequests,
    DismissError,
    DismissToast,

    // Capability responses
    #[serde(skip)]
    ChannelUpdate {
        session: SessionId,
        output: ChannelOutput,
    },
    #[serde(skip)]
    LocationSample {
        watch: WatchId,
        output: LocationOutput,
    },
    #[serde(skip)]
    PositionFixed(LocationOutput),
    #[serde(skip)]
    PresenceRestored(Box<StoreResult>),
    #[serde(skip)]
    PresencePersisted(Box<StoreResult>),
}

impl Event {
    /// Stable name for logs. Never includes payload data.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Configure { .. } => "configure",
            Self::ProfileLoaded { .. } => "profile_loaded",
            Self::SessionExpired => "session_expired",
            Self::Mount { .. } => "mount",
            Self::Unmount => "unmount",
            Self::Tick { .. } => "tick",
            Self::TogglePresence => "toggle_presence",
            Self::Reconnect => "reconnect",
            Self::SubmitEmergency(_) => "submit_emergency",
            Self::AcceptRequest { .. } => "accept_request",
            Self::CancelRequest => "cancel_request",
            Self::DismissRequest { .. } => "dismiss_request",
            Self::RefreshPendingRequests => "refresh_pending_requests",
            Self::DismissError => "dismiss_error",
            Self::DismissToast => "dismiss_toast",
            Self::ChannelUpdate { .. } => "channel_update",
            Self::LocationSample { .. } => "location_sample",
            Self::PositionFixed(_) => "position_fixed",
            Self::PresenceRestored(_) => "presence_restored",
            Self::PresencePersisted(_) => "presence_persisted",
        }
    }
}
