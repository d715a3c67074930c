//! Channel session ownership and reconnection.
//!
//! One session per mounted role. Every frame and lifecycle notification
//! carries the session id it was opened under; anything from another session
//! is stale and ignored.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::CoreConfig;
use crate::model::Role;
use crate::protocol::{Frame, InboundKind, Outbound};
use crate::{calculate_retry_delay, AppError, ErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionToken(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting {
        attempt: u32,
    },
    Connected,
    Failed,
    Closed,
}

impl ConnectionState {
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub url: String,
    pub max_attempts: u32,
    pub attempt_timeout_ms: u64,
}

impl From<&CoreConfig> for ReconnectPolicy {
    fn from(config: &CoreConfig) -> Self {
        Self {
            url: config.channel_url.clone(),
            max_attempts: config.reconnect_attempts,
            attempt_timeout_ms: config.attempt_timeout_ms,
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from(&CoreConfig::default())
    }
}

/// What the shell needs to dial one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialRequest {
    pub session: SessionId,
    pub role: Role,
    pub url: String,
    pub attempt: u32,
    pub timeout_ms: u64,
    pub delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenOutcome {
    /// A session for this role is already open.
    Existing(SessionId),
    Dial(DialRequest),
}

#[derive(Debug, Clone, PartialEq)]
pub enum DropOutcome {
    Retry(DialRequest),
    Exhausted(AppError),
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Session {
    id: SessionId,
    role: Role,
}

#[derive(Debug, Default)]
pub struct ConnectionManager {
    policy: ReconnectPolicy,
    session: Option<Session>,
    state: ConnectionState,
    next_session: u64,
    listeners: BTreeMap<SubscriptionToken, InboundKind>,
    next_token: u64,
}

impl ConnectionManager {
    #[must_use]
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn set_policy(&mut self, policy: ReconnectPolicy) {
        self.policy = policy;
    }

    #[must_use]
    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    #[must_use]
    pub fn session(&self) -> Option<SessionId> {
        self.session.map(|s| s.id)
    }

    #[must_use]
    pub fn role(&self) -> Option<Role> {
        self.session.map(|s| s.role)
    }

    /// Opens the channel for `role`. Re-opening for the same role returns the existing session.
    pub fn open(&mut self, role: Role) -> Result<OpenOutcome, AppError> {
        if let Some(session) = self.session {
            if session.role == role {
                debug!(session = session.id.0, "channel already open");
                return Ok(OpenOutcome::Existing(session.id));
            }
            return Err(AppError::new(
                ErrorKind::InvalidState,
                format!(
                    "A {} channel is already open",
                    session.role.as_str()
                ),
            ));
        }

        self.next_session += 1;
        let session = Session {
            id: SessionId(self.next_session),
            role,
        };
        self.session = Some(session);
        self.state = ConnectionState::Connecting { attempt: 1 };
        info!(session = session.id.0, role = role.as_str(), url = %self.policy.url, "opening channel");

        Ok(OpenOutcome::Dial(self.dial(session, 1, 0)))
    }

    /// Registers the listeners a role needs on the current session.
    pub fn subscribe(&mut self, kind: InboundKind) -> Result<SubscriptionToken, AppError> {
        if self.session.is_none() {
            return Err(AppError::new(
                ErrorKind::InvalidState,
                "Cannot subscribe without an open channel",
            ));
        }
        self.next_token += 1;
        let token = SubscriptionToken(self.next_token);
        self.listeners.insert(token, kind);
        Ok(token)
    }

    #[must_use]
    pub fn is_listening(&self, kind: InboundKind) -> bool {
        self.listeners.values().any(|k| *k == kind)
    }

    /// True when `session` is the live session and its frames may be delivered.
    #[must_use]
    pub fn accepts(&self, session: SessionId) -> bool {
        self.session.is_some_and(|s| s.id == session)
    }

    /// Returns `false` for a stale session.
    pub fn on_opened(&mut self, session: SessionId) -> bool {
        if !self.accepts(session) {
            debug!(session = session.0, "ignoring open from stale session");
            return false;
        }
        self.state = ConnectionState::Connected;
        info!(session = session.0, "channel connected");
        true
    }

    /// An attempt timed out or an established channel dropped.
    pub fn on_dropped(&mut self, session: SessionId, reason: &str, jitter_ms: u64) -> DropOutcome {
        let Some(current) = self.session.filter(|s| s.id == session) else {
            return DropOutcome::Stale;
        };

        let attempt = match self.state {
            ConnectionState::Connecting { attempt } => attempt + 1,
            ConnectionState::Connected | ConnectionState::Idle => 1,
            ConnectionState::Failed | ConnectionState::Closed => return DropOutcome::Stale,
        };

        if attempt > self.policy.max_attempts {
            self.state = ConnectionState::Failed;
            warn!(session = session.0, reason, "reconnect attempts exhausted");
            return DropOutcome::Exhausted(
                AppError::connectivity("Unable to reach the dispatch server")
                    .with_internal(reason.to_string())
                    .with_context("attempts", self.policy.max_attempts.to_string()),
            );
        }

        self.state = ConnectionState::Connecting { attempt };
        let delay_ms = calculate_retry_delay(attempt - 1, jitter_ms);
        warn!(session = session.0, reason, attempt, delay_ms, "channel dropped; retrying");
        DropOutcome::Retry(self.dial(current, attempt, delay_ms))
    }

    /// Restarts dialling after attempts were exhausted.
    pub fn reconnect(&mut self) -> Option<DialRequest> {
        let session = self.session?;
        if self.state != ConnectionState::Failed {
            return None;
        }
        self.state = ConnectionState::Connecting { attempt: 1 };
        info!(session = session.id.0, "manual reconnect");
        Some(self.dial(session, 1, 0))
    }

    /// Tears down the session and detaches every listener registered under it.
    pub fn close(&mut self) -> Option<SessionId> {
        let session = self.session.take()?;
        let detached = self.listeners.len();
        self.listeners.clear();
        self.state = ConnectionState::Closed;
        info!(session = session.id.0, detached, "channel closed");
        Some(session.id)
    }

    pub fn ensure_connected(&self) -> Result<SessionId, AppError> {
        match (self.session, self.state) {
            (Some(session), ConnectionState::Connected) => Ok(session.id),
            (_, state) => Err(AppError::connectivity("Channel is not connected")
                .with_context("state", format!("{state:?}"))),
        }
    }

    /// Prepares an outbound message for the live session.
    pub fn emit(&self, message: &Outbound) -> Result<(SessionId, Frame), AppError> {
        let session = self.ensure_connected()?;
        debug!(session = session.0, event = message.event_name(), "emit");
        Ok((session, message.to_frame()))
    }

    fn dial(&self, session: Session, attempt: u32, delay_ms: u64) -> DialRequest {
        DialRequest {
            session: session.id,
            role: session.role,
            url: self.policy.url.clone(),
            attempt,
            timeout_ms: self.policy.attempt_timeout_ms,
            delay_ms,
        }
    }
}

/// Inbound events each role listens for.
#[must_use]
pub fn listeners_for(role: Role) -> &'static [InboundKind] {
    match role {
        Role::Requester => &[
            InboundKind::ActiveAmbulances,
            InboundKind::AmbulanceLocation,
            InboundKind::RemoveAmbulance,
            InboundKind::RequestAccepted,
            InboundKind::RequestError,
            InboundKind::AcceptedProgress,
            InboundKind::AcceptedProgressDisable,
            InboundKind::RequestStatusUpdated,
        ],
        Role::Responder => &[
            InboundKind::PendingRequests,
            InboundKind::NewEmergencyRequest,
            InboundKind::RequestAccepted,
            InboundKind::RequestError,
            InboundKind::AcceptedProgress,
            InboundKind::AcceptedProgressDisable,
            InboundKind::RequestStatusUpdated,
        ],
    }
}
