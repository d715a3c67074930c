use tracing::{debug, info, instrument, warn};

use crate::capabilities::{
    Capabilities, ChannelOutput, KeyNamespace, LocationOutput, StoreResult, TypedStore,
};
use crate::config::CoreConfig;
use crate::connection::{listeners_for, DialRequest, DropOutcome, OpenOutcome, SessionId};
use crate::event::Event;
use crate::fleet::FleetRegistry;
use crate::lifecycle::{RequestBook, RequestLifecycle, StatusChange};
use crate::location::WatchId;
use crate::model::{
    Identity, Model, PermissionState, Presence, RequestDraft, RequestId, RequestStatus, Role,
    ToastKind, UserId, VehicleId,
};
use crate::presence::PresenceChange;
use crate::protocol::{Frame, Inbound, Outbound, ProgressSignal, RequestAccepted, StatusUpdate};
use crate::view::ViewModel;
use crate::{generate_jitter, AppError, ErrorKind, ACCEPT_TIMEOUT, PRESENCE_STORE_KEY};

#[derive(Default)]
pub struct App;

impl App {
    fn surface(model: &mut Model, error: AppError) {
        warn!(code = error.code(), error = %error, "surfacing error");
        model.set_error(error);
    }

    fn clear_connectivity_error(model: &mut Model) {
        if model
            .active_error
            .as_ref()
            .is_some_and(|e| e.kind == ErrorKind::Connectivity)
        {
            model.clear_error();
        }
    }

    fn presence_store() -> TypedStore<Presence> {
        TypedStore::new(KeyNamespace::Settings)
    }

    fn emit(message: &Outbound, model: &Model, caps: &Capabilities) -> Result<(), AppError> {
        let (session, frame) = model.connection.emit(message)?;
        caps.channel.emit(session, frame);
        Ok(())
    }

    fn dial(dial: DialRequest, caps: &Capabilities) {
        caps.channel
            .open(dial, |session, output| Event::ChannelUpdate { session, output });
    }

    // --- Shell lifecycle ---

    fn configure(json: &str, model: &mut Model) {
        match CoreConfig::from_json(json) {
            Ok(config) => {
                model.connection.set_policy((&config).into());
                model.location.set_policy(config.sampling_policy());
                info!(channel_url = %config.channel_url, "configuration applied");
                model.config = config;
            }
            Err(e) => Self::surface(model, e.into()),
        }
    }

    fn profile_loaded(
        user_id: &str,
        user_type: &str,
        vehicle_id: Option<String>,
        model: &mut Model,
        caps: &Capabilities,
    ) {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            Self::surface(
                model,
                AppError::new(ErrorKind::Protocol, "Profile is missing a user id"),
            );
            return;
        }

        let role = Role::from_user_type(user_type);
        model.identity = Identity {
            user_id: Some(UserId::new(user_id)),
            profile_role: Some(role),
            vehicle_id: vehicle_id
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .map(VehicleId::new),
        };
        model.session_expired = false;
        info!(
            role = role.as_str(),
            has_vehicle = model.identity.vehicle_id.is_some(),
            "profile loaded"
        );

        Self::announce_presence(model, caps);
    }

    fn mount(role: Role, model: &mut Model, caps: &Capabilities) {
        if model.connection.role().is_some_and(|open| open != role) {
            Self::teardown(model, caps);
        }

        let dial = match model.connection.open(role) {
            Ok(OpenOutcome::Dial(dial)) => dial,
            Ok(OpenOutcome::Existing(session)) => {
                debug!(session = session.0, "already mounted");
                return;
            }
            Err(e) => {
                Self::surface(model, e);
                return;
            }
        };
        model.mounted_role = Some(role);

        for kind in listeners_for(role) {
            match model.connection.subscribe(*kind) {
                Ok(token) => debug!(token = token.0, event = kind.event_name(), "listening"),
                Err(e) => warn!(error = %e, event = kind.event_name(), "listener not registered"),
            }
        }

        Self::dial(dial, caps);
        caps.location.current_position(Event::PositionFixed);

        if role == Role::Responder {
            match Self::presence_store().key(PRESENCE_STORE_KEY) {
                Ok(key) => caps
                    .store
                    .get(&key, |result| Event::PresenceRestored(Box::new(result))),
                Err(e) => Self::surface(model, e.into()),
            }
        }
    }

    /// Releases everything owned by the current mount.
    fn teardown(model: &mut Model, caps: &Capabilities) {
        if let Some(watch) = model.location.stop() {
            caps.location.stop_watch(watch);
        }
        if let Some(session) = model.connection.close() {
            caps.channel.close(session);
        }
        model.location.reset();
        model.presence.reset();
        model.fleet = FleetRegistry::default();
        model.pending.clear();
        model.mounted_role = None;
    }

    fn session_expired(model: &mut Model, caps: &Capabilities) {
        info!("session expired; tearing down");
        if model.identity.profile_role == Some(Role::Responder) {
            // The next driver on this device starts offline.
            match Self::presence_store().key(PRESENCE_STORE_KEY) {
                Ok(key) => caps
                    .store
                    .delete(&key, |result| Event::PresencePersisted(Box::new(result))),
                Err(e) => warn!(error = %e, "saved presence not cleared"),
            }
        }
        Self::teardown(model, caps);
        model.identity = Identity::default();
        model.requests = RequestBook::default();
        model.clear_error();
        model.clear_toast();
        model.session_expired = true;
    }

    fn tick(now_ms: u64, model: &mut Model) {
        let timeout_ms = u64::try_from(ACCEPT_TIMEOUT.as_millis()).unwrap_or(u64::MAX);
        for id in model.requests.expired_accepts(now_ms, timeout_ms) {
            let error = model
                .requests
                .get_mut(&id)
                .and_then(RequestLifecycle::expire_accept);
            model.requests.remove(&id);
            if let Some(error) = error {
                warn!(request_id = %id, "accept was never confirmed");
                model.set_error(error);
            }
        }

        if model
            .active_toast
            .as_ref()
            .is_some_and(|toast| toast.is_expired(now_ms))
        {
            model.clear_toast();
        }
    }

    // --- Presence and location ---

    fn toggle_presence(model: &mut Model, caps: &Capabilities) {
        if !model.is_responder() {
            Self::surface(
                model,
                AppError::new(ErrorKind::InvalidState, "Only responders can go online"),
            );
            return;
        }
        let vehicle = model.identity.vehicle_id.clone();
        match model.presence.toggle(vehicle.as_ref()) {
            Ok(change) => Self::apply_presence_change(&change, model, caps),
            Err(e) => Self::surface(model, e),
        }
    }

    fn apply_presence_change(change: &PresenceChange, model: &mut Model, caps: &Capabilities) {
        Self::persist_presence(change.current, model, caps);

        if change.went_online() {
            Self::start_streaming(model, caps);
        } else if change.went_offline() {
            if let Some(watch) = model.location.stop() {
                caps.location.stop_watch(watch);
            }
            model.pending.clear();
        }

        if let Err(e) = Self::emit(&change.announce, model, caps) {
            warn!(error = %e, "presence change not announced");
            Self::surface(
                model,
                AppError::connectivity("Presence change not announced")
                    .with_context("presence", change.current.as_str())
                    .with_internal(e.to_string()),
            );
            return;
        }
        model.presence.mark_announced();
        if change.went_online() {
            if let Err(e) = Self::emit(&Outbound::GetPendingRequests, model, caps) {
                warn!(error = %e, "could not request pending list");
            }
        }
    }

    fn persist_presence(presence: Presence, model: &mut Model, caps: &Capabilities) {
        let store = Self::presence_store();
        let prepared = store
            .key(PRESENCE_STORE_KEY)
            .and_then(|key| store.encode(&presence).map(|bytes| (key, bytes)));
        match prepared {
            Ok((key, bytes)) => caps
                .store
                .set(&key, bytes, |result| Event::PresencePersisted(Box::new(result))),
            Err(e) => Self::surface(model, e.into()),
        }
    }

    fn start_streaming(model: &mut Model, caps: &Capabilities) {
        if let Some(watch) = model.location.start() {
            caps.location.watch(watch, model.location.policy(), |watch, output| {
                Event::LocationSample { watch, output }
            });
        }
    }

    /// Tells the server where this responder stands, after connecting or restoring.
    /// Offline is only sent when a change never reached the server.
    fn announce_presence(model: &mut Model, caps: &Capabilities) {
        if !model.is_responder()
            || !model.presence.needs_announcement()
            || !model.connection.state().is_connected()
        {
            return;
        }
        let Some(vehicle) = model.identity.vehicle_id.as_ref() else {
            return;
        };
        let announcement = model.presence.announcement(vehicle);
        if let Err(e) = Self::emit(&announcement, model, caps) {
            warn!(error = %e, "announce failed");
            return;
        }
        model.presence.mark_announced();
        if !model.presence.is_online() {
            return;
        }
        if let Err(e) = Self::emit(&Outbound::GetPendingRequests, model, caps) {
            warn!(error = %e, "could not request pending list");
        }
    }

    fn presence_restored(result: StoreResult, model: &mut Model, caps: &Capabilities) {
        if !model.is_responder() {
            return;
        }
        let presence = match result.and_then(|output| Self::presence_store().parse_value(output)) {
            Ok(value) => value.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "could not read saved presence");
                Presence::Offline
            }
        };
        if !model.presence.restore(presence) {
            return;
        }
        if presence.is_online() {
            Self::start_streaming(model, caps);
            Self::announce_presence(model, caps);
        }
    }

    fn presence_persisted(result: StoreResult, model: &mut Model) {
        match result {
            Ok(output) => debug!(?output, "presence store updated"),
            Err(e) => Self::surface(model, e.into()),
        }
    }

    fn location_sample(
        watch: WatchId,
        output: LocationOutput,
        model: &mut Model,
        caps: &Capabilities,
    ) {
        if model.location.active_watch() != Some(watch) {
            debug!(watch = watch.0, "dropping output from stale watch");
            return;
        }

        match output {
            LocationOutput::Position(position) => {
                let vehicle = model.identity.vehicle_id.clone();
                let update = model.location.on_sample(watch, position, vehicle.as_ref());
                if let Some(position) = model.location.last_position() {
                    model.device_location = Some(position);
                    model.location_permission = PermissionState::Granted;
                }
                if let Some(update) = update {
                    if let Err(e) = Self::emit(&update, model, caps) {
                        debug!(error = %e, "location update not sent");
                    }
                }
            }
            LocationOutput::PermissionDenied => Self::permission_denied(model, caps),
            LocationOutput::Unavailable { reason } => {
                warn!(reason = %reason, "position unavailable");
            }
        }
    }

    fn position_fixed(output: LocationOutput, model: &mut Model, caps: &Capabilities) {
        match output {
            LocationOutput::Position(position) => match position.validate() {
                Ok(position) => {
                    model.device_location = Some(position);
                    model.location_permission = PermissionState::Granted;
                }
                Err(e) => warn!(error = %e, "discarding invalid position fix"),
            },
            LocationOutput::PermissionDenied => Self::permission_denied(model, caps),
            LocationOutput::Unavailable { reason } => Self::surface(
                model,
                AppError::new(ErrorKind::Location, "Position unavailable").with_internal(reason),
            ),
        }
    }

    fn permission_denied(model: &mut Model, caps: &Capabilities) {
        if let Some(watch) = model.location.stop() {
            caps.location.stop_watch(watch);
        }
        let error = model.location.permission_denied();
        model.location_permission = PermissionState::Denied;
        Self::surface(model, error);
    }

    // --- Channel ---

    fn reconnect(model: &mut Model, caps: &Capabilities) {
        match model.connection.reconnect() {
            Some(dial) => {
                Self::clear_connectivity_error(model);
                Self::dial(dial, caps);
            }
            None => debug!(state = ?model.connection.state(), "reconnect ignored"),
        }
    }

    fn channel_update(
        session: SessionId,
        output: ChannelOutput,
        model: &mut Model,
        caps: &Capabilities,
    ) {
        if !model.connection.accepts(session) {
            debug!(session = session.0, "dropping output from stale session");
            return;
        }

        match output {
            ChannelOutput::Opened => {
                if model.connection.on_opened(session) {
                    Self::clear_connectivity_error(model);
                    Self::announce_presence(model, caps);
                }
            }
            ChannelOutput::Frame(frame) => Self::receive(&frame, model, caps),
            ChannelOutput::Dropped { reason } => Self::dropped(session, &reason, model, caps),
            ChannelOutput::Closed => Self::dropped(session, "closed by server", model, caps),
        }
    }

    fn dropped(session: SessionId, reason: &str, model: &mut Model, caps: &Capabilities) {
        match model.connection.on_dropped(session, reason, generate_jitter()) {
            DropOutcome::Retry(dial) => Self::dial(dial, caps),
            DropOutcome::Exhausted(error) => Self::surface(model, error),
            DropOutcome::Stale => {}
        }
    }

    fn receive(frame: &Frame, model: &mut Model, caps: &Capabilities) {
        let inbound = match Inbound::decode(frame) {
            Ok(inbound) => inbound,
            Err(e) => {
                warn!(error = %e, "discarding inbound frame");
                return;
            }
        };
        if !model.connection.is_listening(inbound.kind()) {
            debug!(event = %frame.event, "no listener registered");
            return;
        }

        match inbound {
            Inbound::PendingRequests(list) => {
                if model.presence.is_online() {
                    model.pending.replace_all(list);
                    debug!(count = model.pending.len(), "pending list replaced");
                }
            }
            Inbound::NewEmergencyRequest(request) => {
                if model.presence.is_online() && model.pending.append(request) {
                    model.show_toast("New emergency request", ToastKind::Info);
                }
            }
            Inbound::ActiveAmbulances(list) => model.fleet.replace_all(list),
            Inbound::AmbulanceLocation(update) => match update.position().validate() {
                Ok(position) => {
                    model.fleet.upsert(update.vehicle_id, position);
                }
                Err(e) => warn!(vehicle_id = %update.vehicle_id, error = %e, "bad vehicle position"),
            },
            Inbound::RemoveAmbulance(vehicle) => {
                model.fleet.remove(&vehicle.vehicle_id);
            }
            Inbound::RequestAccepted(accepted) => Self::request_accepted(&accepted, model),
            Inbound::RequestError(payload) => Self::request_error(&payload.message, model),
            Inbound::AcceptedProgress(signal) => Self::progress(&signal, model),
            Inbound::AcceptedProgressDisable(signal) => Self::completion(&signal, model, caps),
            Inbound::RequestStatusUpdated(update) => Self::status_updated(&update, model, caps),
        }
    }

    /// A requester's own submission learns its server id from the first event naming it.
    fn adopt_server_id(server_id: Option<&RequestId>, model: &mut Model) {
        let Some(server_id) = server_id else {
            return;
        };
        if !model.is_requester() || model.requests.contains(server_id) {
            return;
        }
        let Some(local) = model
            .requests
            .active()
            .filter(|lifecycle| lifecycle.is_awaiting_server())
            .map(|lifecycle| lifecycle.id().clone())
        else {
            return;
        };
        if model.requests.rekey(&local, server_id.clone()) {
            debug!(from = %local, to = %server_id, "request id assigned by server");
        }
    }

    fn request_accepted(accepted: &RequestAccepted, model: &mut Model) {
        Self::adopt_server_id(accepted.request_id.as_ref(), model);

        let Some(id) = model.requests.resolve(accepted.request_id.as_ref()) else {
            if let Some(id) = &accepted.request_id {
                model.pending.remove(id);
            }
            return;
        };

        let responder = model.is_responder();
        let ours = model.identity.vehicle_id.clone();
        let Some(lifecycle) = model.requests.get_mut(&id) else {
            return;
        };
        let had_pending_accept = lifecycle.pending_accept().is_some();
        if responder && !had_pending_accept && ours.as_ref() != Some(&accepted.ambulance_id) {
            debug!(request_id = %id, "assignment for another vehicle");
            return;
        }

        match lifecycle.apply_assignment(&accepted.ambulance_id) {
            Ok(()) => {
                lifecycle.set_eta(accepted.eta_text());
                model.pending.remove(&id);
                if !responder {
                    model.show_toast(
                        format!("Ambulance {} is on the way", accepted.ambulance_id),
                        ToastKind::Success,
                    );
                } else if had_pending_accept {
                    model.show_toast("Request accepted", ToastKind::Success);
                }
            }
            Err(error) if error.kind == ErrorKind::Conflict => {
                model.requests.remove(&id);
                model.pending.remove(&id);
                Self::surface(model, error);
            }
            // Arrived after a cancel or a later status; the request has moved on.
            Err(e) => warn!(request_id = %id, error = %e, "ignoring stale assignment"),
        }
    }

    fn request_error(message: &str, model: &mut Model) {
        if let Some(id) = model.requests.active_id().cloned() {
            if let Some(lifecycle) = model.requests.get_mut(&id) {
                if let Some(error) = lifecycle.reject_accept(message) {
                    model.requests.remove(&id);
                    Self::surface(model, error);
                    return;
                }
                if lifecycle.is_awaiting_server() {
                    model.requests.remove(&id);
                    let text = match message.trim() {
                        "" => "Your request could not be submitted.",
                        text => text,
                    };
                    Self::surface(model, AppError::conflict(text));
                    return;
                }
            }
        }

        warn!(server_message = %message, "request error from server");
        let text = match message.trim() {
            "" => "Something went wrong with the request.",
            text => text,
        };
        model.show_toast(text, ToastKind::Error);
    }

    fn progress(signal: &ProgressSignal, model: &mut Model) {
        Self::adopt_server_id(signal.request_id.as_ref(), model);
        if let Some(id) = &signal.request_id {
            model.pending.remove(id);
        }
        let Some(id) = model.requests.resolve(signal.request_id.as_ref()) else {
            return;
        };
        let Some(lifecycle) = model.requests.get_mut(&id) else {
            return;
        };
        match lifecycle.apply_remote_status(RequestStatus::InProgress, None) {
            Ok(change) if change.is_noop() => {}
            Ok(_) => {
                info!(request_id = %id, "request in progress");
                model.show_toast("Ride in progress", ToastKind::Info);
            }
            Err(e) => warn!(request_id = %id, error = %e, "ignoring progress signal"),
        }
    }

    fn completion(signal: &ProgressSignal, model: &mut Model, caps: &Capabilities) {
        Self::adopt_server_id(signal.request_id.as_ref(), model);
        if let Some(id) = &signal.request_id {
            model.pending.remove(id);
        }
        let Some(id) = model.requests.resolve(signal.request_id.as_ref()) else {
            return;
        };
        let Some(lifecycle) = model.requests.get_mut(&id) else {
            return;
        };
        match lifecycle.apply_remote_status(RequestStatus::Completed, None) {
            Ok(change) if change.is_noop() => {}
            Ok(change) => Self::completed(&id, &change, model, caps),
            Err(e) => warn!(request_id = %id, error = %e, "ignoring completion signal"),
        }
    }

    fn status_updated(update: &StatusUpdate, model: &mut Model, caps: &Capabilities) {
        Self::adopt_server_id(Some(&update.request_id), model);
        model.pending.update_status(&update.request_id, update.status);

        let id = update.request_id.clone();
        let Some(lifecycle) = model.requests.get_mut(&id) else {
            return;
        };
        match lifecycle.apply_remote_status(update.status, update.vehicle_id.as_ref()) {
            Ok(change) if change.is_noop() => {}
            Ok(change) => match change.to {
                RequestStatus::Completed => Self::completed(&id, &change, model, caps),
                RequestStatus::Cancelled => {
                    info!(request_id = %id, "request cancelled");
                    model.show_toast("The request was cancelled", ToastKind::Warning);
                }
                to => debug!(request_id = %id, %to, "request status updated"),
            },
            Err(error) if error.kind == ErrorKind::Conflict => {
                model.requests.remove(&id);
                Self::surface(model, error);
            }
            Err(e) => warn!(request_id = %id, error = %e, "ignoring status update"),
        }
    }

    /// A finished trip frees the vehicle; its responder goes offline.
    fn completed(id: &RequestId, change: &StatusChange, model: &mut Model, caps: &Capabilities) {
        info!(request_id = %id, "request completed");
        model.show_toast("Trip completed", ToastKind::Success);

        let ours = model.identity.vehicle_id.clone();
        let released_ours = ours.is_some() && change.released == ours;
        if !model.is_responder() || !released_ours || !model.presence.is_online() {
            return;
        }
        match model.presence.set(Presence::Offline, ours.as_ref()) {
            Ok(change) => Self::apply_presence_change(&change, model, caps),
            Err(e) => Self::surface(model, e),
        }
    }

    // --- User actions ---

    fn submit_emergency(draft: &RequestDraft, model: &mut Model, caps: &Capabilities) {
        if !model.is_requester() {
            Self::surface(
                model,
                AppError::new(ErrorKind::InvalidState, "Only requesters can ask for help"),
            );
            return;
        }
        if model.requests.has_open_active() {
            Self::surface(
                model,
                AppError::validation("You already have an active request."),
            );
            return;
        }

        let (lifecycle, outbound) = match RequestLifecycle::submit(
            draft,
            model.identity.user_id.as_ref(),
            model.device_location,
        ) {
            Ok(submitted) => submitted,
            Err(e) => {
                Self::surface(model, e);
                return;
            }
        };
        if let Err(e) = Self::emit(&outbound, model, caps) {
            Self::surface(model, e);
            return;
        }

        if let Some(previous) = model.requests.active_id().cloned() {
            model.requests.remove(&previous);
        }
        info!(
            request_id = %lifecycle.id(),
            critical_level = lifecycle.request().critical_level.as_str(),
            "emergency request submitted"
        );
        model.requests.track(lifecycle);
        model.show_toast("Help request sent", ToastKind::Success);
    }

    fn accept_request(
        request_id: &RequestId,
        model: &mut Model,
        caps: &Capabilities,
    ) -> Result<(), AppError> {
        if !model.is_responder() {
            return Err(AppError::new(
                ErrorKind::InvalidState,
                "Only responders can accept requests",
            ));
        }
        let vehicle = model.identity.vehicle_id.clone().ok_or_else(|| {
            AppError::validation("Vehicle details are still loading. Try again in a moment.")
        })?;
        model.connection.ensure_connected()?;

        if let Some(engaged) = model.requests.engagement_of(&vehicle) {
            if engaged.id() != request_id {
                return Err(
                    AppError::conflict("Finish your current request before accepting another.")
                        .with_context("active_request_id", engaged.id().to_string()),
                );
            }
        }

        let now_ms = model.now_ms;
        let outbound = if let Some(lifecycle) = model.requests.get_mut(request_id) {
            lifecycle.accept(&vehicle, now_ms)?
        } else {
            let request = model.pending.get(request_id).cloned().ok_or_else(|| {
                AppError::new(ErrorKind::NotFound, "Request not found")
                    .with_context("request_id", request_id.to_string())
            })?;
            let mut lifecycle = RequestLifecycle::from_server(request)?;
            let outbound = lifecycle.accept(&vehicle, now_ms)?;
            model.requests.track(lifecycle);
            outbound
        };

        info!(request_id = %request_id, vehicle_id = %vehicle, "accepting request");
        Self::emit(&outbound, model, caps)
    }

    fn cancel_request(model: &mut Model, caps: &Capabilities) -> Result<(), AppError> {
        model.connection.ensure_connected()?;
        let lifecycle = model
            .requests
            .active_mut()
            .ok_or_else(|| AppError::new(ErrorKind::NotFound, "No active request to cancel"))?;
        let outbound = lifecycle.cancel()?;
        let id = lifecycle.id().clone();
        model.pending.remove(&id);
        info!(request_id = %id, "request cancelled");
        Self::emit(&outbound, model, caps)
    }

    fn refresh_pending(model: &mut Model, caps: &Capabilities) {
        if !model.is_responder() || !model.presence.is_online() {
            debug!("pending list is only fetched while online");
            return;
        }
        if let Err(e) = Self::emit(&Outbound::GetPendingRequests, model, caps) {
            Self::surface(model, e);
        }
    }
}

impl crux_core::App for App {
    type Event = Event;
    type Model = Model;
    type ViewModel = ViewModel;
    type Capabilities = Capabilities;

    #[instrument(skip_all, fields(event = event.name()))]
    fn update(&self, event: Event, model: &mut Model, caps: &Capabilities) {
        if let Event::Tick { now_ms } = event {
            model.now_ms = now_ms;
        } else {
            model.update_timestamp();
        }

        match event {
            Event::Configure { json } => Self::configure(&json, model),
            Event::ProfileLoaded {
                user_id,
                user_type,
                vehicle_id,
            } => Self::profile_loaded(&user_id, &user_type, vehicle_id, model, caps),
            Event::SessionExpired => Self::session_expired(model, caps),
            Event::Mount { role } => Self::mount(role, model, caps),
            Event::Unmount => Self::teardown(model, caps),
            Event::Tick { now_ms } => Self::tick(now_ms, model),

            Event::TogglePresence => Self::toggle_presence(model, caps),
            Event::Reconnect => Self::reconnect(model, caps),
            Event::SubmitEmergency(draft) => Self::submit_emergency(&draft, model, caps),
            Event::AcceptRequest { request_id } => {
                if let Err(e) = Self::accept_request(&request_id, model, caps) {
                    Self::surface(model, e);
                }
            }
            Event::CancelRequest => {
                if let Err(e) = Self::cancel_request(model, caps) {
                    Self::surface(model, e);
                }
            }
            Event::DismissRequest { request_id } => {
                if let Err(e) = model.requests.dismiss(&request_id) {
                    Self::surface(model, e);
                }
            }
            Event::RefreshPendingRequests => Self::refresh_pending(model, caps),
            Event::DismissError => model.clear_error(),
            Event::DismissToast => model.clear_toast(),

            Event::ChannelUpdate { session, output } => {
                Self::channel_update(session, output, model, caps);
            }
            Event::LocationSample { watch, output } => {
                Self::location_sample(watch, output, model, caps);
            }
            Event::PositionFixed(output) => Self::position_fixed(output, model, caps),
            Event::PresenceRestored(result) => Self::presence_restored(*result, model, caps),
            Event::PresencePersisted(result) => Self::presence_persisted(*result, model),
        }

        caps.render.render();
    }

    fn view(&self, model: &Model) -> ViewModel {
        ViewModel::build(model)
    }
}
